//! Document mapper: wire bodies and query strings into validated documents
//!
//! Everything here runs before the store is touched. A body that fails any
//! check produces a `ValidationError` and no storage call is made.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Map;

use super::document::{DocumentId, Patch, ID_FIELD, STORE_ID_FIELD};
use super::schema::{FieldDefault, FieldKind, LinkSpec, NullPolicy, ResourceSchema, ValidationMode};
use super::value::{Fields, Value};
use super::ValidationError;
use crate::storage::{DateRange, Filter};

/// Query parameter opening a date range (inclusive)
pub const START_DATE_PARAM: &str = "start_date";

/// Query parameter closing a date range (inclusive of the whole day)
pub const END_DATE_PARAM: &str = "end_date";

/// Render an instant the way timestamps are stored.
///
/// Fixed width UTC with millisecond precision, so stored timestamps order
/// correctly as plain strings.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Maps bodies and filters for one resource schema
pub struct Mapper<'a> {
    schema: &'a ResourceSchema,
    nulls: NullPolicy,
}

impl<'a> Mapper<'a> {
    pub fn new(schema: &'a ResourceSchema, nulls: NullPolicy) -> Self {
        Self { schema, nulls }
    }

    /// Validate a create body into the fields to insert.
    ///
    /// Required fields must be present, declared fields must match their
    /// kind, absent optional fields stay absent unless the schema declares a
    /// default.
    pub fn create_fields(&self, body: serde_json::Value) -> Result<Fields, ValidationError> {
        let mut object = body_object(body)?;
        check_field_names(&object)?;
        reject_store_ids(&object)?;

        let mut fields = Fields::new();
        for spec in &self.schema.fields {
            let raw = object.remove(spec.name);
            match raw {
                Some(serde_json::Value::Null) | None if spec.required => {
                    return Err(ValidationError::MissingField {
                        field: spec.name.to_owned(),
                    });
                }
                Some(serde_json::Value::Null) if self.nulls == NullPolicy::Reject => {
                    return Err(ValidationError::TypeMismatch {
                        field: spec.name.to_owned(),
                        expected: spec.kind.expected(),
                    });
                }
                Some(serde_json::Value::Null) | None => {
                    if let Some(default) = spec.default {
                        fields.insert(spec.name.to_owned(), default_value(default));
                    }
                }
                Some(raw) => {
                    let value = check_kind(spec.name, spec.kind, Value::from(raw))?;
                    fields.insert(spec.name.to_owned(), value);
                }
            }
        }

        for (key, raw) in object {
            match self.schema.mode {
                ValidationMode::Strict => return Err(ValidationError::UnknownField { field: key }),
                ValidationMode::Permissive => {
                    fields.insert(key, Value::from(raw));
                }
            }
        }

        Ok(fields)
    }

    /// Validate an update body into a partial update.
    ///
    /// Only fields present in the body change. Under `NullPolicy::Unset` an
    /// optional field sent as `null` is removed; required fields can never be
    /// removed.
    pub fn patch(&self, body: serde_json::Value) -> Result<Patch, ValidationError> {
        let object = body_object(body)?;
        check_field_names(&object)?;
        reject_store_ids(&object)?;

        let mut patch = Patch::default();
        for (key, raw) in object {
            let Some(spec) = self.schema.spec(&key) else {
                match self.schema.mode {
                    ValidationMode::Strict => return Err(ValidationError::UnknownField { field: key }),
                    ValidationMode::Permissive => {
                        patch.set.insert(key, Value::from(raw));
                        continue;
                    }
                }
            };

            if raw.is_null() {
                if spec.required || self.nulls == NullPolicy::Reject {
                    return Err(ValidationError::TypeMismatch {
                        field: key,
                        expected: spec.kind.expected(),
                    });
                }
                patch.unset.push(key);
                continue;
            }

            let value = check_kind(spec.name, spec.kind, Value::from(raw))?;
            patch.set.insert(key, value);
        }

        if patch.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        Ok(patch)
    }

    /// Build an exact-match filter from query parameters.
    ///
    /// Values are coerced by the declared field kind, so `?age=3` matches the
    /// integer 3 rather than the string "3".
    pub fn filter(&self, params: &BTreeMap<String, String>) -> Result<Filter, ValidationError> {
        let mut filter = Filter::default();

        for (key, raw) in params {
            check_field_name(key)?;
            if let Some(range_field) = self.schema.date_range {
                if key == START_DATE_PARAM || key == END_DATE_PARAM {
                    let date = parse_date(key, raw)?;
                    let range = filter.range.get_or_insert_with(|| DateRange::new(range_field));
                    if key == START_DATE_PARAM {
                        range.from = Some(day_start(date));
                    } else {
                        // end_date covers the whole day: stop before the next midnight
                        let next = date.succ_opt().ok_or_else(|| ValidationError::InvalidFormat {
                            field: key.clone(),
                            reason: "date out of range",
                        })?;
                        range.until = Some(day_start(next));
                    }
                    continue;
                }
            }

            let value = match self.schema.spec(key) {
                Some(spec) => filter_value(key, spec.kind, raw)?,
                None => match self.schema.mode {
                    ValidationMode::Strict => {
                        return Err(ValidationError::UnknownField { field: key.clone() })
                    }
                    ValidationMode::Permissive => Value::String(raw.clone()),
                },
            };
            filter.equals.insert(key.clone(), value);
        }

        Ok(filter)
    }

    /// Extract the identifier a link operation adds.
    pub fn link_target(&self, link: &LinkSpec, body: serde_json::Value) -> Result<Value, ValidationError> {
        let mut object = body_object(body)?;
        match object.remove(link.body_key) {
            None | Some(serde_json::Value::Null) => Err(ValidationError::MissingField {
                field: link.body_key.to_owned(),
            }),
            Some(raw) => check_kind(link.body_key, FieldKind::Id, Value::from(raw)),
        }
    }
}

/// Parse a wire identifier, rejecting malformed input before any store call.
pub fn parse_id(raw: &str) -> Result<DocumentId, ValidationError> {
    DocumentId::parse(raw)
}

fn body_object(body: serde_json::Value) -> Result<Map<String, serde_json::Value>, ValidationError> {
    match body {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ValidationError::InvalidBody {
            reason: format!("expected a JSON object, got {}", Value::from(other).kind_name()),
        }),
    }
}

/// Reject names the store treats as operators (`$`), paths (`.`) or that
/// it cannot hold (NUL).
fn check_field_name(name: &str) -> Result<(), ValidationError> {
    if name.starts_with('$') || name.contains('.') || name.contains('\0') {
        return Err(ValidationError::ReservedFieldName {
            field: name.to_owned(),
        });
    }
    Ok(())
}

/// Check every key of a body, including keys of nested objects.
fn check_field_names(object: &Map<String, serde_json::Value>) -> Result<(), ValidationError> {
    for (key, value) in object {
        check_field_name(key)?;
        check_nested_names(value)?;
    }
    Ok(())
}

fn check_nested_names(value: &serde_json::Value) -> Result<(), ValidationError> {
    match value {
        serde_json::Value::Object(map) => check_field_names(map),
        serde_json::Value::Array(items) => items.iter().try_for_each(check_nested_names),
        _ => Ok(()),
    }
}

fn reject_store_ids(object: &Map<String, serde_json::Value>) -> Result<(), ValidationError> {
    for key in [ID_FIELD, STORE_ID_FIELD] {
        if object.contains_key(key) {
            return Err(ValidationError::ImmutableField {
                field: key.to_owned(),
            });
        }
    }
    Ok(())
}

fn default_value(default: FieldDefault) -> Value {
    match default {
        FieldDefault::Now => Value::String(format_timestamp(Utc::now())),
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ValidationError::InvalidFormat {
        field: field.to_owned(),
        reason: "expected a date in YYYY-MM-DD format",
    })
}

fn parse_timestamp(field: &str, raw: &str) -> Result<String, ValidationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| format_timestamp(at.with_timezone(&Utc)))
        .map_err(|_| ValidationError::InvalidFormat {
            field: field.to_owned(),
            reason: "expected an RFC 3339 timestamp",
        })
}

fn day_start(date: NaiveDate) -> String {
    format_timestamp(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Check one value against a declared kind, normalizing where the kind has a
/// canonical stored form.
fn check_kind(field: &str, kind: FieldKind, value: Value) -> Result<Value, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        field: field.to_owned(),
        expected: kind.expected(),
    };

    match (kind, value) {
        (FieldKind::String, v @ Value::String(_)) => Ok(v),
        (FieldKind::Integer, v @ Value::Int(_)) => Ok(v),
        (FieldKind::Integer, Value::Float(f))
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
        {
            Ok(Value::Int(f as i64))
        }
        (FieldKind::Number, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (FieldKind::Boolean, v @ Value::Bool(_)) => Ok(v),
        (FieldKind::Date, Value::String(s)) => {
            parse_date(field, &s)?;
            Ok(Value::String(s))
        }
        (FieldKind::Timestamp, Value::String(s)) => parse_timestamp(field, &s).map(Value::String),
        (FieldKind::Id, Value::String(s)) => Ok(Value::String(DocumentId::parse(&s)?.to_string())),
        (FieldKind::Object, v @ Value::Object(_)) => Ok(v),
        (FieldKind::List(item), Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| check_kind(&format!("{}[{}]", field, i), *item, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Err(mismatch()),
    }
}

/// Coerce a query string value by the declared kind. Array fields filter by
/// membership, so the raw value is parsed as the element kind.
fn filter_value(field: &str, kind: FieldKind, raw: &str) -> Result<Value, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        field: field.to_owned(),
        expected: kind.expected(),
    };

    match kind {
        FieldKind::String => Ok(Value::String(raw.to_owned())),
        FieldKind::Integer => raw.parse::<i64>().map(Value::Int).map_err(|_| mismatch()),
        FieldKind::Number => match raw.parse::<i64>() {
            Ok(i) => Ok(Value::Int(i)),
            Err(_) => raw.parse::<f64>().map(Value::Float).map_err(|_| mismatch()),
        },
        FieldKind::Boolean => raw.parse::<bool>().map(Value::Bool).map_err(|_| mismatch()),
        FieldKind::Date | FieldKind::Timestamp | FieldKind::Id => {
            check_kind(field, kind, Value::String(raw.to_owned()))
        }
        FieldKind::List(item) => filter_value(field, *item, raw),
        FieldKind::Object => Err(ValidationError::NotFilterable {
            field: field.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schema::{self, FieldSpec};
    use serde_json::json;

    fn children() -> ResourceSchema {
        schema::children()
    }

    #[test]
    fn create_keeps_input_fields() {
        let schema = children();
        let fields = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({"name": "Ana", "age": 3}))
            .unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields["name"], Value::from("Ana"));
        assert_eq!(fields["age"], Value::Int(3));
    }

    #[test]
    fn create_requires_declared_fields() {
        let schema = children();
        let err = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({"age": 3}))
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "name".into() });
    }

    #[test]
    fn create_rejects_type_mismatch() {
        let schema = children();
        let err = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({"name": "Ana", "age": "three"}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { ref field, .. } if field == "age"));
    }

    #[test]
    fn create_checks_list_items() {
        let schema = children();
        let err = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({"name": "Ana", "allergies": ["nuts", 4]}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { ref field, .. } if field == "allergies[1]"));
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let schema = children();
        let err = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({"name": "Ana", "shoe_size": 24}))
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownField { field: "shoe_size".into() });
    }

    #[test]
    fn permissive_mode_passes_unknown_fields_verbatim() {
        let schema = schema::staff();
        let fields = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({"name": "Bo", "role": "teacher", "languages": ["en", "pt"]}))
            .unwrap();
        assert_eq!(
            fields["languages"],
            Value::Array(vec!["en".into(), "pt".into()])
        );
    }

    #[test]
    fn operator_and_path_names_are_rejected_on_create() {
        let schema = schema::staff();
        let mapper = Mapper::new(&schema, NullPolicy::Unset);
        let bodies = [
            json!({"name": "Bo", "role": "cook", "$set": {"x": 1}}),
            json!({"name": "Bo", "role": "cook", "a.b": 1}),
            json!({"name": "Bo", "role": "cook", "nul\u{0}key": 1}),
            json!({"name": "Bo", "role": "cook", "prefs": {"$gt": ""}}),
            json!({"name": "Bo", "role": "cook", "shifts": [{"day.of": "mon"}]}),
        ];
        for body in bodies {
            let err = mapper.create_fields(body.clone()).unwrap_err();
            assert!(
                matches!(err, ValidationError::ReservedFieldName { .. }),
                "{body} gave {err:?}"
            );
        }
    }

    #[test]
    fn declared_object_fields_are_checked_too() {
        let schema = schema::activities();
        let err = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({
                "child_id": "65f1c0a2b3d4e5f6a7b8c9d0",
                "type": "meal",
                "details": {"$where": "true"}
            }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::ReservedFieldName { .. }));
    }

    #[test]
    fn dotted_patch_keys_cannot_reach_declared_fields() {
        let schema = schema::staff();
        let mapper = Mapper::new(&schema, NullPolicy::Unset);
        for body in [json!({"name.first": "x"}), json!({"$rename": {"name": "n"}})] {
            let err = mapper.patch(body).unwrap_err();
            assert!(matches!(err, ValidationError::ReservedFieldName { .. }));
        }
    }

    #[test]
    fn operator_filters_are_rejected() {
        let schema = schema::staff();
        let mapper = Mapper::new(&schema, NullPolicy::Unset);
        for key in ["$where", "name.first", "$or"] {
            let mut params = BTreeMap::new();
            params.insert(key.to_string(), "sleep(5000) || true".to_string());
            let err = mapper.filter(&params).unwrap_err();
            assert_eq!(err, ValidationError::ReservedFieldName { field: key.into() });
        }
    }

    #[test]
    fn clients_cannot_set_identifiers() {
        let schema = schema::staff();
        let mapper = Mapper::new(&schema, NullPolicy::Unset);
        for key in ["id", "_id"] {
            let mut body = json!({"name": "Bo", "role": "cook"});
            body[key] = json!("65f1c0a2b3d4e5f6a7b8c9d0");
            let err = mapper.create_fields(body).unwrap_err();
            assert!(matches!(err, ValidationError::ImmutableField { .. }));
        }
    }

    #[test]
    fn optional_nulls_are_omitted_not_stored() {
        let schema = children();
        let fields = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({"name": "Ana", "notes": null}))
            .unwrap();
        assert!(!fields.contains_key("notes"));

        let err = Mapper::new(&schema, NullPolicy::Reject)
            .create_fields(json!({"name": "Ana", "notes": null}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn declared_defaults_fill_absent_fields() {
        let schema = schema::activities();
        let fields = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({
                "child_id": "65f1c0a2b3d4e5f6a7b8c9d0",
                "type": "sleep",
                "details": {"duration_minutes": 60}
            }))
            .unwrap();
        let created_at = fields["created_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(created_at).is_ok());
        assert!(created_at.ends_with('Z'));
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        let schema = schema::activities();
        let fields = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!({
                "child_id": "65f1c0a2b3d4e5f6a7b8c9d0",
                "type": "meal",
                "details": {},
                "created_at": "2024-03-01T10:00:00+02:00"
            }))
            .unwrap();
        assert_eq!(fields["created_at"], Value::from("2024-03-01T08:00:00.000Z"));
    }

    #[test]
    fn patch_only_carries_present_fields() {
        let schema = children();
        let patch = Mapper::new(&schema, NullPolicy::Unset)
            .patch(json!({"group": "Bees"}))
            .unwrap();
        assert_eq!(patch.set.len(), 1);
        assert!(patch.unset.is_empty());
    }

    #[test]
    fn patch_null_follows_policy() {
        let schema = children();
        let patch = Mapper::new(&schema, NullPolicy::Unset)
            .patch(json!({"notes": null}))
            .unwrap();
        assert_eq!(patch.unset, vec!["notes".to_string()]);

        let err = Mapper::new(&schema, NullPolicy::Reject)
            .patch(json!({"notes": null}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn patch_cannot_remove_required_fields() {
        let schema = children();
        let err = Mapper::new(&schema, NullPolicy::Unset)
            .patch(json!({"name": null}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { ref field, .. } if field == "name"));
    }

    #[test]
    fn empty_patch_is_rejected() {
        let schema = children();
        let err = Mapper::new(&schema, NullPolicy::Unset).patch(json!({})).unwrap_err();
        assert_eq!(err, ValidationError::EmptyUpdate);
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        let schema = children();
        let err = Mapper::new(&schema, NullPolicy::Unset)
            .create_fields(json!(["Ana"]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidBody { .. }));
    }

    #[test]
    fn filters_coerce_by_kind() {
        let schema = children();
        let mut params = BTreeMap::new();
        params.insert("age".to_string(), "3".to_string());
        params.insert("group".to_string(), "Bees".to_string());

        let filter = Mapper::new(&schema, NullPolicy::Unset).filter(&params).unwrap();
        assert_eq!(filter.equals["age"], Value::Int(3));
        assert_eq!(filter.equals["group"], Value::from("Bees"));
    }

    #[test]
    fn filters_reject_bad_values_and_unknown_fields() {
        let schema = children();
        let mapper = Mapper::new(&schema, NullPolicy::Unset);

        let mut params = BTreeMap::new();
        params.insert("age".to_string(), "three".to_string());
        assert!(matches!(mapper.filter(&params), Err(ValidationError::TypeMismatch { .. })));

        let mut params = BTreeMap::new();
        params.insert("colour".to_string(), "red".to_string());
        assert!(matches!(mapper.filter(&params), Err(ValidationError::UnknownField { .. })));
    }

    #[test]
    fn object_fields_are_not_filterable() {
        let schema = ResourceSchema::new("things", ValidationMode::Strict)
            .field(FieldSpec::optional("meta", FieldKind::Object));
        let mut params = BTreeMap::new();
        params.insert("meta".to_string(), "x".to_string());
        let err = Mapper::new(&schema, NullPolicy::Unset).filter(&params).unwrap_err();
        assert!(matches!(err, ValidationError::NotFilterable { .. }));
    }

    #[test]
    fn date_range_covers_whole_end_day() {
        let schema = schema::activities();
        let mut params = BTreeMap::new();
        params.insert("start_date".to_string(), "2024-03-01".to_string());
        params.insert("end_date".to_string(), "2024-03-02".to_string());

        let filter = Mapper::new(&schema, NullPolicy::Unset).filter(&params).unwrap();
        let range = filter.range.unwrap();
        assert_eq!(range.field, "created_at");
        assert_eq!(range.from.as_deref(), Some("2024-03-01T00:00:00.000Z"));
        assert_eq!(range.until.as_deref(), Some("2024-03-03T00:00:00.000Z"));
    }

    #[test]
    fn bad_range_dates_are_rejected() {
        let schema = schema::activities();
        let mut params = BTreeMap::new();
        params.insert("start_date".to_string(), "03/01/2024".to_string());
        let err = Mapper::new(&schema, NullPolicy::Unset).filter(&params).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn link_target_must_be_an_identifier() {
        let schema = children();
        let link = schema.find_link("link-supervisor").unwrap();
        let mapper = Mapper::new(&schema, NullPolicy::Unset);

        let value = mapper
            .link_target(link, json!({"supervisor_id": "65F1C0A2B3D4E5F6A7B8C9D0"}))
            .unwrap();
        assert_eq!(value, Value::from("65f1c0a2b3d4e5f6a7b8c9d0"));

        assert!(matches!(
            mapper.link_target(link, json!({})),
            Err(ValidationError::MissingField { .. })
        ));
        assert!(matches!(
            mapper.link_target(link, json!({"supervisor_id": "nope"})),
            Err(ValidationError::InvalidId { .. })
        ));
    }
}
