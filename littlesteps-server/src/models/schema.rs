//! Resource schemas
//!
//! Each resource type declares its fields, their kinds, and whether unknown
//! fields are rejected (strict) or stored verbatim (permissive). The store
//! itself enforces nothing; these declarations are the only schema.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Unknown field policy for a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Undeclared fields are a validation error
    Strict,
    /// Undeclared fields are stored as sent
    Permissive,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!(
                "unknown validation mode '{}' (expected strict or permissive)",
                other
            )),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::Permissive => f.write_str("permissive"),
        }
    }
}

/// What an explicit `null` in a request body means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullPolicy {
    /// `null` removes an optional field (omits it on create)
    #[default]
    Unset,
    /// `null` is a type error for declared fields
    Reject,
}

impl FromStr for NullPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unset" => Ok(Self::Unset),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown null field policy '{}' (expected unset or reject)",
                other
            )),
        }
    }
}

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Calendar date, `YYYY-MM-DD`
    Date,
    /// RFC 3339 instant, normalized to UTC
    Timestamp,
    /// Identifier of another document, stored as its wire string
    Id,
    Object,
    List(&'static FieldKind),
}

impl FieldKind {
    /// Phrase used in type mismatch messages.
    pub fn expected(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::Date => "a date (YYYY-MM-DD)",
            Self::Timestamp => "an RFC 3339 timestamp",
            Self::Id => "an identifier",
            Self::Object => "an object",
            Self::List(_) => "an array",
        }
    }
}

/// Value filled in when an optional field is absent on create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    /// Current UTC time as a timestamp
    Now,
}

/// One declared field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<FieldDefault>,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Declared list ordering
#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: &'static str,
    pub order: SortOrder,
}

/// Identifier field that must point at an existing document
#[derive(Debug, Clone)]
pub struct Reference {
    pub field: &'static str,
    pub collection: &'static str,
}

/// Named operation adding an identifier to an array field without duplicates
#[derive(Debug, Clone)]
pub struct LinkSpec {
    /// Path segment, e.g. `link-supervisor`
    pub name: &'static str,
    /// Array field receiving the identifier
    pub field: &'static str,
    /// Body key carrying the identifier
    pub body_key: &'static str,
}

/// Schema of one resource type
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    /// Path segment and collection name
    pub name: &'static str,
    pub mode: ValidationMode,
    pub fields: Vec<FieldSpec>,
    pub sort: Option<SortKey>,
    /// Timestamp field filtered by `start_date` / `end_date`
    pub date_range: Option<&'static str>,
    pub references: Vec<Reference>,
    pub links: Vec<LinkSpec>,
}

impl ResourceSchema {
    pub fn new(name: &'static str, mode: ValidationMode) -> Self {
        Self {
            name,
            mode,
            fields: Vec::new(),
            sort: None,
            date_range: None,
            references: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn sorted_by(mut self, field: &'static str, order: SortOrder) -> Self {
        self.sort = Some(SortKey { field, order });
        self
    }

    pub fn date_range(mut self, field: &'static str) -> Self {
        self.date_range = Some(field);
        self
    }

    pub fn reference(mut self, field: &'static str, collection: &'static str) -> Self {
        self.references.push(Reference { field, collection });
        self
    }

    pub fn link(mut self, name: &'static str, field: &'static str, body_key: &'static str) -> Self {
        self.links.push(LinkSpec {
            name,
            field,
            body_key,
        });
        self
    }

    pub fn spec(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == field)
    }

    pub fn find_link(&self, name: &str) -> Option<&LinkSpec> {
        self.links.iter().find(|l| l.name == name)
    }
}

/// Children enrolled in the programme
pub fn children() -> ResourceSchema {
    ResourceSchema::new("children", ValidationMode::Strict)
        .field(FieldSpec::required("name", FieldKind::String))
        .field(FieldSpec::optional("age", FieldKind::Integer))
        .field(FieldSpec::optional("birthday", FieldKind::Date))
        .field(FieldSpec::optional("group", FieldKind::String))
        .field(FieldSpec::optional("allergies", FieldKind::List(&FieldKind::String)))
        .field(FieldSpec::optional("notes", FieldKind::String))
        .field(FieldSpec::optional("parent_ids", FieldKind::List(&FieldKind::Id)))
        .field(FieldSpec::optional("supervisor_ids", FieldKind::List(&FieldKind::Id)))
        .link("link-supervisor", "supervisor_ids", "supervisor_id")
        .link("link-parent", "parent_ids", "parent_id")
}

/// Staff members; extra profile fields are kept as sent
pub fn staff() -> ResourceSchema {
    ResourceSchema::new("staff", ValidationMode::Permissive)
        .field(FieldSpec::required("name", FieldKind::String))
        .field(FieldSpec::required("role", FieldKind::String))
        .field(FieldSpec::optional("email", FieldKind::String))
        .field(FieldSpec::optional("phone", FieldKind::String))
}

/// Logged activities (meals, naps, drawings) for one child
pub fn activities() -> ResourceSchema {
    ResourceSchema::new("activities", ValidationMode::Strict)
        .field(FieldSpec::required("child_id", FieldKind::Id))
        .field(FieldSpec::required("type", FieldKind::String))
        .field(FieldSpec::required("details", FieldKind::Object))
        .field(FieldSpec::optional("logged_by", FieldKind::Id))
        .field(FieldSpec::optional("created_at", FieldKind::Timestamp).with_default(FieldDefault::Now))
        .reference("child_id", "children")
        .sorted_by("created_at", SortOrder::Descending)
        .date_range("created_at")
}

/// Set of resource types served, keyed by name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<&'static str, Arc<ResourceSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The operational dataset: children, staff, activities.
    pub fn builtin() -> Self {
        Self::new()
            .register(children())
            .register(staff())
            .register(activities())
    }

    pub fn register(mut self, schema: ResourceSchema) -> Self {
        self.schemas.insert(schema.name, Arc::new(schema));
        self
    }

    /// Override validation modes: `default` applies to every resource not
    /// named in `overrides`.
    pub fn with_modes(
        mut self,
        default: Option<ValidationMode>,
        overrides: &BTreeMap<String, ValidationMode>,
    ) -> Self {
        for (name, schema) in self.schemas.iter_mut() {
            let mode = overrides.get(*name).copied().or(default);
            if let Some(mode) = mode {
                Arc::make_mut(schema).mode = mode;
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<ResourceSchema>> {
        self.schemas.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceSchema>> {
        self.schemas.values()
    }
}
