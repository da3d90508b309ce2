//! List query: exact-match filters, optional date range, optional sort

use crate::models::{Fields, SortKey, Value};

/// Half-open range over a timestamp field: `from <= value < until`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DateRange {
    pub field: String,
    pub from: Option<String>,
    pub until: Option<String>,
}

impl DateRange {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            from: None,
            until: None,
        }
    }

    fn contains(&self, value: Option<&Value>) -> bool {
        let Some(value) = value.and_then(Value::as_str) else {
            return false;
        };
        self.from.as_deref().map_or(true, |from| value >= from)
            && self.until.as_deref().map_or(true, |until| value < until)
    }
}

/// Every key/value pair must match; an empty filter matches everything
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub equals: Fields,
    pub range: Option<DateRange>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.range.is_none()
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        let equal = self
            .equals
            .iter()
            .all(|(k, expected)| fields.get(k).is_some_and(|v| v.matches(expected)));

        equal
            && self
                .range
                .as_ref()
                .map_or(true, |range| range.contains(fields.get(&range.field)))
    }
}

/// Options applied to a find
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<SortKey>,
}
