//! Record filters used by lookups

use crate::error::{DiscoveryError, Result};
use crate::record::Record;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Matches any value, as long as the key is present.
pub const WILDCARD: &str = "*";

/// Predicate form of a record filter
pub type RecordPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Selects records in lookups.
///
/// A JSON filter is a conjunction over its keys. `name`, `type`, `status`
/// and `registration` match the record fields; any other key matches the
/// metadata entry of that name, then the location entry. The value `"*"`
/// matches any present value. An empty filter matches every record.
#[derive(Clone)]
pub enum RecordFilter {
    /// Key/value conjunction
    Json(Map<String, Value>),

    /// Arbitrary predicate
    Predicate(RecordPredicate),
}

impl RecordFilter {
    /// Filter matching every record.
    pub fn all() -> Self {
        Self::Json(Map::new())
    }

    /// Filter on the record name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self::all().with("name", name.into())
    }

    /// Filter on the record type.
    pub fn by_type(service_type: impl Into<String>) -> Self {
        Self::all().with("type", service_type.into())
    }

    /// Filter from a JSON object. `null` matches every record.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Json(map)),
            Value::Null => Ok(Self::all()),
            other => Err(DiscoveryError::InvalidConfiguration(format!(
                "record filter must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Filter from a predicate.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Add a key/value condition.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self {
            Self::Json(mut map) => {
                map.insert(key, value);
                Self::Json(map)
            }
            Self::Predicate(predicate) => {
                Self::predicate(move |record| predicate(record) && field_matches(record, &key, &value))
            }
        }
    }

    /// Whether the record satisfies the filter.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Json(map) => map
                .iter()
                .all(|(key, expected)| field_matches(record, key, expected)),
            Self::Predicate(predicate) => predicate(record),
        }
    }

    /// Whether the filter constrains the status itself.
    pub(crate) fn mentions_status(&self) -> bool {
        matches!(self, Self::Json(map) if map.contains_key("status"))
    }
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Map<String, Value>> for RecordFilter {
    fn from(map: Map<String, Value>) -> Self {
        Self::Json(map)
    }
}

impl fmt::Debug for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(map) => f.debug_tuple("Json").field(map).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

fn field_matches(record: &Record, key: &str, expected: &Value) -> bool {
    match key {
        "name" => str_matches(Some(&record.name), expected),
        "type" => str_matches(Some(&record.service_type), expected),
        "status" => str_matches(Some(record.status.as_str()), expected),
        "registration" => str_matches(record.registration(), expected),
        _ => {
            value_matches(record.metadata.get(key), expected)
                || value_matches(record.location.get(key), expected)
        }
    }
}

fn str_matches(actual: Option<&str>, expected: &Value) -> bool {
    match actual {
        Some(actual) => is_wildcard(expected) || expected.as_str() == Some(actual),
        None => false,
    }
}

fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(actual) => is_wildcard(expected) || actual == expected,
        None => false,
    }
}

fn is_wildcard(value: &Value) -> bool {
    value.as_str() == Some(WILDCARD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Status;
    use serde_json::json;

    fn sample() -> Record {
        Record::new("inventory")
            .with_type("http-endpoint")
            .with_status(Status::Up)
            .with_location("port", 8080)
            .with_metadata("color", "red")
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(RecordFilter::all().matches(&sample()));
        assert!(RecordFilter::from_value(Value::Null).unwrap().matches(&sample()));
    }

    #[test]
    fn test_field_conditions() {
        let record = sample();

        assert!(RecordFilter::by_name("inventory").matches(&record));
        assert!(!RecordFilter::by_name("billing").matches(&record));
        assert!(RecordFilter::by_type("http-endpoint").matches(&record));
        assert!(RecordFilter::all().with("status", "UP").matches(&record));
        assert!(!RecordFilter::all().with("registration", "*").matches(&record));
    }

    #[test]
    fn test_metadata_then_location() {
        let record = sample();

        let filter = RecordFilter::from_value(json!({ "color": "red", "port": 8080 })).unwrap();
        assert!(filter.matches(&record));

        let filter = RecordFilter::from_value(json!({ "color": "blue" })).unwrap();
        assert!(!filter.matches(&record));

        // no coercion between strings and numbers
        assert!(!RecordFilter::all().with("port", "8080").matches(&record));
    }

    #[test]
    fn test_wildcard_requires_presence() {
        let record = sample();

        assert!(RecordFilter::all().with("color", WILDCARD).matches(&record));
        assert!(!RecordFilter::all().with("weight", WILDCARD).matches(&record));
    }

    #[test]
    fn test_predicate_filter() {
        let filter = RecordFilter::predicate(|r| r.name.starts_with("inv"));
        assert!(filter.matches(&sample()));

        let narrowed = filter.with("color", "blue");
        assert!(!narrowed.matches(&sample()));
    }

    #[test]
    fn test_rejects_non_object_filter() {
        assert!(matches!(
            RecordFilter::from_value(json!([1, 2])),
            Err(DiscoveryError::InvalidConfiguration(_))
        ));
    }
}
