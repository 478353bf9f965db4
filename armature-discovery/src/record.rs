//! Service records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lifecycle status of a published service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Available for consumption
    Up,

    /// Known to be unavailable
    Down,

    /// Deliberately withdrawn from lookups
    OutOfService,

    /// Not yet determined
    #[default]
    Unknown,
}

impl Status {
    /// Wire name of the status, as used in records and filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "UP",
            Status::Down => "DOWN",
            Status::OutOfService => "OUT_OF_SERVICE",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag of records created without one
pub const UNKNOWN_TYPE: &str = "unknown";

/// Description of a published service
///
/// The registration id is assigned by the registry on publication and
/// cannot be set by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Service name
    pub name: String,

    /// Service type tag, selects how references resolve the service
    #[serde(rename = "type")]
    pub service_type: String,

    /// Current status
    pub status: Status,

    /// Type-specific location (endpoint, host, port, address...)
    pub location: Map<String, Value>,

    /// Free-form metadata
    pub metadata: Map<String, Value>,

    registration: Option<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            name: String::new(),
            service_type: UNKNOWN_TYPE.to_string(),
            status: Status::Unknown,
            location: Map::new(),
            metadata: Map::new(),
            registration: None,
        }
    }
}

impl Record {
    /// Create a new, unpublished record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the service type
    pub fn with_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Add a location entry
    pub fn with_location(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.location.insert(key.into(), value.into());
        self
    }

    /// Replace the whole location
    pub fn with_location_map(mut self, location: Map<String, Value>) -> Self {
        self.location = location;
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the whole metadata map
    pub fn with_metadata_map(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Registration id, present once published.
    pub fn registration(&self) -> Option<&str> {
        self.registration.as_deref()
    }

    /// Whether the record carries a registration id.
    pub fn is_published(&self) -> bool {
        self.registration.is_some()
    }

    /// The `endpoint` location entry, if it is a string.
    pub fn endpoint(&self) -> Option<&str> {
        self.location.get("endpoint").and_then(Value::as_str)
    }

    pub(crate) fn set_registration(&mut self, registration: String) {
        self.registration = Some(registration);
    }
}
