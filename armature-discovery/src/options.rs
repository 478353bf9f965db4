//! Registry options

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default registry name
pub const DEFAULT_NAME: &str = "service-discovery";

/// Default address for record lifecycle announcements
pub const DEFAULT_ANNOUNCE_ADDRESS: &str = "armature.discovery.announce";

/// Default address for reference usage events
pub const DEFAULT_USAGE_ADDRESS: &str = "armature.discovery.usage";

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Service discovery options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Registry name, used in logs and errors
    pub name: String,

    /// Address tagged on publish/unpublish/update events
    pub announce_address: String,

    /// Address tagged on bind/release events
    pub usage_address: String,

    /// Backend-specific configuration, passed to `RecordStore::init`
    pub backend_configuration: Value,

    /// Forward record updates to exporters
    pub notify_exporters_on_update: bool,

    /// Buffered events per subscriber before lagging
    pub event_capacity: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            announce_address: DEFAULT_ANNOUNCE_ADDRESS.to_string(),
            usage_address: DEFAULT_USAGE_ADDRESS.to_string(),
            backend_configuration: Value::Object(Default::default()),
            notify_exporters_on_update: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DiscoveryOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registry name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the announce address
    pub fn announce_address(mut self, address: impl Into<String>) -> Self {
        self.announce_address = address.into();
        self
    }

    /// Set the usage address
    pub fn usage_address(mut self, address: impl Into<String>) -> Self {
        self.usage_address = address.into();
        self
    }

    /// Set the backend configuration
    pub fn backend_configuration(mut self, configuration: Value) -> Self {
        self.backend_configuration = configuration;
        self
    }

    /// Forward record updates to exporters
    pub fn notify_exporters_on_update(mut self, notify: bool) -> Self {
        self.notify_exporters_on_update = notify;
        self
    }

    /// Set the event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = DiscoveryOptions::default();

        assert_eq!(options.name, DEFAULT_NAME);
        assert_eq!(options.announce_address, DEFAULT_ANNOUNCE_ADDRESS);
        assert_eq!(options.usage_address, DEFAULT_USAGE_ADDRESS);
        assert!(!options.notify_exporters_on_update);
        assert_eq!(options.backend_configuration, json!({}));
    }

    #[test]
    fn test_partial_deserialization() {
        let options: DiscoveryOptions =
            serde_json::from_value(json!({ "name": "edge", "notify_exporters_on_update": true })).unwrap();

        assert_eq!(options.name, "edge");
        assert!(options.notify_exporters_on_update);
        assert_eq!(options.usage_address, DEFAULT_USAGE_ADDRESS);
    }
}
