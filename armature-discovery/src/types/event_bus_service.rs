//! Services reachable through a message bus address

use crate::record::Record;

/// Type tag of event bus service records
pub const TYPE: &str = "event-bus-service";

/// Metadata key carrying the service interface name
pub const INTERFACE_KEY: &str = "service.interface";

/// Create a record for a service listening on `address` and implementing `interface`.
pub fn create_record(name: impl Into<String>, address: &str, interface: &str) -> Record {
    Record::new(name)
        .with_type(TYPE)
        .with_location("endpoint", address)
        .with_metadata(INTERFACE_KEY, interface)
}
