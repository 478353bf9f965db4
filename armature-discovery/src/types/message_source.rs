//! Message sources

use crate::record::Record;

/// Type tag of message source records
pub const TYPE: &str = "message-source";

/// Metadata key carrying the payload type
pub const MESSAGE_TYPE_KEY: &str = "message.type";

/// Create a record for messages published on `address`.
///
/// `message_type` names the payload type and is omitted when `None`.
pub fn create_record(name: impl Into<String>, address: &str, message_type: Option<&str>) -> Record {
    let record = Record::new(name)
        .with_type(TYPE)
        .with_location("endpoint", address);

    match message_type {
        Some(message_type) => record.with_metadata(MESSAGE_TYPE_KEY, message_type),
        None => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_source_record() {
        let record = create_record("ticks", "market.ticks", Some("Tick"));

        assert_eq!(record.service_type, TYPE);
        assert_eq!(record.endpoint(), Some("market.ticks"));
        assert_eq!(record.metadata[MESSAGE_TYPE_KEY], "Tick");

        let untyped = create_record("raw", "raw.bytes", None);
        assert!(untyped.metadata.is_empty());
    }
}
