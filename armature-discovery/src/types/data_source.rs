//! Data stores: JDBC, MongoDB and Redis
//!
//! The location map is passed through untouched (URL, host, database...).

use crate::record::Record;
use serde_json::{Map, Value};

/// Type tag of JDBC data source records
pub const JDBC_TYPE: &str = "jdbc";

/// Type tag of MongoDB data source records
pub const MONGO_TYPE: &str = "mongo";

/// Type tag of Redis data source records
pub const REDIS_TYPE: &str = "redis";

fn create(name: impl Into<String>, service_type: &str, location: Map<String, Value>, metadata: Map<String, Value>) -> Record {
    Record::new(name)
        .with_type(service_type)
        .with_location_map(location)
        .with_metadata_map(metadata)
}

/// Create a JDBC data source record.
pub fn jdbc_data_source(name: impl Into<String>, location: Map<String, Value>, metadata: Map<String, Value>) -> Record {
    create(name, JDBC_TYPE, location, metadata)
}

/// Create a MongoDB data source record.
pub fn mongo_data_source(name: impl Into<String>, location: Map<String, Value>, metadata: Map<String, Value>) -> Record {
    create(name, MONGO_TYPE, location, metadata)
}

/// Create a Redis data source record.
pub fn redis_data_source(name: impl Into<String>, location: Map<String, Value>, metadata: Map<String, Value>) -> Record {
    create(name, REDIS_TYPE, location, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_data_source_records() {
        let jdbc = jdbc_data_source(
            "orders-db",
            object(json!({ "url": "jdbc:postgresql://db/orders" })),
            object(json!({ "pool": 10 })),
        );
        assert_eq!(jdbc.service_type, JDBC_TYPE);
        assert_eq!(jdbc.location["url"], "jdbc:postgresql://db/orders");
        assert_eq!(jdbc.metadata["pool"], 10);

        let mongo = mongo_data_source("docs", object(json!({ "connection_string": "mongodb://db" })), Map::new());
        assert_eq!(mongo.service_type, MONGO_TYPE);

        let redis = redis_data_source("cache", object(json!({ "endpoint": "redis://cache:6379" })), Map::new());
        assert_eq!(redis.service_type, REDIS_TYPE);
        assert_eq!(redis.endpoint(), Some("redis://cache:6379"));
    }
}
