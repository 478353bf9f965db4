//! HTTP endpoints

use crate::record::Record;
use serde_json::{Map, Value};

/// Type tag of HTTP endpoint records
pub const TYPE: &str = "http-endpoint";

/// Create a plain HTTP endpoint record.
///
/// `root` defaults to `/` when empty and is prefixed with `/` otherwise.
pub fn create_record(name: impl Into<String>, host: &str, port: u16, root: &str) -> Record {
    create_record_with_ssl(name, false, host, port, root, Map::new())
}

/// Create an HTTP endpoint record with explicit TLS flag and metadata.
pub fn create_record_with_ssl(
    name: impl Into<String>,
    ssl: bool,
    host: &str,
    port: u16,
    root: &str,
    metadata: Map<String, Value>,
) -> Record {
    let root = normalize_root(root);
    let scheme = if ssl { "https" } else { "http" };
    let endpoint = format!("{}://{}:{}{}", scheme, host, port, root);

    Record::new(name)
        .with_type(TYPE)
        .with_location("host", host)
        .with_location("port", port)
        .with_location("root", root.as_str())
        .with_location("ssl", ssl)
        .with_location("endpoint", endpoint)
        .with_metadata_map(metadata)
}

fn normalize_root(root: &str) -> String {
    if root.is_empty() {
        "/".to_string()
    } else if root.starts_with('/') {
        root.to_string()
    } else {
        format!("/{}", root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_endpoint_record() {
        let record = create_record("catalog", "localhost", 8080, "api");

        assert_eq!(record.service_type, TYPE);
        assert_eq!(record.endpoint(), Some("http://localhost:8080/api"));
        assert_eq!(record.location["host"], "localhost");
        assert_eq!(record.location["port"], 8080);
        assert_eq!(record.location["root"], "/api");
        assert_eq!(record.location["ssl"], false);
    }

    #[test]
    fn test_https_endpoint_record() {
        let mut metadata = Map::new();
        metadata.insert("version".into(), json!("2"));

        let record = create_record_with_ssl("catalog", true, "example.com", 443, "", metadata);

        assert_eq!(record.endpoint(), Some("https://example.com:443/"));
        assert_eq!(record.metadata["version"], "2");
    }
}
