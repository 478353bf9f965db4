//! Bridges to other discovery systems
//!
//! Importers pull services from elsewhere and publish them through a
//! [`ServicePublisher`]; exporters mirror local records outward.

use crate::error::Result;
use crate::record::Record;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Publication surface handed to importers
#[async_trait]
pub trait ServicePublisher: Send + Sync {
    /// Publish a record, returning it with its registration id.
    async fn publish(&self, record: Record) -> Result<Record>;

    /// Unpublish a record by registration id.
    async fn unpublish(&self, registration: &str) -> Result<()>;

    /// Replace a published record.
    async fn update(&self, record: Record) -> Result<Record>;
}

/// Imports services from an external system
#[async_trait]
pub trait ServiceImporter: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Start importing. The registry only keeps importers that started.
    async fn start(&self, publisher: Arc<dyn ServicePublisher>, configuration: Value) -> Result<()>;

    /// Stop importing.
    async fn close(&self) {}
}

/// Exports local records to an external system
///
/// Notifications are delivered in order on a task dedicated to the
/// exporter; failures are logged and do not stop later notifications.
#[async_trait]
pub trait ServiceExporter: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Start exporting, given the records published so far.
    async fn init(&self, records: Vec<Record>, configuration: Value) -> Result<()>;

    /// A record was published.
    async fn on_publish(&self, record: Record) -> Result<()>;

    /// A record was unpublished.
    async fn on_unpublish(&self, registration: String) -> Result<()>;

    /// A record was updated. Only called when the registry forwards updates.
    async fn on_update(&self, _record: Record) -> Result<()> {
        Ok(())
    }

    /// Stop exporting. Called after every queued notification was delivered.
    async fn close(&self) {}
}
