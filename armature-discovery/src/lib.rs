//! Service Discovery for Armature
//!
//! A registry of service records with tracked, lazily resolved service
//! references and bridges to external discovery systems.
//!
//! ## Features
//!
//! - **Records** - Publish, unpublish, update and look up service records
//! - **Filters** - JSON key/value filters with `"*"` wildcards, or predicates
//! - **Service References** - Resolve once, share, release exactly once
//! - **Service Types** - Pluggable resolution keyed by record type
//! - **Bridges** - Importers and exporters for other discovery systems
//! - **Events** - Broadcast record and reference lifecycle events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_discovery::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
//!
//!     discovery.register_service_type(Arc::new(service_type_fn(
//!         http_endpoint::TYPE,
//!         |record, _config| Ok(Arc::new(record.endpoint().unwrap_or_default().to_string()) as ServiceObject),
//!     )));
//!
//!     // Publish a service
//!     let record = discovery
//!         .publish(http_endpoint::create_record("api", "localhost", 8080, "/"))
//!         .await?;
//!
//!     // Look it up and use it
//!     let found = discovery.get_record(RecordFilter::by_name("api")).await.unwrap();
//!     let reference = discovery.get_reference(&found)?;
//!     let endpoint = reference.get_as::<String>()?;
//!     println!("Found: {}", endpoint);
//!
//!     reference.release();
//!     discovery.unpublish(record.registration().unwrap()).await?;
//!     discovery.close().await;
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod discovery;
pub mod error;
pub mod events;
pub mod filter;
pub mod options;
pub mod record;
pub mod reference;
pub mod service_type;
pub mod store;
pub mod types;

pub use bridge::{ServiceExporter, ServiceImporter, ServicePublisher};
pub use discovery::ServiceDiscovery;
pub use error::{DiscoveryError, Result};
pub use events::DiscoveryEvent;
pub use filter::{RecordFilter, RecordPredicate, WILDCARD};
pub use options::DiscoveryOptions;
pub use record::{Record, Status, UNKNOWN_TYPE};
pub use reference::ServiceReference;
pub use service_type::{FnServiceType, ServiceObject, ServiceType, ServiceTypes, service_type_fn};
pub use store::{InMemoryRecordStore, RecordStore};
pub use types::{data_source, event_bus_service, http_endpoint, message_source};
