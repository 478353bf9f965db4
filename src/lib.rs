// Armature Service Kit - service discovery and circuit breaking for microservices
//
// Bundles the discovery registry and circuit breakers with configuration
// loading and logging setup.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{FileFormat, ServiceKitConfig, load_dotenv};
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};

// Re-export the component crates
pub use armature_circuit;
pub use armature_discovery;

/// Prelude for common imports
///
/// ```no_run
/// use servicekit::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServiceKitConfig::load(None)?;
///     config.logging.init();
///
///     let discovery = config.build_discovery();
///     let breakers = config.build_breakers();
///
///     let record = discovery
///         .publish(http_endpoint::create_record("catalog", "localhost", 8080, "/"))
///         .await?;
///     let breaker = breakers.get_or_create("catalog");
///     let _endpoint = breaker
///         .execute(|| async { Ok::<_, std::io::Error>(record.endpoint().map(str::to_string)) })
///         .await;
///
///     discovery.close().await;
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::config::ServiceKitConfig;
    pub use crate::logging::{LogConfig, LogFormat, LogLevel};
    pub use armature_circuit::{
        CircuitBreaker, CircuitBreakerError, CircuitBreakerOptions, CircuitBreakers, CircuitState,
        Promise,
    };
    pub use armature_discovery::{
        DiscoveryError, DiscoveryEvent, DiscoveryOptions, Record, RecordFilter, ServiceDiscovery,
        ServiceExporter, ServiceImporter, ServiceObject, ServicePublisher, ServiceReference,
        ServiceType, Status, data_source, event_bus_service, http_endpoint, message_source,
        service_type_fn,
    };
}
