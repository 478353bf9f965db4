//! Integration tests for common service kit workflows.
//!
//! These tests verify that discovery, references and circuit breakers work
//! together the way applications use them.

use async_trait::async_trait;
use serde_json::json;
use servicekit::prelude::*;
use servicekit::{FileFormat, ServiceKitConfig};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Client handed out for HTTP endpoint records.
struct HttpClient {
    endpoint: String,
}

fn http_client_type(released: Arc<AtomicUsize>) -> Arc<dyn ServiceType> {
    Arc::new(
        service_type_fn(http_endpoint::TYPE, |record, _config| {
            let endpoint = record
                .endpoint()
                .ok_or_else(|| DiscoveryError::resolution(&record.name, "missing endpoint"))?;
            Ok(Arc::new(HttpClient {
                endpoint: endpoint.to_string(),
            }) as ServiceObject)
        })
        .on_release(move |_| {
            released.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

// =============================================================================
// Discovery Workflows
// =============================================================================

#[tokio::test]
async fn test_publish_lookup_consume_release() {
    let released = Arc::new(AtomicUsize::new(0));
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    discovery.register_service_type(http_client_type(released.clone()));

    let published = discovery
        .publish(
            http_endpoint::create_record("catalog", "localhost", 8080, "/api")
                .with_metadata("zone", "eu-west"),
        )
        .await
        .unwrap();

    // Lookup returns the published record, registration included
    let filter = RecordFilter::from_value(json!({ "name": "catalog", "zone": "*" })).unwrap();
    let found = discovery.get_record(filter).await.unwrap();
    assert_eq!(found, published);

    // Both calls share one client
    let reference = discovery.get_reference(&found).unwrap();
    let client = reference.get_as::<HttpClient>().unwrap();
    assert_eq!(client.endpoint, "http://localhost:8080/api");
    assert!(Arc::ptr_eq(&client, &reference.get_as::<HttpClient>().unwrap()));
    assert!(reference.is_holding(&client));

    assert!(discovery.release(&reference));
    assert_eq!(released.load(Ordering::SeqCst), 1);

    // A new reference resolves a fresh client
    let again = discovery.get_reference(&found).unwrap();
    let fresh = again.get_as::<HttpClient>().unwrap();
    assert!(!Arc::ptr_eq(&client, &fresh));

    discovery.close().await;
}

#[tokio::test]
async fn test_unpublish_is_not_repeatable() {
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    let record = discovery
        .publish(message_source::create_record("ticks", "market.ticks", Some("Tick")))
        .await
        .unwrap();
    let registration = record.registration().unwrap().to_string();

    discovery.unpublish(&registration).await.unwrap();
    let second = discovery.unpublish(&registration).await;

    assert!(matches!(second, Err(DiscoveryError::RecordNotFound(id)) if id == registration));
}

#[tokio::test]
async fn test_filters_by_metadata() {
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    for (name, color) in [("a", "red"), ("b", "blue")] {
        discovery
            .publish(Record::new(name).with_metadata("color", color))
            .await
            .unwrap();
    }

    let names = |records: Vec<Record>| records.into_iter().map(|r| r.name).collect::<Vec<_>>();

    assert_eq!(
        names(discovery.get_records(RecordFilter::all().with("color", "*")).await),
        vec!["a", "b"]
    );
    assert_eq!(
        names(discovery.get_records(RecordFilter::all().with("color", "red")).await),
        vec!["a"]
    );
    assert_eq!(names(discovery.get_records(RecordFilter::all()).await), vec!["a", "b"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_release_releases_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    discovery.register_service_type(http_client_type(released.clone()));

    let record = discovery
        .publish(http_endpoint::create_record("catalog", "localhost", 8080, "/"))
        .await
        .unwrap();
    let reference = discovery.get_reference(&record).unwrap();
    reference.get().unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let discovery = discovery.clone();
            let reference = reference.clone();
            tokio::spawn(async move { discovery.release(&reference) })
        })
        .collect();

    let mut unbound = 0;
    for task in tasks {
        if task.await.unwrap() {
            unbound += 1;
        }
    }

    assert_eq!(unbound, 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(discovery.bindings().is_empty());
}

/// Exporter recording what it was told, in order.
#[derive(Default)]
struct Mirror {
    log: Mutex<Vec<String>>,
}

#[async_trait]
impl ServiceExporter for Mirror {
    fn name(&self) -> &str {
        "mirror"
    }

    async fn init(&self, records: Vec<Record>, _configuration: serde_json::Value) -> armature_discovery::Result<()> {
        for record in records {
            self.log.lock().unwrap().push(format!("+{}", record.name));
        }
        Ok(())
    }

    async fn on_publish(&self, record: Record) -> armature_discovery::Result<()> {
        self.log.lock().unwrap().push(format!("+{}", record.name));
        Ok(())
    }

    async fn on_unpublish(&self, registration: String) -> armature_discovery::Result<()> {
        self.log.lock().unwrap().push(format!("-{}", registration.len()));
        Ok(())
    }
}

#[tokio::test]
async fn test_exporter_mirrors_registry() {
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    discovery.publish(Record::new("existing")).await.unwrap();

    let mirror = Arc::new(Mirror::default());
    discovery
        .register_service_exporter(mirror.clone(), json!({}))
        .await
        .unwrap();

    let record = discovery.publish(Record::new("new")).await.unwrap();
    discovery.unpublish(record.registration().unwrap()).await.unwrap();
    discovery.close().await;

    // registration ids are UUIDs: 36 characters
    assert_eq!(*mirror.log.lock().unwrap(), vec!["+existing", "+new", "-36"]);
}

// =============================================================================
// Circuit Breaker Workflows
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_breaker_lifecycle() {
    let breaker = CircuitBreaker::create(
        "inventory",
        CircuitBreakerOptions::new()
            .max_failures(3)
            .reset_timeout(Duration::from_secs(5)),
    );

    let transitions = Arc::new(AtomicUsize::new(0));
    let opened = transitions.clone();
    breaker.on_open(move |_| {
        opened.fetch_add(1, Ordering::SeqCst);
    });

    for _ in 0..3 {
        let result = breaker.execute(|| async { Err::<(), _>("unavailable") }).await;
        assert!(result.unwrap_err().is_failure());
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(transitions.load(Ordering::SeqCst), 1);

    // Rejected without running the code
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let result = breaker
        .execute_with_fallback(
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>("live")
            },
            |_| "cached",
        )
        .await;
    assert_eq!(result.unwrap(), "cached");
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_secs(6)).await;

    let probe_state = breaker
        .execute(|| async { Ok::<_, &str>(breaker.state()) })
        .await
        .unwrap();
    assert_eq!(probe_state, CircuitState::HalfOpen);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_completion_is_not_counted_twice() {
    let breaker = CircuitBreaker::create(
        "callbacks",
        CircuitBreakerOptions::new().timeout(Duration::from_millis(100)),
    );
    let (tx, rx) = tokio::sync::oneshot::channel();

    let result = breaker
        .execute_with_promise(|promise: Promise<&str, String>| {
            let late = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                promise.complete("too late")
            });
            let _ = tx.send(late);
        })
        .await;
    assert!(result.unwrap_err().is_timeout());

    assert!(!rx.await.unwrap().await.unwrap());
    let stats = breaker.stats();
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.total_successes, 0);
    assert_eq!(breaker.failure_count(), 1);
}

#[tokio::test]
async fn test_breaker_guards_service_resolution() {
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    discovery.register_service_type(http_client_type(Arc::new(AtomicUsize::new(0))));
    let breakers = CircuitBreakers::with_defaults(CircuitBreakerOptions::new().max_failures(1));

    // No endpoint in the location: resolution fails
    let broken = discovery
        .publish(Record::new("broken").with_type(http_endpoint::TYPE))
        .await
        .unwrap();
    let reference = discovery.get_reference(&broken).unwrap();

    let breaker = breakers.get_or_create("broken");
    let result = breaker.execute_blocking(|| reference.get_as::<HttpClient>());

    match result {
        Err(CircuitBreakerError::Failure(DiscoveryError::Resolution { name, .. })) => {
            assert_eq!(name, "broken")
        }
        other => panic!("expected resolution failure, got {:?}", other.err().map(|e| e.to_string())),
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.execute_blocking(|| reference.get()).unwrap_err().is_open());
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_configured_kit() {
    let config = ServiceKitConfig::parse(
        r#"
        [discovery]
        name = "edge"

        [breakers.catalog]
        max_failures = 1
        "#,
        FileFormat::Toml,
    )
    .unwrap();
    config.validate().unwrap();

    let discovery = config.build_discovery();
    let breakers = config.build_breakers();

    assert_eq!(discovery.options().name, "edge");
    let catalog = breakers.get("catalog").unwrap();
    let _ = catalog.execute_blocking(|| Err::<(), _>("down"));
    assert_eq!(catalog.state(), CircuitState::Open);
}

#[test]
fn test_blocking_entry_points() {
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());

    let record = tokio_test::block_on(discovery.publish(Record::new("sync-caller"))).unwrap();
    let found = tokio_test::block_on(discovery.get_record(RecordFilter::by_name("sync-caller")));

    assert_eq!(found, Some(record));
}
