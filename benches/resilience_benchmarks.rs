#![allow(clippy::all)]

//! Resilience Pattern Benchmarks
//!
//! Benchmarks for circuit breakers, service lookups and references.

use armature_circuit::*;
use armature_discovery::*;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

// =============================================================================
// Circuit Breaker Benchmarks
// =============================================================================

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    // Circuit breaker creation
    group.bench_function("create_default", |b| {
        b.iter(|| CircuitBreaker::create("bench", CircuitBreakerOptions::default()))
    });

    let cb = CircuitBreaker::create("bench", CircuitBreakerOptions::default());

    group.bench_function("state_check", |b| b.iter(|| black_box(cb.state())));

    group.bench_function("execute_blocking_success", |b| {
        b.iter(|| black_box(cb.execute_blocking(|| Ok::<_, &str>(42))))
    });

    group.bench_function("execute_async_success", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(cb.execute(|| async { Ok::<_, &str>(42) }).await) })
    });

    group.bench_function("execute_with_promise", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(
                cb.execute_with_promise(|promise: Promise<i32, String>| {
                    promise.complete(42);
                })
                .await,
            )
        })
    });

    // Rejection path: open circuit with a call-scoped fallback
    let open = CircuitBreaker::create("open", CircuitBreakerOptions::new().disable_reset());
    open.open();

    group.bench_function("rejected_with_fallback", |b| {
        b.iter(|| black_box(open.execute_blocking_with_fallback(|| Ok::<_, &str>(1), |_| 0)))
    });

    // Named breaker lookup
    let breakers = CircuitBreakers::new();
    for i in 0..100 {
        breakers.get_or_create(&format!("breaker-{}", i));
    }

    group.bench_function("registry_lookup", |b| {
        b.iter(|| black_box(breakers.get_or_create("breaker-50")))
    });

    group.finish();
}

// =============================================================================
// Discovery Benchmarks
// =============================================================================

fn bench_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    // Record lookup by filter, over registries of increasing size
    for size in [10, 100, 1000] {
        let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
        runtime.block_on(async {
            for i in 0..size {
                let record = http_endpoint::create_record(format!("svc-{}", i), "localhost", 8080, "/")
                    .with_metadata("shard", i % 4);
                discovery.publish(record).await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::new("get_record_by_name", size), &size, |b, size| {
            let name = format!("svc-{}", size - 1);
            b.to_async(&runtime).iter(|| async {
                black_box(discovery.get_record(RecordFilter::by_name(name.clone())).await)
            })
        });

        group.bench_with_input(BenchmarkId::new("get_records_by_metadata", size), &size, |b, _| {
            b.to_async(&runtime).iter(|| async {
                black_box(discovery.get_records(RecordFilter::all().with("shard", 1)).await)
            })
        });
    }

    // Cached reference acquisition and resolution
    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    discovery.register_service_type(Arc::new(service_type_fn(http_endpoint::TYPE, |record, _| {
        Ok(Arc::new(record.endpoint().unwrap_or_default().to_string()) as ServiceObject)
    })));
    let record = runtime
        .block_on(discovery.publish(http_endpoint::create_record("catalog", "localhost", 8080, "/")))
        .unwrap();
    let reference = discovery.get_reference(&record).unwrap();

    group.bench_function("get_reference_shared", |b| {
        b.iter(|| black_box(discovery.get_reference(&record).unwrap()))
    });

    group.bench_function("reference_get_cached", |b| {
        b.iter(|| black_box(reference.get_as::<String>().unwrap()))
    });

    group.finish();
}

// =============================================================================
// Combined Benchmarks
// =============================================================================

fn bench_combined(c: &mut Criterion) {
    let mut group = c.benchmark_group("combined");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    discovery.register_service_type(Arc::new(service_type_fn(http_endpoint::TYPE, |record, _| {
        Ok(Arc::new(record.endpoint().unwrap_or_default().to_string()) as ServiceObject)
    })));
    runtime
        .block_on(discovery.publish(http_endpoint::create_record("catalog", "localhost", 8080, "/")))
        .unwrap();
    let cb = CircuitBreaker::create("catalog", CircuitBreakerOptions::default());

    // Lookup, bind and resolve under breaker protection
    group.bench_function("lookup_and_guarded_resolve", |b| {
        b.to_async(&runtime).iter(|| async {
            let record = discovery.get_record(RecordFilter::by_name("catalog")).await.unwrap();
            let reference = discovery.get_reference(&record).unwrap();
            black_box(cb.execute_blocking(|| reference.get_as::<String>()))
        })
    });

    group.finish();
}

criterion_group!(
    resilience_benches,
    bench_circuit_breaker,
    bench_discovery,
    bench_combined,
);

criterion_main!(resilience_benches);
