//! The service discovery registry

use crate::bridge::{ServiceExporter, ServiceImporter, ServicePublisher};
use crate::error::{DiscoveryError, Result};
use crate::events::DiscoveryEvent;
use crate::filter::RecordFilter;
use crate::options::DiscoveryOptions;
use crate::record::{Record, Status};
use crate::reference::ServiceReference;
use crate::service_type::{ServiceType, ServiceTypes};
use crate::store::{InMemoryRecordStore, RecordStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry of published services.
///
/// Cloning is cheap and every clone operates on the same registry.
///
/// ```rust,ignore
/// let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
/// discovery.register_service_type(Arc::new(http_client_type()));
///
/// let record = discovery
///     .publish(http_endpoint::create_record("catalog", "localhost", 8080, "/api"))
///     .await?;
///
/// if let Some(found) = discovery.get_record(RecordFilter::by_name("catalog")).await {
///     let reference = discovery.get_reference(&found)?;
///     let client = reference.get_as::<HttpClient>()?;
///     // ...
///     reference.release();
/// }
/// ```
#[derive(Clone)]
pub struct ServiceDiscovery {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    options: DiscoveryOptions,
    state: Mutex<State>,
    events: broadcast::Sender<DiscoveryEvent>,
    next_reference: AtomicU64,
    shut_down: watch::Sender<bool>,
}

struct State {
    store: Box<dyn RecordStore>,
    bindings: BTreeMap<u64, ServiceReference>,
    service_types: ServiceTypes,
    importers: Vec<Arc<dyn ServiceImporter>>,
    exporters: Vec<ExporterHandle>,
    next_exporter: u64,
    closing: bool,
    closed: bool,
}

struct ExporterHandle {
    id: u64,
    exporter: Arc<dyn ServiceExporter>,
    queue: mpsc::UnboundedSender<ExportEvent>,
    worker: JoinHandle<()>,
}

enum ExportEvent {
    Publish(Record),
    Unpublish(String),
    Update(Record),
}

impl State {
    fn ensure_open(&self, name: &str) -> Result<()> {
        if self.closed {
            Err(DiscoveryError::Closed(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Bridges may only join before [`ServiceDiscovery::close`] starts.
    fn ensure_accepting_bridges(&self, name: &str) -> Result<()> {
        if self.closing || self.closed {
            Err(DiscoveryError::Closed(name.to_string()))
        } else {
            Ok(())
        }
    }

    fn dispatch(&self, event: impl Fn() -> ExportEvent) {
        for handle in &self.exporters {
            // Queue only closes when the worker stopped; nothing left to notify.
            let _ = handle.queue.send(event());
        }
    }
}

impl Shared {
    fn announce(&self, event: DiscoveryEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub(crate) fn unbind(&self, reference: u64, registration: &str) -> bool {
        let removed = self.state.lock().bindings.remove(&reference).is_some();
        if removed {
            self.announce(DiscoveryEvent::Released {
                registration: registration.to_string(),
                reference,
            });
        }
        removed
    }
}

impl ServiceDiscovery {
    /// Create a registry backed by an in-memory store.
    ///
    /// The in-memory store takes no backend configuration.
    pub fn create(options: DiscoveryOptions) -> Self {
        Self::build(options, Box::new(InMemoryRecordStore::new()))
    }

    /// Create a registry backed by a custom store.
    ///
    /// The store is initialised with the options' `backend_configuration`
    /// before the registry uses it.
    pub fn with_store(options: DiscoveryOptions, mut store: Box<dyn RecordStore>) -> Result<Self> {
        store.init(&options.backend_configuration)?;
        Ok(Self::build(options, store))
    }

    fn build(options: DiscoveryOptions, store: Box<dyn RecordStore>) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let (shut_down, _) = watch::channel(false);
        info!(name = %options.name, "Service discovery created");

        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(State {
                    store,
                    bindings: BTreeMap::new(),
                    service_types: ServiceTypes::new(),
                    importers: Vec::new(),
                    exporters: Vec::new(),
                    next_exporter: 0,
                    closing: false,
                    closed: false,
                }),
                events,
                next_reference: AtomicU64::new(1),
                shut_down,
            }),
        }
    }

    /// Registry options
    pub fn options(&self) -> &DiscoveryOptions {
        &self.shared.options
    }

    /// Subscribe to record and reference lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.shared.events.subscribe()
    }

    /// Publish a record.
    ///
    /// Returns the stored record, carrying a fresh registration id. A record
    /// published with [`Status::Unknown`] is stored as [`Status::Up`].
    ///
    /// ```
    /// # use armature_discovery::*;
    /// # tokio_test::block_on(async {
    /// let discovery = ServiceDiscovery::create(DiscoveryOptions::default());
    /// let record = discovery.publish(Record::new("catalog")).await?;
    ///
    /// assert!(record.registration().is_some());
    /// assert_eq!(record.status, Status::Up);
    /// # Ok::<(), DiscoveryError>(())
    /// # }).unwrap();
    /// ```
    pub async fn publish(&self, mut record: Record) -> Result<Record> {
        if record.name.trim().is_empty() {
            return Err(DiscoveryError::InvalidRecord("record name is required".to_string()));
        }
        if let Some(registration) = record.registration() {
            return Err(DiscoveryError::InvalidRecord(format!(
                "record '{}' is already published as {}",
                record.name, registration
            )));
        }

        record.set_registration(Uuid::new_v4().to_string());
        if record.status == Status::Unknown {
            record.status = Status::Up;
        }

        {
            let mut state = self.shared.state.lock();
            state.ensure_open(&self.shared.options.name)?;
            state.store.insert(record.clone())?;
            state.dispatch(|| ExportEvent::Publish(record.clone()));
        }

        info!(
            name = %record.name,
            service_type = %record.service_type,
            registration = record.registration().unwrap_or_default(),
            "Published service record"
        );
        self.shared.announce(DiscoveryEvent::Published(record.clone()));
        Ok(record)
    }

    /// Unpublish a record by registration id.
    pub async fn unpublish(&self, registration: &str) -> Result<()> {
        let record = {
            let mut state = self.shared.state.lock();
            state.ensure_open(&self.shared.options.name)?;
            let record = state
                .store
                .remove(registration)
                .ok_or_else(|| DiscoveryError::RecordNotFound(registration.to_string()))?;
            state.dispatch(|| ExportEvent::Unpublish(registration.to_string()));
            record
        };

        info!(name = %record.name, registration, "Unpublished service record");
        self.shared.announce(DiscoveryEvent::Unpublished(record));
        Ok(())
    }

    /// Replace a published record, matched by registration id.
    pub async fn update(&self, record: Record) -> Result<Record> {
        if record.name.trim().is_empty() {
            return Err(DiscoveryError::InvalidRecord("record name is required".to_string()));
        }
        if !record.is_published() {
            return Err(DiscoveryError::InvalidRecord(format!(
                "record '{}' has no registration",
                record.name
            )));
        }

        {
            let mut state = self.shared.state.lock();
            state.ensure_open(&self.shared.options.name)?;
            state.store.replace(record.clone())?;
            if self.shared.options.notify_exporters_on_update {
                state.dispatch(|| ExportEvent::Update(record.clone()));
            }
        }

        debug!(
            name = %record.name,
            registration = record.registration().unwrap_or_default(),
            status = %record.status,
            "Updated service record"
        );
        self.shared.announce(DiscoveryEvent::Updated(record.clone()));
        Ok(record)
    }

    /// First `Up` record matching the filter, in publication order.
    pub async fn get_record(&self, filter: RecordFilter) -> Option<Record> {
        self.get_record_with(filter, false).await
    }

    /// First record matching the filter, optionally including records that
    /// are not `Up`.
    pub async fn get_record_with(&self, filter: RecordFilter, include_out_of_service: bool) -> Option<Record> {
        self.snapshot(&filter, include_out_of_service)
            .into_iter()
            .find(|record| filter.matches(record))
    }

    /// All `Up` records matching the filter, in publication order.
    pub async fn get_records(&self, filter: RecordFilter) -> Vec<Record> {
        self.get_records_with(filter, false).await
    }

    /// All records matching the filter, optionally including records that
    /// are not `Up`.
    pub async fn get_records_with(&self, filter: RecordFilter, include_out_of_service: bool) -> Vec<Record> {
        self.snapshot(&filter, include_out_of_service)
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect()
    }

    /// Copy of the candidate records. Filters run outside the lock so
    /// predicates may call back into the registry.
    fn snapshot(&self, filter: &RecordFilter, include_out_of_service: bool) -> Vec<Record> {
        let any_status = include_out_of_service || filter.mentions_status();
        let state = self.shared.state.lock();
        if state.closed {
            return Vec::new();
        }

        state
            .store
            .records()
            .filter(|record| any_status || record.status == Status::Up)
            .cloned()
            .collect()
    }

    /// Install a service type, replacing any previous one with the same name.
    pub fn register_service_type(&self, service_type: Arc<dyn ServiceType>) -> Option<Arc<dyn ServiceType>> {
        debug!(service_type = service_type.name(), "Registering service type");
        self.shared.state.lock().service_types.register(service_type)
    }

    /// Names of the installed service types, sorted.
    pub fn service_types(&self) -> Vec<String> {
        self.shared.state.lock().service_types.names()
    }

    /// Get a reference on a published record.
    pub fn get_reference(&self, record: &Record) -> Result<ServiceReference> {
        self.bind(record, None)
    }

    /// Get a reference on a published record with consumer configuration.
    ///
    /// References are shared per (registration, configuration) pair until
    /// released.
    pub fn get_reference_with_configuration(&self, record: &Record, configuration: Value) -> Result<ServiceReference> {
        if !configuration.is_object() {
            return Err(DiscoveryError::InvalidConfiguration(
                "reference configuration must be a JSON object".to_string(),
            ));
        }
        self.bind(record, Some(configuration))
    }

    fn bind(&self, record: &Record, configuration: Option<Value>) -> Result<ServiceReference> {
        let registration = record.registration().ok_or_else(|| {
            DiscoveryError::InvalidRecord(format!("record '{}' has no registration", record.name))
        })?;

        let reference = {
            let mut state = self.shared.state.lock();
            state.ensure_open(&self.shared.options.name)?;

            let current = state
                .store
                .get(registration)
                .cloned()
                .ok_or_else(|| DiscoveryError::RecordNotFound(registration.to_string()))?;

            if let Some(existing) = state
                .bindings
                .values()
                .find(|r| r.same_binding(registration, configuration.as_ref()))
            {
                return Ok(existing.clone());
            }

            let service_type = state
                .service_types
                .get(&current.service_type)
                .ok_or_else(|| DiscoveryError::UnknownServiceType(current.service_type.clone()))?;

            let id = self.shared.next_reference.fetch_add(1, Ordering::Relaxed);
            let reference = ServiceReference::new(
                id,
                current,
                configuration,
                service_type,
                Arc::downgrade(&self.shared),
            );
            state.bindings.insert(id, reference.clone());
            reference
        };

        debug!(
            name = %reference.record().name,
            registration,
            reference = reference.id(),
            "Bound service reference"
        );
        self.shared.announce(DiscoveryEvent::Bound {
            registration: registration.to_string(),
            reference: reference.id(),
        });
        Ok(reference)
    }

    /// Release a reference. Returns true if it was still bound.
    pub fn release(&self, reference: &ServiceReference) -> bool {
        reference.release()
    }

    /// Live references, oldest first.
    pub fn bindings(&self) -> Vec<ServiceReference> {
        self.shared.state.lock().bindings.values().cloned().collect()
    }

    /// Start an importer and keep it until [`close`](Self::close).
    pub async fn register_service_importer(
        &self,
        importer: Arc<dyn ServiceImporter>,
        configuration: Value,
    ) -> Result<()> {
        self.shared
            .state
            .lock()
            .ensure_accepting_bridges(&self.shared.options.name)?;

        let publisher: Arc<dyn ServicePublisher> = Arc::new(Publisher {
            shared: Arc::downgrade(&self.shared),
        });

        if let Err(e) = importer.start(publisher, configuration).await {
            warn!(bridge = importer.name(), error = %e, "Service importer failed to start");
            return Err(DiscoveryError::BridgeStart {
                bridge: importer.name().to_string(),
                message: e.to_string(),
            });
        }

        // close() may have taken the importer list while start ran
        let accepted = {
            let mut state = self.shared.state.lock();
            let accepted = state.ensure_accepting_bridges(&self.shared.options.name).is_ok();
            if accepted {
                state.importers.push(Arc::clone(&importer));
            }
            accepted
        };
        if !accepted {
            debug!(bridge = importer.name(), "Service importer started during close");
            importer.close().await;
            return Err(DiscoveryError::Closed(self.shared.options.name.clone()));
        }

        info!(bridge = importer.name(), "Service importer started");
        Ok(())
    }

    /// Start an exporter and keep it until [`close`](Self::close).
    ///
    /// The exporter is initialised with the records published so far and
    /// then receives every later change, with nothing missed or repeated.
    pub async fn register_service_exporter(
        &self,
        exporter: Arc<dyn ServiceExporter>,
        configuration: Value,
    ) -> Result<()> {
        let (queue, events) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let id = {
            let mut state = self.shared.state.lock();
            state.ensure_accepting_bridges(&self.shared.options.name)?;

            let records: Vec<Record> = state.store.records().cloned().collect();
            let worker = tokio::spawn(run_exporter(
                Arc::clone(&exporter),
                records,
                configuration,
                events,
                ready_tx,
            ));

            state.next_exporter += 1;
            let id = state.next_exporter;
            state.exporters.push(ExporterHandle {
                id,
                exporter: Arc::clone(&exporter),
                queue,
                worker,
            });
            id
        };

        let started = match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Bridge("exporter task stopped".to_string())),
        };

        match started {
            Ok(()) => {
                info!(bridge = exporter.name(), "Service exporter started");
                Ok(())
            }
            Err(e) => {
                self.shared.state.lock().exporters.retain(|h| h.id != id);
                warn!(bridge = exporter.name(), error = %e, "Service exporter failed to start");
                Err(DiscoveryError::BridgeStart {
                    bridge: exporter.name().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Stop every bridge and drop all records and bindings.
    ///
    /// Importers close first, while they can still unpublish what they
    /// imported, then exporters, each in registration order. Exporters
    /// receive every queued notification before closing.
    ///
    /// Concurrent calls all return once the shutdown completed. Calling
    /// `close` from a bridge's own `close` never returns.
    pub async fn close(&self) {
        let importers = {
            let mut state = self.shared.state.lock();
            if state.closing {
                None
            } else {
                state.closing = true;
                Some(std::mem::take(&mut state.importers))
            }
        };
        let Some(importers) = importers else {
            let mut shut_down = self.shared.shut_down.subscribe();
            // Sender lives in `Shared`, which `self` keeps alive.
            let _ = shut_down.wait_for(|done| *done).await;
            return;
        };

        for importer in importers {
            importer.close().await;
            debug!(bridge = importer.name(), "Service importer closed");
        }

        let (exporters, outstanding) = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            let outstanding = state.bindings.len();
            state.bindings.clear();
            state.store.clear();
            (std::mem::take(&mut state.exporters), outstanding)
        };

        for handle in exporters {
            drop(handle.queue);
            if let Err(e) = handle.worker.await {
                warn!(bridge = handle.exporter.name(), error = %e, "Service exporter task failed");
            }
            handle.exporter.close().await;
            debug!(bridge = handle.exporter.name(), "Service exporter closed");
        }

        if outstanding > 0 {
            warn!(
                name = %self.shared.options.name,
                outstanding,
                "Service discovery closed with unreleased service references"
            );
        }
        info!(name = %self.shared.options.name, "Service discovery closed");
        self.shared.shut_down.send_replace(true);
    }
}

async fn run_exporter(
    exporter: Arc<dyn ServiceExporter>,
    records: Vec<Record>,
    configuration: Value,
    mut events: mpsc::UnboundedReceiver<ExportEvent>,
    ready: oneshot::Sender<Result<()>>,
) {
    let started = exporter.init(records, configuration).await;
    let failed = started.is_err();
    let _ = ready.send(started);
    if failed {
        return;
    }

    while let Some(event) = events.recv().await {
        let result = match event {
            ExportEvent::Publish(record) => exporter.on_publish(record).await,
            ExportEvent::Unpublish(registration) => exporter.on_unpublish(registration).await,
            ExportEvent::Update(record) => exporter.on_update(record).await,
        };
        if let Err(e) = result {
            warn!(bridge = exporter.name(), error = %e, "Service exporter failed to process change");
        }
    }
}

/// Publisher handed to importers. Does not keep the registry alive.
struct Publisher {
    shared: Weak<Shared>,
}

impl Publisher {
    fn discovery(&self) -> Result<ServiceDiscovery> {
        self.shared
            .upgrade()
            .map(|shared| ServiceDiscovery { shared })
            .ok_or_else(|| DiscoveryError::Closed("dropped".to_string()))
    }
}

#[async_trait]
impl ServicePublisher for Publisher {
    async fn publish(&self, record: Record) -> Result<Record> {
        self.discovery()?.publish(record).await
    }

    async fn unpublish(&self, registration: &str) -> Result<()> {
        self.discovery()?.unpublish(registration).await
    }

    async fn update(&self, record: Record) -> Result<Record> {
        self.discovery()?.update(record).await
    }
}

#[async_trait]
impl ServicePublisher for ServiceDiscovery {
    async fn publish(&self, record: Record) -> Result<Record> {
        ServiceDiscovery::publish(self, record).await
    }

    async fn unpublish(&self, registration: &str) -> Result<()> {
        ServiceDiscovery::unpublish(self, registration).await
    }

    async fn update(&self, record: Record) -> Result<Record> {
        ServiceDiscovery::update(self, record).await
    }
}

impl std::fmt::Debug for ServiceDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ServiceDiscovery")
            .field("name", &self.shared.options.name)
            .field("records", &state.store.len())
            .field("bindings", &state.bindings.len())
            .field("closed", &state.closed)
            .finish()
    }
}
