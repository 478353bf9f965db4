//! Service references: tracked, lazily resolved handles on published services

use crate::discovery::Shared;
use crate::error::{DiscoveryError, Result};
use crate::record::Record;
use crate::service_type::{ServiceObject, ServiceType};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Handle on a published service, obtained from
/// [`ServiceDiscovery::get_reference`](crate::ServiceDiscovery::get_reference).
///
/// The service object is resolved on first [`get`](Self::get) and shared by
/// every later call until [`release`](Self::release). Clones share the same
/// underlying reference.
#[derive(Clone)]
pub struct ServiceReference {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    registration: String,
    record: Record,
    configuration: Option<Value>,
    service_type: Arc<dyn ServiceType>,
    cached: Mutex<Option<ServiceObject>>,
    released: AtomicBool,
    owner: Weak<Shared>,
}

impl ServiceReference {
    pub(crate) fn new(
        id: u64,
        record: Record,
        configuration: Option<Value>,
        service_type: Arc<dyn ServiceType>,
        owner: Weak<Shared>,
    ) -> Self {
        let registration = record.registration().unwrap_or_default().to_string();
        Self {
            inner: Arc::new(Inner {
                id,
                registration,
                record,
                configuration,
                service_type,
                cached: Mutex::new(None),
                released: AtomicBool::new(false),
                owner,
            }),
        }
    }

    /// Identifier, unique within the registry.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The record as it was when the reference was created.
    pub fn record(&self) -> &Record {
        &self.inner.record
    }

    /// Registration id of the referenced record.
    pub fn registration(&self) -> &str {
        &self.inner.registration
    }

    /// Configuration passed when the reference was created.
    pub fn configuration(&self) -> Option<&Value> {
        self.inner.configuration.as_ref()
    }

    /// Resolve the service object, or return the cached one.
    ///
    /// Concurrent first calls resolve once; the others wait and share the
    /// result. Resolution errors are not cached.
    pub fn get(&self) -> Result<ServiceObject> {
        let mut cached = self.inner.cached.lock();
        if self.is_released() {
            return Err(DiscoveryError::ReferenceReleased(self.inner.record.name.clone()));
        }
        if let Some(object) = cached.as_ref() {
            return Ok(Arc::clone(object));
        }

        let object = self
            .inner
            .service_type
            .resolve(&self.inner.record, self.inner.configuration.as_ref())?;
        debug!(
            name = %self.inner.record.name,
            reference = self.inner.id,
            service_type = self.inner.service_type.name(),
            "Resolved service object"
        );

        *cached = Some(Arc::clone(&object));
        Ok(object)
    }

    /// Resolve the service object as a concrete type.
    pub fn get_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.get()?
            .downcast::<T>()
            .map_err(|_| DiscoveryError::ServiceTypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }

    /// The service object if already resolved. Never resolves.
    pub fn cached(&self) -> Option<ServiceObject> {
        self.inner.cached.lock().clone()
    }

    /// Whether `object` is the service object held by this reference.
    ///
    /// Compares allocations, so it works with both [`get`](Self::get) and
    /// [`get_as`](Self::get_as) results.
    pub fn is_holding<T: ?Sized>(&self, object: &Arc<T>) -> bool {
        self.inner
            .cached
            .lock()
            .as_ref()
            .is_some_and(|held| std::ptr::addr_eq(Arc::as_ptr(held), Arc::as_ptr(object)))
    }

    /// Whether the reference has been released.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Release the reference.
    ///
    /// The service type releases the cached object exactly once, whichever
    /// clone or thread calls first. Returns true if this call removed the
    /// reference from the registry's bindings.
    pub fn release(&self) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        let unbound = self
            .inner
            .owner
            .upgrade()
            .is_some_and(|shared| shared.unbind(self.inner.id, &self.inner.registration));

        let object = self.inner.cached.lock().take();
        if let Some(object) = object {
            self.inner.service_type.release(&object);
        }

        debug!(
            name = %self.inner.record.name,
            reference = self.inner.id,
            "Released service reference"
        );
        unbound
    }

    pub(crate) fn same_binding(&self, registration: &str, configuration: Option<&Value>) -> bool {
        !self.is_released()
            && self.inner.registration == registration
            && self.inner.configuration.as_ref() == configuration
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.inner.id)
            .field("name", &self.inner.record.name)
            .field("registration", &self.inner.registration)
            .field("released", &self.is_released())
            .finish()
    }
}
