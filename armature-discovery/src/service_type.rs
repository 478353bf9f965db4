//! Service types: how a record of a given type becomes a usable object

use crate::error::Result;
use crate::record::Record;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A resolved service object, shared by every caller of a reference.
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// Resolves records of one type into service objects.
///
/// `resolve` runs at most once per reference; `release` runs at most once
/// for each object `resolve` produced.
pub trait ServiceType: Send + Sync {
    /// Type tag matched against [`Record::service_type`].
    fn name(&self) -> &str;

    /// Build the service object for a record.
    ///
    /// Runs while the requesting [`ServiceReference`](crate::ServiceReference)
    /// holds its lock: calling `get`, `cached` or `is_holding` on that same
    /// reference from here deadlocks.
    fn resolve(&self, record: &Record, configuration: Option<&Value>) -> Result<ServiceObject>;

    /// Dispose of an object produced by `resolve`.
    fn release(&self, _object: &ServiceObject) {}
}

type ResolveFn = dyn Fn(&Record, Option<&Value>) -> Result<ServiceObject> + Send + Sync;
type ReleaseFn = dyn Fn(&ServiceObject) + Send + Sync;

/// Service type built from closures.
pub struct FnServiceType {
    name: String,
    resolve: Box<ResolveFn>,
    release: Option<Box<ReleaseFn>>,
}

impl FnServiceType {
    /// Run `release` whenever an object of this type is released.
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: Fn(&ServiceObject) + Send + Sync + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }
}

impl ServiceType for FnServiceType {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, record: &Record, configuration: Option<&Value>) -> Result<ServiceObject> {
        (self.resolve)(record, configuration)
    }

    fn release(&self, object: &ServiceObject) {
        if let Some(release) = &self.release {
            release(object);
        }
    }
}

impl fmt::Debug for FnServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnServiceType").field("name", &self.name).finish()
    }
}

/// Create a service type from a resolve closure.
///
/// ```rust,ignore
/// let http = service_type_fn("http-endpoint", |record, _config| {
///     let endpoint = record.endpoint().unwrap_or_default().to_string();
///     Ok(Arc::new(HttpClient::new(endpoint)) as ServiceObject)
/// });
/// ```
pub fn service_type_fn<F>(name: impl Into<String>, resolve: F) -> FnServiceType
where
    F: Fn(&Record, Option<&Value>) -> Result<ServiceObject> + Send + Sync + 'static,
{
    FnServiceType {
        name: name.into(),
        resolve: Box::new(resolve),
        release: None,
    }
}

/// Service types known to a registry, by type tag.
#[derive(Default, Clone)]
pub struct ServiceTypes {
    types: HashMap<String, Arc<dyn ServiceType>>,
}

impl ServiceTypes {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type under its own name, returning the one it replaces.
    pub fn register(&mut self, service_type: Arc<dyn ServiceType>) -> Option<Arc<dyn ServiceType>> {
        self.types.insert(service_type.name().to_string(), service_type)
    }

    /// Look up a type by tag.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceType>> {
        self.types.get(name).cloned()
    }

    /// Registered tags, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ServiceTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTypes").field("types", &self.names()).finish()
    }
}
