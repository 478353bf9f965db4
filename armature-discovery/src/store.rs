//! Record storage backends

use crate::error::{DiscoveryError, Result};
use crate::record::Record;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Storage for published records, keyed by registration id.
///
/// Stores are owned by the registry and only accessed under its lock, so
/// implementations need no internal synchronization. Iteration yields
/// records in publication order.
pub trait RecordStore: Send {
    /// Apply the registry's backend configuration before first use.
    fn init(&mut self, _configuration: &Value) -> Result<()> {
        Ok(())
    }

    /// Store a newly published record.
    fn insert(&mut self, record: Record) -> Result<()>;

    /// Replace a stored record, returning the previous version.
    fn replace(&mut self, record: Record) -> Result<Record>;

    /// Remove a record by registration id.
    fn remove(&mut self, registration: &str) -> Option<Record>;

    /// Get a record by registration id.
    fn get(&self, registration: &str) -> Option<&Record>;

    /// All records, in publication order.
    fn records(&self) -> Box<dyn Iterator<Item = &Record> + '_>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record.
    fn clear(&mut self);
}

/// In-memory record store (default backend)
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: BTreeMap<u64, Record>,
    index: HashMap<String, u64>,
    sequence: u64,
}

impl InMemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn registration_of(record: &Record) -> Result<&str> {
    record
        .registration()
        .ok_or_else(|| DiscoveryError::InvalidRecord(format!("record '{}' has no registration", record.name)))
}

impl RecordStore for InMemoryRecordStore {
    fn insert(&mut self, record: Record) -> Result<()> {
        let registration = registration_of(&record)?.to_string();
        if self.index.contains_key(&registration) {
            return Err(DiscoveryError::InvalidRecord(format!(
                "registration '{}' already exists",
                registration
            )));
        }

        self.sequence += 1;
        self.index.insert(registration, self.sequence);
        self.records.insert(self.sequence, record);
        Ok(())
    }

    fn replace(&mut self, record: Record) -> Result<Record> {
        let registration = registration_of(&record)?;
        let slot = self
            .index
            .get(registration)
            .and_then(|seq| self.records.get_mut(seq))
            .ok_or_else(|| DiscoveryError::RecordNotFound(registration.to_string()))?;

        Ok(std::mem::replace(slot, record))
    }

    fn remove(&mut self, registration: &str) -> Option<Record> {
        let seq = self.index.remove(registration)?;
        self.records.remove(&seq)
    }

    fn get(&self, registration: &str) -> Option<&Record> {
        self.index.get(registration).and_then(|seq| self.records.get(seq))
    }

    fn records(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        Box::new(self.records.values())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}
