use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use crate::{CertificateStore, StoreError, check_name};

/// In-process store. Nothing survives the process, which makes it the store
/// of choice for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an entry, returning its previous content.
    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.entries().remove(name)
    }

    /// Names of all entries, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // The map stays consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CertificateStore for MemoryStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        check_name(name)?;
        Ok(self.entries().contains_key(name))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        check_name(name)?;
        self.entries()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn put(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        check_name(name)?;
        self.entries().insert(name.to_string(), data.to_vec());
        Ok(())
    }
}
