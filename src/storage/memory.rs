use super::engine::{Engine, Status};
use crate::error::Result;

use std::collections::BTreeMap;
use std::sync::Mutex;

/// An in-memory key-value engine using a BTreeMap. Stored data is lost
/// when the engine is dropped. Useful for tests, and as a cache-style
/// stand-in wherever the byte-level contract is all that matters.
pub struct Memory {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl Memory {
    /// Creates a new in-memory engine.
    pub fn new() -> Self {
        Self { data: Mutex::new(BTreeMap::new()) }
    }
}

impl Engine for Memory {
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock()?.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data.lock()?.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn del(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock()?.remove(key).is_some())
    }

    fn for_each(&self, mut f: impl FnMut(&str, &[u8]) -> bool) -> Result<()> {
        for (key, value) in self.data.lock()?.iter() {
            if !f(key, value) {
                break;
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> Result<Status> {
        let data = self.data.lock()?;
        let keys = data.len() as u64;
        let size =
            data.iter().fold(0, |size, (key, value)| size + key.len() as u64 + value.len() as u64);
        Ok(Status {
            name: "memory".to_string(),
            keys,
            size,
            total_disk_size: 0,
            live_disk_size: 0,
            garbage_disk_size: 0,
        })
    }
}
