use std::collections::HashMap;

use super::{PersistentStore, StoreError, StoreKey};

/// Volatile store for simulation and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blocks: HashMap<StoreKey, Vec<u8>>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes so far, to check write-through throttling
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl PersistentStore for MemoryStore {
    fn read(&self, key: StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blocks.get(&key).cloned())
    }

    fn write(&mut self, key: StoreKey, bytes: &[u8]) -> Result<(), StoreError> {
        self.blocks.insert(key, bytes.to_vec());
        self.writes += 1;
        Ok(())
    }
}
