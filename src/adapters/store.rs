//! An in-memory snapshot store using the JSON checkpoint format.

use crate::domain::snapshot::Snapshot;
use crate::domain::value_objects::Hash;
use crate::errors::StoreError;
use crate::ports::store::SnapshotStore;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Keeps JSON-encoded snapshots in a map, keyed by header hash.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    entries: Mutex<HashMap<Hash, Vec<u8>>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self, hash: &Hash) -> Result<Option<Snapshot>, StoreError> {
        match self.entries.lock().get(hash) {
            Some(raw) => serde_json::from_slice(raw)
                .map(Some)
                .map_err(|err| StoreError::Codec(err.to_string())),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let raw =
            serde_json::to_vec(snapshot).map_err(|err| StoreError::Codec(err.to_string()))?;
        self.entries.lock().insert(snapshot.hash, raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Address;

    #[test]
    fn save_and_load_round_trip() {
        let store = InMemorySnapshotStore::new();
        let snap = Snapshot::new(1024, Hash::new([1; 32]), vec![Address::new([2; 20])]);

        store.save(&snap).unwrap();
        assert_eq!(store.load(&snap.hash).unwrap(), Some(snap));
        assert_eq!(store.load(&Hash::ZERO).unwrap(), None);
        assert_eq!(store.len(), 1);
    }
}
