//! Snapshot checkpoint persistence.

use crate::domain::snapshot::Snapshot;
use crate::domain::value_objects::Hash;
use crate::errors::StoreError;

/// Stores snapshot checkpoints keyed by header hash. Snapshots are
/// reconstructible from headers, so a lossy store only costs recomputation.
pub trait SnapshotStore: Send + Sync {
    /// Loads the snapshot stored under `hash`, if any.
    fn load(&self, hash: &Hash) -> Result<Option<Snapshot>, StoreError>;

    /// Persists a snapshot under its own hash.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}
