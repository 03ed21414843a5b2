//! Read access to the header chain.

use crate::domain::entities::Header;
use crate::domain::value_objects::Hash;

/// Reads headers from the canonical chain and from side chains.
pub trait HeaderReader: Send + Sync {
    /// The header with the given hash at the given height, if known.
    fn header(&self, hash: &Hash, number: u64) -> Option<Header>;

    /// The canonical header at the given height, if known.
    fn header_by_number(&self, number: u64) -> Option<Header>;
}
