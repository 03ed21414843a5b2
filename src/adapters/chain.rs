//! An in-memory header chain.

use crate::domain::entities::Header;
use crate::domain::value_objects::Hash;
use crate::ports::chain::HeaderReader;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct ChainInner {
    by_hash: HashMap<Hash, Header>,
    canonical: BTreeMap<u64, Hash>,
}

/// A thread-safe in-memory chain of headers, canonical by insertion.
#[derive(Default)]
pub struct InMemoryChain {
    inner: RwLock<ChainInner>,
}

impl InMemoryChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header and marks it canonical at its height.
    pub fn insert(&self, header: Header) {
        let hash = header.hash();
        let mut inner = self.inner.write();
        inner.canonical.insert(header.number, hash);
        inner.by_hash.insert(hash, header);
    }

    /// Inserts a header without touching the canonical index (side chain).
    pub fn insert_side(&self, header: Header) {
        let hash = header.hash();
        self.inner.write().by_hash.insert(hash, header);
    }

    /// Height of the highest canonical header.
    #[must_use]
    pub fn head_number(&self) -> Option<u64> {
        self.inner.read().canonical.keys().next_back().copied()
    }
}

impl HeaderReader for InMemoryChain {
    fn header(&self, hash: &Hash, number: u64) -> Option<Header> {
        self.inner
            .read()
            .by_hash
            .get(hash)
            .filter(|header| header.number == number)
            .cloned()
    }

    fn header_by_number(&self, number: u64) -> Option<Header> {
        let inner = self.inner.read();
        let hash = inner.canonical.get(&number)?;
        inner.by_hash.get(hash).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_lookup_follows_insertion() {
        let chain = InMemoryChain::new();
        let header = Header {
            number: 5,
            ..Default::default()
        };
        let hash = header.hash();
        chain.insert(header.clone());

        assert_eq!(chain.header_by_number(5), Some(header.clone()));
        assert_eq!(chain.header(&hash, 5), Some(header));
        assert_eq!(chain.header(&hash, 6), None);
        assert_eq!(chain.head_number(), Some(5));
    }

    #[test]
    fn side_headers_are_not_canonical() {
        let chain = InMemoryChain::new();
        let header = Header {
            number: 5,
            time: 99,
            ..Default::default()
        };
        let hash = header.hash();
        chain.insert_side(header.clone());

        assert_eq!(chain.header_by_number(5), None);
        assert_eq!(chain.header(&hash, 5), Some(header));
    }
}
