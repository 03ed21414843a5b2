//! Account-state access.
//!
//! The engine mutates state only through system-contract calls and the
//! bookkeeping around them (fee sweep, nonce bumps, code erasure). The full
//! trait mirrors the surface those operations need; [`StateReader`] is the
//! storage-only slice used by the contract-creation gate.

use crate::domain::entities::Log;
use crate::domain::value_objects::{Address, Hash, U256};
use crate::errors::StateAccessError;

/// Read-only access to contract storage.
pub trait StateReader {
    /// The storage word at `slot` of `address`; zero when never written.
    fn storage(&self, address: &Address, slot: &Hash) -> Hash;
}

/// Mutable account state for one block's execution.
pub trait State: StateReader {
    /// Account balance in wei.
    fn balance(&self, address: &Address) -> U256;

    /// Overwrites an account balance.
    fn set_balance(&mut self, address: &Address, value: U256);

    /// Credits an account.
    fn add_balance(&mut self, address: &Address, value: U256);

    /// Account nonce.
    fn nonce(&self, address: &Address) -> u64;

    /// Overwrites an account nonce.
    fn set_nonce(&mut self, address: &Address, nonce: u64);

    /// Deployed code of an account; empty for externally owned accounts.
    fn code(&self, address: &Address) -> Vec<u8>;

    /// Replaces the deployed code of an account.
    fn set_code(&mut self, address: &Address, code: Vec<u8>);

    /// Writes a storage word.
    fn set_storage(&mut self, address: &Address, slot: Hash, value: Hash);

    /// Removes the code of an account. Returns whether code was present.
    fn erase_code(&mut self, address: &Address) -> bool;

    /// Marks the start of a transaction for log attribution.
    fn prepare(&mut self, tx_hash: Hash, index: usize);

    /// Index of the transaction currently being processed.
    fn tx_index(&self) -> usize;

    /// Logs recorded for a transaction hash.
    fn logs(&self, tx_hash: &Hash) -> Vec<Log>;

    /// Flushes pending journal entries so subsequent reads observe them;
    /// deletes empty accounts when `delete_empty` is set.
    fn finalise(&mut self, delete_empty: bool);

    /// The state root over all changes so far.
    fn intermediate_root(&mut self, delete_empty: bool) -> Hash;
}

/// Opens historic state by root, for reads against a parent block.
pub trait StateDatabase: Send + Sync {
    /// State as of the given root.
    fn state_at(&self, root: &Hash) -> Result<Box<dyn State>, StateAccessError>;
}
