//! An in-memory account state.
//!
//! Faithful enough for consensus tests: balances, nonces, code, storage
//! words, per-transaction log attribution and a deterministic pseudo state
//! root. Not a merkleized trie.

use crate::domain::entities::Log;
use crate::domain::rlp::keccak256;
use crate::domain::value_objects::{Address, Hash, U256};
use crate::ports::state::{State, StateReader};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Account {
    balance: U256,
    nonce: u64,
    code: Vec<u8>,
}

impl Account {
    fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.code.is_empty()
    }
}

/// A thread-unsafe in-memory state; wrap it per block like a real state
/// database handle.
#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<(Address, Hash), Hash>,
    logs: BTreeMap<Hash, Vec<Log>>,
    current_tx: Hash,
    current_index: usize,
}

impl InMemoryState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a log against the transaction currently being processed.
    /// Executor implementations call this while running a message.
    pub fn push_log(&mut self, log: Log) {
        self.logs.entry(self.current_tx).or_default().push(log);
    }

    /// The hash of the transaction currently being processed.
    #[must_use]
    pub fn current_tx(&self) -> Hash {
        self.current_tx
    }
}

impl StateReader for InMemoryState {
    fn storage(&self, address: &Address, slot: &Hash) -> Hash {
        self.storage
            .get(&(*address, *slot))
            .copied()
            .unwrap_or(Hash::ZERO)
    }
}

impl State for InMemoryState {
    fn balance(&self, address: &Address) -> U256 {
        self.accounts
            .get(address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    fn set_balance(&mut self, address: &Address, value: U256) {
        self.accounts.entry(*address).or_default().balance = value;
    }

    fn add_balance(&mut self, address: &Address, value: U256) {
        let account = self.accounts.entry(*address).or_default();
        account.balance = account.balance.saturating_add(value);
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.accounts
            .get(address)
            .map(|account| account.nonce)
            .unwrap_or_default()
    }

    fn set_nonce(&mut self, address: &Address, nonce: u64) {
        self.accounts.entry(*address).or_default().nonce = nonce;
    }

    fn code(&self, address: &Address) -> Vec<u8> {
        self.accounts
            .get(address)
            .map(|account| account.code.clone())
            .unwrap_or_default()
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        self.accounts.entry(*address).or_default().code = code;
    }

    fn set_storage(&mut self, address: &Address, slot: Hash, value: Hash) {
        self.storage.insert((*address, slot), value);
    }

    fn erase_code(&mut self, address: &Address) -> bool {
        match self.accounts.get_mut(address) {
            Some(account) if !account.code.is_empty() => {
                account.code.clear();
                true
            }
            _ => false,
        }
    }

    fn prepare(&mut self, tx_hash: Hash, index: usize) {
        self.current_tx = tx_hash;
        self.current_index = index;
    }

    fn tx_index(&self) -> usize {
        self.current_index
    }

    fn logs(&self, tx_hash: &Hash) -> Vec<Log> {
        self.logs.get(tx_hash).cloned().unwrap_or_default()
    }

    fn finalise(&mut self, delete_empty: bool) {
        if delete_empty {
            self.accounts.retain(|_, account| !account.is_empty());
        }
    }

    fn intermediate_root(&mut self, delete_empty: bool) -> Hash {
        self.finalise(delete_empty);

        let mut buf = Vec::new();
        for (address, account) in &self.accounts {
            buf.extend_from_slice(address.as_bytes());
            buf.extend_from_slice(Hash::from_uint(account.balance).as_bytes());
            buf.extend_from_slice(&account.nonce.to_be_bytes());
            buf.extend_from_slice(keccak256(&account.code).as_bytes());
        }
        for ((address, slot), value) in &self.storage {
            buf.extend_from_slice(address.as_bytes());
            buf.extend_from_slice(slot.as_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
        keccak256(&buf)
    }
}

/// Serves a clone of one template state for any requested root. Historic
/// roots are not tracked; epoch reads only need a live state to run contract
/// calls against, which is what tests and single-node scaffolding want.
#[derive(Default)]
pub struct InMemoryStateDatabase {
    template: parking_lot::RwLock<InMemoryState>,
}

impl InMemoryStateDatabase {
    /// Creates a database serving an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the template state handed out for subsequent reads.
    pub fn set(&self, state: InMemoryState) {
        *self.template.write() = state;
    }
}

impl crate::ports::state::StateDatabase for InMemoryStateDatabase {
    fn state_at(
        &self,
        _root: &Hash,
    ) -> Result<Box<dyn State>, crate::errors::StateAccessError> {
        Ok(Box::new(self.template.read().clone()))
    }
}
