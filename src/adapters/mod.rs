//! # Adapters
//!
//! In-memory implementations of every port: a header chain, account state, a
//! snapshot store, a local secp256k1 signer and a programmable
//! system-contract simulator. The test suite runs entirely on these; they
//! also serve as scaffolding for embedders wiring the engine up.

mod chain;
mod signer;
mod state;
mod store;
mod system_sim;

pub use chain::InMemoryChain;
pub use signer::LocalSigner;
pub use state::{InMemoryState, InMemoryStateDatabase};
pub use store::InMemorySnapshotStore;
pub use system_sim::{SimRecords, SystemContractSim};
