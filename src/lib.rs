//! # Congress: Proof-of-Stake-Authority Consensus
//!
//! A clique-derived authority-rotation engine for an EVM-compatible chain,
//! augmented with on-chain system contracts that handle validator election,
//! punishment, address-based access control and governance proposal replay.
//!
//! The engine validates and produces headers whose extra-data carries a
//! 32-byte vanity prefix, an optional epoch validator list and a 65-byte
//! secp256k1 seal:
//!
//! ```text
//! extra = vanity(32) || [validators(N * 20), epoch headers only] || seal(65)
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters (outer)                                   │
//! │  - In-memory chain / state / snapshot store         │
//! │  - Local secp256k1 signer                           │
//! │  - Simulated system contracts (tests)               │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports (middle)                                     │
//! │  - HeaderReader, State, StateDatabase               │
//! │  - MessageExecutor (the opaque EVM)                 │
//! │  - SnapshotStore, ValidatorSigner                   │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain + system contracts (inner)                  │
//! │  - Header rules, snapshots, RLP, secp256k1          │
//! │  - ABI registry, fee-free invoker, governance,      │
//! │    access control, hard-fork upgrades               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The [`service::Congress`] engine ties the layers together: headers flow
//! through verification into the snapshot machinery, block production runs
//! prepare → finalize → seal, and every finalized block replays the
//! system-contract pipeline (reward, punishment, epoch rotation, governance).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;
pub mod system;

/// Convenient re-exports for embedders.
pub mod prelude {
    pub use crate::config::{ChainSpec, CongressConfig, UpgradeManifest};
    pub use crate::domain::entities::{Block, Header, Log, Receipt, Transaction};
    pub use crate::domain::snapshot::Snapshot;
    pub use crate::domain::value_objects::{Address, Bloom, Hash, SealSignature, U256};
    pub use crate::errors::{AdmissionError, ConsensusError, SystemCallError};
    pub use crate::ports::chain::HeaderReader;
    pub use crate::ports::executor::{EvmExtraValidator, Message, MessageExecutor};
    pub use crate::ports::signing::ValidatorSigner;
    pub use crate::ports::state::{State, StateDatabase, StateReader};
    pub use crate::ports::store::SnapshotStore;
    pub use crate::service::Congress;
    pub use crate::system::governance::Proposal;
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
