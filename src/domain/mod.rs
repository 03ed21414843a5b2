//! # Domain Layer
//!
//! Pure consensus logic: value objects, chain entities, RLP, secp256k1
//! helpers, the authority snapshot and the gas-limit rules. Nothing in this
//! module performs I/O.

pub mod ecdsa;
pub mod entities;
pub mod gas;
pub mod rlp;
pub mod snapshot;
pub mod value_objects;

use value_objects::U256;

/// Fixed number of extra-data prefix bytes reserved for validator vanity.
pub const EXTRA_VANITY: usize = 32;

/// Fixed number of extra-data suffix bytes reserved for the validator seal.
pub const EXTRA_SEAL: usize = 65;

/// Maximum validators allowed to seal.
pub const MAX_VALIDATORS: usize = 21;

/// Block difficulty for in-turn signatures.
pub const DIFF_IN_TURN: u64 = 2;

/// Block difficulty for out-of-turn signatures.
pub const DIFF_NO_TURN: u64 = 1;

/// Number of blocks after which a snapshot checkpoint is persisted.
pub const CHECKPOINT_INTERVAL: u64 = 1024;

/// Number of recent block signatures kept in memory.
pub const INMEMORY_SIGNATURES: usize = 4096;

/// Number of recent blacklist/rule snapshots kept in memory.
pub const INMEMORY_BLACKLIST: usize = 21;

/// Per-validator random sealing delay granted to out-of-turn signers.
pub const WIGGLE_TIME_MS: u64 = 500;

/// Depth beyond which an epoch header is trusted as a snapshot anchor.
pub const FULL_IMMUTABILITY_THRESHOLD: usize = 90_000;

/// Maximum block gas limit (2^63 - 1).
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// In-turn difficulty as a 256-bit integer.
pub fn diff_in_turn() -> U256 {
    U256::from(DIFF_IN_TURN)
}

/// Out-of-turn difficulty as a 256-bit integer.
pub fn diff_no_turn() -> U256 {
    U256::from(DIFF_NO_TURN)
}
