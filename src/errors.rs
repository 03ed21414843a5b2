//! # Error Types
//!
//! All error enums for the consensus engine. Header-format and authorization
//! failures mark a block permanently invalid; ancestry failures are retryable
//! once the missing parents arrive; system-call failures during finalize are
//! fatal for the block being processed.

use crate::domain::value_objects::{Address, U256};
use thiserror::Error;

// =============================================================================
// CONSENSUS ERRORS
// =============================================================================

/// Errors marking a header or block invalid under the consensus rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The block is not part of the local chain (e.g. sealing the genesis).
    #[error("unknown block")]
    UnknownBlock,

    /// The header timestamp lies beyond the local wall clock.
    #[error("block in the future")]
    FutureBlock,

    /// Extra-data is shorter than the 32-byte vanity prefix.
    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    /// Extra-data is too short to hold the 65-byte seal suffix.
    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,

    /// A non-epoch header carries validator bytes, or an epoch header carries
    /// a validator section not divisible by the address width.
    #[error("non-checkpoint block contains extra validator list")]
    ExtraValidators,

    /// The validator list embedded in an epoch header does not match the set
    /// returned by the validators contract.
    #[error("invalid extra validators in extra-data field")]
    InvalidExtraValidators,

    /// The mix digest is non-zero.
    #[error("non-zero mix digest")]
    InvalidMixDigest,

    /// The uncle hash is not the hash of an empty uncle list.
    #[error("non empty uncle hash")]
    InvalidUncleHash,

    /// Difficulty is missing on a non-genesis header.
    #[error("invalid difficulty")]
    InvalidDifficulty,

    /// The gas limit exceeds the protocol maximum.
    #[error("invalid gas limit: have {have}, max {max}")]
    InvalidGasLimit {
        /// Declared gas limit.
        have: u64,
        /// Protocol cap.
        max: u64,
    },

    /// Gas used exceeds the gas limit.
    #[error("invalid gas used: have {used}, limit {limit}")]
    InvalidGasUsed {
        /// Declared gas used.
        used: u64,
        /// Block gas limit.
        limit: u64,
    },

    /// The gas limit moved too far from the parent's.
    #[error("invalid gas limit: have {have}, parent {parent}, max delta {max_delta}")]
    InvalidGasLimitDelta {
        /// Declared gas limit.
        have: u64,
        /// Parent gas limit (adjusted on the EIP-1559 fork block).
        parent: u64,
        /// Maximum allowed change.
        max_delta: u64,
    },

    /// The gas limit fell below the protocol minimum.
    #[error("gas limit below minimum: have {have}, min {min}")]
    GasLimitBelowMinimum {
        /// Declared gas limit.
        have: u64,
        /// Protocol minimum.
        min: u64,
    },

    /// Base fee missing, unexpected, or not matching the EIP-1559 schedule.
    #[error("invalid base fee: have {have:?}, want {want:?}")]
    InvalidBaseFee {
        /// Declared base fee.
        have: Option<U256>,
        /// Expected base fee.
        want: Option<U256>,
    },

    /// The parent header is missing or does not match.
    #[error("unknown ancestor")]
    UnknownAncestor,

    /// The timestamp does not leave at least one period after the parent's.
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// The header is signed by an address outside the authority set.
    #[error("unauthorized validator")]
    UnauthorizedValidator,

    /// The signer already sealed a block within the recent-signer window.
    #[error("recently signed")]
    RecentlySigned,

    /// The difficulty does not match the signer's turn-ness.
    #[error("wrong difficulty")]
    WrongDifficulty,

    /// The recovered seal signer differs from the coinbase.
    #[error("invalid coinbase")]
    InvalidCoinbase,

    /// The validator set is empty or larger than the protocol cap.
    #[error("invalid validators length")]
    InvalidValidatorsLength,

    /// The block carries a different number of system transactions than the
    /// governance contract reports passed proposals.
    #[error("invalid system governance tx count: expected {expected}, have {have}")]
    InvalidSysGovCount {
        /// Passed proposals reported by the governance contract.
        expected: u32,
        /// System transactions carried by the block.
        have: usize,
    },

    /// A system governance transaction was not signed by the block coinbase.
    #[error("invalid sender for system governance transaction")]
    InvalidSysGovSender,

    /// A system governance transaction payload differs from the proposal
    /// fetched from the governance contract.
    #[error("system governance payload mismatch for proposal {id}")]
    SysGovPayloadMismatch {
        /// Identifier of the mismatching proposal.
        id: U256,
    },

    /// The block carries uncles, which the protocol forbids.
    #[error("uncles not allowed")]
    UnclesNotAllowed,

    /// Headers handed to snapshot application are not a contiguous ascending
    /// chain segment.
    #[error("snapshot lineage is not contiguous")]
    InvalidSnapshotChain,

    /// Seal recovery or signature parsing failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// A system-contract call failed during finalize.
    #[error(transparent)]
    SystemCall(#[from] SystemCallError),

    /// The snapshot store failed; snapshots are reconstructible, retries are
    /// safe.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The local signer rejected a signing request.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// A consensus-critical payload failed to decode.
    #[error(transparent)]
    Rlp(#[from] RlpError),
}

// =============================================================================
// SYSTEM-CALL ERRORS
// =============================================================================

/// Failures of the fee-free system-contract call path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemCallError {
    /// Argument packing or result unpacking failed.
    #[error("abi: {0}")]
    Abi(#[from] AbiError),

    /// The EVM executor reported a failure.
    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    /// The call returned data the caller cannot interpret.
    #[error("unexpected output: {0}")]
    UnexpectedOutput(String),

    /// No state is available for the requested root.
    #[error(transparent)]
    State(#[from] StateAccessError),

    /// The engine has no state database to read historic state from.
    #[error("state database not set")]
    StateDatabaseNotSet,

    /// The operation needs a signing key but none is registered.
    #[error("transaction signer not set")]
    SignerNotSet,
}

/// ABI packing/unpacking failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// The registry has no contract under the given name.
    #[error("unknown contract: {0}")]
    UnknownContract(String),

    /// The contract ABI has no method under the given name.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The supplied arguments do not match the method inputs.
    #[error("argument mismatch for {method}: expected {expected}, got {got}")]
    ArgumentMismatch {
        /// Method name.
        method: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },

    /// The output buffer ended before all declared values were read.
    #[error("output truncated at offset {offset}")]
    Truncated {
        /// Byte offset at which decoding failed.
        offset: usize,
    },

    /// A dynamic-value offset points outside the output buffer.
    #[error("invalid dynamic offset")]
    InvalidOffset,
}

/// Failure reported by the opaque EVM executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The call reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The call failed without revert data.
    #[error("{0}")]
    Failed(String),
}

/// The host could not open state for a given root.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no state for root {0}")]
pub struct StateAccessError(pub crate::domain::value_objects::Hash);

// =============================================================================
// ADMISSION ERRORS
// =============================================================================

/// Transaction-admission failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// Sender or recipient is blacklisted for the relevant direction.
    #[error("address denied")]
    AddressDenied {
        /// The address that matched the blacklist.
        address: Address,
    },

    /// The blacklist could not be loaded from the contract.
    #[error(transparent)]
    System(#[from] SystemCallError),
}

// =============================================================================
// SIGNATURE / SIGNING / STORE / RLP ERRORS
// =============================================================================

/// secp256k1 signature failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature buffer is not 65 bytes.
    #[error("invalid signature length: {0}")]
    InvalidLength(usize),

    /// r/s failed curve validation.
    #[error("invalid signature format")]
    InvalidFormat,

    /// The recovery id byte is not one of 0, 1, 27, 28.
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Public-key recovery failed.
    #[error("signature recovery failed")]
    RecoveryFailed,
}

/// Failures of the injected validator signer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// No signer has been registered via `authorize`.
    #[error("validator signer not set")]
    SignerNotSet,

    /// The signer backend rejected the request.
    #[error("signing failed: {0}")]
    Backend(String),
}

/// Snapshot-store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store rejected the operation.
    #[error("snapshot store: {0}")]
    Backend(String),

    /// A stored snapshot failed to decode.
    #[error("snapshot codec: {0}")]
    Codec(String),
}

/// RLP encoding/decoding failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RlpError {
    /// The buffer ended inside an item.
    #[error("rlp: unexpected end of input")]
    UnexpectedEof,

    /// A string item appeared where a list was required, or vice versa.
    #[error("rlp: unexpected item kind")]
    UnexpectedKind,

    /// An integer was encoded with leading zero bytes.
    #[error("rlp: leading zero bytes in integer")]
    LeadingZeros,

    /// An integer is wider than the target type.
    #[error("rlp: integer overflow")]
    Overflow,

    /// A list carries a different item count than the decoder expects.
    #[error("rlp: expected {expected} items, got {got}")]
    ItemCount {
        /// Items the decoder expected.
        expected: usize,
        /// Items present.
        got: usize,
    },

    /// Trailing bytes after the outermost item.
    #[error("rlp: trailing bytes")]
    TrailingBytes,

    /// A fixed-width field has the wrong length.
    #[error("rlp: invalid field length {0}")]
    InvalidLength(usize),
}
