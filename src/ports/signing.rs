//! The local validator's signing capability.

use crate::domain::entities::Transaction;
use crate::domain::value_objects::{Hash, SealSignature};
use crate::errors::SigningError;

/// Signs seals and system transactions with the validator key. Injected via
/// `Congress::authorize`; the engine never sees the key material.
pub trait ValidatorSigner: Send + Sync {
    /// Signs a 32-byte seal hash, returning the 65-byte recoverable
    /// signature placed into the header extra-data.
    fn sign_seal(&self, seal_hash: &Hash) -> Result<SealSignature, SigningError>;

    /// Signs a transaction under the EIP-155 scheme for the given chain.
    fn sign_transaction(
        &self,
        tx: Transaction,
        chain_id: u64,
    ) -> Result<Transaction, SigningError>;
}
