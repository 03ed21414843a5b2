//! A local secp256k1 validator signer.

use crate::domain::ecdsa;
use crate::domain::entities::Transaction;
use crate::domain::value_objects::{Address, Hash, SealSignature};
use crate::errors::SigningError;
use crate::ports::signing::ValidatorSigner;
use k256::ecdsa::SigningKey;

/// Holds a validator key in memory and signs seals and transactions with it.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Wraps an existing key.
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        let address = ecdsa::address_from_pubkey(key.verifying_key());
        Self { key, address }
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut rand::thread_rng()))
    }

    /// The account address derived from the key.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }
}

impl ValidatorSigner for LocalSigner {
    fn sign_seal(&self, seal_hash: &Hash) -> Result<SealSignature, SigningError> {
        ecdsa::sign_prehash(&self.key, seal_hash)
            .map_err(|err| SigningError::Backend(err.to_string()))
    }

    fn sign_transaction(
        &self,
        tx: Transaction,
        chain_id: u64,
    ) -> Result<Transaction, SigningError> {
        let signature = ecdsa::sign_prehash(&self.key, &tx.sig_hash(chain_id))
            .map_err(|err| SigningError::Backend(err.to_string()))?;
        Ok(tx.with_signature(signature.as_bytes(), chain_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rlp::keccak256;
    use crate::domain::value_objects::U256;

    #[test]
    fn seal_signature_recovers_to_the_signer() {
        let signer = LocalSigner::random();
        let digest = keccak256(b"header");
        let sig = signer.sign_seal(&digest).unwrap();
        assert_eq!(
            ecdsa::recover_address(&digest, sig.as_bytes()).unwrap(),
            signer.address()
        );
    }

    #[test]
    fn transaction_signature_recovers_to_the_signer() {
        let signer = LocalSigner::random();
        let tx = Transaction::new(1, None, U256::zero(), 21_000, U256::zero(), vec![]);
        let signed = signer.sign_transaction(tx, 55).unwrap();
        assert_eq!(signed.sender().unwrap(), signer.address());
    }
}
