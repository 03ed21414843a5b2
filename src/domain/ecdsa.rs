//! # secp256k1 Helpers
//!
//! Recoverable signing and address recovery over 32-byte prehashes. Seals and
//! synthetic governance transactions both go through these functions.

use crate::domain::rlp::keccak256;
use crate::domain::value_objects::{Address, Hash, SealSignature};
use crate::errors::SignatureError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Recovers the signer address from a 65-byte `r || s || v` signature over a
/// prehashed message.
pub fn recover_address(prehash: &Hash, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != 65 {
        return Err(SignatureError::InvalidLength(signature.len()));
    }
    let recovery_id = parse_recovery_id(signature[64])?;
    let sig = Signature::from_slice(&signature[..64]).map_err(|_| SignatureError::InvalidFormat)?;

    let key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(address_from_pubkey(&key))
}

/// Signs a prehashed message, returning a 65-byte `r || s || v` signature
/// with `v` in `{0, 1}`.
pub fn sign_prehash(key: &SigningKey, prehash: &Hash) -> Result<SealSignature, SignatureError> {
    let (sig, recovery_id) = key
        .sign_prehash_recoverable(prehash.as_bytes())
        .map_err(|_| SignatureError::RecoveryFailed)?;

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(SealSignature(out))
}

/// Derives the account address from a public key: the low 20 bytes of the
/// Keccak-256 digest of the uncompressed point.
#[must_use]
pub fn address_from_pubkey(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_word(&digest)
}

/// Parses a recovery id byte. Accepts the raw form (0, 1) and the legacy
/// offset form (27, 28).
pub fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId(v))
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// Generates a fresh keypair and its account address.
    pub fn generate_keypair() -> (SigningKey, Address) {
        let key = SigningKey::random(&mut rand::thread_rng());
        let address = address_from_pubkey(key.verifying_key());
        (key, address)
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::generate_keypair;
    use super::*;

    #[test]
    fn sign_and_recover_round_trip() {
        let (key, address) = generate_keypair();
        let prehash = keccak256(b"seal me");

        let sig = sign_prehash(&key, &prehash).unwrap();
        let recovered = recover_address(&prehash, sig.as_bytes()).unwrap();
        assert_eq!(recovered, address);
    }

    #[test]
    fn legacy_recovery_id_is_accepted() {
        let (key, address) = generate_keypair();
        let prehash = keccak256(b"legacy v");

        let mut sig = sign_prehash(&key, &prehash).unwrap().0;
        sig[64] += 27;
        assert_eq!(recover_address(&prehash, &sig).unwrap(), address);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let prehash = keccak256(b"short");
        assert_eq!(
            recover_address(&prehash, &[0u8; 64]),
            Err(SignatureError::InvalidLength(64))
        );
    }

    #[test]
    fn bad_recovery_id_is_rejected() {
        let (key, _) = generate_keypair();
        let prehash = keccak256(b"bad v");
        let mut sig = sign_prehash(&key, &prehash).unwrap().0;
        sig[64] = 9;
        assert_eq!(
            recover_address(&prehash, &sig),
            Err(SignatureError::InvalidRecoveryId(9))
        );
    }

    #[test]
    fn tampered_message_recovers_different_address() {
        let (key, address) = generate_keypair();
        let sig = sign_prehash(&key, &keccak256(b"one")).unwrap();
        let recovered = recover_address(&keccak256(b"two"), sig.as_bytes()).unwrap();
        assert_ne!(recovered, address);
    }
}
