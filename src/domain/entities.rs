//! # Chain Entities
//!
//! Headers, blocks, legacy transactions, receipts and logs as the consensus
//! engine sees them. RLP layouts follow the canonical ledger encoding; the
//! seal hash covers every header field except the trailing 65 bytes of
//! extra-data.

use crate::domain::ecdsa;
use crate::domain::rlp::{self, keccak256};
use crate::domain::value_objects::{Address, Bloom, Hash, U256};
use crate::domain::{EXTRA_SEAL, EXTRA_VANITY};
use crate::errors::SignatureError;

/// Hash of the canonical empty uncle list, `keccak256(rlp([]))`.
#[must_use]
pub fn empty_uncle_hash() -> Hash {
    keccak256(&rlp::encode_list(&[]))
}

// =============================================================================
// HEADER
// =============================================================================

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Parent block hash.
    pub parent_hash: Hash,
    /// Uncle-list hash; always the empty-list hash in this protocol.
    pub uncle_hash: Hash,
    /// Block beneficiary; must equal the seal signer.
    pub coinbase: Address,
    /// Post-execution state root.
    pub root: Hash,
    /// Transaction trie root.
    pub tx_root: Hash,
    /// Receipt trie root.
    pub receipt_root: Hash,
    /// Aggregated log bloom.
    pub bloom: Bloom,
    /// Seal difficulty; 1 (out-of-turn) or 2 (in-turn).
    pub difficulty: U256,
    /// Block height.
    pub number: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Gas consumed by the block.
    pub gas_used: u64,
    /// Unix timestamp in seconds.
    pub time: u64,
    /// vanity(32) || [validators, epoch headers only] || seal(65).
    pub extra: Vec<u8>,
    /// Must be zero; there is no fork protection digest.
    pub mix_digest: Hash,
    /// Legacy PoW nonce; always zero.
    pub nonce: u64,
    /// EIP-1559 base fee, present from the London fork on.
    pub base_fee: Option<U256>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: Hash::ZERO,
            uncle_hash: empty_uncle_hash(),
            coinbase: Address::ZERO,
            root: Hash::ZERO,
            tx_root: Hash::ZERO,
            receipt_root: Hash::ZERO,
            bloom: Bloom::ZERO,
            difficulty: U256::zero(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            time: 0,
            extra: Vec::new(),
            mix_digest: Hash::ZERO,
            nonce: 0,
            base_fee: None,
        }
    }
}

impl Header {
    /// The block hash: Keccak-256 of the full RLP encoding.
    #[must_use]
    pub fn hash(&self) -> Hash {
        keccak256(&self.rlp_encode())
    }

    /// Full RLP encoding; the base fee is appended only when present.
    #[must_use]
    pub fn rlp_encode(&self) -> Vec<u8> {
        let mut fields = self.common_fields(&self.extra);
        if let Some(base_fee) = self.base_fee {
            fields.push(rlp::encode_uint(base_fee));
        }
        rlp::encode_list(&fields)
    }

    /// RLP of every field except the trailing seal bytes of extra-data.
    ///
    /// Panics when extra-data is shorter than the 65-byte seal, so the two
    /// forms (seal present or absent) can never hash alike.
    #[must_use]
    pub fn seal_rlp(&self) -> Vec<u8> {
        let fields = self.common_fields(&self.extra[..self.extra.len() - EXTRA_SEAL]);
        rlp::encode_list(&fields)
    }

    /// The hash a validator signs: Keccak-256 of [`Self::seal_rlp`].
    #[must_use]
    pub fn seal_hash(&self) -> Hash {
        keccak256(&self.seal_rlp())
    }

    fn common_fields(&self, extra: &[u8]) -> Vec<Vec<u8>> {
        vec![
            rlp::encode_bytes(self.parent_hash.as_bytes()),
            rlp::encode_bytes(self.uncle_hash.as_bytes()),
            rlp::encode_bytes(self.coinbase.as_bytes()),
            rlp::encode_bytes(self.root.as_bytes()),
            rlp::encode_bytes(self.tx_root.as_bytes()),
            rlp::encode_bytes(self.receipt_root.as_bytes()),
            rlp::encode_bytes(self.bloom.as_bytes()),
            rlp::encode_uint(self.difficulty),
            rlp::encode_u64(self.number),
            rlp::encode_u64(self.gas_limit),
            rlp::encode_u64(self.gas_used),
            rlp::encode_u64(self.time),
            rlp::encode_bytes(extra),
            rlp::encode_bytes(self.mix_digest.as_bytes()),
            rlp::encode_bytes(&self.nonce.to_be_bytes()),
        ]
    }

    /// The 65-byte seal suffix of extra-data, if long enough.
    #[must_use]
    pub fn seal(&self) -> Option<&[u8]> {
        if self.extra.len() < EXTRA_SEAL {
            return None;
        }
        Some(&self.extra[self.extra.len() - EXTRA_SEAL..])
    }

    /// Writes a seal signature into the trailing extra-data bytes.
    pub fn set_seal(&mut self, signature: &[u8; EXTRA_SEAL]) {
        let start = self.extra.len() - EXTRA_SEAL;
        self.extra[start..].copy_from_slice(signature);
    }

    /// The validator section between vanity and seal, in raw bytes.
    #[must_use]
    pub fn validator_bytes(&self) -> &[u8] {
        if self.extra.len() < EXTRA_VANITY + EXTRA_SEAL {
            return &[];
        }
        &self.extra[EXTRA_VANITY..self.extra.len() - EXTRA_SEAL]
    }
}

/// Parses the validator list embedded between vanity and seal of an epoch
/// header's extra-data. Returns `None` when the section length is not a
/// multiple of the address width.
#[must_use]
pub fn parse_checkpoint_validators(extra: &[u8]) -> Option<Vec<Address>> {
    if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return None;
    }
    let section = &extra[EXTRA_VANITY..extra.len() - EXTRA_SEAL];
    if section.len() % 20 != 0 {
        return None;
    }
    Some(
        section
            .chunks(20)
            .map(|chunk| Address::from_slice(chunk).expect("chunk is 20 bytes"))
            .collect(),
    )
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// A legacy (pre-typed) transaction signed with the EIP-155 scheme.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Sender account nonce.
    pub nonce: u64,
    /// Gas price in wei; zero for system transactions.
    pub gas_price: U256,
    /// Gas limit.
    pub gas: u64,
    /// Recipient; `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
    /// Call data.
    pub data: Vec<u8>,
    /// Signature recovery value (EIP-155 encoded, or 27/28 pre-fork).
    pub v: u64,
    /// Signature r.
    pub r: U256,
    /// Signature s.
    pub s: U256,
}

impl Transaction {
    /// Builds an unsigned transaction.
    #[must_use]
    pub fn new(
        nonce: u64,
        to: Option<Address>,
        value: U256,
        gas: u64,
        gas_price: U256,
        data: Vec<u8>,
    ) -> Self {
        Self {
            nonce,
            gas_price,
            gas,
            to,
            value,
            data,
            v: 0,
            r: U256::zero(),
            s: U256::zero(),
        }
    }

    fn body_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp::encode_u64(self.nonce),
            rlp::encode_uint(self.gas_price),
            rlp::encode_u64(self.gas),
            match self.to {
                Some(to) => rlp::encode_bytes(to.as_bytes()),
                None => rlp::encode_bytes(&[]),
            },
            rlp::encode_uint(self.value),
            rlp::encode_bytes(&self.data),
        ]
    }

    /// The hash signed under EIP-155 for the given chain.
    #[must_use]
    pub fn sig_hash(&self, chain_id: u64) -> Hash {
        let mut fields = self.body_fields();
        fields.push(rlp::encode_u64(chain_id));
        fields.push(rlp::encode_uint(U256::zero()));
        fields.push(rlp::encode_uint(U256::zero()));
        keccak256(&rlp::encode_list(&fields))
    }

    /// The pre-EIP-155 signing hash (six-field RLP).
    #[must_use]
    pub fn legacy_sig_hash(&self) -> Hash {
        keccak256(&rlp::encode_list(&self.body_fields()))
    }

    /// Full signed RLP encoding.
    #[must_use]
    pub fn rlp_encode(&self) -> Vec<u8> {
        let mut fields = self.body_fields();
        fields.push(rlp::encode_u64(self.v));
        fields.push(rlp::encode_uint(self.r));
        fields.push(rlp::encode_uint(self.s));
        rlp::encode_list(&fields)
    }

    /// The transaction hash.
    #[must_use]
    pub fn hash(&self) -> Hash {
        keccak256(&self.rlp_encode())
    }

    /// Attaches an EIP-155 signature produced over [`Self::sig_hash`].
    pub fn with_signature(mut self, signature: &[u8; 65], chain_id: u64) -> Self {
        self.r = U256::from_big_endian(&signature[..32]);
        self.s = U256::from_big_endian(&signature[32..64]);
        self.v = chain_id * 2 + 35 + u64::from(signature[64]);
        self
    }

    /// Recovers the sender address from the signature, deriving the chain id
    /// from `v`.
    pub fn sender(&self) -> Result<Address, SignatureError> {
        let (recovery_id, prehash) = if self.v == 27 || self.v == 28 {
            ((self.v - 27) as u8, self.legacy_sig_hash())
        } else if self.v >= 35 {
            let chain_id = (self.v - 35) / 2;
            (((self.v - 35) % 2) as u8, self.sig_hash(chain_id))
        } else {
            return Err(SignatureError::InvalidRecoveryId(self.v as u8));
        };

        let mut sig = [0u8; 65];
        self.r.to_big_endian(&mut sig[..32]);
        self.s.to_big_endian(&mut sig[32..64]);
        sig[64] = recovery_id;
        ecdsa::recover_address(&prehash, &sig)
    }
}

// =============================================================================
// LOGS AND RECEIPTS
// =============================================================================

/// A log emitted by contract execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics; topic 0 is the event signature.
    pub topics: Vec<Hash>,
    /// Unindexed payload.
    pub data: Vec<u8>,
}

/// Computes the bloom filter covering a set of logs.
#[must_use]
pub fn logs_bloom(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        bloom.accrue(&keccak256(log.address.as_bytes()));
        for topic in &log.topics {
            bloom.accrue(&keccak256(topic.as_bytes()));
        }
    }
    bloom
}

/// An execution receipt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Receipt {
    /// 1 for success, 0 for failure.
    pub status: u64,
    /// Gas consumed by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Bloom over this receipt's logs.
    pub bloom: Bloom,
    /// Logs emitted by the transaction.
    pub logs: Vec<Log>,
    /// Hash of the transaction this receipt belongs to.
    pub tx_hash: Hash,
    /// Hash of the enclosing block; zero while the block is being assembled.
    pub block_hash: Hash,
    /// Height of the enclosing block.
    pub block_number: u64,
    /// Index of the transaction within the block.
    pub transaction_index: u64,
}

impl Receipt {
    /// Builds a receipt with the given outcome and cumulative gas.
    #[must_use]
    pub fn new(failed: bool, cumulative_gas_used: u64) -> Self {
        Self {
            status: if failed { 0 } else { 1 },
            cumulative_gas_used,
            ..Default::default()
        }
    }

    /// Attaches logs and recomputes the bloom.
    pub fn set_logs(&mut self, logs: Vec<Log>) {
        self.bloom = logs_bloom(&logs);
        self.logs = logs;
    }
}

// =============================================================================
// BLOCK
// =============================================================================

/// A block: header plus transaction body. Uncles are forbidden by the
/// protocol and therefore not represented.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// Transactions, system transactions last.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Builds a block from its parts.
    #[must_use]
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Returns the same block carrying a freshly sealed header.
    #[must_use]
    pub fn with_seal(&self, header: Header) -> Self {
        Self {
            header,
            transactions: self.transactions.clone(),
        }
    }

    /// The block hash.
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ecdsa::test_helpers::generate_keypair;
    use crate::domain::ecdsa::sign_prehash;

    fn sealed_header() -> Header {
        Header {
            number: 7,
            gas_limit: 8_000_000,
            time: 1_700_000_000,
            extra: vec![0u8; EXTRA_VANITY + EXTRA_SEAL],
            difficulty: U256::from(2),
            ..Default::default()
        }
    }

    #[test]
    fn seal_hash_ignores_the_seal_bytes() {
        let mut header = sealed_header();
        let before = header.seal_hash();
        header.set_seal(&[0xaa; EXTRA_SEAL]);
        assert_eq!(header.seal_hash(), before);
        assert_ne!(header.hash(), before);
    }

    #[test]
    fn seal_hash_covers_the_vanity() {
        let mut header = sealed_header();
        let before = header.seal_hash();
        header.extra[0] = 0xff;
        assert_ne!(header.seal_hash(), before);
    }

    #[test]
    fn base_fee_changes_the_block_hash_only() {
        let mut header = sealed_header();
        let hash = header.hash();
        let seal_hash = header.seal_hash();
        header.base_fee = Some(U256::from(1_000_000_000u64));
        assert_ne!(header.hash(), hash);
        assert_eq!(header.seal_hash(), seal_hash);
    }

    #[test]
    fn checkpoint_validators_round_trip() {
        let vals = vec![Address::new([1; 20]), Address::new([2; 20])];
        let mut extra = vec![0u8; EXTRA_VANITY];
        for val in &vals {
            extra.extend_from_slice(val.as_bytes());
        }
        extra.extend_from_slice(&[0u8; EXTRA_SEAL]);

        assert_eq!(parse_checkpoint_validators(&extra), Some(vals));
    }

    #[test]
    fn checkpoint_validators_reject_ragged_section() {
        let mut extra = vec![0u8; EXTRA_VANITY];
        extra.extend_from_slice(&[0u8; 7]);
        extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
        assert_eq!(parse_checkpoint_validators(&extra), None);
    }

    #[test]
    fn transaction_sign_and_recover() {
        let (key, address) = generate_keypair();
        let chain_id = 321;
        let tx = Transaction::new(
            3,
            Some(Address::new([9; 20])),
            U256::from(10),
            21_000,
            U256::zero(),
            vec![1, 2, 3],
        );
        let sig = sign_prehash(&key, &tx.sig_hash(chain_id)).unwrap();
        let signed = tx.with_signature(sig.as_bytes(), chain_id);

        assert_eq!(signed.sender().unwrap(), address);
        assert!(signed.v == chain_id * 2 + 35 || signed.v == chain_id * 2 + 36);
    }

    #[test]
    fn transaction_hash_depends_on_signature() {
        let (key, _) = generate_keypair();
        let tx = Transaction::new(0, None, U256::zero(), 50_000, U256::zero(), vec![]);
        let unsigned_hash = tx.hash();
        let sig = sign_prehash(&key, &tx.sig_hash(1)).unwrap();
        let signed = tx.with_signature(sig.as_bytes(), 1);
        assert_ne!(signed.hash(), unsigned_hash);
    }

    #[test]
    fn receipt_bloom_covers_log_address_and_topics() {
        let log = Log {
            address: Address::new([3; 20]),
            topics: vec![keccak256(b"Transfer(address,address,uint256)")],
            data: vec![],
        };
        let mut receipt = Receipt::new(false, 21_000);
        receipt.set_logs(vec![log]);
        assert!(!receipt.bloom.is_zero());
        assert_eq!(receipt.status, 1);
    }

    #[test]
    fn default_header_carries_empty_uncle_hash() {
        assert_eq!(Header::default().uncle_hash, empty_uncle_hash());
    }
}
