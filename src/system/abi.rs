//! # ABI Registry
//!
//! Call-data packing and return-data unpacking for the system-contract
//! methods the engine drives. The registry is built once at engine start and
//! is immutable afterwards; selectors are the first four bytes of the
//! Keccak-256 digest of the canonical method signature.

use crate::domain::rlp::keccak256;
use crate::domain::value_objects::{Address, Hash, U256};
use crate::errors::AbiError;
use std::collections::BTreeMap;

// =============================================================================
// PARAMETERS AND TOKENS
// =============================================================================

/// Canonical ABI parameter kinds used by the system contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `address`
    Address,
    /// `uint256`
    Uint256,
    /// `uint128`
    Uint128,
    /// `uint32`
    Uint32,
    /// `uint8`
    Uint8,
    /// `bool`
    Bool,
    /// `bytes32`
    Bytes32,
    /// `bytes`
    Bytes,
    /// `address[]`
    AddressArray,
}

impl ParamKind {
    /// The canonical type string entering the method signature.
    #[must_use]
    pub fn canonical(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Uint256 => "uint256",
            Self::Uint128 => "uint128",
            Self::Uint32 => "uint32",
            Self::Uint8 => "uint8",
            Self::Bool => "bool",
            Self::Bytes32 => "bytes32",
            Self::Bytes => "bytes",
            Self::AddressArray => "address[]",
        }
    }

    /// Whether the value is encoded in the tail with a head offset.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Bytes | Self::AddressArray)
    }
}

/// A decoded or to-be-encoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An address value.
    Address(Address),
    /// Any word-sized unsigned integer.
    Uint(U256),
    /// A boolean value.
    Bool(bool),
    /// A fixed 32-byte value.
    Bytes32(Hash),
    /// A dynamic byte string.
    Bytes(Vec<u8>),
    /// A dynamic address array.
    AddressArray(Vec<Address>),
}

impl Token {
    /// The address carried by this token, if it is one.
    #[must_use]
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(addr) => Some(*addr),
            _ => None,
        }
    }

    /// The integer carried by this token, if it is one.
    #[must_use]
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::Uint(value) => Some(*value),
            _ => None,
        }
    }

    /// The integer carried by this token, narrowed to `u32`.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        self.as_uint()
            .and_then(|v| if v <= U256::from(u32::MAX) { Some(v.as_u32()) } else { None })
    }

    /// The boolean carried by this token, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The 32-byte value carried by this token, if it is one.
    #[must_use]
    pub fn as_bytes32(&self) -> Option<Hash> {
        match self {
            Self::Bytes32(value) => Some(*value),
            _ => None,
        }
    }

    /// The byte string carried by this token, if it is one.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    /// The address array carried by this token, if it is one.
    #[must_use]
    pub fn as_address_array(&self) -> Option<&[Address]> {
        match self {
            Self::AddressArray(values) => Some(values),
            _ => None,
        }
    }

    fn matches(&self, kind: ParamKind) -> bool {
        matches!(
            (self, kind),
            (Self::Address(_), ParamKind::Address)
                | (
                    Self::Uint(_),
                    ParamKind::Uint256 | ParamKind::Uint128 | ParamKind::Uint32 | ParamKind::Uint8
                )
                | (Self::Bool(_), ParamKind::Bool)
                | (Self::Bytes32(_), ParamKind::Bytes32)
                | (Self::Bytes(_), ParamKind::Bytes)
                | (Self::AddressArray(_), ParamKind::AddressArray)
        )
    }
}

// =============================================================================
// METHODS
// =============================================================================

/// A single contract method: signature, selector and parameter layout.
#[derive(Debug, Clone)]
pub struct Method {
    name: &'static str,
    inputs: Vec<ParamKind>,
    outputs: Vec<ParamKind>,
    selector: [u8; 4],
}

impl Method {
    fn new(name: &'static str, inputs: Vec<ParamKind>, outputs: Vec<ParamKind>) -> Self {
        let signature = format!(
            "{name}({})",
            inputs
                .iter()
                .map(ParamKind::canonical)
                .collect::<Vec<_>>()
                .join(",")
        );
        let digest = keccak256(signature.as_bytes());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&digest.as_bytes()[..4]);
        Self {
            name,
            inputs,
            outputs,
            selector,
        }
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The four-byte call selector.
    #[must_use]
    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    /// Packs call data: selector followed by the ABI-encoded arguments.
    pub fn pack(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        if args.len() != self.inputs.len()
            || args.iter().zip(&self.inputs).any(|(arg, kind)| !arg.matches(*kind))
        {
            return Err(AbiError::ArgumentMismatch {
                method: self.name.to_string(),
                expected: self.inputs.len(),
                got: args.len(),
            });
        }

        let encoded = encode_values(args);
        let mut out = Vec::with_capacity(4 + encoded.len());
        out.extend_from_slice(&self.selector);
        out.extend_from_slice(&encoded);
        Ok(out)
    }

    /// Unpacks return data according to the declared outputs.
    pub fn unpack(&self, data: &[u8]) -> Result<Vec<Token>, AbiError> {
        decode_values(data, &self.outputs)
    }

    /// Unpacks the argument section of call data (after the selector)
    /// according to the declared inputs.
    pub fn unpack_inputs(&self, data: &[u8]) -> Result<Vec<Token>, AbiError> {
        let args = data.get(4..).ok_or(AbiError::Truncated { offset: 0 })?;
        decode_values(args, &self.inputs)
    }
}

/// ABI-encodes a token sequence: static head words plus a dynamic tail with
/// offsets. Dynamic-ness follows the token variant.
#[must_use]
pub fn encode_values(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Bytes(_) | Token::AddressArray(_) => {
                head.extend_from_slice(&uint_word(U256::from(head_len + tail.len())));
                tail.extend_from_slice(&encode_tail(token));
            }
            _ => head.extend_from_slice(&encode_static(token)),
        }
    }
    head.extend_from_slice(&tail);
    head
}

fn decode_values(data: &[u8], kinds: &[ParamKind]) -> Result<Vec<Token>, AbiError> {
    let mut tokens = Vec::with_capacity(kinds.len());
    for (index, kind) in kinds.iter().enumerate() {
        let word = read_word(data, index * 32)?;
        let token = if kind.is_dynamic() {
            let offset = word_to_offset(&word)?;
            decode_tail(data, offset, *kind)?
        } else {
            decode_static(&word, *kind)
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn uint_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn encode_static(token: &Token) -> [u8; 32] {
    match token {
        Token::Address(addr) => *addr.into_word().as_bytes(),
        Token::Uint(value) => uint_word(*value),
        Token::Bool(value) => uint_word(U256::from(u8::from(*value))),
        Token::Bytes32(value) => *value.as_bytes(),
        // Dynamic tokens never reach here; pack routes them to the tail.
        Token::Bytes(_) | Token::AddressArray(_) => [0u8; 32],
    }
}

fn encode_tail(token: &Token) -> Vec<u8> {
    match token {
        Token::Bytes(data) => {
            let mut out = uint_word(U256::from(data.len())).to_vec();
            out.extend_from_slice(data);
            let padding = (32 - data.len() % 32) % 32;
            out.extend(std::iter::repeat(0u8).take(padding));
            out
        }
        Token::AddressArray(addrs) => {
            let mut out = uint_word(U256::from(addrs.len())).to_vec();
            for addr in addrs {
                out.extend_from_slice(addr.into_word().as_bytes());
            }
            out
        }
        _ => Vec::new(),
    }
}

fn read_word(data: &[u8], offset: usize) -> Result<[u8; 32], AbiError> {
    let end = offset.checked_add(32).ok_or(AbiError::InvalidOffset)?;
    if data.len() < end {
        return Err(AbiError::Truncated { offset });
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[offset..end]);
    Ok(word)
}

fn word_to_offset(word: &[u8; 32]) -> Result<usize, AbiError> {
    let value = U256::from_big_endian(word);
    if value > U256::from(u32::MAX) {
        return Err(AbiError::InvalidOffset);
    }
    Ok(value.as_usize())
}

fn decode_static(word: &[u8; 32], kind: ParamKind) -> Token {
    match kind {
        ParamKind::Address => Token::Address(Address::from_word(&Hash::new(*word))),
        ParamKind::Uint256 | ParamKind::Uint128 | ParamKind::Uint32 | ParamKind::Uint8 => {
            Token::Uint(U256::from_big_endian(word))
        }
        ParamKind::Bool => Token::Bool(word[31] != 0),
        ParamKind::Bytes32 => Token::Bytes32(Hash::new(*word)),
        ParamKind::Bytes | ParamKind::AddressArray => Token::Bytes(Vec::new()),
    }
}

fn decode_tail(data: &[u8], offset: usize, kind: ParamKind) -> Result<Token, AbiError> {
    let len_word = read_word(data, offset)?;
    let len = word_to_offset(&len_word)?;
    match kind {
        ParamKind::Bytes => {
            let start = offset + 32;
            let end = start.checked_add(len).ok_or(AbiError::InvalidOffset)?;
            if data.len() < end {
                return Err(AbiError::Truncated { offset: start });
            }
            Ok(Token::Bytes(data[start..end].to_vec()))
        }
        ParamKind::AddressArray => {
            let mut addrs = Vec::with_capacity(len);
            for i in 0..len {
                let word = read_word(data, offset + 32 + i * 32)?;
                addrs.push(Address::from_word(&Hash::new(word)));
            }
            Ok(Token::AddressArray(addrs))
        }
        _ => Err(AbiError::InvalidOffset),
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// The methods of one system contract.
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    methods: BTreeMap<&'static str, Method>,
}

impl ContractAbi {
    fn with(mut self, name: &'static str, inputs: Vec<ParamKind>, outputs: Vec<ParamKind>) -> Self {
        self.methods.insert(name, Method::new(name, inputs, outputs));
        self
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Result<&Method, AbiError> {
        self.methods
            .get(name)
            .ok_or_else(|| AbiError::UnknownMethod(name.to_string()))
    }

    /// Looks up a method by its four-byte selector.
    #[must_use]
    pub fn method_by_selector(&self, selector: [u8; 4]) -> Option<&Method> {
        self.methods
            .values()
            .find(|method| method.selector == selector)
    }
}

/// Immutable name → ABI map for every system contract, built once at engine
/// construction.
#[derive(Debug, Clone)]
pub struct AbiRegistry {
    contracts: BTreeMap<&'static str, ContractAbi>,
}

impl AbiRegistry {
    /// Builds the registry covering all interactive system-contract methods.
    #[must_use]
    pub fn interactive() -> Self {
        use ParamKind::{
            Address as Addr, AddressArray as AddrArray, Bool, Bytes, Bytes32, Uint128, Uint256,
            Uint32, Uint8,
        };
        let mut contracts = BTreeMap::new();

        contracts.insert(
            crate::system::contracts::VALIDATORS_CONTRACT,
            ContractAbi::default()
                .with("initialize", vec![AddrArray], vec![])
                .with("distributeBlockReward", vec![], vec![])
                .with("getTopValidators", vec![], vec![AddrArray])
                .with("updateActiveValidatorSet", vec![AddrArray, Uint256], vec![])
                .with(
                    "getValidatorInfo",
                    vec![Addr],
                    vec![Addr, Uint8, Uint256, Uint256, Uint256, Uint256, AddrArray],
                ),
        );

        contracts.insert(
            crate::system::contracts::PUNISH_CONTRACT,
            ContractAbi::default()
                .with("initialize", vec![], vec![])
                .with("punish", vec![Addr], vec![])
                .with("decreaseMissedBlocksCounter", vec![Uint256], vec![]),
        );

        contracts.insert(
            crate::system::contracts::PROPOSAL_CONTRACT,
            ContractAbi::default().with("initialize", vec![AddrArray], vec![]),
        );

        contracts.insert(
            crate::system::contracts::GOVERNANCE_CONTRACT,
            ContractAbi::default()
                .with("initialize", vec![Addr], vec![])
                .with("finishProposalById", vec![Uint256], vec![])
                .with("getPassedProposalCount", vec![], vec![Uint32])
                .with(
                    "getPassedProposalByIndex",
                    vec![Uint32],
                    vec![Uint256, Uint256, Addr, Addr, Uint256, Bytes],
                ),
        );

        contracts.insert(
            crate::system::contracts::ADDRESS_LIST_CONTRACT,
            ContractAbi::default()
                .with("initialize", vec![Addr], vec![])
                .with("initializeV2", vec![], vec![])
                .with("getBlacksFrom", vec![], vec![AddrArray])
                .with("getBlacksTo", vec![], vec![AddrArray])
                .with("getRuleByIndex", vec![Uint32], vec![Bytes32, Uint128, Uint8])
                .with("rulesLen", vec![], vec![Uint32])
                .with("devVerifyEnabled", vec![], vec![Bool])
                .with("isDeveloper", vec![Addr], vec![Bool])
                .with("blackLastUpdatedNumber", vec![], vec![Uint256])
                .with("rulesLastUpdatedNumber", vec![], vec![Uint256]),
        );

        contracts.insert(
            crate::system::contracts::VALIDATORS_V1_CONTRACT,
            ContractAbi::default()
                .with("initialize", vec![AddrArray, AddrArray, Addr], vec![])
                .with("distributeBlockReward", vec![], vec![])
                .with("getTopValidators", vec![], vec![AddrArray])
                .with("updateActiveValidatorSet", vec![AddrArray, Uint256], vec![])
                .with("activeValidators", vec![Uint256], vec![Addr]),
        );

        contracts.insert(
            crate::system::contracts::PUNISH_V1_CONTRACT,
            ContractAbi::default().with("initialize", vec![], vec![]),
        );

        Self { contracts }
    }

    /// Looks up a contract ABI by registry name.
    pub fn contract(&self, name: &str) -> Result<&ContractAbi, AbiError> {
        self.contracts
            .get(name)
            .ok_or_else(|| AbiError::UnknownContract(name.to_string()))
    }

    /// Looks up a method by contract and method name.
    pub fn method(&self, contract: &str, method: &str) -> Result<&Method, AbiError> {
        self.contract(contract)?.method(method)
    }
}
