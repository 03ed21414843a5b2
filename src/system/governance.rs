//! # Governance Proposals
//!
//! Passed proposals are read from the governance contract, executed as
//! synthetic system transactions and finished on-chain in a second pass. The
//! proposal payload travels RLP-encoded in the transaction data, so producer
//! and verifier can compare it bytewise.

use crate::domain::entities::Header;
use crate::domain::rlp;
use crate::domain::value_objects::{Address, U256};
use crate::errors::{RlpError, SystemCallError};
use crate::ports::state::State;
use crate::system::abi::Token;
use crate::system::contracts::{GOVERNANCE_ADDR, GOVERNANCE_CONTRACT};
use crate::system::invoker::SystemInvoker;

/// Proposal action: execute an EVM call.
pub const ACTION_EVM_CALL: u64 = 0;

/// Proposal action: erase the code of a contract.
pub const ACTION_ERASE_CODE: u64 = 1;

/// A passed system governance proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Proposal identifier assigned by the governance contract.
    pub id: U256,
    /// Action discriminator; see [`ACTION_EVM_CALL`] and [`ACTION_ERASE_CODE`].
    pub action: U256,
    /// Caller of the proposal's EVM action.
    pub from: Address,
    /// Target of the proposal's action.
    pub to: Address,
    /// Value forwarded by the EVM action (forced to zero after Sophon).
    pub value: U256,
    /// Call data of the EVM action.
    pub data: Vec<u8>,
}

impl Proposal {
    /// RLP-encodes the proposal exactly as embedded in system transactions.
    #[must_use]
    pub fn rlp_encode(&self) -> Vec<u8> {
        rlp::encode_list(&[
            rlp::encode_uint(self.id),
            rlp::encode_uint(self.action),
            rlp::encode_bytes(self.from.as_bytes()),
            rlp::encode_bytes(self.to.as_bytes()),
            rlp::encode_uint(self.value),
            rlp::encode_bytes(&self.data),
        ])
    }

    /// Decodes a proposal from system-transaction data.
    pub fn rlp_decode(data: &[u8]) -> Result<Self, RlpError> {
        let items = rlp::decode_list_exact(data, 6)?;
        let from = items[2].as_bytes()?;
        let to = items[3].as_bytes()?;
        Ok(Self {
            id: items[0].as_uint()?,
            action: items[1].as_uint()?,
            from: Address::from_slice(from).ok_or(RlpError::InvalidLength(from.len()))?,
            to: Address::from_slice(to).ok_or(RlpError::InvalidLength(to.len()))?,
            value: items[4].as_uint()?,
            data: items[5].as_bytes()?.to_vec(),
        })
    }
}

/// Number of passed proposals waiting for execution.
pub fn passed_proposal_count(
    invoker: &SystemInvoker,
    state: &mut dyn State,
    header: &Header,
) -> Result<u32, SystemCallError> {
    let tokens = invoker.read_call(
        header.coinbase,
        GOVERNANCE_CONTRACT,
        GOVERNANCE_ADDR,
        "getPassedProposalCount",
        &[],
        state,
        header,
    )?;
    tokens
        .first()
        .and_then(Token::as_u32)
        .ok_or_else(|| SystemCallError::UnexpectedOutput("proposal count".into()))
}

/// The passed proposal at `index` in the contract's current ordering.
pub fn passed_proposal_by_index(
    invoker: &SystemInvoker,
    index: u32,
    state: &mut dyn State,
    header: &Header,
) -> Result<Proposal, SystemCallError> {
    let tokens = invoker.read_call(
        header.coinbase,
        GOVERNANCE_CONTRACT,
        GOVERNANCE_ADDR,
        "getPassedProposalByIndex",
        &[Token::Uint(U256::from(index))],
        state,
        header,
    )?;
    let bad = || SystemCallError::UnexpectedOutput("proposal".into());
    Ok(Proposal {
        id: tokens.first().and_then(Token::as_uint).ok_or_else(bad)?,
        action: tokens.get(1).and_then(Token::as_uint).ok_or_else(bad)?,
        from: tokens.get(2).and_then(Token::as_address).ok_or_else(bad)?,
        to: tokens.get(3).and_then(Token::as_address).ok_or_else(bad)?,
        value: tokens.get(4).and_then(Token::as_uint).ok_or_else(bad)?,
        data: tokens
            .get(5)
            .and_then(Token::as_bytes)
            .ok_or_else(bad)?
            .to_vec(),
    })
}

/// Marks a proposal finished on-chain. Must run only after every passed
/// proposal of the block has executed, because finishing reorders the
/// contract's proposal list.
pub fn finish_proposal_by_id(
    invoker: &SystemInvoker,
    id: U256,
    state: &mut dyn State,
    header: &Header,
) -> Result<(), SystemCallError> {
    // Runs outside any transaction; reset the log attribution point.
    state.prepare(crate::domain::value_objects::Hash::ZERO, 0);
    invoker.mutate_call(
        GOVERNANCE_CONTRACT,
        GOVERNANCE_ADDR,
        "finishProposalById",
        &[Token::Uint(id)],
        U256::zero(),
        state,
        header,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Proposal {
        Proposal {
            id: U256::from(7),
            action: U256::from(ACTION_EVM_CALL),
            from: Address::new([0xaa; 20]),
            to: Address::new([0xbb; 20]),
            value: U256::from(1234),
            data: vec![0x01, 0x02, 0x03],
        }
    }

    #[test]
    fn proposal_rlp_round_trip() {
        let prop = sample();
        let encoded = prop.rlp_encode();
        assert_eq!(Proposal::rlp_decode(&encoded).unwrap(), prop);
    }

    #[test]
    fn proposal_rlp_is_bytewise_stable() {
        let prop = sample();
        assert_eq!(prop.rlp_encode(), prop.rlp_encode());
        let mut other = sample();
        other.value = U256::from(1235);
        assert_ne!(prop.rlp_encode(), other.rlp_encode());
    }

    #[test]
    fn proposal_decode_rejects_wrong_arity() {
        let encoded = rlp::encode_list(&[rlp::encode_uint(U256::one())]);
        assert!(matches!(
            Proposal::rlp_decode(&encoded),
            Err(RlpError::ItemCount { expected: 6, .. })
        ));
    }

    #[test]
    fn proposal_decode_rejects_short_address() {
        let encoded = rlp::encode_list(&[
            rlp::encode_uint(U256::one()),
            rlp::encode_uint(U256::zero()),
            rlp::encode_bytes(&[0xaa; 19]),
            rlp::encode_bytes(&[0xbb; 20]),
            rlp::encode_uint(U256::zero()),
            rlp::encode_bytes(&[]),
        ]);
        assert!(matches!(
            Proposal::rlp_decode(&encoded),
            Err(RlpError::InvalidLength(19))
        ));
    }

    #[test]
    fn empty_data_round_trips() {
        let prop = Proposal {
            data: Vec::new(),
            value: U256::zero(),
            ..sample()
        };
        let encoded = prop.rlp_encode();
        assert_eq!(Proposal::rlp_decode(&encoded).unwrap(), prop);
    }
}
