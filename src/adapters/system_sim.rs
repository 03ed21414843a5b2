//! A programmable system-contract simulator.
//!
//! Stands in for the EVM executor in tests: decodes incoming system calls
//! against the ABI registry, answers reads from configurable tables, records
//! writes for assertions, and moves value like a plain transfer would.
//! Individual methods or target addresses can be made to fail.

use crate::domain::entities::Header;
use crate::domain::value_objects::{Address, Hash, U256};
use crate::errors::ExecutionError;
use crate::ports::executor::{Message, MessageExecutor};
use crate::ports::state::State;
use crate::system::abi::{encode_values, AbiRegistry, Token};
use crate::system::contracts::{
    ADDRESS_LIST_ADDR, ADDRESS_LIST_CONTRACT, GOVERNANCE_ADDR, GOVERNANCE_CONTRACT,
    PROPOSAL_ADDR, PROPOSAL_CONTRACT, PUNISH_CONTRACT, PUNISH_V0_ADDR, PUNISH_V1_ADDR,
    PUNISH_V1_CONTRACT, VALIDATORS_CONTRACT, VALIDATORS_V0_ADDR, VALIDATORS_V1_ADDR,
    VALIDATORS_V1_CONTRACT,
};
use crate::system::governance::Proposal;
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Everything the simulator recorded about mutating calls.
#[derive(Debug, Clone, Default)]
pub struct SimRecords {
    /// Contracts that received an `initialize`-family call, in order.
    pub initialized: Vec<Address>,
    /// Validators handed to `punish`, in order.
    pub punished: Vec<Address>,
    /// Arguments of `updateActiveValidatorSet` calls.
    pub updated_sets: Vec<(Vec<Address>, U256)>,
    /// Epoch arguments of `decreaseMissedBlocksCounter` calls.
    pub decreased_counters: Vec<U256>,
    /// Values carried by `distributeBlockReward` calls.
    pub rewards: Vec<U256>,
    /// Proposal ids handed to `finishProposalById`, in order.
    pub finished: Vec<U256>,
    /// Non-system calls (proposal EVM actions): from, to, value, data.
    pub plain_calls: Vec<(Address, Address, U256, Vec<u8>)>,
}

#[derive(Default)]
struct SimInner {
    top_validators: Vec<Address>,
    proposals: Vec<Proposal>,
    blacks_from: Vec<Address>,
    blacks_to: Vec<Address>,
    rules: Vec<(Hash, u64, u8)>,
    devs: BTreeSet<Address>,
    dev_verify_enabled: bool,
    black_last_updated: u64,
    rules_last_updated: u64,
    fail_methods: BTreeSet<String>,
    fail_targets: BTreeSet<Address>,
    records: SimRecords,
}

/// The simulator; implements [`MessageExecutor`].
pub struct SystemContractSim {
    registry: AbiRegistry,
    inner: Mutex<SimInner>,
}

impl Default for SystemContractSim {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemContractSim {
    /// Creates a simulator with empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: AbiRegistry::interactive(),
            inner: Mutex::new(SimInner::default()),
        }
    }

    /// Sets the validator set `getTopValidators` reports.
    pub fn set_top_validators(&self, validators: Vec<Address>) {
        self.inner.lock().top_validators = validators;
    }

    /// Queues passed proposals in contract order.
    pub fn set_passed_proposals(&self, proposals: Vec<Proposal>) {
        self.inner.lock().proposals = proposals;
    }

    /// Sets the blacklist arrays.
    pub fn set_blacklist(&self, froms: Vec<Address>, tos: Vec<Address>) {
        let mut inner = self.inner.lock();
        inner.blacks_from = froms;
        inner.blacks_to = tos;
    }

    /// Sets the event check rules as (signature, topic index, check type).
    pub fn set_rules(&self, rules: Vec<(Hash, u64, u8)>) {
        self.inner.lock().rules = rules;
    }

    /// Registers a verified developer.
    pub fn add_developer(&self, addr: Address) {
        self.inner.lock().devs.insert(addr);
    }

    /// Switches the developer-verification flag reported by the contract.
    pub fn set_dev_verify_enabled(&self, enabled: bool) {
        self.inner.lock().dev_verify_enabled = enabled;
    }

    /// Makes every call to the named method fail.
    pub fn fail_method(&self, method: &str) {
        self.inner.lock().fail_methods.insert(method.to_string());
    }

    /// Makes every call to the given address fail.
    pub fn fail_target(&self, addr: Address) {
        self.inner.lock().fail_targets.insert(addr);
    }

    /// A copy of everything recorded so far.
    #[must_use]
    pub fn records(&self) -> SimRecords {
        self.inner.lock().records.clone()
    }

    /// Proposals not yet finished.
    #[must_use]
    pub fn remaining_proposals(&self) -> usize {
        self.inner.lock().proposals.len()
    }

    fn contract_names(to: Address) -> Option<&'static [&'static str]> {
        if to == VALIDATORS_V0_ADDR || to == VALIDATORS_V1_ADDR {
            Some(&[VALIDATORS_CONTRACT, VALIDATORS_V1_CONTRACT])
        } else if to == PUNISH_V0_ADDR || to == PUNISH_V1_ADDR {
            Some(&[PUNISH_CONTRACT, PUNISH_V1_CONTRACT])
        } else if to == PROPOSAL_ADDR {
            Some(&[PROPOSAL_CONTRACT])
        } else if to == GOVERNANCE_ADDR {
            Some(&[GOVERNANCE_CONTRACT])
        } else if to == ADDRESS_LIST_ADDR {
            Some(&[ADDRESS_LIST_CONTRACT])
        } else {
            None
        }
    }

    fn transfer(
        msg: &Message,
        to: Address,
        state: &mut dyn State,
    ) -> Result<(), ExecutionError> {
        if msg.value.is_zero() {
            return Ok(());
        }
        let balance = state.balance(&msg.from);
        if balance < msg.value {
            return Err(ExecutionError::Failed("insufficient balance".into()));
        }
        state.set_balance(&msg.from, balance - msg.value);
        state.add_balance(&to, msg.value);
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch(
        &self,
        contract: &'static str,
        method_name: &str,
        args: Vec<Token>,
        msg: &Message,
        to: Address,
    ) -> Result<Vec<u8>, ExecutionError> {
        let mut inner = self.inner.lock();
        if inner.fail_methods.contains(method_name) {
            return Err(ExecutionError::Failed(format!(
                "simulated failure in {method_name}"
            )));
        }

        let bad_args = || ExecutionError::Failed("malformed call arguments".into());
        let out = match (contract, method_name) {
            (VALIDATORS_CONTRACT | VALIDATORS_V1_CONTRACT, "getTopValidators") => {
                encode_values(&[Token::AddressArray(inner.top_validators.clone())])
            }
            (VALIDATORS_CONTRACT | VALIDATORS_V1_CONTRACT, "updateActiveValidatorSet") => {
                let set = args
                    .first()
                    .and_then(Token::as_address_array)
                    .ok_or_else(bad_args)?
                    .to_vec();
                let epoch = args.get(1).and_then(Token::as_uint).ok_or_else(bad_args)?;
                inner.top_validators = set.clone();
                inner.records.updated_sets.push((set, epoch));
                Vec::new()
            }
            (VALIDATORS_CONTRACT | VALIDATORS_V1_CONTRACT, "distributeBlockReward") => {
                inner.records.rewards.push(msg.value);
                Vec::new()
            }
            (VALIDATORS_CONTRACT, "getValidatorInfo") => {
                let validator = args.first().and_then(Token::as_address).ok_or_else(bad_args)?;
                encode_values(&[
                    Token::Address(validator),
                    Token::Uint(U256::zero()),
                    Token::Uint(U256::zero()),
                    Token::Uint(U256::zero()),
                    Token::Uint(U256::zero()),
                    Token::Uint(U256::zero()),
                    Token::AddressArray(Vec::new()),
                ])
            }
            (VALIDATORS_V1_CONTRACT, "activeValidators") => {
                let index = args.first().and_then(Token::as_uint).ok_or_else(bad_args)?;
                let validator = inner
                    .top_validators
                    .get(index.low_u64() as usize)
                    .copied()
                    .unwrap_or_default();
                encode_values(&[Token::Address(validator)])
            }
            (PUNISH_CONTRACT | PUNISH_V1_CONTRACT, "punish") => {
                let validator = args.first().and_then(Token::as_address).ok_or_else(bad_args)?;
                inner.records.punished.push(validator);
                Vec::new()
            }
            (PUNISH_CONTRACT | PUNISH_V1_CONTRACT, "decreaseMissedBlocksCounter") => {
                let epoch = args.first().and_then(Token::as_uint).ok_or_else(bad_args)?;
                inner.records.decreased_counters.push(epoch);
                Vec::new()
            }
            (GOVERNANCE_CONTRACT, "getPassedProposalCount") => {
                encode_values(&[Token::Uint(U256::from(inner.proposals.len() as u64))])
            }
            (GOVERNANCE_CONTRACT, "getPassedProposalByIndex") => {
                let index = args.first().and_then(Token::as_uint).ok_or_else(bad_args)?;
                let proposal = inner
                    .proposals
                    .get(index.low_u64() as usize)
                    .ok_or_else(|| ExecutionError::Failed("proposal index out of range".into()))?;
                encode_values(&[
                    Token::Uint(proposal.id),
                    Token::Uint(proposal.action),
                    Token::Address(proposal.from),
                    Token::Address(proposal.to),
                    Token::Uint(proposal.value),
                    Token::Bytes(proposal.data.clone()),
                ])
            }
            (GOVERNANCE_CONTRACT, "finishProposalById") => {
                let id = args.first().and_then(Token::as_uint).ok_or_else(bad_args)?;
                // Finishing swaps the last proposal into the hole, the
                // reordering that forces the engine's two-phase schedule.
                if let Some(position) = inner.proposals.iter().position(|p| p.id == id) {
                    inner.proposals.swap_remove(position);
                }
                inner.records.finished.push(id);
                Vec::new()
            }
            (ADDRESS_LIST_CONTRACT, "getBlacksFrom") => {
                encode_values(&[Token::AddressArray(inner.blacks_from.clone())])
            }
            (ADDRESS_LIST_CONTRACT, "getBlacksTo") => {
                encode_values(&[Token::AddressArray(inner.blacks_to.clone())])
            }
            (ADDRESS_LIST_CONTRACT, "rulesLen") => {
                encode_values(&[Token::Uint(U256::from(inner.rules.len() as u64))])
            }
            (ADDRESS_LIST_CONTRACT, "getRuleByIndex") => {
                let index = args.first().and_then(Token::as_uint).ok_or_else(bad_args)?;
                let (sig, topic_index, check) = inner
                    .rules
                    .get(index.low_u64() as usize)
                    .copied()
                    .ok_or_else(|| ExecutionError::Failed("rule index out of range".into()))?;
                encode_values(&[
                    Token::Bytes32(sig),
                    Token::Uint(U256::from(topic_index)),
                    Token::Uint(U256::from(check)),
                ])
            }
            (ADDRESS_LIST_CONTRACT, "devVerifyEnabled") => {
                encode_values(&[Token::Bool(inner.dev_verify_enabled)])
            }
            (ADDRESS_LIST_CONTRACT, "isDeveloper") => {
                let addr = args.first().and_then(Token::as_address).ok_or_else(bad_args)?;
                encode_values(&[Token::Bool(inner.devs.contains(&addr))])
            }
            (ADDRESS_LIST_CONTRACT, "blackLastUpdatedNumber") => {
                encode_values(&[Token::Uint(U256::from(inner.black_last_updated))])
            }
            (ADDRESS_LIST_CONTRACT, "rulesLastUpdatedNumber") => {
                encode_values(&[Token::Uint(U256::from(inner.rules_last_updated))])
            }
            (_, "initialize" | "initializeV2") => {
                inner.records.initialized.push(to);
                Vec::new()
            }
            _ => {
                return Err(ExecutionError::Failed(format!(
                    "unhandled system call {method_name}"
                )))
            }
        };
        Ok(out)
    }
}

impl MessageExecutor for SystemContractSim {
    fn execute(
        &self,
        msg: &Message,
        state: &mut dyn State,
        _header: &Header,
    ) -> Result<Vec<u8>, ExecutionError> {
        let Some(to) = msg.to else {
            return Ok(Vec::new());
        };
        if self.inner.lock().fail_targets.contains(&to) {
            return Err(ExecutionError::Failed("simulated failure".into()));
        }
        Self::transfer(msg, to, state)?;

        let Some(candidates) = Self::contract_names(to) else {
            // An ordinary account: record the call and succeed.
            self.inner.lock().records.plain_calls.push((
                msg.from,
                to,
                msg.value,
                msg.data.clone(),
            ));
            return Ok(Vec::new());
        };

        let mut selector = [0u8; 4];
        if msg.data.len() < 4 {
            return Err(ExecutionError::Failed("call data too short".into()));
        }
        selector.copy_from_slice(&msg.data[..4]);

        for contract in candidates {
            if let Ok(abi) = self.registry.contract(contract) {
                if let Some(method) = abi.method_by_selector(selector) {
                    let args = method
                        .unpack_inputs(&msg.data)
                        .map_err(|err| ExecutionError::Failed(err.to_string()))?;
                    return self.dispatch(contract, method.name(), args, msg, to);
                }
            }
        }
        Err(ExecutionError::Failed("unknown selector".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryState;
    use crate::system::invoker::SystemInvoker;
    use std::sync::Arc;

    fn harness() -> (Arc<SystemContractSim>, SystemInvoker, InMemoryState, Header) {
        let sim = Arc::new(SystemContractSim::new());
        let invoker = SystemInvoker::new(
            Arc::new(AbiRegistry::interactive()),
            sim.clone(),
            crate::config::ChainSpec::default(),
        );
        (sim, invoker, InMemoryState::new(), Header::default())
    }

    #[test]
    fn top_validators_round_trip_through_the_invoker() {
        let (sim, invoker, mut state, header) = harness();
        let vals = vec![Address::new([3; 20]), Address::new([1; 20])];
        sim.set_top_validators(vals);

        let got = invoker
            .top_validators(Address::ZERO, &header, &mut state)
            .unwrap();
        // The invoker sorts ascending.
        assert_eq!(got, vec![Address::new([1; 20]), Address::new([3; 20])]);
    }

    #[test]
    fn punish_is_recorded() {
        let (sim, invoker, mut state, header) = harness();
        let victim = Address::new([7; 20]);
        invoker.punish_validator(victim, &mut state, &header).unwrap();
        assert_eq!(sim.records().punished, vec![victim]);
    }

    #[test]
    fn reward_distribution_moves_value() {
        let (sim, invoker, mut state, mut header) = harness();
        header.coinbase = Address::new([9; 20]);
        state.set_balance(&header.coinbase, U256::from(1000));

        invoker
            .distribute_block_reward(U256::from(400), &mut state, &header)
            .unwrap();

        assert_eq!(sim.records().rewards, vec![U256::from(400)]);
        assert_eq!(state.balance(&header.coinbase), U256::from(600));
        assert_eq!(state.balance(&VALIDATORS_V0_ADDR), U256::from(400));
    }

    #[test]
    fn finish_reorders_remaining_proposals() {
        let (sim, invoker, mut state, header) = harness();
        let prop = |id: u64| Proposal {
            id: U256::from(id),
            action: U256::zero(),
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::zero(),
            data: vec![],
        };
        sim.set_passed_proposals(vec![prop(7), prop(3), prop(11)]);

        crate::system::governance::finish_proposal_by_id(
            &invoker,
            U256::from(7),
            &mut state,
            &header,
        )
        .unwrap();

        // 11 swapped into index 0.
        assert_eq!(sim.remaining_proposals(), 2);
        let second = crate::system::governance::passed_proposal_by_index(
            &invoker, 0, &mut state, &header,
        )
        .unwrap();
        assert_eq!(second.id, U256::from(11));
    }

    #[test]
    fn validator_fee_addr_reads_the_info_tuple() {
        let (_, invoker, mut state, header) = harness();
        let validator = Address::new([5; 20]);
        let fee_addr = invoker
            .validator_fee_addr(validator, &mut state, &header)
            .unwrap();
        assert_eq!(fee_addr, validator);
    }

    #[test]
    fn failing_method_surfaces_as_execution_error() {
        let (sim, invoker, mut state, header) = harness();
        sim.fail_method("punish");
        let err = invoker
            .punish_validator(Address::ZERO, &mut state, &header)
            .unwrap_err();
        assert!(err.to_string().contains("simulated failure"));
    }
}
