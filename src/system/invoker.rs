//! # System-Contract Invoker
//!
//! The fee-free call path shared by every consensus-driven contract
//! interaction: gas price zero, gas limit at the maximum, gas never charged
//! to the block, and the state finalised after each call so an empty caller
//! account cannot persist.

use crate::config::ChainSpec;
use crate::domain::entities::Header;
use crate::domain::value_objects::{Address, U256};
use crate::errors::SystemCallError;
use crate::ports::executor::{Message, MessageExecutor};
use crate::ports::state::State;
use crate::system::abi::{AbiRegistry, Token};
use crate::system::contracts;
use std::sync::Arc;
use tracing::error;

/// Executes fee-free messages against the system contracts.
pub struct SystemInvoker {
    registry: Arc<AbiRegistry>,
    executor: Arc<dyn MessageExecutor>,
    spec: ChainSpec,
}

impl SystemInvoker {
    /// Builds an invoker around the host EVM executor.
    pub fn new(registry: Arc<AbiRegistry>, executor: Arc<dyn MessageExecutor>, spec: ChainSpec) -> Self {
        Self {
            registry,
            executor,
            spec,
        }
    }

    /// The ABI registry backing this invoker.
    #[must_use]
    pub fn registry(&self) -> &AbiRegistry {
        &self.registry
    }

    /// The fork schedule in effect.
    #[must_use]
    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    /// Builds a fee-free message.
    #[must_use]
    pub fn system_message(
        from: Address,
        to: Address,
        nonce: u64,
        value: U256,
        data: Vec<u8>,
        check_nonce: bool,
    ) -> Message {
        Message {
            from,
            to: Some(to),
            nonce,
            value,
            gas: u64::MAX,
            gas_price: U256::zero(),
            data,
            check_nonce,
        }
    }

    /// Runs a message and finalises the state.
    pub fn execute(
        &self,
        msg: &Message,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<Vec<u8>, SystemCallError> {
        let ret = self.executor.execute(msg, state, header)?;
        // Flush so the `from` account, if empty, is dropped rather than kept.
        state.finalise(true);
        Ok(ret)
    }

    /// A read-only contract call: nonce 0, no nonce check, no value.
    pub fn read_call(
        &self,
        caller: Address,
        contract: &str,
        addr: Address,
        method: &str,
        args: &[Token],
        state: &mut dyn State,
        header: &Header,
    ) -> Result<Vec<Token>, SystemCallError> {
        let m = self.registry.method(contract, method)?;
        let data = m.pack(args).map_err(|err| {
            error!(method, %err, "can't pack system call data");
            err
        })?;
        let msg = Self::system_message(caller, addr, 0, U256::zero(), data, false);
        let ret = self.execute(&msg, state, header)?;
        Ok(m.unpack(&ret)?)
    }

    /// A mutating contract call from the coinbase, carrying `value` and the
    /// coinbase's current nonce.
    pub fn mutate_call(
        &self,
        contract: &str,
        addr: Address,
        method: &str,
        args: &[Token],
        value: U256,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<Vec<u8>, SystemCallError> {
        let m = self.registry.method(contract, method)?;
        let data = m.pack(args).map_err(|err| {
            error!(method, %err, "can't pack system call data");
            err
        })?;
        let nonce = state.nonce(&header.coinbase);
        let msg = Self::system_message(header.coinbase, addr, nonce, value, data, true);
        self.execute(&msg, state, header)
    }

    // =========================================================================
    // VALIDATORS / PUNISH WRAPPERS
    // =========================================================================

    /// Reads the current top validators, sorted ascending by address. The
    /// contract version is chosen by `header.number`; `caller` is the
    /// coinbase of the block being built or verified.
    pub fn top_validators(
        &self,
        caller: Address,
        header: &Header,
        state: &mut dyn State,
    ) -> Result<Vec<Address>, SystemCallError> {
        let addr = contracts::validators_addr(header.number, &self.spec);
        let tokens = self.read_call(
            caller,
            contracts::VALIDATORS_CONTRACT,
            addr,
            "getTopValidators",
            &[],
            state,
            header,
        )?;
        let mut validators = tokens
            .first()
            .and_then(Token::as_address_array)
            .map(<[Address]>::to_vec)
            .ok_or_else(|| SystemCallError::UnexpectedOutput("validators".into()))?;
        validators.sort();
        Ok(validators)
    }

    /// Pushes a fresh validator set into the validators contract.
    pub fn update_active_validator_set(
        &self,
        validators: &[Address],
        epoch: u64,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<(), SystemCallError> {
        let addr = contracts::validators_addr(header.number, &self.spec);
        self.mutate_call(
            contracts::VALIDATORS_CONTRACT,
            addr,
            "updateActiveValidatorSet",
            &[
                Token::AddressArray(validators.to_vec()),
                Token::Uint(U256::from(epoch)),
            ],
            U256::zero(),
            state,
            header,
        )
        .map_err(|err| {
            error!(%err, "can't update validators to contract");
            err
        })?;
        Ok(())
    }

    /// Moves the block fee into the validators contract for distribution.
    pub fn distribute_block_reward(
        &self,
        fee: U256,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<(), SystemCallError> {
        let addr = contracts::validators_addr(header.number, &self.spec);
        self.mutate_call(
            contracts::VALIDATORS_CONTRACT,
            addr,
            "distributeBlockReward",
            &[],
            fee,
            state,
            header,
        )?;
        Ok(())
    }

    /// Punishes a validator that missed its in-turn block.
    pub fn punish_validator(
        &self,
        validator: Address,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<(), SystemCallError> {
        let addr = contracts::punish_addr(header.number, &self.spec);
        self.mutate_call(
            contracts::PUNISH_CONTRACT,
            addr,
            "punish",
            &[Token::Address(validator)],
            U256::zero(),
            state,
            header,
        )
        .map_err(|err| {
            error!(validator = ?validator, %err, "can't punish validator");
            err
        })?;
        Ok(())
    }

    /// Decreases every validator's missed-block counter at an epoch boundary.
    pub fn decrease_missed_blocks_counter(
        &self,
        epoch: u64,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<(), SystemCallError> {
        let addr = contracts::punish_addr(header.number, &self.spec);
        self.mutate_call(
            contracts::PUNISH_CONTRACT,
            addr,
            "decreaseMissedBlocksCounter",
            &[Token::Uint(U256::from(epoch))],
            U256::zero(),
            state,
            header,
        )
        .map_err(|err| {
            error!(%err, "can't decrease missed blocks counter");
            err
        })?;
        Ok(())
    }

    /// Reads a validator's fee address from the v0 validators contract.
    pub fn validator_fee_addr(
        &self,
        validator: Address,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<Address, SystemCallError> {
        let tokens = self.read_call(
            header.coinbase,
            contracts::VALIDATORS_CONTRACT,
            contracts::VALIDATORS_V0_ADDR,
            "getValidatorInfo",
            &[Token::Address(validator)],
            state,
            header,
        )?;
        tokens
            .first()
            .and_then(Token::as_address)
            .ok_or_else(|| SystemCallError::UnexpectedOutput("fee address".into()))
    }
}
