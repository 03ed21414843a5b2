//! Block finalization: the system-contract pipeline every block runs through.
//!
//! Order is consensus-critical: block-1 bootstrap, out-of-turn punishment,
//! fee sweep and reward distribution, epoch rotation, governance replay, and
//! only then the state root.

use crate::domain::entities::{empty_uncle_hash, Block, Header, Receipt, Transaction};
use crate::domain::value_objects::{Address, U256};
use crate::domain::{diff_in_turn, EXTRA_SEAL, EXTRA_VANITY, MAX_VALIDATORS};
use crate::errors::ConsensusError;
use crate::ports::chain::HeaderReader;
use crate::ports::state::State;
use crate::system::abi::Token;
use crate::system::contracts::{
    FEE_RECORDER_ADDR, PROPOSAL_ADDR, PROPOSAL_CONTRACT, PUNISH_CONTRACT, PUNISH_V0_ADDR,
    VALIDATORS_CONTRACT, VALIDATORS_V0_ADDR,
};
use tracing::{error, warn};

use super::Congress;

impl Congress {
    /// Finalizes a block during verification: runs the system-contract
    /// pipeline, replays the carried system transactions and computes the
    /// final state root and uncle hash in place.
    pub fn finalize(
        &self,
        chain: &dyn HeaderReader,
        header: &mut Header,
        state: &mut dyn State,
        txs: &mut Vec<Transaction>,
        receipts: &mut Vec<Receipt>,
        system_txs: &[Transaction],
    ) -> Result<(), ConsensusError> {
        // Initialize all system contracts at block 1.
        if header.number == 1 {
            self.initialize_system_contracts(chain, header, state)
                .map_err(|err| {
                    error!(%err, "initialize system contracts failed");
                    err
                })?;
        }

        if header.difficulty != diff_in_turn() {
            self.try_punish_validator(chain, header, state)?;
        }

        // Fees only accrue when user transactions ran.
        if !txs.is_empty() {
            self.try_send_block_reward(header, state)?;
        }

        // Epoch rotation runs late because it replaces the active set.
        if header.number % self.config().epoch == 0 {
            let new_validators = self.rotate_epoch_validators(chain, header, state)?;
            verify_epoch_extra(header, &new_validators)?;
        }

        if self.spec().is_redcoast(header.number) {
            self.replay_governance(header, state, txs, receipts, system_txs)?;
        }

        header.root = state.intermediate_root(self.spec().is_eip158(header.number));
        header.uncle_hash = empty_uncle_hash();
        Ok(())
    }

    /// Finalizes a locally produced block and assembles it: same pipeline as
    /// [`Self::finalize`], but governance transactions are synthesized and
    /// signed rather than replayed.
    ///
    /// A failing system call here means the local miner is about to produce
    /// an invalid block; that is unrecoverable, so this method panics instead
    /// of returning the error.
    pub fn finalize_and_assemble(
        &self,
        chain: &dyn HeaderReader,
        mut header: Header,
        state: &mut dyn State,
        mut txs: Vec<Transaction>,
        mut receipts: Vec<Receipt>,
    ) -> Result<(Block, Vec<Receipt>), ConsensusError> {
        if header.number == 1 {
            if let Err(err) = self.initialize_system_contracts(chain, &header, state) {
                panic!("initialize system contracts failed: {err}");
            }
        }

        if header.difficulty != diff_in_turn() {
            if let Err(err) = self.try_punish_validator(chain, &header, state) {
                panic!("punishing out-of-turn validator failed: {err}");
            }
        }

        if !txs.is_empty() {
            if let Err(err) = self.try_send_block_reward(&header, state) {
                panic!("block reward distribution failed: {err}");
            }
        }

        if header.number % self.config().epoch == 0 {
            if let Err(err) = self.rotate_epoch_validators(chain, &header, state) {
                panic!("epoch validator rotation failed: {err}");
            }
        }

        // A node without signing credentials still assembles blocks; it just
        // cannot synthesize governance transactions.
        if self.signer_handle().is_some() && self.spec().is_redcoast(header.number) {
            self.produce_governance(&header, state, &mut txs, &mut receipts)
                .map_err(|err| {
                    warn!(%err, "assembling governance transactions failed");
                    err
                })?;
        }

        header.root = state.intermediate_root(self.spec().is_eip158(header.number));
        header.uncle_hash = empty_uncle_hash();

        Ok((Block::new(header, txs), receipts))
    }

    /// Sweeps the accumulated fee balance to the coinbase and forwards it to
    /// the validators contract for distribution.
    pub(crate) fn try_send_block_reward(
        &self,
        header: &Header,
        state: &mut dyn State,
    ) -> Result<(), ConsensusError> {
        let fee = state.balance(&FEE_RECORDER_ADDR);
        if fee.is_zero() {
            return Ok(());
        }

        // The coinbase pays the contract, so credit it first.
        state.add_balance(&header.coinbase, fee);
        state.set_balance(&FEE_RECORDER_ADDR, U256::zero());

        self.invoker().distribute_block_reward(fee, state, header)?;
        Ok(())
    }

    /// Punishes the validator that skipped its in-turn slot, unless it has
    /// signed something within the retained recents.
    pub(crate) fn try_punish_validator(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        state: &mut dyn State,
    ) -> Result<(), ConsensusError> {
        let number = header.number;
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        let validators = snap.validators_ascending();
        let expected = validators[(number % validators.len() as u64) as usize];

        if !snap.signed_any_recent(&expected) {
            self.invoker().punish_validator(expected, state, header)?;
        }
        Ok(())
    }

    /// Epoch work: fetch fresh top validators, push them into the contract
    /// and decrease the missed-block counters.
    pub(crate) fn rotate_epoch_validators(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        state: &mut dyn State,
    ) -> Result<Vec<Address>, ConsensusError> {
        let new_sorted = self.top_validators(chain, header)?;

        self.invoker()
            .update_active_validator_set(&new_sorted, self.config().epoch, state, header)?;
        self.invoker()
            .decrease_missed_blocks_counter(self.config().epoch, state, header)?;

        Ok(new_sorted)
    }

    /// Block-1 bootstrap: hands the genesis validator list to the validators,
    /// punish and proposal contracts.
    pub(crate) fn initialize_system_contracts(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        state: &mut dyn State,
    ) -> Result<(), ConsensusError> {
        let snap = self.snapshot(chain, 0, header.parent_hash, &[])?;
        let genesis_validators = snap.validators_ascending();
        if genesis_validators.is_empty() || genesis_validators.len() > MAX_VALIDATORS {
            return Err(ConsensusError::InvalidValidatorsLength);
        }

        let validators_arg = Token::AddressArray(genesis_validators);
        let calls: [(&str, Address, Vec<Token>); 3] = [
            (
                VALIDATORS_CONTRACT,
                VALIDATORS_V0_ADDR,
                vec![validators_arg.clone()],
            ),
            (PUNISH_CONTRACT, PUNISH_V0_ADDR, vec![]),
            (PROPOSAL_CONTRACT, PROPOSAL_ADDR, vec![validators_arg]),
        ];
        for (contract, addr, args) in calls {
            self.invoker()
                .mutate_call(contract, addr, "initialize", &args, U256::zero(), state, header)?;
        }
        Ok(())
    }
}

/// Asserts that an epoch header's embedded validator bytes equal the freshly
/// fetched set.
fn verify_epoch_extra(header: &Header, validators: &[Address]) -> Result<(), ConsensusError> {
    let mut expected = Vec::with_capacity(validators.len() * 20);
    for validator in validators {
        expected.extend_from_slice(validator.as_bytes());
    }
    let suffix = header.extra.len() - EXTRA_SEAL;
    if header.extra[EXTRA_VANITY..suffix] != expected[..] {
        return Err(ConsensusError::InvalidExtraValidators);
    }
    Ok(())
}
