//! Governance proposal execution and replay.
//!
//! Producing and verifying nodes run the same two-phase schedule: execute
//! every passed proposal in index order, then finish them all in the same
//! order. Finishing first would reorder the contract's proposal list and
//! desynchronize producer and verifier.

use crate::domain::entities::{Header, Receipt, Transaction};
use crate::domain::value_objects::{Address, Hash, U256};
use crate::errors::{ConsensusError, ExecutionError, SigningError};
use crate::ports::executor::{Message, MessageExecutor};
use crate::ports::state::State;
use crate::system::contracts::{GOVERNANCE_ADDR, GOVERNANCE_TO_ADDR};
use crate::system::governance::{
    self, Proposal, ACTION_ERASE_CODE, ACTION_EVM_CALL,
};
use tracing::{error, info, warn};

use super::Congress;

impl Congress {
    /// Whether a transaction is a system transaction: sent by the block's
    /// coinbase either to the governance transaction sink with zero gas
    /// price, or to the governance contract itself (legacy entry point).
    #[must_use]
    pub fn is_sys_transaction(&self, sender: Address, tx: &Transaction, header: &Header) -> bool {
        let Some(to) = tx.to else {
            return false;
        };
        if sender == header.coinbase && to == GOVERNANCE_TO_ADDR && tx.gas_price.is_zero() {
            return true;
        }
        // The coinbase must never reach the governance contract through a
        // normal transaction.
        sender == header.coinbase && to == GOVERNANCE_ADDR
    }

    /// Verification path: replays the block's system transactions against
    /// the freshly fetched passed proposals, then finishes them all.
    pub(crate) fn replay_governance(
        &self,
        header: &Header,
        state: &mut dyn State,
        txs: &mut Vec<Transaction>,
        receipts: &mut Vec<Receipt>,
        system_txs: &[Transaction],
    ) -> Result<(), ConsensusError> {
        let count = governance::passed_proposal_count(self.invoker(), state, header)?;
        if count as usize != system_txs.len() {
            return Err(ConsensusError::InvalidSysGovCount {
                expected: count,
                have: system_txs.len(),
            });
        }

        let mut ids = Vec::with_capacity(count as usize);
        for index in 0..count {
            let proposal =
                governance::passed_proposal_by_index(self.invoker(), index, state, header)?;
            let tx = &system_txs[index as usize];
            let receipt = self.replay_proposal(header, state, &proposal, txs.len(), tx)?;
            txs.push(tx.clone());
            receipts.push(receipt);
            ids.push(proposal.id);
        }
        for id in ids {
            governance::finish_proposal_by_id(self.invoker(), id, state, header)?;
        }
        Ok(())
    }

    /// Production path: synthesizes, signs and executes one system
    /// transaction per passed proposal, then finishes them all.
    pub(crate) fn produce_governance(
        &self,
        header: &Header,
        state: &mut dyn State,
        txs: &mut Vec<Transaction>,
        receipts: &mut Vec<Receipt>,
    ) -> Result<(), ConsensusError> {
        let count = governance::passed_proposal_count(self.invoker(), state, header)?;

        let mut ids = Vec::with_capacity(count as usize);
        for index in 0..count {
            let proposal =
                governance::passed_proposal_by_index(self.invoker(), index, state, header)?;
            let (tx, receipt) = self.execute_proposal(header, state, &proposal, txs.len())?;
            txs.push(tx);
            receipts.push(receipt);
            ids.push(proposal.id);
        }
        for id in ids {
            governance::finish_proposal_by_id(self.invoker(), id, state, header)?;
        }
        Ok(())
    }

    /// Synthesizes and executes the system transaction for one proposal.
    fn execute_proposal(
        &self,
        header: &Header,
        state: &mut dyn State,
        proposal: &Proposal,
        total_tx_index: usize,
    ) -> Result<(Transaction, Receipt), ConsensusError> {
        let handle = self.signer_handle().ok_or(SigningError::SignerNotSet)?;

        let payload = proposal.rlp_encode();
        let nonce = state.nonce(&handle.validator);
        // The transaction used to carry the proposal value; that double
        // counted it against the synthetic sender, fixed at Sophon.
        let amount = if self.spec().is_sophon(header.number) {
            U256::zero()
        } else {
            proposal.value
        };
        let tx = Transaction::new(
            nonce,
            Some(GOVERNANCE_TO_ADDR),
            amount,
            header.gas_limit,
            U256::zero(),
            payload,
        );
        let tx = handle
            .signer
            .sign_transaction(tx, self.spec().chain_id)?;

        state.set_nonce(&handle.validator, nonce + 1);
        let receipt =
            self.execute_proposal_msg(header, state, proposal, total_tx_index, tx.hash(), Hash::ZERO);
        Ok((tx, receipt))
    }

    /// Replays a carried system transaction: sender and payload must match
    /// before the proposal's effects re-apply.
    fn replay_proposal(
        &self,
        header: &Header,
        state: &mut dyn State,
        proposal: &Proposal,
        total_tx_index: usize,
        tx: &Transaction,
    ) -> Result<Receipt, ConsensusError> {
        let sender = tx.sender()?;
        if sender != header.coinbase {
            return Err(ConsensusError::InvalidSysGovSender);
        }
        let payload = proposal.rlp_encode();
        if payload != tx.data {
            error!(
                id = %proposal.id,
                tx = ?tx.hash(),
                "system governance payload differs from contract proposal"
            );
            return Err(ConsensusError::SysGovPayloadMismatch { id: proposal.id });
        }

        let nonce = state.nonce(&sender);
        state.set_nonce(&sender, nonce + 1);
        Ok(self.execute_proposal_msg(
            header,
            state,
            proposal,
            total_tx_index,
            tx.hash(),
            header.hash(),
        ))
    }

    /// Applies one proposal's effects and synthesizes its receipt. Proposal
    /// failures are recorded in the receipt status, never surfaced as
    /// errors.
    fn execute_proposal_msg(
        &self,
        header: &Header,
        state: &mut dyn State,
        proposal: &Proposal,
        total_tx_index: usize,
        tx_hash: Hash,
        block_hash: Hash,
    ) -> Receipt {
        let mut receipt = if proposal.action == U256::from(ACTION_EVM_CALL) {
            self.execute_evm_call_proposal(header, state, proposal, total_tx_index, tx_hash)
        } else if proposal.action == U256::from(ACTION_ERASE_CODE) {
            let erased = state.erase_code(&proposal.to);
            info!(
                action = "erase",
                id = %proposal.id,
                to = ?proposal.to,
                tx = ?tx_hash,
                success = erased,
                "executed governance proposal"
            );
            Receipt::new(!erased, header.gas_used)
        } else {
            warn!(
                action = %proposal.action,
                id = %proposal.id,
                from = ?proposal.from,
                to = ?proposal.to,
                value = %proposal.value,
                tx = ?tx_hash,
                "governance proposal with unsupported action"
            );
            Receipt::new(true, header.gas_used)
        };

        receipt.tx_hash = tx_hash;
        receipt.block_hash = block_hash;
        receipt.block_number = header.number;
        receipt.transaction_index = state.tx_index() as u64;
        receipt
    }

    /// Runs a proposal's EVM call with the block gas limit and zero gas
    /// price; gas is not billed.
    fn execute_evm_call_proposal(
        &self,
        header: &Header,
        state: &mut dyn State,
        proposal: &Proposal,
        total_tx_index: usize,
        tx_hash: Hash,
    ) -> Receipt {
        let msg = Message {
            from: proposal.from,
            to: Some(proposal.to),
            nonce: 0,
            value: proposal.value,
            gas: header.gas_limit,
            gas_price: U256::zero(),
            data: proposal.data.clone(),
            check_nonce: false,
        };
        state.prepare(tx_hash, total_tx_index);
        let result = self.invoker().execute(&msg, state, header);

        let mut receipt = Receipt::new(result.is_err(), header.gas_used);
        receipt.set_logs(state.logs(&tx_hash));

        info!(
            action = "evmCall",
            id = %proposal.id,
            from = ?proposal.from,
            to = ?proposal.to,
            value = %proposal.value,
            tx = ?tx_hash,
            failed = result.is_err(),
            "executed governance proposal"
        );
        receipt
    }

    /// Replays a single system transaction through a caller-supplied
    /// executor, for debug tracing. Returns the call output and the EVM
    /// failure, if any; both are data, not errors.
    pub fn apply_sys_tx(
        &self,
        executor: &dyn MessageExecutor,
        state: &mut dyn State,
        header: &Header,
        tx_index: usize,
        sender: Address,
        tx: &Transaction,
    ) -> Result<(Vec<u8>, Option<ExecutionError>), ConsensusError> {
        let proposal = Proposal::rlp_decode(&tx.data)?;

        let nonce = state.nonce(&sender);
        state.set_nonce(&sender, nonce + 1);

        if proposal.action == U256::from(ACTION_EVM_CALL) {
            let msg = Message {
                from: proposal.from,
                to: Some(proposal.to),
                nonce: 0,
                value: proposal.value,
                gas: tx.gas,
                gas_price: U256::zero(),
                data: proposal.data.clone(),
                check_nonce: false,
            };
            state.prepare(tx.hash(), tx_index);
            let result = executor.execute(&msg, state, header);
            state.finalise(true);
            match result {
                Ok(ret) => Ok((ret, None)),
                Err(err) => Ok((Vec::new(), Some(err))),
            }
        } else if proposal.action == U256::from(ACTION_ERASE_CODE) {
            state.erase_code(&proposal.to);
            Ok((Vec::new(), None))
        } else {
            Ok((
                Vec::new(),
                Some(ExecutionError::Failed("unsupported action".into())),
            ))
        }
    }
}
