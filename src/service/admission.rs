//! Transaction admission, the contract-creation gate and the hard-fork hook.

use crate::domain::entities::{Header, Transaction};
use crate::domain::value_objects::Address;
use crate::errors::{AdmissionError, ConsensusError};
use crate::ports::state::{State, StateReader};
use crate::system::access_control::BlacklistGuard;
use crate::system::upgrades::{apply_system_contract_upgrade, UpgradeVersion};

use super::Congress;

impl Congress {
    /// Consensus-level validation of a transaction against the blacklist in
    /// force at the parent of `header`.
    pub fn validate_tx(
        &self,
        sender: Address,
        tx: &Transaction,
        header: &Header,
        parent_state: &mut dyn State,
    ) -> Result<(), AdmissionError> {
        let chain = self.chain.read().clone();
        self.access().validate_tx(
            self.invoker(),
            chain.as_deref(),
            sender,
            tx,
            header,
            parent_state,
        )
    }

    /// Whether `addr` may create a contract at `height` under the on-chain
    /// developer allow-list.
    #[must_use]
    pub fn can_create(&self, state: &dyn StateReader, addr: &Address, height: u64) -> bool {
        self.access().can_create(state, addr, height)
    }

    /// Builds the per-block EVM guard answering address and log denial
    /// queries. `None` before the Sophon fork or when the contract state is
    /// unreadable.
    pub fn create_evm_extra_validator(
        &self,
        header: &Header,
        parent_state: &mut dyn State,
    ) -> Option<BlacklistGuard> {
        let chain = self.chain.read().clone();
        self.access()
            .create_extra_validator(self.invoker(), chain.as_deref(), header, parent_state)
    }

    /// Applies the pending hard-fork contract upgrades when `header` sits
    /// exactly on an activation height. Runs before the block's transactions.
    pub fn pre_handle(
        &self,
        header: &Header,
        state: &mut dyn State,
    ) -> Result<(), ConsensusError> {
        if self.spec().redcoast_block == Some(header.number) {
            apply_system_contract_upgrade(
                UpgradeVersion::V1,
                self.invoker(),
                &self.spec().upgrades,
                state,
                header,
            )?;
        }
        if self.spec().sophon_block == Some(header.number) {
            apply_system_contract_upgrade(
                UpgradeVersion::V2,
                self.invoker(),
                &self.spec().upgrades,
                state,
                header,
            )?;
        }
        Ok(())
    }
}
