//! # Hard-Fork Contract Upgrades
//!
//! At fork activation heights the engine rewrites system-contract code and
//! runs one-shot initializers before the block's transactions execute. Each
//! version carries a fixed, ordered action list; actions are a closed enum so
//! the upgrade surface cannot grow outside consensus review.

use crate::config::UpgradeManifest;
use crate::domain::entities::Header;
use crate::domain::value_objects::{Address, U256};
use crate::errors::SystemCallError;
use crate::ports::state::State;
use crate::system::abi::Token;
use crate::system::contracts::{
    ADDRESS_LIST_ADDR, ADDRESS_LIST_CONTRACT, GOVERNANCE_ADDR, GOVERNANCE_CONTRACT,
    PUNISH_V1_ADDR, PUNISH_V1_CONTRACT, VALIDATORS_CONTRACT, VALIDATORS_V0_ADDR,
    VALIDATORS_V1_ADDR, VALIDATORS_V1_CONTRACT,
};
use crate::system::invoker::SystemInvoker;
use tracing::{error, info};

/// A versioned bundle of upgrade actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeVersion {
    /// RedCoast activation: governance, address list, v1 validators/punish.
    V1,
    /// Sophon activation: address-list v2 and validators v2 rewrites.
    V2,
}

impl UpgradeVersion {
    /// The ordered actions of this version.
    #[must_use]
    pub fn actions(&self) -> &'static [UpgradeAction] {
        match self {
            Self::V1 => &[
                UpgradeAction::SysGov,
                UpgradeAction::AddressList,
                UpgradeAction::ValidatorsV1,
                UpgradeAction::PunishV1,
            ],
            Self::V2 => &[UpgradeAction::AddressListV2, UpgradeAction::ValidatorsV2],
        }
    }
}

/// One contract upgrade: a code install plus an optional initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeAction {
    /// Deploy the governance contract.
    SysGov,
    /// Deploy the address-list contract.
    AddressList,
    /// Deploy the v1 validators contract.
    ValidatorsV1,
    /// Deploy the v1 punish contract.
    PunishV1,
    /// Rewrite the address-list contract for rule support.
    AddressListV2,
    /// Rewrite the v1 validators contract.
    ValidatorsV2,
}

impl UpgradeAction {
    /// Stable action name; also the manifest key for replacement code.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SysGov => "sys_gov",
            Self::AddressList => "address_list",
            Self::ValidatorsV1 => "validators_v1",
            Self::PunishV1 => "punish_v1",
            Self::AddressListV2 => "address_list_v2",
            Self::ValidatorsV2 => "validators_v2",
        }
    }

    /// The account whose code this action rewrites.
    #[must_use]
    pub fn contract_addr(&self) -> Address {
        match self {
            Self::SysGov => GOVERNANCE_ADDR,
            Self::AddressList | Self::AddressListV2 => ADDRESS_LIST_ADDR,
            Self::ValidatorsV1 | Self::ValidatorsV2 => VALIDATORS_V1_ADDR,
            Self::PunishV1 => PUNISH_V1_ADDR,
        }
    }

    /// Installs the replacement runtime code, when the manifest carries one.
    pub fn update(&self, manifest: &UpgradeManifest, state: &mut dyn State) {
        if let Some(code) = manifest.code(self.name()) {
            state.set_code(&self.contract_addr(), code.to_vec());
        }
    }

    /// Runs the one-shot initializer of the freshly installed contract.
    pub fn execute(
        &self,
        invoker: &SystemInvoker,
        manifest: &UpgradeManifest,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<(), SystemCallError> {
        match self {
            Self::SysGov => {
                invoker.mutate_call(
                    GOVERNANCE_CONTRACT,
                    GOVERNANCE_ADDR,
                    "initialize",
                    &[Token::Address(manifest.admin)],
                    U256::zero(),
                    state,
                    header,
                )?;
            }
            Self::AddressList => {
                invoker.mutate_call(
                    ADDRESS_LIST_CONTRACT,
                    ADDRESS_LIST_ADDR,
                    "initialize",
                    &[Token::Address(manifest.admin)],
                    U256::zero(),
                    state,
                    header,
                )?;
            }
            Self::ValidatorsV1 => {
                // Seed the v1 contract with the authority set the v0 contract
                // reports at the fork block; validators manage themselves.
                let tokens = invoker.read_call(
                    header.coinbase,
                    VALIDATORS_CONTRACT,
                    VALIDATORS_V0_ADDR,
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
                invoker.mutate_call(
                    VALIDATORS_V1_CONTRACT,
                    VALIDATORS_V1_ADDR,
                    "initialize",
                    &[
                        Token::AddressArray(validators.clone()),
                        Token::AddressArray(validators),
                        Token::Address(manifest.admin),
                    ],
                    U256::zero(),
                    state,
                    header,
                )?;
            }
            Self::PunishV1 => {
                invoker.mutate_call(
                    PUNISH_V1_CONTRACT,
                    PUNISH_V1_ADDR,
                    "initialize",
                    &[],
                    U256::zero(),
                    state,
                    header,
                )?;
            }
            Self::AddressListV2 => {
                invoker.mutate_call(
                    ADDRESS_LIST_CONTRACT,
                    ADDRESS_LIST_ADDR,
                    "initializeV2",
                    &[],
                    U256::zero(),
                    state,
                    header,
                )?;
            }
            // Code-only rewrite; storage layout is unchanged.
            Self::ValidatorsV2 => {}
        }
        Ok(())
    }
}

/// Applies every action of `version` in order, then finalises the state.
pub fn apply_system_contract_upgrade(
    version: UpgradeVersion,
    invoker: &SystemInvoker,
    manifest: &UpgradeManifest,
    state: &mut dyn State,
    header: &Header,
) -> Result<(), SystemCallError> {
    for action in version.actions() {
        info!(
            name = action.name(),
            height = header.number,
            "system contract upgrade"
        );
        action.update(manifest, state);

        if let Err(err) = action.execute(invoker, manifest, state, header) {
            error!(name = action.name(), %err, "system contract upgrade failed");
            return Err(err);
        }
    }
    state.finalise(true);
    Ok(())
}
