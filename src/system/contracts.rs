//! Well-known contract addresses, names and storage positions.

use crate::config::ChainSpec;
use crate::domain::value_objects::{Address, Hash};

const fn system_address(suffix: u16) -> Address {
    let mut bytes = [0u8; 20];
    bytes[18] = (suffix >> 8) as u8;
    bytes[19] = suffix as u8;
    Address::new(bytes)
}

/// Validators contract, pre-RedCoast deployment.
pub const VALIDATORS_V0_ADDR: Address = system_address(0xf000);

/// Punish contract, pre-RedCoast deployment.
pub const PUNISH_V0_ADDR: Address = system_address(0xf001);

/// Proposal contract.
pub const PROPOSAL_ADDR: Address = system_address(0xf002);

/// Governance contract, RedCoast on.
pub const GOVERNANCE_ADDR: Address = system_address(0xf003);

/// Address-list contract, RedCoast on.
pub const ADDRESS_LIST_ADDR: Address = system_address(0xf004);

/// Validators contract, RedCoast on.
pub const VALIDATORS_V1_ADDR: Address = system_address(0xf005);

/// Punish contract, RedCoast on.
pub const PUNISH_V1_ADDR: Address = system_address(0xf006);

/// Recipient of synthetic governance transactions. Not a contract address.
pub const GOVERNANCE_TO_ADDR: Address = system_address(0xffff);

/// Pseudo-account accumulating transaction fees for the block, swept to the
/// coinbase during reward distribution.
pub const FEE_RECORDER_ADDR: Address = {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x10;
    Address::new(bytes)
};

/// Registry name of the v0 validators contract.
pub const VALIDATORS_CONTRACT: &str = "validators";
/// Registry name of the v0 punish contract.
pub const PUNISH_CONTRACT: &str = "punish";
/// Registry name of the proposal contract.
pub const PROPOSAL_CONTRACT: &str = "proposal";
/// Registry name of the governance contract.
pub const GOVERNANCE_CONTRACT: &str = "governance";
/// Registry name of the address-list contract.
pub const ADDRESS_LIST_CONTRACT: &str = "address_list";
/// Registry name of the v1 validators contract.
pub const VALIDATORS_V1_CONTRACT: &str = "validators_v1";
/// Registry name of the v1 punish contract.
pub const PUNISH_V1_CONTRACT: &str = "punish_v1";

/// Storage position of the `devs` mapping in the address-list contract.
///
/// Slot 0 packs `initialized`, `devVerifyEnabled` and `admin`; slot 1 holds
/// `pendingAdmin`; the mapping therefore sits at position 2.
pub const DEV_MAPPING_POSITION: u16 = 2;

const fn slot(byte: u8) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[31] = byte;
    Hash::new(bytes)
}

/// Storage slot of `blackLastUpdatedNumber` in the address-list contract.
pub const BLACK_LAST_UPDATED_SLOT: Hash = slot(0x07);

/// Storage slot of `rulesLastUpdatedNumber` in the address-list contract.
pub const RULES_LAST_UPDATED_SLOT: Hash = slot(0x08);

/// The validators contract serving the given height.
#[must_use]
pub fn validators_addr(number: u64, spec: &ChainSpec) -> Address {
    if spec.is_redcoast(number) {
        VALIDATORS_V1_ADDR
    } else {
        VALIDATORS_V0_ADDR
    }
}

/// The punish contract serving the given height.
#[must_use]
pub fn punish_addr(number: u64, spec: &ChainSpec) -> Address {
    if spec.is_redcoast(number) {
        PUNISH_V1_ADDR
    } else {
        PUNISH_V0_ADDR
    }
}
