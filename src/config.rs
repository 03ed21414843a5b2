//! # Engine Configuration
//!
//! Chain-wide fork schedule plus the consensus-specific knobs. Forks activate
//! at a block number and stay active from that number on; `None` means the
//! fork never activates on this chain.

use crate::domain::value_objects::Address;
use std::collections::BTreeMap;

/// Fork schedule and chain identity.
#[derive(Debug, Clone, Default)]
pub struct ChainSpec {
    /// EIP-155 chain identifier, used for transaction signing and recovery.
    pub chain_id: u64,

    /// Activation height of the RedCoast fork (governance, address list,
    /// v1 validators/punish contracts).
    pub redcoast_block: Option<u64>,

    /// Activation height of the Sophon fork (v2 contract upgrades, event
    /// check rules, proposal value zeroing).
    pub sophon_block: Option<u64>,

    /// Activation height of the legacy standalone SysGov upgrade. Retained
    /// for chains that activated governance before the RedCoast bundle.
    pub sysgov_block: Option<u64>,

    /// EIP-1559 activation height.
    pub london_block: Option<u64>,

    /// EIP-158 activation height (empty-account deletion).
    pub eip158_block: Option<u64>,

    /// Byzantium activation height (status-bearing receipts).
    pub byzantium_block: Option<u64>,

    /// Hard-fork contract upgrade payloads, keyed by upgrade name.
    pub upgrades: UpgradeManifest,
}

impl ChainSpec {
    fn active(fork: Option<u64>, number: u64) -> bool {
        fork.map_or(false, |height| number >= height)
    }

    /// Whether RedCoast is active at `number`.
    pub fn is_redcoast(&self, number: u64) -> bool {
        Self::active(self.redcoast_block, number)
    }

    /// Whether `number` lies strictly after the RedCoast activation block.
    pub fn past_redcoast(&self, number: u64) -> bool {
        self.redcoast_block.map_or(false, |height| number > height)
    }

    /// Whether Sophon is active at `number`.
    pub fn is_sophon(&self, number: u64) -> bool {
        Self::active(self.sophon_block, number)
    }

    /// Whether `number` lies strictly after the Sophon activation block.
    pub fn past_sophon(&self, number: u64) -> bool {
        self.sophon_block.map_or(false, |height| number > height)
    }

    /// Whether the legacy SysGov upgrade is active at `number`.
    pub fn is_sysgov(&self, number: u64) -> bool {
        Self::active(self.sysgov_block, number)
    }

    /// Whether EIP-1559 is active at `number`.
    pub fn is_london(&self, number: u64) -> bool {
        Self::active(self.london_block, number)
    }

    /// Whether EIP-158 is active at `number`.
    pub fn is_eip158(&self, number: u64) -> bool {
        Self::active(self.eip158_block, number)
    }

    /// Whether Byzantium is active at `number`.
    pub fn is_byzantium(&self, number: u64) -> bool {
        Self::active(self.byzantium_block, number)
    }
}

/// Consensus-specific parameters.
#[derive(Debug, Clone)]
pub struct CongressConfig {
    /// Minimum seconds between consecutive blocks.
    pub period: u64,

    /// Blocks between validator-set rotations.
    pub epoch: u64,

    /// Gate contract creation on the on-chain developer allow-list.
    pub enable_dev_verification: bool,

    /// Capacity of the in-memory snapshot cache.
    pub snapshot_cache: usize,
}

/// Default number of blocks between validator-set rotations.
pub const DEFAULT_EPOCH: u64 = 30_000;

/// Default capacity of the in-memory snapshot cache.
pub const DEFAULT_SNAPSHOT_CACHE: usize = 128;

impl Default for CongressConfig {
    fn default() -> Self {
        Self {
            period: 3,
            epoch: DEFAULT_EPOCH,
            enable_dev_verification: false,
            snapshot_cache: DEFAULT_SNAPSHOT_CACHE,
        }
    }
}

impl CongressConfig {
    /// Fills unset parameters with protocol defaults.
    pub fn normalized(mut self) -> Self {
        if self.epoch == 0 {
            self.epoch = DEFAULT_EPOCH;
        }
        if self.snapshot_cache == 0 {
            self.snapshot_cache = DEFAULT_SNAPSHOT_CACHE;
        }
        self
    }
}

/// Runtime bytecode and initializer admin for hard-fork contract upgrades.
///
/// Upgrade actions look up their replacement code by action name; an absent
/// entry leaves the deployed code untouched (storage-only upgrade).
#[derive(Debug, Clone, Default)]
pub struct UpgradeManifest {
    /// Admin handed to the `initialize` calls of freshly installed contracts.
    pub admin: Address,

    /// Replacement runtime bytecode keyed by upgrade-action name.
    pub codes: BTreeMap<String, Vec<u8>>,
}

impl UpgradeManifest {
    /// Replacement code for the named upgrade action, if any.
    pub fn code(&self, name: &str) -> Option<&[u8]> {
        self.codes.get(name).map(Vec::as_slice)
    }
}
