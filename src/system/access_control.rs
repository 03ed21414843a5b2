//! # Access Controller
//!
//! Contract-governed admission rules: an address blacklist consulted during
//! transaction validation, event check rules consulted on EVM log emission,
//! and the developer allow-list gating contract creation. Both contract-read
//! structures are cached per parent hash in bounded LRUs; population is
//! guarded by a per-kind lock with a double-checked re-read.

use crate::config::ChainSpec;
use crate::domain::entities::{Header, Log, Transaction};
use crate::domain::rlp::keccak256;
use crate::domain::value_objects::{Address, Hash};
use crate::domain::INMEMORY_BLACKLIST;
use crate::errors::{AdmissionError, SystemCallError};
use crate::ports::chain::HeaderReader;
use crate::ports::executor::EvmExtraValidator;
use crate::ports::state::{State, StateReader};
use crate::system::abi::Token;
use crate::system::contracts::{
    ADDRESS_LIST_ADDR, ADDRESS_LIST_CONTRACT, BLACK_LAST_UPDATED_SLOT, DEV_MAPPING_POSITION,
    RULES_LAST_UPDATED_SLOT,
};
use crate::system::invoker::SystemInvoker;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{error, trace, warn};

// =============================================================================
// DOMAIN TYPES
// =============================================================================

/// Which traffic direction a blacklisted address is blocked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Blocked as a sender.
    From,
    /// Blocked as a recipient.
    To,
    /// Blocked in both directions.
    Both,
}

/// The check a rule applies to one topic of a matching log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressCheckType {
    /// No check.
    None,
    /// Deny when the address is blacklisted as a sender.
    From,
    /// Deny when the address is blacklisted as a recipient.
    To,
    /// Deny when the address appears on the blacklist at all.
    BothInAny,
}

impl AddressCheckType {
    /// Decodes the contract's enum encoding.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::From,
            2 => Self::To,
            3 => Self::BothInAny,
            _ => Self::None,
        }
    }
}

/// Per-event-signature log check: topic index → check type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCheckRule {
    /// topic0 of the events this rule covers.
    pub event_sig: Hash,
    /// Checks keyed by topic index.
    pub checks: BTreeMap<u64, AddressCheckType>,
}

/// Address → blocked direction.
pub type BlacklistMap = BTreeMap<Address, Direction>;

/// topic0 → rule.
pub type RuleMap = BTreeMap<Hash, EventCheckRule>;

// =============================================================================
// EVM-FACING GUARD
// =============================================================================

/// The capability object handed to the EVM for one block: answers address
/// and log denial queries from immutable copies of the contract state.
pub struct BlacklistGuard {
    blacks: Arc<BlacklistMap>,
    rules: Arc<RuleMap>,
}

impl BlacklistGuard {
    /// Builds a guard over resolved blacklist and rule maps.
    #[must_use]
    pub fn new(blacks: Arc<BlacklistMap>, rules: Arc<RuleMap>) -> Self {
        Self { blacks, rules }
    }
}

impl EvmExtraValidator for BlacklistGuard {
    fn is_address_denied(&self, address: &Address, check: AddressCheckType) -> bool {
        let Some(direction) = self.blacks.get(address) else {
            return false;
        };
        let hit = match check {
            AddressCheckType::From => *direction != Direction::To,
            AddressCheckType::To => *direction != Direction::From,
            AddressCheckType::BothInAny => true,
            AddressCheckType::None => {
                warn!(?check, "blacklist: unsupported address check type");
                false
            }
        };
        if hit {
            trace!(address = ?address, direction = ?direction, ?check, "hit blacklist");
        }
        hit
    }

    fn is_log_denied(&self, log: &Log) -> bool {
        if log.topics.len() <= 1 {
            return false;
        }
        let Some(rule) = self.rules.get(&log.topics[0]) else {
            return false;
        };
        for (&index, &check) in &rule.checks {
            let Some(topic) = log.topics.get(index as usize) else {
                error!(
                    sig = ?rule.event_sig,
                    check_index = index,
                    topics = log.topics.len(),
                    "check index in rule out of range"
                );
                continue;
            };
            let address = Address::from_word(topic);
            if self.is_address_denied(&address, check) {
                return true;
            }
        }
        false
    }
}

// =============================================================================
// STORAGE PROBES
// =============================================================================

/// Whether the address-list contract has developer verification switched on.
///
/// Slot 0 packs `initialized`, `devVerifyEnabled` and `admin`; the enabled
/// flag sits in byte 30.
#[must_use]
pub fn dev_verification_enabled(state: &dyn StateReader) -> bool {
    let word = state.storage(&ADDRESS_LIST_ADDR, &Hash::ZERO);
    word.as_bytes()[30] == 0x01
}

/// The storage slot of `devs[addr]`: `keccak256(key_word || position_word)`.
#[must_use]
pub fn slot_for_dev_mapping(addr: &Address) -> Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(addr.into_word().as_bytes());
    buf[62..].copy_from_slice(&DEV_MAPPING_POSITION.to_be_bytes());
    keccak256(&buf)
}

/// Last block the blacklist changed, read from the parent state.
#[must_use]
pub fn last_blacklist_updated(state: &dyn StateReader) -> u64 {
    let word = state.storage(&ADDRESS_LIST_ADDR, &BLACK_LAST_UPDATED_SLOT);
    word.into_uint().low_u64()
}

/// Last block the event check rules changed, read from the parent state.
#[must_use]
pub fn last_rules_updated(state: &dyn StateReader) -> u64 {
    let word = state.storage(&ADDRESS_LIST_ADDR, &RULES_LAST_UPDATED_SLOT);
    word.into_uint().low_u64()
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Loads, caches and applies the contract-governed access rules.
pub struct AccessController {
    spec: ChainSpec,
    dev_verification: bool,
    blacklists: Mutex<LruCache<Hash, Arc<BlacklistMap>>>,
    blacklist_fill: Mutex<()>,
    rules: Mutex<LruCache<Hash, Arc<RuleMap>>>,
    rules_fill: Mutex<()>,
}

impl AccessController {
    /// Builds a controller with bounded per-parent-hash caches.
    #[must_use]
    pub fn new(spec: ChainSpec, dev_verification: bool) -> Self {
        let capacity = NonZeroUsize::new(INMEMORY_BLACKLIST).expect("capacity is non-zero");
        Self {
            spec,
            dev_verification,
            blacklists: Mutex::new(LruCache::new(capacity)),
            blacklist_fill: Mutex::new(()),
            rules: Mutex::new(LruCache::new(capacity)),
            rules_fill: Mutex::new(()),
        }
    }

    /// The blacklist in force for a block, keyed by its parent hash.
    pub fn blacklist(
        &self,
        invoker: &SystemInvoker,
        chain: Option<&dyn HeaderReader>,
        header: &Header,
        parent_state: &mut dyn State,
    ) -> Result<Arc<BlacklistMap>, SystemCallError> {
        if let Some(map) = self.blacklists.lock().get(&header.parent_hash) {
            return Ok(map.clone());
        }

        let _fill = self.blacklist_fill.lock();
        if let Some(map) = self.blacklists.lock().get(&header.parent_hash) {
            return Ok(map.clone());
        }

        // When the list has not changed since the grandparent, carry the
        // parent's cache entry forward without touching the contract.
        if self.spec.past_sophon(header.number) {
            let number = header.number;
            let last_updated = last_blacklist_updated(parent_state);
            if number >= 2 && number > last_updated + 1 {
                if let Some(chain) = chain {
                    match chain.header(&header.parent_hash, number - 1) {
                        Some(parent) => {
                            let carried =
                                self.blacklists.lock().get(&parent.parent_hash).cloned();
                            if let Some(map) = carried {
                                self.blacklists.lock().put(header.parent_hash, map.clone());
                                return Ok(map);
                            }
                        }
                        None => error!(
                            number,
                            parent_hash = ?header.parent_hash,
                            "can not get parent from chain while loading blacklist"
                        ),
                    }
                }
            }
        }

        let read = |method: &str, state: &mut dyn State| -> Result<Vec<Address>, SystemCallError> {
            let tokens = invoker.read_call(
                header.coinbase,
                ADDRESS_LIST_CONTRACT,
                ADDRESS_LIST_ADDR,
                method,
                &[],
                state,
                header,
            )?;
            tokens
                .first()
                .and_then(Token::as_address_array)
                .map(<[Address]>::to_vec)
                .ok_or_else(|| SystemCallError::UnexpectedOutput("blacklist".into()))
        };
        let froms = read("getBlacksFrom", parent_state)?;
        let tos = read("getBlacksTo", parent_state)?;

        let mut map = BlacklistMap::new();
        for from in froms {
            map.insert(from, Direction::From);
        }
        for to in tos {
            map.entry(to)
                .and_modify(|direction| *direction = Direction::Both)
                .or_insert(Direction::To);
        }

        let map = Arc::new(map);
        self.blacklists.lock().put(header.parent_hash, map.clone());
        Ok(map)
    }

    /// The event check rules in force for a block, keyed by its parent hash.
    pub fn event_check_rules(
        &self,
        invoker: &SystemInvoker,
        chain: Option<&dyn HeaderReader>,
        header: &Header,
        parent_state: &mut dyn State,
    ) -> Result<Arc<RuleMap>, SystemCallError> {
        if let Some(map) = self.rules.lock().get(&header.parent_hash) {
            return Ok(map.clone());
        }

        let _fill = self.rules_fill.lock();
        if let Some(map) = self.rules.lock().get(&header.parent_hash) {
            return Ok(map.clone());
        }

        let number = header.number;
        let last_updated = last_rules_updated(parent_state);
        if number >= 2 && number > last_updated + 1 {
            if let Some(chain) = chain {
                match chain.header(&header.parent_hash, number - 1) {
                    Some(parent) => {
                        let carried = self.rules.lock().get(&parent.parent_hash).cloned();
                        if let Some(map) = carried {
                            self.rules.lock().put(header.parent_hash, map.clone());
                            return Ok(map);
                        }
                    }
                    None => error!(
                        number,
                        parent_hash = ?header.parent_hash,
                        "can not get parent from chain while loading event check rules"
                    ),
                }
            }
        }

        let count = {
            let tokens = invoker.read_call(
                header.coinbase,
                ADDRESS_LIST_CONTRACT,
                ADDRESS_LIST_ADDR,
                "rulesLen",
                &[],
                parent_state,
                header,
            )?;
            tokens
                .first()
                .and_then(Token::as_u32)
                .ok_or_else(|| SystemCallError::UnexpectedOutput("rules length".into()))?
        };

        let mut map = RuleMap::new();
        for index in 0..count {
            let tokens = invoker.read_call(
                header.coinbase,
                ADDRESS_LIST_CONTRACT,
                ADDRESS_LIST_ADDR,
                "getRuleByIndex",
                &[Token::Uint(crate::domain::value_objects::U256::from(index))],
                parent_state,
                header,
            )?;
            let bad = || SystemCallError::UnexpectedOutput("event check rule".into());
            let sig = tokens.first().and_then(Token::as_bytes32).ok_or_else(bad)?;
            let topic_index = tokens
                .get(1)
                .and_then(Token::as_uint)
                .ok_or_else(bad)?
                .low_u64();
            let check = tokens
                .get(2)
                .and_then(Token::as_uint)
                .map(|v| AddressCheckType::from_u8(v.low_u64() as u8))
                .ok_or_else(bad)?;

            map.entry(sig)
                .or_insert_with(|| EventCheckRule {
                    event_sig: sig,
                    checks: BTreeMap::new(),
                })
                .checks
                .insert(topic_index, check);
        }

        let map = Arc::new(map);
        self.rules.lock().put(header.parent_hash, map.clone());
        Ok(map)
    }

    /// Consensus-level transaction validation against the blacklist. Active
    /// strictly after the RedCoast activation block; validation reads the
    /// parent state, which only exists from the block after the fork.
    pub fn validate_tx(
        &self,
        invoker: &SystemInvoker,
        chain: Option<&dyn HeaderReader>,
        sender: Address,
        tx: &Transaction,
        header: &Header,
        parent_state: &mut dyn State,
    ) -> Result<(), AdmissionError> {
        if !self.spec.past_redcoast(header.number) {
            return Ok(());
        }
        let map = self.blacklist(invoker, chain, header, parent_state)?;
        if let Some(direction) = map.get(&sender) {
            if *direction != Direction::To {
                trace!(tx = ?tx.hash(), addr = ?sender, ?direction, "hit blacklist");
                return Err(AdmissionError::AddressDenied { address: sender });
            }
        }
        if let Some(to) = tx.to {
            if let Some(direction) = map.get(&to) {
                if *direction != Direction::From {
                    trace!(tx = ?tx.hash(), addr = ?to, ?direction, "hit blacklist");
                    return Err(AdmissionError::AddressDenied { address: to });
                }
            }
        }
        Ok(())
    }

    /// Builds the EVM-facing guard for one block. Active strictly after the
    /// Sophon activation block; returns `None` earlier or when the contract
    /// reads fail.
    pub fn create_extra_validator(
        &self,
        invoker: &SystemInvoker,
        chain: Option<&dyn HeaderReader>,
        header: &Header,
        parent_state: &mut dyn State,
    ) -> Option<BlacklistGuard> {
        if !self.spec.past_sophon(header.number) {
            return None;
        }
        let blacks = match self.blacklist(invoker, chain, header, parent_state) {
            Ok(map) => map,
            Err(err) => {
                error!(%err, "loading blacklist failed");
                return None;
            }
        };
        let rules = match self.event_check_rules(invoker, chain, header, parent_state) {
            Ok(map) => map,
            Err(err) => {
                error!(%err, "loading event check rules failed");
                return None;
            }
        };
        Some(BlacklistGuard::new(blacks, rules))
    }

    /// Whether `addr` may create a contract at `height`. Reads the developer
    /// allow-list mapping slot directly, so it is tied to the contract's
    /// storage layout.
    #[must_use]
    pub fn can_create(&self, state: &dyn StateReader, addr: &Address, height: u64) -> bool {
        if self.spec.is_redcoast(height) && self.dev_verification {
            if dev_verification_enabled(state) {
                let slot = slot_for_dev_mapping(addr);
                let value = state.storage(&ADDRESS_LIST_ADDR, &slot);
                return !value.is_zero();
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(blacks: Vec<(Address, Direction)>, rules: Vec<EventCheckRule>) -> BlacklistGuard {
        BlacklistGuard::new(
            Arc::new(blacks.into_iter().collect()),
            Arc::new(rules.into_iter().map(|r| (r.event_sig, r)).collect()),
        )
    }

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn address_denial_follows_direction() {
        let g = guard(
            vec![
                (addr(1), Direction::From),
                (addr(2), Direction::To),
                (addr(3), Direction::Both),
            ],
            vec![],
        );

        assert!(g.is_address_denied(&addr(1), AddressCheckType::From));
        assert!(!g.is_address_denied(&addr(1), AddressCheckType::To));
        assert!(!g.is_address_denied(&addr(2), AddressCheckType::From));
        assert!(g.is_address_denied(&addr(2), AddressCheckType::To));
        assert!(g.is_address_denied(&addr(3), AddressCheckType::From));
        assert!(g.is_address_denied(&addr(3), AddressCheckType::To));
        // Listed in any direction trips the any-check.
        assert!(g.is_address_denied(&addr(1), AddressCheckType::BothInAny));
        assert!(g.is_address_denied(&addr(2), AddressCheckType::BothInAny));
        // Unlisted addresses never hit.
        assert!(!g.is_address_denied(&addr(9), AddressCheckType::BothInAny));
    }

    #[test]
    fn log_denial_checks_configured_topics() {
        let sig = keccak256(b"Transfer(address,address,uint256)");
        let mut checks = BTreeMap::new();
        checks.insert(1u64, AddressCheckType::From);
        checks.insert(2u64, AddressCheckType::To);
        let g = guard(
            vec![(addr(5), Direction::From)],
            vec![EventCheckRule {
                event_sig: sig,
                checks,
            }],
        );

        let log = |from: Address, to: Address| Log {
            address: addr(0x77),
            topics: vec![sig, from.into_word(), to.into_word()],
            data: vec![],
        };

        // Sender blacklisted From → denied via topic 1.
        assert!(g.is_log_denied(&log(addr(5), addr(6))));
        // Recipient position checks To; a From-listed address passes.
        assert!(!g.is_log_denied(&log(addr(6), addr(5))));
        // Unknown signature → no rule.
        let mut other = log(addr(5), addr(6));
        other.topics[0] = keccak256(b"Other()");
        assert!(!g.is_log_denied(&other));
        // Single-topic logs are never checked.
        assert!(!g.is_log_denied(&Log {
            address: addr(1),
            topics: vec![sig],
            data: vec![],
        }));
    }

    #[test]
    fn out_of_range_check_index_is_skipped() {
        let sig = keccak256(b"Thin(address)");
        let mut checks = BTreeMap::new();
        checks.insert(5u64, AddressCheckType::BothInAny);
        let g = guard(
            vec![(addr(1), Direction::Both)],
            vec![EventCheckRule {
                event_sig: sig,
                checks,
            }],
        );
        let log = Log {
            address: addr(9),
            topics: vec![sig, addr(1).into_word()],
            data: vec![],
        };
        assert!(!g.is_log_denied(&log));
    }

    #[test]
    fn dev_mapping_slot_matches_contract_layout() {
        let addr = Address::new([
            0x5b, 0x38, 0xda, 0x6a, 0x70, 0x1c, 0x56, 0x85, 0x45, 0xdc, 0xfc, 0xb0, 0x3f, 0xcb,
            0x87, 0x5f, 0x56, 0xbe, 0xdd, 0xc4,
        ]);
        let slot = slot_for_dev_mapping(&addr);
        assert_eq!(
            format!("{slot:?}"),
            "0xb314f101a00aa0d8cc6704cc6dd1e9dd7551ec98c9df52079c192c560ba66c4a"
        );
    }

    #[test]
    fn check_type_decoding() {
        assert_eq!(AddressCheckType::from_u8(1), AddressCheckType::From);
        assert_eq!(AddressCheckType::from_u8(2), AddressCheckType::To);
        assert_eq!(AddressCheckType::from_u8(3), AddressCheckType::BothInAny);
        assert_eq!(AddressCheckType::from_u8(0), AddressCheckType::None);
        assert_eq!(AddressCheckType::from_u8(77), AddressCheckType::None);
    }
}
