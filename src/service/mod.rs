//! # The Consensus Engine
//!
//! [`Congress`] ties header verification, snapshot maintenance, block
//! production and the system-contract pipeline together behind the interface
//! the host ledger drives.
//!
//! Concurrency model: the engine is `Send + Sync`. Batched verification runs
//! on a spawned worker streaming per-header results; sealing signs first and
//! delivers the block from a timer thread honoring a stop channel; admission
//! calls may arrive from any thread at any time.

mod admission;
mod finalize;
mod govern;

use crate::config::{ChainSpec, CongressConfig};
use crate::domain::ecdsa;
use crate::domain::entities::{empty_uncle_hash, parse_checkpoint_validators, Block, Header};
use crate::domain::snapshot::Snapshot;
use crate::domain::value_objects::{Address, Hash, U256};
use crate::domain::{
    diff_in_turn, diff_no_turn, gas, CHECKPOINT_INTERVAL, EXTRA_SEAL, EXTRA_VANITY,
    FULL_IMMUTABILITY_THRESHOLD, INMEMORY_SIGNATURES, MAX_GAS_LIMIT, WIGGLE_TIME_MS,
};
use crate::errors::{ConsensusError, SigningError, SystemCallError};
use crate::ports::chain::HeaderReader;
use crate::ports::executor::MessageExecutor;
use crate::ports::signing::ValidatorSigner;
use crate::ports::state::StateDatabase;
use crate::ports::store::SnapshotStore;
use crate::system::abi::AbiRegistry;
use crate::system::access_control::AccessController;
use crate::system::invoker::SystemInvoker;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, trace, warn};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[derive(Clone)]
struct SignerHandle {
    validator: Address,
    signer: Arc<dyn ValidatorSigner>,
}

/// The Proof-of-Stake-Authority consensus engine.
pub struct Congress {
    spec: ChainSpec,
    config: CongressConfig,
    store: Arc<dyn SnapshotStore>,
    invoker: SystemInvoker,
    access: AccessController,

    /// Snapshots for recent blocks, to speed up re-orgs.
    recents: Mutex<LruCache<Hash, Snapshot>>,
    /// Seal signers of recent blocks, to speed up verification.
    signatures: Mutex<LruCache<Hash, Address>>,

    /// Local validator identity and signing functions.
    signer: RwLock<Option<SignerHandle>>,
    /// Historic state access, needed for epoch reads against parent roots.
    state_db: RwLock<Option<Arc<dyn StateDatabase>>>,
    /// Chain access for cache propagation in the access controller.
    chain: RwLock<Option<Arc<dyn HeaderReader>>>,

    /// Skips the difficulty turn-ness assertion; unit tests only.
    fake_diff: bool,
}

impl Congress {
    /// Builds the engine around the host's snapshot store and EVM executor.
    pub fn new(
        spec: ChainSpec,
        config: CongressConfig,
        store: Arc<dyn SnapshotStore>,
        executor: Arc<dyn MessageExecutor>,
    ) -> Self {
        let config = config.normalized();
        let registry = Arc::new(AbiRegistry::interactive());
        let invoker = SystemInvoker::new(registry, executor, spec.clone());
        let access = AccessController::new(spec.clone(), config.enable_dev_verification);

        let snapshots = NonZeroUsize::new(config.snapshot_cache).expect("normalized to non-zero");
        let signatures = NonZeroUsize::new(INMEMORY_SIGNATURES).expect("constant is non-zero");

        Self {
            spec,
            config,
            store,
            invoker,
            access,
            recents: Mutex::new(LruCache::new(snapshots)),
            signatures: Mutex::new(LruCache::new(signatures)),
            signer: RwLock::new(None),
            state_db: RwLock::new(None),
            chain: RwLock::new(None),
            fake_diff: false,
        }
    }

    /// Registers chain access used for cache propagation.
    pub fn set_chain(&self, chain: Arc<dyn HeaderReader>) {
        *self.chain.write() = Some(chain);
    }

    /// Registers historic state access used for parent-state reads.
    pub fn set_state_database(&self, state_db: Arc<dyn StateDatabase>) {
        *self.state_db.write() = Some(state_db);
    }

    /// Injects the local validator address and signing functions.
    pub fn authorize(&self, validator: Address, signer: Arc<dyn ValidatorSigner>) {
        *self.signer.write() = Some(SignerHandle { validator, signer });
    }

    /// The configured consensus parameters.
    #[must_use]
    pub fn config(&self) -> &CongressConfig {
        &self.config
    }

    /// The fork schedule in effect.
    #[must_use]
    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    pub(crate) fn invoker(&self) -> &SystemInvoker {
        &self.invoker
    }

    pub(crate) fn access(&self) -> &AccessController {
        &self.access
    }

    pub(crate) fn signer_handle(&self) -> Option<SignerHandle> {
        self.signer.read().clone()
    }

    /// The local validator address, when authorized.
    #[must_use]
    pub fn validator(&self) -> Option<Address> {
        self.signer.read().as_ref().map(|handle| handle.validator)
    }

    #[cfg(test)]
    pub(crate) fn set_fake_difficulty(&mut self) {
        self.fake_diff = true;
    }

    // =========================================================================
    // AUTHORSHIP AND SEAL RECOVERY
    // =========================================================================

    /// The account that produced the block. By protocol rule the seal signer
    /// must equal the coinbase, so the coinbase is authoritative.
    #[must_use]
    pub fn author(&self, header: &Header) -> Address {
        header.coinbase
    }

    /// Recovers the seal signer, memoized by header hash.
    pub(crate) fn ecrecover(&self, header: &Header) -> Result<Address, ConsensusError> {
        let hash = header.hash();
        if let Some(signer) = self.signatures.lock().get(&hash) {
            return Ok(*signer);
        }
        let seal = header.seal().ok_or(ConsensusError::MissingSignature)?;
        let signer = ecdsa::recover_address(&header.seal_hash(), seal)?;
        self.signatures.lock().put(hash, signer);
        Ok(signer)
    }

    /// The hash a validator signs for the given header.
    #[must_use]
    pub fn seal_hash(&self, header: &Header) -> Hash {
        header.seal_hash()
    }

    // =========================================================================
    // HEADER VERIFICATION
    // =========================================================================

    /// Checks whether a header conforms to the consensus rules.
    pub fn verify_header(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
    ) -> Result<(), ConsensusError> {
        self.verify_header_with_parents(chain, header, &[])
    }

    /// Rejects any non-empty uncle list.
    pub fn verify_uncles(&self, uncles: &[Header]) -> Result<(), ConsensusError> {
        if uncles.is_empty() {
            Ok(())
        } else {
            Err(ConsensusError::UnclesNotAllowed)
        }
    }

    /// Checks the seal of a single header against the snapshot at its parent.
    pub fn verify_seal(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
    ) -> Result<(), ConsensusError> {
        self.verify_seal_with_parents(chain, header, &[])
    }

    pub(crate) fn verify_header_with_parents(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), ConsensusError> {
        let number = header.number;

        // Don't waste time on blocks from the future.
        if header.time > now_secs() {
            return Err(ConsensusError::FutureBlock);
        }
        if header.extra.len() < EXTRA_VANITY {
            return Err(ConsensusError::MissingVanity);
        }
        if header.extra.len() < EXTRA_VANITY + EXTRA_SEAL {
            return Err(ConsensusError::MissingSignature);
        }

        // Epoch headers carry the validator list, all others must not.
        let is_epoch = number % self.config.epoch == 0;
        let validator_bytes = header.extra.len() - EXTRA_VANITY - EXTRA_SEAL;
        if !is_epoch && validator_bytes != 0 {
            return Err(ConsensusError::ExtraValidators);
        }
        if is_epoch && validator_bytes % 20 != 0 {
            return Err(ConsensusError::ExtraValidators);
        }

        if !header.mix_digest.is_zero() {
            return Err(ConsensusError::InvalidMixDigest);
        }
        if header.uncle_hash != empty_uncle_hash() {
            return Err(ConsensusError::InvalidUncleHash);
        }
        if number > 0 && header.difficulty.is_zero() {
            return Err(ConsensusError::InvalidDifficulty);
        }
        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(ConsensusError::InvalidGasLimit {
                have: header.gas_limit,
                max: MAX_GAS_LIMIT,
            });
        }

        self.verify_cascading_fields(chain, header, parents)
    }

    fn verify_cascading_fields(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), ConsensusError> {
        let number = header.number;
        // The genesis block is the always-valid dead end.
        if number == 0 {
            return Ok(());
        }

        let parent = match parents.last() {
            Some(parent) => parent.clone(),
            None => chain
                .header(&header.parent_hash, number - 1)
                .ok_or(ConsensusError::UnknownAncestor)?,
        };
        if parent.number != number - 1 || parent.hash() != header.parent_hash {
            return Err(ConsensusError::UnknownAncestor);
        }

        if parent.time + self.config.period > header.time {
            return Err(ConsensusError::InvalidTimestamp);
        }
        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::InvalidGasUsed {
                used: header.gas_used,
                limit: header.gas_limit,
            });
        }

        if !self.spec.is_london(number) {
            if header.base_fee.is_some() {
                return Err(ConsensusError::InvalidBaseFee {
                    have: header.base_fee,
                    want: None,
                });
            }
            gas::verify_gas_limit(parent.gas_limit, header.gas_limit)?;
        } else {
            gas::verify_eip1559_header(&self.spec, &parent, header)?;
        }

        self.verify_seal_with_parents(chain, header, parents)
    }

    fn verify_seal_with_parents(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), ConsensusError> {
        let number = header.number;
        // Verifying the genesis seal is not supported.
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }

        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents)?;

        let signer = self.ecrecover(header)?;
        if signer != header.coinbase {
            return Err(ConsensusError::InvalidCoinbase);
        }
        if !snap.validators.contains(&signer) {
            return Err(ConsensusError::UnauthorizedValidator);
        }
        if snap.recently_signed(number, &signer) {
            return Err(ConsensusError::RecentlySigned);
        }

        if !self.fake_diff {
            let inturn = snap.inturn(number, &signer);
            if inturn && header.difficulty != diff_in_turn() {
                return Err(ConsensusError::WrongDifficulty);
            }
            if !inturn && header.difficulty != diff_no_turn() {
                return Err(ConsensusError::WrongDifficulty);
            }
        }
        Ok(())
    }

    /// Verifies a batch of headers on a background worker. Results stream in
    /// input order; each header is checked against its predecessors in the
    /// batch, so the batch may extend past the locally known chain.
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn HeaderReader>,
        headers: Vec<Header>,
    ) -> HeaderVerificationTask {
        let (sender, results) = channel();
        let abort = Arc::new(AtomicBool::new(false));

        let engine = Arc::clone(self);
        let stop = Arc::clone(&abort);
        thread::spawn(move || {
            for index in 0..headers.len() {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let result =
                    engine.verify_header_with_parents(&*chain, &headers[index], &headers[..index]);
                if sender.send(result).is_err() {
                    return;
                }
            }
        });

        HeaderVerificationTask { results, abort }
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// The authorization snapshot at a given point in time.
    pub(crate) fn snapshot(
        &self,
        chain: &dyn HeaderReader,
        number: u64,
        hash: Hash,
        parents: &[Header],
    ) -> Result<Snapshot, ConsensusError> {
        let mut headers: Vec<Header> = Vec::new();
        let mut number = number;
        let mut hash = hash;
        let mut parents = parents;

        let snap = loop {
            // An in-memory snapshot is the fastest path.
            if let Some(snap) = self.recents.lock().get(&hash) {
                break snap.clone();
            }
            // On-disk checkpoints avoid replaying deep history.
            if number % CHECKPOINT_INTERVAL == 0 {
                if let Some(snap) = self.store.load(&hash)? {
                    trace!(number, hash = ?hash, "loaded snapshot from disk");
                    break snap;
                }
            }
            // At the genesis, or at an epoch header too deep to re-org,
            // trust the embedded validator list as an anchor.
            if number == 0
                || (number % self.config.epoch == 0
                    && (headers.len() > FULL_IMMUTABILITY_THRESHOLD
                        || chain.header_by_number(number - 1).is_none()))
            {
                if let Some(checkpoint) = chain.header_by_number(number) {
                    let checkpoint_hash = checkpoint.hash();
                    let validators = parse_checkpoint_validators(&checkpoint.extra)
                        .filter(|validators| !validators.is_empty())
                        .ok_or(ConsensusError::InvalidExtraValidators)?;
                    let snap = Snapshot::new(number, checkpoint_hash, validators);
                    self.store.save(&snap)?;
                    info!(number, hash = ?checkpoint_hash, "stored checkpoint snapshot to disk");
                    break snap;
                }
                if number == 0 {
                    return Err(ConsensusError::UnknownAncestor);
                }
            }
            // No snapshot here; collect the header and walk backward.
            let header = if let Some((last, rest)) = parents.split_last() {
                if last.hash() != hash || last.number != number {
                    return Err(ConsensusError::UnknownAncestor);
                }
                parents = rest;
                last.clone()
            } else {
                chain
                    .header(&hash, number)
                    .ok_or(ConsensusError::UnknownAncestor)?
            };
            hash = header.parent_hash;
            number -= 1;
            headers.push(header);
        };

        // Apply the collected headers in ascending order.
        headers.reverse();
        let snap = snap.apply(&headers, self.config.epoch, |header| self.ecrecover(header))?;
        self.recents.lock().put(snap.hash, snap.clone());

        // A freshly crossed checkpoint goes back to disk.
        if snap.number % CHECKPOINT_INTERVAL == 0 && !headers.is_empty() {
            self.store.save(&snap)?;
            trace!(number = snap.number, hash = ?snap.hash, "stored snapshot to disk");
        }
        Ok(snap)
    }

    // =========================================================================
    // BLOCK PRODUCTION
    // =========================================================================

    /// Prepares the consensus fields of a header for the transactions to run
    /// on top: coinbase, difficulty, extra-data skeleton and timestamp.
    pub fn prepare(
        &self,
        chain: &dyn HeaderReader,
        header: &mut Header,
    ) -> Result<(), ConsensusError> {
        let validator = self.validator().unwrap_or_default();
        header.coinbase = validator;
        header.nonce = 0;

        let number = header.number;
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        header.difficulty = calc_difficulty(&snap, &validator);

        // Normalize the vanity prefix, then lay out the rest of extra-data.
        if header.extra.len() < EXTRA_VANITY {
            header.extra.resize(EXTRA_VANITY, 0);
        }
        header.extra.truncate(EXTRA_VANITY);

        if number % self.config.epoch == 0 {
            for validator in self.top_validators(chain, header)? {
                header.extra.extend_from_slice(validator.as_bytes());
            }
        }
        header.extra.extend_from_slice(&[0u8; EXTRA_SEAL]);

        header.mix_digest = Hash::ZERO;

        let parent = chain
            .header(&header.parent_hash, number - 1)
            .ok_or(ConsensusError::UnknownAncestor)?;
        header.time = std::cmp::max(parent.time + self.config.period, now_secs());
        Ok(())
    }

    /// Attempts to seal a block with the local signing credentials. The
    /// signed block is delivered on `results` once the slot time (plus an
    /// out-of-turn wiggle) elapses; a message on `stop`, or closing it,
    /// aborts silently.
    pub fn seal(
        &self,
        chain: &dyn HeaderReader,
        block: Block,
        results: Sender<Block>,
        stop: Receiver<()>,
    ) -> Result<(), ConsensusError> {
        let mut header = block.header.clone();
        let number = header.number;

        // Sealing the genesis block is not supported.
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }
        // For 0-period chains, refuse to seal empty blocks.
        if self.config.period == 0 && block.transactions.is_empty() {
            info!("sealing paused, waiting for transactions");
            return Ok(());
        }

        // Take a read snapshot of the signing credentials and release the
        // lock before any waiting.
        let handle = self.signer_handle().ok_or(SigningError::SignerNotSet)?;
        let validator = handle.validator;

        // Bail out early when the protocol forbids us to sign.
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        if !snap.validators.contains(&validator) {
            return Err(ConsensusError::UnauthorizedValidator);
        }
        if snap.must_wait_for_turn(number, &validator) {
            info!("signed recently, must wait for others");
            return Ok(());
        }

        // Wait until the slot time, plus a random wiggle when out-of-turn.
        let mut delay = Duration::from_secs(header.time.saturating_sub(now_secs()));
        if header.difficulty == diff_no_turn() {
            let wiggle = snap.signer_window() * WIGGLE_TIME_MS;
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..wiggle));
            trace!(wiggle_ms = wiggle, "out-of-turn signing requested");
        }

        let signature = handle.signer.sign_seal(&header.seal_hash())?;
        header.set_seal(signature.as_bytes());
        let sealed = block.with_seal(header);

        trace!(delay_ms = delay.as_millis() as u64, "waiting for slot to sign and propagate");
        thread::spawn(move || {
            match stop.recv_timeout(delay) {
                // Stop fired (or the miner went away): abort silently.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => (),
                Err(RecvTimeoutError::Timeout) => {
                    let seal_hash = sealed.header.seal_hash();
                    if results.send(sealed).is_err() {
                        warn!(seal_hash = ?seal_hash, "sealing result is not read by miner");
                    }
                }
            }
        });
        Ok(())
    }

    /// The difficulty a new block on `parent` should carry for the local
    /// validator: 2 in-turn, 1 out-of-turn.
    pub fn calc_difficulty(
        &self,
        chain: &dyn HeaderReader,
        parent: &Header,
    ) -> Result<U256, ConsensusError> {
        let snap = self.snapshot(chain, parent.number, parent.hash(), &[])?;
        Ok(calc_difficulty(
            &snap,
            &self.validator().unwrap_or_default(),
        ))
    }

    /// Reads the current top validators against the parent state of `header`.
    pub(crate) fn top_validators(
        &self,
        chain: &dyn HeaderReader,
        header: &Header,
    ) -> Result<Vec<Address>, ConsensusError> {
        let parent = chain
            .header(&header.parent_hash, header.number - 1)
            .ok_or(ConsensusError::UnknownAncestor)?;
        let state_db = self
            .state_db
            .read()
            .clone()
            .ok_or(SystemCallError::StateDatabaseNotSet)?;
        let mut state = state_db.state_at(&parent.root).map_err(SystemCallError::from)?;
        let validators = self
            .invoker
            .top_validators(header.coinbase, &parent, state.as_mut())?;
        Ok(validators)
    }
}

fn calc_difficulty(snap: &Snapshot, validator: &Address) -> U256 {
    if snap.inturn(snap.number + 1, validator) {
        diff_in_turn()
    } else {
        diff_no_turn()
    }
}

/// Handle to a running batched verification: per-header results in input
/// order plus an abort switch.
pub struct HeaderVerificationTask {
    results: Receiver<Result<(), ConsensusError>>,
    abort: Arc<AtomicBool>,
}

impl HeaderVerificationTask {
    /// Blocks for the next per-header result; `None` once the worker is done
    /// or aborted.
    pub fn recv(&self) -> Option<Result<(), ConsensusError>> {
        self.results.recv().ok()
    }

    /// Stops the worker after the in-flight header.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }
}
