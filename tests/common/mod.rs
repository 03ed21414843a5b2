//! Shared harness for the end-to-end consensus scenarios: a set of sorted
//! validator keys, an in-memory chain seeded with a genesis embedding them,
//! and an engine wired to the system-contract simulator.
#![allow(dead_code)]

use congress::adapters::{
    InMemoryChain, InMemorySnapshotStore, InMemoryStateDatabase, LocalSigner, SystemContractSim,
};
use congress::domain::{DIFF_IN_TURN, EXTRA_SEAL, EXTRA_VANITY};
use congress::prelude::*;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub struct Harness {
    pub engine: Arc<Congress>,
    pub sim: Arc<SystemContractSim>,
    pub chain: Arc<InMemoryChain>,
    pub state_db: Arc<InMemoryStateDatabase>,
    pub signers: Vec<Arc<LocalSigner>>,
    pub spec: ChainSpec,
    pub config: CongressConfig,
}

impl Harness {
    pub fn new(validators: usize, period: u64, epoch: u64, spec: ChainSpec) -> Self {
        let mut signers: Vec<Arc<LocalSigner>> = (0..validators)
            .map(|_| Arc::new(LocalSigner::random()))
            .collect();
        signers.sort_by_key(|signer| signer.address());

        let chain = Arc::new(InMemoryChain::new());
        chain.insert(genesis_header(
            &signers.iter().map(|s| s.address()).collect::<Vec<_>>(),
        ));

        Self::with_parts(signers, chain, period, epoch, spec)
    }

    /// A second engine over the same chain and validator keys, with its own
    /// simulator; verifier-side counterpart of a producing harness.
    pub fn sibling(&self) -> Self {
        Self::with_parts(
            self.signers.clone(),
            self.chain.clone(),
            self.config.period,
            self.config.epoch,
            self.spec.clone(),
        )
    }

    fn with_parts(
        signers: Vec<Arc<LocalSigner>>,
        chain: Arc<InMemoryChain>,
        period: u64,
        epoch: u64,
        spec: ChainSpec,
    ) -> Self {
        let sim = Arc::new(SystemContractSim::new());
        sim.set_top_validators(signers.iter().map(|s| s.address()).collect());

        let config = CongressConfig {
            period,
            epoch,
            ..Default::default()
        };
        let engine = Arc::new(Congress::new(
            spec.clone(),
            config.clone(),
            Arc::new(InMemorySnapshotStore::new()),
            sim.clone(),
        ));
        let state_db = Arc::new(InMemoryStateDatabase::new());
        engine.set_chain(chain.clone());
        engine.set_state_database(state_db.clone());

        Self {
            engine,
            sim,
            chain,
            state_db,
            signers,
            spec,
            config,
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.signers.iter().map(|signer| signer.address()).collect()
    }

    pub fn inturn_signer(&self, number: u64) -> Arc<LocalSigner> {
        self.signers[(number % self.signers.len() as u64) as usize].clone()
    }

    pub fn head(&self) -> Header {
        let number = self.chain.head_number().expect("chain has a genesis");
        self.chain.header_by_number(number).expect("head exists")
    }

    /// Builds a sealed child of the current head.
    pub fn sealed_child(&self, signer: &LocalSigner, difficulty: u64) -> Header {
        self.sealed_child_with(signer, difficulty, None)
    }

    pub fn sealed_child_with(
        &self,
        signer: &LocalSigner,
        difficulty: u64,
        epoch_validators: Option<&[Address]>,
    ) -> Header {
        let parent = self.head();
        let mut extra = vec![0u8; EXTRA_VANITY];
        if let Some(validators) = epoch_validators {
            for validator in validators {
                extra.extend_from_slice(validator.as_bytes());
            }
        }
        extra.extend_from_slice(&[0u8; EXTRA_SEAL]);

        let mut header = Header {
            parent_hash: parent.hash(),
            coinbase: signer.address(),
            number: parent.number + 1,
            gas_limit: parent.gas_limit,
            time: parent.time + self.config.period,
            difficulty: U256::from(difficulty),
            extra,
            ..Default::default()
        };
        let signature = signer.sign_seal(&header.seal_hash()).expect("seal signing");
        header.set_seal(signature.as_bytes());
        header
    }

    /// Verifies a header against the engine and extends the chain.
    pub fn verify_and_insert(&self, header: Header) {
        self.engine
            .verify_header(&*self.chain, &header)
            .expect("header verifies");
        self.chain.insert(header);
    }

    /// Grows the chain by in-turn blocks.
    pub fn extend_inturn(&self, blocks: u64) {
        for _ in 0..blocks {
            let number = self.head().number + 1;
            let signer = self.inturn_signer(number);
            let header = self.sealed_child(&signer, DIFF_IN_TURN);
            self.verify_and_insert(header);
        }
    }
}

pub fn genesis_header(validators: &[Address]) -> Header {
    let mut extra = vec![0u8; EXTRA_VANITY];
    for validator in validators {
        extra.extend_from_slice(validator.as_bytes());
    }
    extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
    Header {
        number: 0,
        gas_limit: 8_000_000,
        time: now_secs().saturating_sub(100_000),
        extra,
        ..Default::default()
    }
}

/// A placeholder user transaction; finalize only looks at the count.
pub fn dummy_user_tx() -> Transaction {
    Transaction::new(
        0,
        Some(Address::new([0x42; 20])),
        U256::from(1),
        21_000,
        U256::from(1_000_000_000u64),
        Vec::new(),
    )
}
