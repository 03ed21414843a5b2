//! Governance two-phase replay: proposals execute in index order, finish in
//! the same order, and verification accepts exactly the producer's
//! transactions.

mod common;

use common::Harness;
use congress::adapters::{InMemoryState, LocalSigner};
use congress::domain::DIFF_IN_TURN;
use congress::prelude::*;
use congress::system::contracts::GOVERNANCE_TO_ADDR;
use congress::system::governance::{ACTION_ERASE_CODE, ACTION_EVM_CALL};
use std::sync::Arc;

fn redcoast_spec() -> ChainSpec {
    ChainSpec {
        chain_id: 9000,
        redcoast_block: Some(0),
        ..Default::default()
    }
}

fn proposals() -> Vec<Proposal> {
    let prop = |id: u64, action: u64, to: Address| Proposal {
        id: U256::from(id),
        action: U256::from(action),
        from: Address::new([0xaa; 20]),
        to,
        value: U256::zero(),
        data: vec![id as u8, 0xfe],
    };
    vec![
        prop(7, ACTION_EVM_CALL, Address::new([0x71; 20])),
        prop(3, ACTION_ERASE_CODE, Address::new([0x72; 20])),
        prop(11, ACTION_EVM_CALL, Address::new([0x73; 20])),
    ]
}

/// Builds a producing harness with an authorized in-turn validator and the
/// three test proposals queued, then assembles block 1.
fn produce() -> (Harness, Header, Block, Vec<Receipt>, InMemoryState) {
    let harness = Harness::new(3, 3, 30_000, redcoast_spec());
    let validator = harness.inturn_signer(1);
    harness
        .engine
        .authorize(validator.address(), validator.clone());
    harness.sim.set_passed_proposals(proposals());

    let header = harness.sealed_child(&validator, DIFF_IN_TURN);
    let mut state = InMemoryState::new();
    // Give the erase target some code so the proposal has something to wipe.
    state.set_code(&Address::new([0x72; 20]), vec![0x60, 0x00]);

    let (block, receipts) = harness
        .engine
        .finalize_and_assemble(
            &*harness.chain,
            header.clone(),
            &mut state,
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
    (harness, header, block, receipts, state)
}

#[test]
fn producer_executes_then_finishes_in_index_order() {
    let (harness, _, block, receipts, state) = produce();

    assert_eq!(block.transactions.len(), 3);
    assert_eq!(receipts.len(), 3);

    let records = harness.sim.records();
    // Finish strictly after all executions, in index order.
    assert_eq!(
        records.finished,
        vec![U256::from(7), U256::from(3), U256::from(11)]
    );
    // The two EVM actions ran against their declared targets.
    let targets: Vec<Address> = records.plain_calls.iter().map(|call| call.1).collect();
    assert_eq!(targets, vec![Address::new([0x71; 20]), Address::new([0x73; 20])]);
    // The erase action wiped the code.
    assert!(state.code(&Address::new([0x72; 20])).is_empty());
    // All three receipts report success.
    assert!(receipts.iter().all(|receipt| receipt.status == 1));
}

#[test]
fn synthesized_transactions_are_wellformed_system_txs() {
    let (harness, header, block, _, _) = produce();
    let validator = harness.inturn_signer(1).address();

    for (index, tx) in block.transactions.iter().enumerate() {
        assert_eq!(tx.to, Some(GOVERNANCE_TO_ADDR));
        assert!(tx.gas_price.is_zero());
        assert_eq!(tx.gas, header.gas_limit);
        assert_eq!(tx.nonce, index as u64);
        assert_eq!(tx.sender().unwrap(), validator);
        assert!(harness.engine.is_sys_transaction(validator, tx, &header));
        // The payload decodes back to the proposal it carries.
        let carried = Proposal::rlp_decode(&tx.data).unwrap();
        assert_eq!(carried.id, proposals()[index].id);
    }
}

#[test]
fn verifier_accepts_the_produced_block() {
    let (harness, mut header, block, _, _) = produce();

    let verifier = harness.sibling();
    verifier.sim.set_passed_proposals(proposals());

    let mut state = InMemoryState::new();
    state.set_code(&Address::new([0x72; 20]), vec![0x60, 0x00]);

    let mut txs = Vec::new();
    let mut receipts = Vec::new();
    verifier
        .engine
        .finalize(
            &*verifier.chain,
            &mut header,
            &mut state,
            &mut txs,
            &mut receipts,
            &block.transactions,
        )
        .unwrap();

    assert_eq!(txs.len(), 3);
    assert_eq!(receipts.len(), 3);
    assert_eq!(
        verifier.sim.records().finished,
        vec![U256::from(7), U256::from(3), U256::from(11)]
    );
    // Replayed receipts carry the enclosing block's hash; produced receipts
    // leave it zero until the block exists.
    assert!(receipts.iter().all(|receipt| !receipt.block_hash.is_zero()));
}

#[test]
fn verifier_rejects_a_wrong_transaction_count() {
    let (harness, mut header, block, _, _) = produce();
    let verifier = harness.sibling();
    verifier.sim.set_passed_proposals(proposals());

    let mut state = InMemoryState::new();
    let result = verifier.engine.finalize(
        &*verifier.chain,
        &mut header,
        &mut state,
        &mut Vec::new(),
        &mut Vec::new(),
        &block.transactions[..2],
    );
    assert_eq!(
        result,
        Err(ConsensusError::InvalidSysGovCount {
            expected: 3,
            have: 2,
        })
    );
}

#[test]
fn verifier_rejects_a_foreign_sender() {
    let (harness, mut header, mut block, _, _) = produce();

    // Re-sign the first system transaction with a key that is not the
    // coinbase.
    let outsider = LocalSigner::random();
    let tx = block.transactions[0].clone();
    let resigned = outsider
        .sign_transaction(
            Transaction::new(tx.nonce, tx.to, tx.value, tx.gas, tx.gas_price, tx.data),
            9000,
        )
        .unwrap();
    block.transactions[0] = resigned;

    let verifier = harness.sibling();
    verifier.sim.set_passed_proposals(proposals());

    let mut state = InMemoryState::new();
    let result = verifier.engine.finalize(
        &*verifier.chain,
        &mut header,
        &mut state,
        &mut Vec::new(),
        &mut Vec::new(),
        &block.transactions,
    );
    assert_eq!(result, Err(ConsensusError::InvalidSysGovSender));
}

#[test]
fn verifier_rejects_a_tampered_payload() {
    let (harness, mut header, mut block, _, _) = produce();
    let validator = harness.inturn_signer(1);

    // A validly signed system transaction whose payload belongs to another
    // proposal.
    let mut wrong = proposals()[1].clone();
    wrong.data = vec![0xba, 0xad];
    let tx = block.transactions[0].clone();
    let resigned = validator
        .sign_transaction(
            Transaction::new(
                tx.nonce,
                tx.to,
                tx.value,
                tx.gas,
                tx.gas_price,
                wrong.rlp_encode(),
            ),
            9000,
        )
        .unwrap();
    block.transactions[0] = resigned;

    let verifier = harness.sibling();
    verifier.sim.set_passed_proposals(proposals());

    let mut state = InMemoryState::new();
    let result = verifier.engine.finalize(
        &*verifier.chain,
        &mut header,
        &mut state,
        &mut Vec::new(),
        &mut Vec::new(),
        &block.transactions,
    );
    assert_eq!(
        result,
        Err(ConsensusError::SysGovPayloadMismatch { id: U256::from(7) })
    );
}

#[test]
fn proposal_value_rides_the_transaction_until_sophon() {
    let mut proposal = proposals()[0].clone();
    proposal.value = U256::from(42);

    // Pre-Sophon: the synthetic transaction carries the proposal value.
    let harness = Harness::new(3, 3, 30_000, redcoast_spec());
    let validator = harness.inturn_signer(1);
    harness
        .engine
        .authorize(validator.address(), validator.clone());
    harness.sim.set_passed_proposals(vec![proposal.clone()]);

    let header = harness.sealed_child(&validator, DIFF_IN_TURN);
    let mut state = InMemoryState::new();
    state.set_balance(&validator.address(), U256::from(1_000));
    state.set_balance(&proposal.from, U256::from(1_000));
    let (block, _) = harness
        .engine
        .finalize_and_assemble(&*harness.chain, header, &mut state, Vec::new(), Vec::new())
        .unwrap();
    assert_eq!(block.transactions[0].value, U256::from(42));

    // Post-Sophon: the transaction value is forced to zero, while the inner
    // EVM call still forwards the proposal value.
    let spec = ChainSpec {
        sophon_block: Some(0),
        ..redcoast_spec()
    };
    let harness = Harness::new(3, 3, 30_000, spec);
    let validator = harness.inturn_signer(1);
    harness
        .engine
        .authorize(validator.address(), validator.clone());
    harness.sim.set_passed_proposals(vec![proposal.clone()]);

    let header = harness.sealed_child(&validator, DIFF_IN_TURN);
    let mut state = InMemoryState::new();
    state.set_balance(&proposal.from, U256::from(1_000));
    let (block, _) = harness
        .engine
        .finalize_and_assemble(&*harness.chain, header, &mut state, Vec::new(), Vec::new())
        .unwrap();
    assert!(block.transactions[0].value.is_zero());
    assert_eq!(harness.sim.records().plain_calls[0].2, U256::from(42));
}

#[test]
fn failed_proposal_calls_yield_failed_receipts() {
    let harness = Harness::new(3, 3, 30_000, redcoast_spec());
    let validator = harness.inturn_signer(1);
    harness
        .engine
        .authorize(validator.address(), validator.clone());

    let target = Address::new([0x71; 20]);
    harness.sim.set_passed_proposals(vec![proposals()[0].clone()]);
    harness.sim.fail_target(target);

    let header = harness.sealed_child(&validator, DIFF_IN_TURN);
    let mut state = InMemoryState::new();
    let (block, receipts) = harness
        .engine
        .finalize_and_assemble(&*harness.chain, header, &mut state, Vec::new(), Vec::new())
        .unwrap();

    // The EVM failure lands in the receipt, not in the block's validity.
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(receipts[0].status, 0);
    assert_eq!(harness.sim.records().finished, vec![U256::from(7)]);
}

#[test]
fn unsupported_actions_fail_their_receipt_only() {
    let harness = Harness::new(3, 3, 30_000, redcoast_spec());
    let validator = harness.inturn_signer(1);
    harness
        .engine
        .authorize(validator.address(), validator.clone());

    let mut odd = proposals()[0].clone();
    odd.action = U256::from(9);
    harness.sim.set_passed_proposals(vec![odd]);

    let header = harness.sealed_child(&validator, DIFF_IN_TURN);
    let mut state = InMemoryState::new();
    let (_, receipts) = harness
        .engine
        .finalize_and_assemble(&*harness.chain, header, &mut state, Vec::new(), Vec::new())
        .unwrap();
    assert_eq!(receipts[0].status, 0);
}

#[test]
fn apply_sys_tx_replays_a_single_transaction() {
    let (harness, header, block, _, _) = produce();
    let sender = harness.inturn_signer(1).address();
    let tx = &block.transactions[0];

    let mut state = InMemoryState::new();
    let executor: Arc<congress::adapters::SystemContractSim> = harness.sim.clone();
    let (ret, vm_err) = harness
        .engine
        .apply_sys_tx(&*executor, &mut state, &header, 0, sender, tx)
        .unwrap();

    assert!(ret.is_empty());
    assert!(vm_err.is_none());
    assert_eq!(state.nonce(&sender), 1);
}

#[test]
fn system_transaction_detection_covers_both_entry_points() {
    let harness = Harness::new(3, 3, 30_000, redcoast_spec());
    let header = harness.sealed_child(&harness.inturn_signer(1), DIFF_IN_TURN);
    let coinbase = header.coinbase;
    let other = Address::new([0x99; 20]);

    let sink_tx = Transaction::new(
        0,
        Some(GOVERNANCE_TO_ADDR),
        U256::zero(),
        1_000_000,
        U256::zero(),
        vec![],
    );
    assert!(harness.engine.is_sys_transaction(coinbase, &sink_tx, &header));
    assert!(!harness.engine.is_sys_transaction(other, &sink_tx, &header));

    // Non-zero gas price disqualifies the sink entry point.
    let mut priced = sink_tx.clone();
    priced.gas_price = U256::one();
    assert!(!harness.engine.is_sys_transaction(coinbase, &priced, &header));

    // The legacy entry point: coinbase calling the governance contract.
    let legacy = Transaction::new(
        0,
        Some(congress::system::contracts::GOVERNANCE_ADDR),
        U256::zero(),
        1_000_000,
        U256::one(),
        vec![],
    );
    assert!(harness.engine.is_sys_transaction(coinbase, &legacy, &header));

    let create = Transaction::new(0, None, U256::zero(), 1_000_000, U256::zero(), vec![]);
    assert!(!harness.engine.is_sys_transaction(coinbase, &create, &header));
}
