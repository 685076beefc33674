// Query-surface tests: wire encodings (0x-hex big integers and byte
// fields) and the full query API over a live ledger.

mod common;

use plasma::confirmer::{confirmation_request_digest, TransactionConfirmer};
use plasma::crypto;
use plasma::rootchain::NullClient;
use plasma::rpc::{ConfirmedTransactionWire, QueryApi, SignatureWire};
use plasma::{Mempool, Operator};
use primitive_types::U256;
use std::sync::Arc;

#[test]
fn test_big_integers_cross_the_wire_as_lowercase_hex() {
    let value = U256::from(500u64);
    assert_eq!(serde_json::to_value(value).unwrap(), serde_json::json!("0x1f4"));

    let parsed: U256 = serde_json::from_value(serde_json::json!("0x1f4")).unwrap();
    assert_eq!(parsed, value);

    assert_eq!(serde_json::to_value(U256::zero()).unwrap(), serde_json::json!("0x0"));
}

#[test]
fn test_confirmed_transaction_wire_round_trip() {
    let alice = common::account();
    let bob = common::account();
    let mut spend =
        common::spend_tx(&alice, common::deposit_input(&alice, 1, 7), bob.address, 600, 399, 1);
    spend.transaction.blk_num = 2;
    spend.transaction.tx_idx = 0;

    let wire: ConfirmedTransactionWire = (&spend).into();
    let json = serde_json::to_string(&wire).unwrap();
    assert!(json.contains("\"0x1\""), "fee should serialize as 0x-hex");
    assert!(
        json.contains(&format!("\"0x{}\"", hex::encode(bob.address))),
        "addresses should serialize as 0x-hex strings"
    );

    let parsed: ConfirmedTransactionWire = serde_json::from_str(&json).unwrap();
    let back: plasma::ConfirmedTransaction = (&parsed).try_into().unwrap();
    assert_eq!(back, spend, "wire form should round-trip, position included");
}

#[tokio::test]
async fn test_query_api_reads() {
    let alice = common::account();
    let bob = common::account();
    let storage = common::memory_store();
    common::seed_deposit_then_spend(&storage, &alice, &bob);

    let mempool = Mempool::spawn(storage.clone());
    let api = QueryApi::new(storage.clone(), mempool);

    assert_eq!(api.get_balance(&bob.address).unwrap(), U256::from(600u64));
    assert_eq!(api.get_balance(&alice.address).unwrap(), U256::from(399u64));
    assert_eq!(api.block_height().unwrap(), 2);

    let spendable = api.get_outputs(&alice.address, true).unwrap();
    assert_eq!(spendable.len(), 1);
    let history = api.get_outputs(&alice.address, false).unwrap();
    assert_eq!(history.len(), 2);

    let response = api.get_block(2).unwrap();
    assert_eq!(response.block.header.number, 2);
    assert_eq!(response.confirmed_transactions.len(), 1);
    assert_eq!(response.metadata.transaction_count, 1);
    assert_eq!(response.metadata.fees, U256::from(1u64));
    assert_eq!(
        response.confirmed_transactions[0].transaction.block_num, 2,
        "wire transactions carry their stamped position"
    );

    assert!(api.get_block(9).is_err(), "missing blocks should error");
}

#[tokio::test]
async fn test_send_waits_for_inclusion() {
    let alice = common::account();
    let bob = common::account();
    let carol = common::account();
    let storage = common::memory_store();
    common::seed_deposit_then_spend(&storage, &alice, &bob);

    let mempool = Mempool::spawn(storage.clone());
    let api = QueryApi::new(storage.clone(), mempool.clone());
    let operator = Operator::new(storage.clone(), mempool, Arc::new(NullClient));

    // The packager answers pending submissions on its next tick.
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        operator.package_tick().await.expect("packaging tick should succeed");
    });

    let spend = common::spend_tx(&bob, common::outpoint(&bob, 2, 0, 0), carol.address, 600, 0, 0);
    let response = api.send(&(&spend).into()).await.expect("send should resolve");

    assert_eq!(response.inclusion.block_number, 3);
    assert_eq!(response.inclusion.transaction_index, 0);
    assert_eq!(response.confirmed.transaction.block_num, 3);
    assert_eq!(storage.balance(&carol.address).unwrap(), U256::from(600u64));
}

#[tokio::test]
async fn test_confirm_validates_and_stores() {
    let alice = common::account();
    let bob = common::account();
    let mallory = common::account();
    let storage = common::memory_store();
    let spend = common::seed_deposit_then_spend(&storage, &alice, &bob);

    let confirmer = TransactionConfirmer::new(storage.clone());
    let digest = spend.transaction.signature_hash();
    let good = crypto::sign_digest(&digest, &alice.key).unwrap();
    let forged = crypto::sign_digest(&digest, &mallory.key).unwrap();

    assert!(
        confirmer.confirm(2, 0, [forged, forged]).is_err(),
        "confirmation signatures must recover to the spender"
    );

    let confirmed = confirmer.confirm(2, 0, [good, good]).expect("confirmation should attach");
    assert_eq!(confirmed.signatures[0], good);
    assert_eq!(storage.auth_sigs_for(2, 0).unwrap(), [good, good]);
}

#[tokio::test]
async fn test_get_confirmations_requires_owner_signature() {
    let alice = common::account();
    let bob = common::account();
    let mallory = common::account();
    let storage = common::memory_store();
    let spend = common::seed_deposit_then_spend(&storage, &alice, &bob);

    let confirmer = TransactionConfirmer::new(storage.clone());
    let digest = spend.transaction.signature_hash();
    let auth = crypto::sign_digest(&digest, &alice.key).unwrap();
    confirmer.confirm(2, 0, [auth, auth]).unwrap();

    let mempool = Mempool::spawn(storage.clone());
    let api = QueryApi::new(storage.clone(), mempool);

    // Bob owns output 0 of (2, 0); his signature over the request digest
    // unlocks the stored pair.
    let request = confirmation_request_digest(99, 2, 0, 0);
    let bob_sig = crypto::sign_digest(&request, &bob.key).unwrap();
    let (sig0, sig1) = api
        .get_confirmations(SignatureWire(bob_sig.0), 99, 2, 0, 0)
        .expect("owner request should succeed");
    assert_eq!(sig0, SignatureWire(auth.0));
    assert_eq!(sig1, SignatureWire(auth.0));

    let mallory_sig = crypto::sign_digest(&request, &mallory.key).unwrap();
    assert!(
        api.get_confirmations(SignatureWire(mallory_sig.0), 99, 2, 0, 0).is_err(),
        "a non-owner must not obtain the confirmation signatures"
    );
}
