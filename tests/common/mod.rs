// Shared helpers for the ledger integration tests: throwaway accounts,
// signed transaction builders and an in-memory store.

#![allow(dead_code)]

use k256::ecdsa::SigningKey;
use plasma::crypto::{self, Address};
use plasma::tx::{ConfirmedTransaction, Input, Output, Transaction};
use plasma::Store;
use primitive_types::U256;
use std::sync::Arc;

pub struct Account {
    pub key: SigningKey,
    pub address: Address,
}

pub fn account() -> Account {
    let key = SigningKey::random(&mut rand::thread_rng());
    let address = crypto::address_from_key(key.verifying_key());
    Account { key, address }
}

pub fn memory_store() -> Arc<Store> {
    Arc::new(Store::in_memory())
}

pub fn deposit_tx(owner: &Account, amount: u64, nonce: u64) -> ConfirmedTransaction {
    ConfirmedTransaction::deposit(owner.address, U256::from(amount), U256::from(nonce))
}

/// The outpoint of a deposit packaged at block `blk_num`.
pub fn deposit_input(owner: &Account, blk_num: u64, nonce: u64) -> Input {
    Input::new(blk_num, 0, 0, U256::from(nonce), owner.address)
}

pub fn outpoint(owner: &Account, blk_num: u64, tx_idx: u32, out_idx: u8) -> Input {
    Input::new(blk_num, tx_idx, out_idx, U256::zero(), owner.address)
}

/// A fully signed single-input spend: `amount` to `to`, optional change
/// back to the spender, the remainder as fee.
pub fn spend_tx(
    from: &Account,
    input: Input,
    to: Address,
    amount: u64,
    change: u64,
    fee: u64,
) -> ConfirmedTransaction {
    let mut tx = Transaction::default();
    tx.input0 = input;
    tx.output0 = Output::new(to, U256::from(amount), U256::zero());
    if change > 0 {
        tx.output1 = Output::new(from.address, U256::from(change), U256::zero());
    }
    tx.fee = U256::from(fee);
    tx.sig0 = crypto::sign_digest(&tx.input0.signature_hash(), &from.key)
        .expect("failed to sign input 0");

    let mut confirmed = ConfirmedTransaction::new(tx);
    let digest = confirmed.transaction.signature_hash();
    confirmed.signatures[0] =
        crypto::sign_digest(&digest, &from.key).expect("failed to sign confirmation 0");
    confirmed
}

/// A fully signed spend consuming two outpoints, possibly owned by two
/// different accounts.
pub fn spend_tx_two_inputs(
    from0: &Account,
    input0: Input,
    from1: &Account,
    input1: Input,
    to: Address,
    amount: u64,
    fee: u64,
) -> ConfirmedTransaction {
    let mut tx = Transaction::default();
    tx.input0 = input0;
    tx.input1 = input1;
    tx.output0 = Output::new(to, U256::from(amount), U256::zero());
    tx.fee = U256::from(fee);
    tx.sig0 = crypto::sign_digest(&tx.input0.signature_hash(), &from0.key)
        .expect("failed to sign input 0");
    tx.sig1 = crypto::sign_digest(&tx.input1.signature_hash(), &from1.key)
        .expect("failed to sign input 1");

    let mut confirmed = ConfirmedTransaction::new(tx);
    let digest = confirmed.transaction.signature_hash();
    confirmed.signatures[0] =
        crypto::sign_digest(&digest, &from0.key).expect("failed to sign confirmation 0");
    confirmed.signatures[1] =
        crypto::sign_digest(&digest, &from1.key).expect("failed to sign confirmation 1");
    confirmed
}

/// A spend surrendering the whole input to the settlement layer.
pub fn exit_tx(from: &Account, input: Input, amount: u64) -> ConfirmedTransaction {
    let mut tx = Transaction::default();
    tx.input0 = input;
    tx.output0 = Output::exit(U256::from(amount));
    tx.sig0 = crypto::sign_digest(&tx.input0.signature_hash(), &from.key)
        .expect("failed to sign input 0");

    let mut confirmed = ConfirmedTransaction::new(tx);
    let digest = confirmed.transaction.signature_hash();
    confirmed.signatures[0] =
        crypto::sign_digest(&digest, &from.key).expect("failed to sign confirmation 0");
    confirmed
}

/// Packages Alice's 1000-denom deposit (nonce 7) as block 1 and her spend
/// of it (600 to Bob, 399 change, 1 fee) as block 2. Returns the spend.
pub fn seed_deposit_then_spend(
    store: &Store,
    alice: &Account,
    bob: &Account,
) -> ConfirmedTransaction {
    store
        .process_deposit(deposit_tx(alice, 1000, 7))
        .expect("failed to package deposit block");
    let spend = spend_tx(alice, deposit_input(alice, 1, 7), bob.address, 600, 399, 1);
    store.package_block(vec![spend.clone()]).expect("failed to package spend block");
    spend
}
