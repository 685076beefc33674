// Ledger type tests: canonical encoding, digests, signatures and the
// block Merkle tree.

mod common;

use plasma::block::{Block, BlockHeader, BlockMetadata};
use plasma::crypto::{self, Signature, EXIT_ADDRESS, ZERO_HASH};
use plasma::tx::{ConfirmedTransaction, Input, Output, SpendIdentifier, Transaction};
use plasma::MerkleTree;
use primitive_types::U256;

#[test]
fn test_encoding_round_trips() {
    let alice = common::account();
    let bob = common::account();

    let input = Input::new(3, 7, 1, U256::from(42u64), alice.address);
    let decoded: Input = bincode::deserialize(&bincode::serialize(&input).unwrap()).unwrap();
    assert_eq!(decoded, input, "Input should round-trip through its encoding");

    let output = Output::new(bob.address, U256::from(600u64), U256::zero());
    let decoded: Output = bincode::deserialize(&bincode::serialize(&output).unwrap()).unwrap();
    assert_eq!(decoded, output, "Output should round-trip through its encoding");

    let spend = common::spend_tx(&alice, input, bob.address, 600, 399, 1);
    let decoded: ConfirmedTransaction =
        bincode::deserialize(&bincode::serialize(&spend).unwrap()).unwrap();
    assert_eq!(decoded, spend, "ConfirmedTransaction should round-trip");

    let tx = spend.transaction.clone();
    let decoded: Transaction = bincode::deserialize(&bincode::serialize(&tx).unwrap()).unwrap();
    assert_eq!(decoded, tx, "Transaction should round-trip");

    let header = BlockHeader { merkle_root: [1u8; 32], prev_hash: [2u8; 32], number: 9 };
    let block = Block { block_hash: header.hash(), header };
    let decoded: Block = bincode::deserialize(&bincode::serialize(&block).unwrap()).unwrap();
    assert_eq!(decoded, block, "Block should round-trip");

    let meta = BlockMetadata { created_at: 1700000000, transaction_count: 3, fees: U256::from(5u64) };
    let decoded: BlockMetadata =
        bincode::deserialize(&bincode::serialize(&meta).unwrap()).unwrap();
    assert_eq!(decoded, meta, "BlockMetadata should round-trip");

    let ident = SpendIdentifier { block_number: 4, transaction_index: 2, input_index: 1 };
    let decoded: SpendIdentifier =
        bincode::deserialize(&bincode::serialize(&ident).unwrap()).unwrap();
    assert_eq!(decoded, ident, "SpendIdentifier should round-trip");
}

#[test]
fn test_stored_encoding_omits_position() {
    let alice = common::account();
    let bob = common::account();
    let mut spend =
        common::spend_tx(&alice, common::deposit_input(&alice, 1, 7), bob.address, 600, 399, 1);
    spend.transaction.blk_num = 2;
    spend.transaction.tx_idx = 5;

    let decoded: ConfirmedTransaction =
        bincode::deserialize(&bincode::serialize(&spend).unwrap()).unwrap();
    assert_eq!(decoded.transaction.blk_num, 0, "position must not be part of the encoding");
    assert_eq!(decoded.transaction.tx_idx, 0, "position must not be part of the encoding");

    // Position never feeds the digests either.
    let mut unstamped = spend.clone();
    unstamped.transaction.blk_num = 0;
    unstamped.transaction.tx_idx = 0;
    assert_eq!(spend.signature_hash(), unstamped.signature_hash());
    assert_eq!(spend.content_hash(), unstamped.content_hash());
}

#[test]
fn test_canonical_bytes_widen_numbers() {
    let alice = common::account();
    let input = Input::new(1, 2, 3, U256::from(4u64), alice.address);
    let bytes = input.signing_bytes();
    assert_eq!(bytes.len(), 4 * 32 + 20, "four 32-byte words plus the owner");
    assert_eq!(bytes[31], 1, "blkNum widened to a big-endian word");
    assert_eq!(bytes[63], 2, "txIdx widened to a big-endian word");
    assert_eq!(bytes[95], 3, "outIdx widened to a big-endian word");
    assert_eq!(bytes[127], 4, "depositNonce as a big-endian word");
    assert_eq!(&bytes[128..], &input.owner, "owner appended verbatim");
}

#[test]
fn test_zero_input_and_output_predicates() {
    assert!(Input::zero().is_zero());
    let mut input = Input::zero();
    input.deposit_nonce = U256::from(1u64);
    assert!(!input.is_zero(), "nonzero deposit nonce makes the input real");
    assert!(input.is_deposit());

    // The owner alone does not make an input non-zero.
    let mut owned = Input::zero();
    owned.owner = [9u8; 20];
    assert!(owned.is_zero());

    assert!(Output::zero().is_zero());
    let exit = Output::exit(U256::from(10u64));
    assert!(exit.is_exit());
    assert!(!exit.is_deposit());
    assert_eq!(exit.owner, EXIT_ADDRESS);

    let deposit = Output::new([1u8; 20], U256::from(10u64), U256::from(7u64));
    assert!(deposit.is_deposit());
    assert!(!deposit.is_exit());
}

#[test]
fn test_deposit_transaction_shape() {
    let alice = common::account();
    let deposit = common::deposit_tx(&alice, 1000, 7);
    assert!(deposit.transaction.is_deposit());
    assert!(deposit.transaction.input0.is_zero());
    assert_eq!(deposit.transaction.output0.deposit_nonce, U256::from(7u64));

    let bob = common::account();
    let spend = common::spend_tx(&alice, common::deposit_input(&alice, 1, 7), bob.address, 600, 399, 1);
    assert!(!spend.transaction.is_deposit());
}

#[test]
fn test_signature_recover_round_trip() {
    let alice = common::account();
    let digest = crypto::keccak256(b"some digest");

    let sig = crypto::sign_digest(&digest, &alice.key).expect("signing should succeed");
    let recovered = crypto::recover_signer(&digest, &sig).expect("recovery should succeed");
    assert_eq!(recovered, alice.address, "signature should recover to the signer");
    crypto::validate_signature(&digest, &sig, &alice.address).expect("validation should pass");

    let other = crypto::keccak256(b"some other digest");
    assert!(
        crypto::validate_signature(&other, &sig, &alice.address).is_err(),
        "signature must not validate against a different digest"
    );

    // The legacy 27/28 recovery id convention is accepted too.
    let mut legacy = sig;
    legacy.0[64] += 27;
    assert_eq!(crypto::recover_signer(&digest, &legacy).unwrap(), alice.address);

    assert!(Signature::zero().is_zero());
    assert!(!sig.is_zero());
}

#[test]
fn test_geth_hash_applies_preamble() {
    let digest = crypto::keccak256(b"payload");
    let mut manual = Vec::new();
    manual.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    manual.extend_from_slice(&digest);
    assert_eq!(crypto::geth_hash(&digest), crypto::keccak256(&manual));
}

#[test]
fn test_keccak_known_vector() {
    // keccak256 of the empty string, as fixed by the settlement layer.
    assert_eq!(
        hex::encode(crypto::keccak256(b"")),
        "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
    );
}

#[test]
fn test_merkle_edge_cases() {
    assert_eq!(MerkleTree::root(&[]), ZERO_HASH, "empty tree hashes to the zero digest");

    let leaf = crypto::keccak256(b"only");
    assert_eq!(MerkleTree::root(&[leaf]), leaf, "a lone leaf is its own root");

    // Odd layers duplicate their last node.
    let leaves: Vec<_> = [b"a".as_ref(), b"b".as_ref(), b"c".as_ref()]
        .iter()
        .map(|l| crypto::keccak256(l))
        .collect();
    let ab = crypto::keccak256(&[leaves[0], leaves[1]].concat());
    let cc = crypto::keccak256(&[leaves[2], leaves[2]].concat());
    let expected = crypto::keccak256(&[ab, cc].concat());
    assert_eq!(MerkleTree::root(&leaves), expected);
}

#[test]
fn test_merkle_proofs_verify() {
    let leaves: Vec<_> = (0u8..5).map(|i| crypto::keccak256(&[i])).collect();
    let root = MerkleTree::root(&leaves);

    for (i, leaf) in leaves.iter().enumerate() {
        let proof = MerkleTree::proof(&leaves, i).expect("proof should exist");
        assert!(
            MerkleTree::verify_proof(leaf, &proof, &root),
            "proof for leaf {i} should verify"
        );
        assert!(
            !MerkleTree::verify_proof(leaf, &proof, &ZERO_HASH),
            "proof for leaf {i} must fail against a wrong root"
        );
    }

    assert!(MerkleTree::proof(&leaves, 5).is_none(), "out-of-range index yields no proof");
    assert!(
        !MerkleTree::verify_proof(&leaves[0], &MerkleTree::proof(&leaves, 1).unwrap(), &root),
        "a proof is bound to its leaf"
    );
}
