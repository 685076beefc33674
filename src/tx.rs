use crate::crypto::{self, Address, Hash, Signature, EXIT_ADDRESS, ZERO_ADDRESS};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Transaction index reserved for the per-block fee transaction. Regular
/// transactions always sit below it.
pub const FEE_TX_IDX: u32 = 65_535;

/// Appends a number as a 32-byte big-endian word. Every logically 256-bit
/// quantity is widened to this form so canonical bytes are independent of
/// the in-memory width.
fn push_u256(buf: &mut Vec<u8>, value: &U256) {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    buf.extend_from_slice(&word);
}

fn push_uint(buf: &mut Vec<u8>, value: u64) {
    push_u256(buf, &U256::from(value));
}

/// A reference to a previously created output, by coordinates. The nonce is
/// nonzero exactly when the referenced output was minted by a deposit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Input {
    pub blk_num: u64,
    pub tx_idx: u32,
    pub out_idx: u8,
    pub deposit_nonce: U256,
    pub owner: Address,
}

impl Input {
    pub fn new(blk_num: u64, tx_idx: u32, out_idx: u8, deposit_nonce: U256, owner: Address) -> Self {
        Input { blk_num, tx_idx, out_idx, deposit_nonce, owner }
    }

    pub fn zero() -> Self {
        Input::default()
    }

    /// The zero input stands for "no input": all four numeric coordinates
    /// are zero.
    pub fn is_zero(&self) -> bool {
        self.blk_num == 0 && self.tx_idx == 0 && self.out_idx == 0 && self.deposit_nonce.is_zero()
    }

    pub fn is_deposit(&self) -> bool {
        !self.deposit_nonce.is_zero()
    }

    /// Canonical bytes: blkNum ‖ txIdx ‖ outIdx ‖ depositNonce as 32-byte
    /// words, then the owner verbatim.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 * 32 + 20);
        push_uint(&mut buf, self.blk_num);
        push_uint(&mut buf, self.tx_idx as u64);
        push_uint(&mut buf, self.out_idx as u64);
        push_u256(&mut buf, &self.deposit_nonce);
        buf.extend_from_slice(&self.owner);
        buf
    }

    /// The digest a spender signs to authorize consuming this input.
    pub fn signature_hash(&self) -> Hash {
        crypto::keccak256(&self.signing_bytes())
    }
}

/// A value assignment. Deposit outputs carry the settlement-layer nonce
/// that minted them; exit outputs carry the reserved exit owner.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Output {
    pub owner: Address,
    pub denom: U256,
    pub deposit_nonce: U256,
}

impl Output {
    pub fn new(owner: Address, denom: U256, deposit_nonce: U256) -> Self {
        Output { owner, denom, deposit_nonce }
    }

    pub fn zero() -> Self {
        Output::default()
    }

    /// An output surrendered to the settlement layer.
    pub fn exit(denom: U256) -> Self {
        Output { owner: EXIT_ADDRESS, denom, deposit_nonce: U256::zero() }
    }

    pub fn is_zero(&self) -> bool {
        self.owner == ZERO_ADDRESS && self.denom.is_zero() && self.deposit_nonce.is_zero()
    }

    pub fn is_deposit(&self) -> bool {
        !self.deposit_nonce.is_zero()
    }

    pub fn is_exit(&self) -> bool {
        self.owner == EXIT_ADDRESS
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20 + 2 * 32);
        buf.extend_from_slice(&self.owner);
        push_u256(&mut buf, &self.denom);
        push_u256(&mut buf, &self.deposit_nonce);
        buf
    }
}

/// A two-in two-out value transfer. The position fields are assigned by the
/// block packager, are never signed over, and are omitted from stored
/// encodings; readers re-stamp them from the storage key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub input0: Input,
    pub sig0: Signature,
    pub input1: Input,
    pub sig1: Signature,
    pub output0: Output,
    pub output1: Output,
    pub fee: U256,
    #[serde(skip)]
    pub blk_num: u64,
    #[serde(skip)]
    pub tx_idx: u32,
}

impl Transaction {
    pub fn input_at(&self, index: u8) -> &Input {
        match index {
            0 => &self.input0,
            1 => &self.input1,
            _ => panic!("input index must be 0 or 1"),
        }
    }

    pub fn output_at(&self, index: u8) -> &Output {
        match index {
            0 => &self.output0,
            1 => &self.output1,
            _ => panic!("output index must be 0 or 1"),
        }
    }

    /// A deposit transaction mints value from a settlement-layer event: its
    /// first output carries the deposit nonce and its first input is zero.
    pub fn is_deposit(&self) -> bool {
        self.output0.is_deposit() && self.input0.is_zero()
    }

    /// Canonical bytes over inputs (with their spend signatures), outputs
    /// and fee. Position fields are excluded.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 * (4 * 32 + 20 + 65) + 2 * (20 + 2 * 32) + 32);
        buf.extend_from_slice(&self.input0.signing_bytes());
        buf.extend_from_slice(self.sig0.as_bytes());
        buf.extend_from_slice(&self.input1.signing_bytes());
        buf.extend_from_slice(self.sig1.as_bytes());
        buf.extend_from_slice(&self.output0.signing_bytes());
        buf.extend_from_slice(&self.output1.signing_bytes());
        push_u256(&mut buf, &self.fee);
        buf
    }

    /// The digest confirmation signatures attest to, and the Merkle leaf
    /// digest of the enclosing block.
    pub fn signature_hash(&self) -> Hash {
        crypto::keccak256(&self.signing_bytes())
    }
}

/// A transaction together with the confirmation signatures of its spenders,
/// attesting they observed the block that committed their inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub transaction: Transaction,
    pub signatures: [Signature; 2],
}

impl ConfirmedTransaction {
    pub fn new(transaction: Transaction) -> Self {
        ConfirmedTransaction { transaction, signatures: [Signature::zero(); 2] }
    }

    /// Builds the single-transaction body minted for a settlement-layer
    /// deposit event.
    pub fn deposit(owner: Address, amount: U256, deposit_nonce: U256) -> Self {
        let mut tx = Transaction::default();
        tx.output0 = Output::new(owner, amount, deposit_nonce);
        ConfirmedTransaction::new(tx)
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = self.transaction.signing_bytes();
        buf.extend_from_slice(self.signatures[0].as_bytes());
        buf.extend_from_slice(self.signatures[1].as_bytes());
        buf
    }

    /// Content address of the transaction in storage.
    pub fn content_hash(&self) -> Hash {
        crypto::sha256(&self.signing_bytes())
    }

    /// Leaf digest of this transaction in its block's Merkle tree.
    pub fn signature_hash(&self) -> Hash {
        crypto::keccak256(&self.signing_bytes())
    }

    /// Sum of this transaction's output denominations owned by `addr`.
    pub fn amount_owed_to(&self, addr: &Address) -> U256 {
        let mut total = U256::zero();
        if self.transaction.output0.owner == *addr {
            total += self.transaction.output0.denom;
        }
        if self.transaction.output1.owner == *addr {
            total += self.transaction.output1.denom;
        }
        total
    }
}

/// Points back at the transaction input that consumed an outpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpendIdentifier {
    pub block_number: u64,
    pub transaction_index: u32,
    pub input_index: u8,
}
