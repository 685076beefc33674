use crate::crypto::{self, Address, Hash, Signature};
use crate::storage::Store;
use crate::tx::ConfirmedTransaction;
use anyhow::{anyhow, Result};
use primitive_types::U256;
use std::sync::Arc;

/// Storage hooks for confirmation signatures: verified attachment after a
/// spender observes their block, and authenticated retrieval for wallets
/// assembling exits.
pub struct TransactionConfirmer {
    storage: Arc<Store>,
}

impl TransactionConfirmer {
    pub fn new(storage: Arc<Store>) -> Self {
        TransactionConfirmer { storage }
    }

    /// Verifies each supplied confirmation signature against the matching
    /// input's previous-output owner, then persists the pair.
    pub fn confirm(
        &self,
        blk_num: u64,
        tx_idx: u32,
        sigs: [Signature; 2],
    ) -> Result<ConfirmedTransaction> {
        let confirmed = self
            .storage
            .find_transaction_by_block_num_tx_idx(blk_num, tx_idx)?
            .ok_or_else(|| anyhow!("no transaction found at {blk_num}:{tx_idx}"))?;
        let digest = confirmed.transaction.signature_hash();

        if !confirmed.transaction.input0.is_zero() {
            let owner = self.input_owner(&confirmed, 0)?;
            crypto::validate_signature(&digest, &sigs[0], &owner)
                .map_err(|e| anyhow!("confirmation signature 0 rejected: {e}"))?;
        }
        if !confirmed.transaction.input1.is_zero() {
            let owner = self.input_owner(&confirmed, 1)?;
            crypto::validate_signature(&digest, &sigs[1], &owner)
                .map_err(|e| anyhow!("confirmation signature 1 rejected: {e}"))?;
        }

        self.storage.confirm_transaction(blk_num, tx_idx, sigs)
    }

    /// Returns the stored confirmation signatures of the transaction at
    /// `(blk_num, tx_idx)` once the caller proves they own output
    /// `out_idx`: `sig` must recover to that output's owner over
    /// [`confirmation_request_digest`].
    pub fn get_confirmations(
        &self,
        sig: &Signature,
        nonce: u64,
        blk_num: u64,
        tx_idx: u32,
        out_idx: u8,
    ) -> Result<[Signature; 2]> {
        let confirmed = self
            .storage
            .find_transaction_by_block_num_tx_idx(blk_num, tx_idx)?
            .ok_or_else(|| anyhow!("no transaction found at {blk_num}:{tx_idx}"))?;
        let owner = confirmed.transaction.output_at(out_idx).owner;
        let digest = confirmation_request_digest(nonce, blk_num, tx_idx, out_idx);
        crypto::validate_signature(&digest, sig, &owner)
            .map_err(|e| anyhow!("confirmation request rejected: {e}"))?;
        self.storage.auth_sigs_for(blk_num, tx_idx)
    }

    fn input_owner(&self, confirmed: &ConfirmedTransaction, which: u8) -> Result<Address> {
        let input = confirmed.transaction.input_at(which);
        let prev = self
            .storage
            .find_transaction_by_block_num_tx_idx(input.blk_num, input.tx_idx)?
            .ok_or_else(|| anyhow!("input {which} not found"))?;
        Ok(prev.transaction.output_at(input.out_idx).owner)
    }
}

/// Digest a wallet signs to request confirmation signatures for an
/// outpoint: the keccak digest of the coordinates and a caller-chosen
/// replay nonce, each widened to a 32-byte word.
pub fn confirmation_request_digest(nonce: u64, blk_num: u64, tx_idx: u32, out_idx: u8) -> Hash {
    let mut buf = Vec::with_capacity(4 * 32);
    for value in [blk_num, tx_idx as u64, out_idx as u64, nonce] {
        let mut word = [0u8; 32];
        U256::from(value).to_big_endian(&mut word);
        buf.extend_from_slice(&word);
    }
    crypto::keccak256(&buf)
}
