use crate::crypto::{self, Hash};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Header committed to the settlement layer. `number` starts at 1; the
/// genesis predecessor hash is all zeroes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub merkle_root: Hash,
    pub prev_hash: Hash,
    pub number: u64,
}

impl BlockHeader {
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 * 32);
        buf.extend_from_slice(&self.merkle_root);
        buf.extend_from_slice(&self.prev_hash);
        let mut word = [0u8; 32];
        U256::from(self.number).to_big_endian(&mut word);
        buf.extend_from_slice(&word);
        buf
    }

    pub fn hash(&self) -> Hash {
        crypto::keccak256(&self.signing_bytes())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub block_hash: Hash,
}

/// Bookkeeping persisted next to, not inside, the block so headers stay
/// small.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockMetadata {
    pub created_at: u64,
    pub transaction_count: u32,
    pub fees: U256,
}
