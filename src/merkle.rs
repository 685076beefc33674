use crate::crypto::{self, Hash, ZERO_HASH};

pub struct MerkleTree;

impl MerkleTree {
    /// Root over leaf digests in transaction-index order. Empty input hashes
    /// to the zero digest, a lone leaf is its own root, and odd layers
    /// duplicate their last node.
    pub fn root(leaves: &[Hash]) -> Hash {
        if leaves.is_empty() {
            return ZERO_HASH;
        }
        let mut level = leaves.to_vec();
        while level.len() > 1 {
            let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
            for chunk in level.chunks(2) {
                next_level.push(Self::parent(&chunk[0], chunk.get(1).unwrap_or(&chunk[0])));
            }
            level = next_level;
        }
        level[0]
    }

    /// Membership proof for `leaves[index]`: sibling digests bottom-up, each
    /// flagged with whether the sibling sits on the left.
    pub fn proof(leaves: &[Hash], index: usize) -> Option<Vec<(Hash, bool)>> {
        if index >= leaves.len() {
            return None;
        }
        let mut level = leaves.to_vec();
        let mut index = index;
        let mut proof: Vec<(Hash, bool)> = Vec::new();
        while level.len() > 1 {
            let (sibling, sibling_is_left) = if index % 2 == 0 {
                (*level.get(index + 1).unwrap_or(&level[index]), false)
            } else {
                (level[index - 1], true)
            };
            proof.push((sibling, sibling_is_left));
            let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
            for chunk in level.chunks(2) {
                next_level.push(Self::parent(&chunk[0], chunk.get(1).unwrap_or(&chunk[0])));
            }
            index /= 2;
            level = next_level;
        }
        Some(proof)
    }

    pub fn verify_proof(leaf: &Hash, proof: &[(Hash, bool)], root: &Hash) -> bool {
        let mut computed = *leaf;
        for (sibling, sibling_is_left) in proof {
            computed = if *sibling_is_left {
                Self::parent(sibling, &computed)
            } else {
                Self::parent(&computed, sibling)
            };
        }
        computed == *root
    }

    /// Serializes a proof the way the settlement-layer verifier walks it:
    /// the concatenated sibling digests bottom-up.
    pub fn proof_bytes(proof: &[(Hash, bool)]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(proof.len() * 32);
        for (sibling, _) in proof {
            buf.extend_from_slice(sibling);
        }
        buf
    }

    fn parent(left: &Hash, right: &Hash) -> Hash {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(left);
        buf[32..].copy_from_slice(right);
        crypto::keccak256(&buf)
    }
}
