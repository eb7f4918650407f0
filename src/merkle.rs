//! Simple Merkle proofs over a binary tree split by halving: the left subtree
//! holds `ceil(total / 2)` leaves, the right the rest. Inclusion is proven by
//! the leaf hash and the ordered list of sibling ("aunt") hashes from the leaf
//! upward.

use crate::errors::TrustError;
use crate::hash::{ct_eq_hash, h_tag, Hash256, TAG_MERKLE_LEAF, TAG_MERKLE_NODE};

/// Hash a leaf payload.
#[must_use]
pub fn leaf_hash(payload: &[u8]) -> Hash256 {
    h_tag(TAG_MERKLE_LEAF, &[payload])
}

/// Hash two child hashes into their parent, length-framed and domain-tagged.
#[must_use]
pub fn inner_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    h_tag(TAG_MERKLE_NODE, &[left, right])
}

/// Root of the halving tree over leaf payloads. The empty tree has the
/// all-zero root.
#[must_use]
pub fn simple_root(items: &[Vec<u8>]) -> Hash256 {
    let hashes: Vec<Hash256> = items.iter().map(|p| leaf_hash(p)).collect();
    root_of(&hashes)
}

fn root_of(hashes: &[Hash256]) -> Hash256 {
    match hashes.len() {
        0 => [0u8; 32],
        1 => hashes[0],
        n => {
            let split = n.div_ceil(2);
            let left = root_of(&hashes[..split]);
            let right = root_of(&hashes[split..]);
            inner_hash(&left, &right)
        }
    }
}

/// Merkle inclusion proof for one leaf: `total` leaves in the tree, the leaf
/// at `index`, and the sibling hashes ordered leaf-to-root.
///
/// Immutable once constructed from wire data; used once to recompute a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleProof {
    pub total: u64,
    pub index: u64,
    pub leaf_hash: Hash256,
    pub aunts: Vec<Hash256>,
}

impl SimpleProof {
    /// Check the proof against an expected root and leaf hash.
    ///
    /// Malformed proofs (index out of range, wrong aunt count for the
    /// recursion depth implied by `total`) fail verification; they never
    /// panic.
    pub fn verify(&self, root: &Hash256, leaf: &Hash256) -> Result<(), TrustError> {
        if self.total == 0 {
            return Err(TrustError::InvalidCommit("proof over empty tree"));
        }
        if self.index >= self.total {
            return Err(TrustError::InvalidCommit("proof index out of range"));
        }
        if !ct_eq_hash(&self.leaf_hash, leaf) {
            return Err(TrustError::InvalidCommit("leaf hash mismatch"));
        }
        let computed = self
            .compute_root()
            .ok_or(TrustError::InvalidCommit("malformed aunt path"))?;
        if !ct_eq_hash(&computed, root) {
            return Err(TrustError::InvalidCommit("root hash mismatch"));
        }
        Ok(())
    }

    /// Recompute the root from the leaf hash and the aunt path, or `None` if
    /// the aunt count does not match the tree shape.
    #[must_use]
    pub fn compute_root(&self) -> Option<Hash256> {
        hash_from_aunts(self.index, self.total, self.leaf_hash, &self.aunts)
    }

    /// Build the root and one proof per leaf for a known set of payloads.
    #[must_use]
    pub fn from_items(items: &[Vec<u8>]) -> (Hash256, Vec<Self>) {
        let hashes: Vec<Hash256> = items.iter().map(|p| leaf_hash(p)).collect();
        let total = hashes.len() as u64;
        let mut proofs: Vec<Self> = hashes
            .iter()
            .enumerate()
            .map(|(i, h)| Self {
                total,
                index: i as u64,
                leaf_hash: *h,
                aunts: Vec::new(),
            })
            .collect();
        let root = fill_aunts(&hashes, &mut proofs, 0);
        // Paths were collected root-first; proofs expect leaf-to-root order.
        for proof in &mut proofs {
            proof.aunts.reverse();
        }
        (root, proofs)
    }
}

fn hash_from_aunts(index: u64, total: u64, leaf: Hash256, aunts: &[Hash256]) -> Option<Hash256> {
    if total == 0 || index >= total {
        return None;
    }
    if total == 1 {
        return aunts.is_empty().then_some(leaf);
    }
    let (&last, rest) = aunts.split_last()?;
    let left_size = total.div_ceil(2);
    if index < left_size {
        let left = hash_from_aunts(index, left_size, leaf, rest)?;
        Some(inner_hash(&left, &last))
    } else {
        let right = hash_from_aunts(index - left_size, total - left_size, leaf, rest)?;
        Some(inner_hash(&last, &right))
    }
}

// Recursively computes subtree roots while appending, root-first, the sibling
// hash each contained leaf needs at this level.
fn fill_aunts(hashes: &[Hash256], proofs: &mut [SimpleProof], offset: usize) -> Hash256 {
    match hashes.len() {
        0 => [0u8; 32],
        1 => hashes[0],
        n => {
            let split = n.div_ceil(2);
            let left_root = {
                let left = root_of(&hashes[..split]);
                for proof in &mut proofs[offset + split..offset + n] {
                    proof.aunts.push(left);
                }
                left
            };
            let right_root = {
                let right = root_of(&hashes[split..]);
                for proof in &mut proofs[offset..offset + split] {
                    proof.aunts.push(right);
                }
                right
            };
            fill_aunts(&hashes[..split], proofs, offset);
            fill_aunts(&hashes[split..], proofs, offset + split);
            inner_hash(&left_root, &right_root)
        }
    }
}
