//! Commits and precommit votes as produced by a peer's consensus engine.
//! This crate only verifies them; it never produces blocks or votes.

use ed25519_dalek::Signature;

use crate::errors::TrustError;
use crate::hash::{h_tag, Hash256, TAG_VOTE};

/// Vote phase tag carried by a precommit. Only the precommit phase is ever
/// counted toward a commit.
pub const VOTE_TYPE_PRECOMMIT: u8 = 2;

/// Identity of the block a vote refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    pub hash: Hash256,
}

/// One validator's signed precommit vote for a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precommit {
    pub vote_type: u8,
    pub height: u64,
    pub round: u32,
    /// RFC 3339 timestamp as received from the peer; canonicalized as raw
    /// bytes, never parsed.
    pub timestamp: String,
    pub block_id: BlockId,
    pub validator_address: Vec<u8>,
    pub validator_index: usize,
    pub signature: Signature,
}

/// A block commit: the target block id and one precommit column per
/// validator-set slot. Absent entries are abstaining or offline validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub block_id: BlockId,
    pub precommits: Vec<Option<Precommit>>,
}

impl Commit {
    /// Height of the commit, taken from the first present precommit.
    pub fn height(&self) -> Result<u64, TrustError> {
        self.first_precommit().map(|pc| pc.height)
    }

    /// Round of the commit, taken from the first present precommit.
    pub fn round(&self) -> Result<u32, TrustError> {
        self.first_precommit().map(|pc| pc.round)
    }

    fn first_precommit(&self) -> Result<&Precommit, TrustError> {
        self.precommits
            .iter()
            .flatten()
            .next()
            .ok_or(TrustError::InvalidCommit("commit has no precommits"))
    }
}

/// Canonical sign-bytes of a vote: domain-tagged, length-framed encoding of
/// the fields a validator commits to, bound to `chain_id`.
///
/// Field order is fixed; any reordering or omission changes the digest.
#[must_use]
pub fn canonical_vote_bytes(chain_id: &str, precommit: &Precommit) -> Vec<u8> {
    let digest: Hash256 = h_tag(
        TAG_VOTE,
        &[
            chain_id.as_bytes(),
            &[precommit.vote_type],
            &precommit.height.to_le_bytes(),
            &precommit.round.to_le_bytes(),
            &precommit.block_id.hash,
            precommit.timestamp.as_bytes(),
        ],
    );
    digest.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precommit(height: u64, round: u32) -> Precommit {
        Precommit {
            vote_type: VOTE_TYPE_PRECOMMIT,
            height,
            round,
            timestamp: "2019-04-11T17:30:00Z".to_owned(),
            block_id: BlockId { hash: [7u8; 32] },
            validator_address: vec![1, 2, 3],
            validator_index: 0,
            signature: Signature::from_bytes(&[0u8; 64]),
        }
    }

    #[test]
    fn height_and_round_come_from_first_present_precommit() {
        let commit = Commit {
            block_id: BlockId { hash: [7u8; 32] },
            precommits: vec![None, Some(precommit(12, 1)), Some(precommit(12, 1))],
        };
        assert_eq!(commit.height().unwrap(), 12);
        assert_eq!(commit.round().unwrap(), 1);
    }

    #[test]
    fn all_absent_is_invalid() {
        let commit = Commit {
            block_id: BlockId { hash: [7u8; 32] },
            precommits: vec![None, None],
        };
        assert!(commit.height().is_err());
    }

    #[test]
    fn sign_bytes_bind_chain_id() {
        let pc = precommit(5, 0);
        assert_ne!(
            canonical_vote_bytes("chain-a", &pc),
            canonical_vote_bytes("chain-b", &pc)
        );
    }

    #[test]
    fn sign_bytes_bind_every_field() {
        let base = precommit(5, 0);
        let reference = canonical_vote_bytes("chain", &base);

        let mut changed = base.clone();
        changed.height = 6;
        assert_ne!(canonical_vote_bytes("chain", &changed), reference);

        let mut changed = base.clone();
        changed.round = 1;
        assert_ne!(canonical_vote_bytes("chain", &changed), reference);

        let mut changed = base.clone();
        changed.block_id.hash[0] ^= 1;
        assert_ne!(canonical_vote_bytes("chain", &changed), reference);

        let mut changed = base;
        changed.timestamp.push('Z');
        assert_ne!(canonical_vote_bytes("chain", &changed), reference);
    }
}
