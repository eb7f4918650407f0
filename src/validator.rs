//! Validator sets and the two commit-verification paths: direct quorum
//! verification against the signing set, and the future-commit check that
//! extends trust across a validator-set transition.

use std::collections::HashSet;

use ed25519_dalek::VerifyingKey;

use crate::commit::{canonical_vote_bytes, BlockId, Commit, VOTE_TYPE_PRECOMMIT};
use crate::errors::TrustError;
use crate::hash::{ct_eq_hash, h_tag, Hash256, TAG_VALIDATOR};
use crate::merkle::simple_root;

/// One consensus validator. Identity is `address`; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub address: Vec<u8>,
    pub pub_key: VerifyingKey,
    pub voting_power: i64,
}

impl Validator {
    /// Canonical byte encoding used as this validator's Merkle leaf.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        h_tag(
            TAG_VALIDATOR,
            &[
                &self.address,
                self.pub_key.as_bytes(),
                &self.voting_power.to_le_bytes(),
            ],
        )
        .to_vec()
    }
}

/// Validators sorted by address ascending, with the saturating total voting
/// power computed once at construction.
///
/// "No validators" is represented by absence of a set, never by an empty one;
/// duplicate addresses are rejected so that positional and address-keyed
/// verification agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    total_power: i64,
}

impl ValidatorSet {
    pub fn new(mut validators: Vec<Validator>) -> Result<Self, TrustError> {
        if validators.is_empty() {
            return Err(TrustError::InvalidCommit("explicit empty validator set"));
        }
        if validators.iter().any(|v| v.voting_power < 0) {
            return Err(TrustError::InvalidCommit("negative voting power"));
        }
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        if validators
            .windows(2)
            .any(|pair| pair[0].address == pair[1].address)
        {
            return Err(TrustError::InvalidCommit("duplicate validator address"));
        }
        let total_power = validators
            .iter()
            .fold(0i64, |acc, v| acc.saturating_add(v.voting_power));
        Ok(Self {
            validators,
            total_power,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Always false: empty sets are unrepresentable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    #[must_use]
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Sum of all voting power, overflow-clamped (saturating, never wrapping).
    #[must_use]
    pub const fn total_voting_power(&self) -> i64 {
        self.total_power
    }

    /// Binary search over the address-sorted sequence.
    #[must_use]
    pub fn get_by_address(&self, address: &[u8]) -> Option<(usize, &Validator)> {
        self.validators
            .binary_search_by(|v| v.address.as_slice().cmp(address))
            .ok()
            .map(|i| (i, &self.validators[i]))
    }

    /// Merkle root over the canonical validator encodings; this is the value
    /// carried in a header's `validators_hash`.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        let leaves: Vec<Vec<u8>> = self.validators.iter().map(Validator::canonical_bytes).collect();
        simple_root(&leaves)
    }

    /// Verify a commit signed by this validator set.
    ///
    /// `commit.precommits[i]` must correspond to `validators[i]`; the count
    /// must match exactly and each present precommit's claimed address must
    /// equal the validator at its slot. Power accrues only for precommits
    /// naming the target `block_id`; mismatched block ids are tolerated but
    /// contribute nothing. Success requires accrued power strictly greater
    /// than 2/3 of the total.
    pub fn verify_commit(
        &self,
        chain_id: &str,
        block_id: &BlockId,
        height: u64,
        commit: &Commit,
    ) -> Result<(), TrustError> {
        if commit.precommits.len() != self.len() {
            return Err(TrustError::InvalidCommit("precommit count mismatch"));
        }
        if commit.height()? != height {
            return Err(TrustError::InvalidCommit("commit height mismatch"));
        }
        let round = commit.round()?;

        let mut accrued = 0i64;
        for (i, slot) in commit.precommits.iter().enumerate() {
            let Some(precommit) = slot else { continue };
            if precommit.vote_type != VOTE_TYPE_PRECOMMIT {
                return Err(TrustError::InvalidCommit("vote is not a precommit"));
            }
            if precommit.height != height {
                return Err(TrustError::InvalidCommit("precommit height mismatch"));
            }
            if precommit.round != round {
                return Err(TrustError::InvalidCommit("precommit round mismatch"));
            }
            let validator = &self.validators[i];
            if precommit.validator_address != validator.address {
                return Err(TrustError::InvalidCommit(
                    "precommit address does not match validator slot",
                ));
            }
            let sign_bytes = canonical_vote_bytes(chain_id, precommit);
            validator
                .pub_key
                .verify_strict(&sign_bytes, &precommit.signature)
                .map_err(|_| TrustError::BadSignature { index: i })?;
            if ct_eq_hash(&precommit.block_id.hash, &block_id.hash) {
                accrued = accrued.saturating_add(validator.voting_power);
            }
        }

        if quorum(accrued, self.total_power) {
            Ok(())
        } else {
            Err(TrustError::QuorumNotReached {
                accrued,
                total: self.total_power,
            })
        }
    }

    /// Extend trust across a validator-set change.
    ///
    /// The commit is first fully verified against `new_set`, the candidate
    /// set that signed it. Then, separately, the signers' voting power *in
    /// this (old) set* must exceed 2/3 of the old total — each address counted
    /// at most once. Falling short is the bisection trigger, not a hard
    /// verdict on the commit.
    pub fn verify_future_commit(
        &self,
        new_set: &Self,
        chain_id: &str,
        block_id: &BlockId,
        height: u64,
        commit: &Commit,
    ) -> Result<(), TrustError> {
        new_set.verify_commit(chain_id, block_id, height, commit)?;

        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut accrued = 0i64;
        for precommit in commit.precommits.iter().flatten() {
            if !ct_eq_hash(&precommit.block_id.hash, &block_id.hash) {
                continue;
            }
            if !seen.insert(&precommit.validator_address) {
                continue;
            }
            if let Some((_, validator)) = self.get_by_address(&precommit.validator_address) {
                accrued = accrued.saturating_add(validator.voting_power);
            }
        }

        if quorum(accrued, self.total_power) {
            Ok(())
        } else {
            Err(TrustError::TooMuchChange {
                height,
                accrued,
                total: self.total_power,
            })
        }
    }
}

/// Strict supermajority: accrued power must exceed `ceil(2/3 * total)`.
///
/// On totals divisible by three this is the usual `> 2/3` bound; on others it
/// rounds the threshold up, so 67 of 100 is not enough but 68 is.
#[must_use]
fn quorum(accrued: i64, total: i64) -> bool {
    if accrued < 0 || total < 0 {
        return false;
    }
    u128::from(accrued.unsigned_abs()) > (u128::from(total.unsigned_abs()) * 2).div_ceil(3)
}
