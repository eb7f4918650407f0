//! The light-client verifier: extends a stored trust root to later heights,
//! bisecting over the height range when the validator set has changed too
//! much for a single hop.

use tracing::{debug, info};

use crate::errors::TrustError;
use crate::hash::ct_eq_hash;
use crate::node::{FullCommit, Node};
use crate::store::{TrustStore, TrustedCommit};

/// Bisection recursion limit. Each level halves a u64 height interval, so 64
/// levels only trip on an adversarial or broken peer.
pub const MAX_BISECT_DEPTH: u32 = 64;

/// Verifies commits from a peer against persisted trust state.
///
/// All trust decisions flow through [`Verifier::verify`]; the store is only
/// ever advanced with commits that passed it.
pub struct Verifier<S, N> {
    store: S,
    node: N,
    chain_id: String,
}

impl<S: TrustStore, N: Node> Verifier<S, N> {
    pub fn new(store: S, node: N, chain_id: impl Into<String>) -> Self {
        Self {
            store,
            node,
            chain_id: chain_id.into(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn node(&self) -> &N {
        &self.node
    }

    /// Establish the initial trust root at `height`.
    ///
    /// Trust-on-first-use: the fetched commit is checked for internal
    /// consistency (its own validator set reaches quorum on it) and then
    /// persisted. The height itself must come from an out-of-band source the
    /// operator trusts.
    pub fn init_trust(&mut self, height: u64) -> Result<TrustedCommit, TrustError> {
        let candidate = self.node.fetch_full_commit(height)?;
        let header = candidate.header();
        if header.chain_id != self.chain_id {
            return Err(TrustError::InvalidCommit("chain id mismatch"));
        }
        candidate.validators().verify_commit(
            &self.chain_id,
            &header.block_id,
            header.height,
            &header.commit,
        )?;
        let trusted = candidate.to_trusted();
        self.store.put(&trusted)?;
        info!(height, "initial trust root established");
        Ok(trusted)
    }

    /// Verify a candidate commit against the latest trust and persist it.
    ///
    /// Too much validator turnover for a single hop is not a verdict on the
    /// candidate: it falls through to [`Self::update_to_height`], which
    /// bridges the gap by bisection and only then gives up.
    pub fn verify(&mut self, candidate: &FullCommit) -> Result<TrustedCommit, TrustError> {
        let trusted = self.store.latest()?;
        match self.check_candidate(&trusted, candidate) {
            Ok(()) => {
                let next = candidate.to_trusted();
                self.store.put(&next)?;
                Ok(next)
            }
            Err(TrustError::TooMuchChange { .. }) => self.update_to_height(candidate.height()),
            Err(e) => Err(e),
        }
    }

    /// Advance trust to at least `target`, bisecting as needed.
    ///
    /// Returns the trusted commit at `target`. Trust never regresses: if the
    /// store is already at or past `target` nothing is fetched.
    pub fn update_to_height(&mut self, target: u64) -> Result<TrustedCommit, TrustError> {
        let trusted = self.store.latest()?;
        if trusted.height >= target {
            return self.store.get(target).or(Ok(trusted));
        }
        info!(from = trusted.height, target, "updating trust");
        self.bisect(trusted, target, 0)
    }

    /// Advance trust to the peer's latest height.
    pub fn update_to_latest(&mut self) -> Result<TrustedCommit, TrustError> {
        let target = self.node.latest_height()?;
        self.update_to_height(target)
    }

    fn bisect(
        &mut self,
        trusted: TrustedCommit,
        target: u64,
        depth: u32,
    ) -> Result<TrustedCommit, TrustError> {
        if depth >= MAX_BISECT_DEPTH {
            return Err(TrustError::BisectDepthExceeded {
                trusted: trusted.height,
                target,
            });
        }
        let candidate = self.node.fetch_full_commit(target)?;
        match self.check_candidate(&trusted, &candidate) {
            Ok(()) => {
                let next = candidate.to_trusted();
                self.store.put(&next)?;
                debug!(height = next.height, depth, "trust advanced");
                Ok(next)
            }
            Err(TrustError::TooMuchChange { .. }) => {
                let mid = trusted.height + (target - trusted.height) / 2;
                if mid == trusted.height {
                    // Adjacent heights and still too much change: the chain
                    // itself violates the single-hop bound.
                    return Err(TrustError::InvalidCommit(
                        "adjacent validator sets changed beyond the trust bound",
                    ));
                }
                debug!(from = trusted.height, mid, target, depth, "bisecting");
                let closer = self.bisect(trusted, mid, depth + 1)?;
                self.bisect(closer, target, depth + 1)
            }
            Err(e) => Err(e),
        }
    }

    /// Check one candidate against one trusted commit.
    ///
    /// When the candidate's validator set is exactly the successor set pinned
    /// by the trusted commit, a direct quorum check suffices; otherwise the
    /// old set must also re-endorse the commit via the future-commit rule.
    fn check_candidate(
        &self,
        trusted: &TrustedCommit,
        candidate: &FullCommit,
    ) -> Result<(), TrustError> {
        let header = candidate.header();
        if header.chain_id != self.chain_id {
            return Err(TrustError::InvalidCommit("chain id mismatch"));
        }
        if header.height <= trusted.height {
            return Err(TrustError::InvalidCommit(
                "candidate height not ahead of trust",
            ));
        }
        if ct_eq_hash(&trusted.next_validators_hash, &header.validators_hash) {
            candidate.validators().verify_commit(
                &self.chain_id,
                &header.block_id,
                header.height,
                &header.commit,
            )
        } else {
            trusted.validators.verify_future_commit(
                candidate.validators(),
                &self.chain_id,
                &header.block_id,
                header.height,
                &header.commit,
            )
        }
    }
}
