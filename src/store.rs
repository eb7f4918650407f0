//! Durable trust state. A [`TrustedCommit`] is the residue of a verified
//! commit: the height, the validator set that signed it, and the hash pinning
//! the next set. The verifier only ever moves this state forward.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::TrustError;
use crate::hash::Hash256;
use crate::node::wire;
use crate::validator::{Validator, ValidatorSet};

/// A height the light client trusts, with everything needed to extend that
/// trust to later heights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCommit {
    pub height: u64,
    pub next_validators_hash: Hash256,
    pub validators: ValidatorSet,
}

/// Storage for trusted commits, keyed by height.
pub trait TrustStore {
    /// Persist a trusted commit. Re-storing a height overwrites it.
    fn put(&mut self, commit: &TrustedCommit) -> Result<(), TrustError>;

    /// Trusted commit at an exact height.
    fn get(&self, height: u64) -> Result<TrustedCommit, TrustError>;

    /// The highest trusted commit, the verifier's starting point.
    fn latest(&self) -> Result<TrustedCommit, TrustError>;
}

/// In-memory store, mainly for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemStore {
    commits: BTreeMap<u64, TrustedCommit>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustStore for MemStore {
    fn put(&mut self, commit: &TrustedCommit) -> Result<(), TrustError> {
        self.commits.insert(commit.height, commit.clone());
        Ok(())
    }

    fn get(&self, height: u64) -> Result<TrustedCommit, TrustError> {
        self.commits
            .get(&height)
            .cloned()
            .ok_or(TrustError::NotFound("no trusted commit at this height"))
    }

    fn latest(&self) -> Result<TrustedCommit, TrustError> {
        self.commits
            .values()
            .next_back()
            .cloned()
            .ok_or(TrustError::NotFound("trust store is empty"))
    }
}

/// One JSON file per height under a directory, written atomically via a
/// temporary file and rename.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, height: u64) -> PathBuf {
        self.dir.join(format!("{height:020}.json"))
    }

    fn heights(&self) -> Result<Vec<u64>, TrustError> {
        let mut heights = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(height) = stem.parse::<u64>() {
                    heights.push(height);
                }
            }
        }
        heights.sort_unstable();
        Ok(heights)
    }
}

impl TrustStore for FileStore {
    fn put(&mut self, commit: &TrustedCommit) -> Result<(), TrustError> {
        let encoded = serde_json::to_vec_pretty(&TrustedCommitJson::from(commit))
            .map_err(|e| TrustError::Encoding(e.to_string()))?;
        let path = self.path_for(commit.height);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &path)?;
        debug!(height = commit.height, path = %path.display(), "stored trusted commit");
        Ok(())
    }

    fn get(&self, height: u64) -> Result<TrustedCommit, TrustError> {
        let path = self.path_for(height);
        if !path.exists() {
            return Err(TrustError::NotFound("no trusted commit at this height"));
        }
        let raw = fs::read(&path)?;
        let decoded: TrustedCommitJson =
            serde_json::from_slice(&raw).map_err(|e| TrustError::Encoding(e.to_string()))?;
        decoded.try_into()
    }

    fn latest(&self) -> Result<TrustedCommit, TrustError> {
        let heights = self.heights()?;
        let last = heights
            .last()
            .ok_or(TrustError::NotFound("trust store is empty"))?;
        self.get(*last)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TrustedCommitJson {
    height: String,
    next_validators_hash: String,
    validators: Vec<wire::ValidatorJson>,
}

impl From<&TrustedCommit> for TrustedCommitJson {
    fn from(value: &TrustedCommit) -> Self {
        Self {
            height: value.height.to_string(),
            next_validators_hash: hex::encode(value.next_validators_hash),
            validators: value
                .validators
                .validators()
                .iter()
                .map(wire::ValidatorJson::from)
                .collect(),
        }
    }
}

impl TryFrom<TrustedCommitJson> for TrustedCommit {
    type Error = TrustError;

    fn try_from(value: TrustedCommitJson) -> Result<Self, TrustError> {
        let hash = hex::decode(&value.next_validators_hash)
            .map_err(|e| wire::bad("next_validators_hash", e))?;
        let validators = value
            .validators
            .into_iter()
            .map(Validator::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            height: value
                .height
                .parse()
                .map_err(|e| wire::bad("height", e))?,
            next_validators_hash: hash
                .try_into()
                .map_err(|_| wire::bad("next_validators_hash", "expected 32 bytes"))?,
            validators: ValidatorSet::new(validators)?,
        })
    }
}
