//! Peers that serve commits and validator sets.
//!
//! The verifier only needs the small capability set modeled by [`Node`];
//! implementations are a remote HTTP peer here and mock peers in the tests.

use tracing::debug;

use crate::commit::{BlockId, Commit};
use crate::errors::TrustError;
use crate::hash::{ct_eq_hash, Hash256};
use crate::store::TrustedCommit;
use crate::validator::ValidatorSet;

/// Header fields of a committed block, as attested by its commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeader {
    pub chain_id: String,
    pub height: u64,
    pub validators_hash: Hash256,
    pub next_validators_hash: Hash256,
    pub block_id: BlockId,
    pub commit: Commit,
}

/// A commit paired with the validator set that signed it: the unit the
/// verifier works with and, stripped of the commit, the unit of trust the
/// store persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullCommit {
    header: SignedHeader,
    validators: ValidatorSet,
}

impl FullCommit {
    /// Combine a header and validator set fetched at the same height.
    ///
    /// The set must hash to the header's `validators_hash`; a peer returning
    /// mismatched pieces is malformed, not merely untrusted.
    pub fn new(header: SignedHeader, validators: ValidatorSet) -> Result<Self, TrustError> {
        if !ct_eq_hash(&validators.hash(), &header.validators_hash) {
            return Err(TrustError::InvalidCommit(
                "validator set does not match header hash",
            ));
        }
        Ok(Self { header, validators })
    }

    #[must_use]
    pub const fn header(&self) -> &SignedHeader {
        &self.header
    }

    #[must_use]
    pub const fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    #[must_use]
    pub const fn height(&self) -> u64 {
        self.header.height
    }

    /// The durable view the store persists.
    #[must_use]
    pub fn to_trusted(&self) -> TrustedCommit {
        TrustedCommit {
            height: self.header.height,
            next_validators_hash: self.header.next_validators_hash,
            validators: self.validators.clone(),
        }
    }
}

/// A peer the verifier can query. Calls block; there is no internal retry.
pub trait Node {
    /// Commit (signed header) at a height.
    fn fetch_commit(&self, height: u64) -> Result<SignedHeader, TrustError>;

    /// Validator set at a height.
    fn fetch_validators(&self, height: u64) -> Result<ValidatorSet, TrustError>;

    /// Height of the peer's latest commit.
    fn latest_height(&self) -> Result<u64, TrustError>;

    /// Commit and validators at a height, combined and cross-checked.
    fn fetch_full_commit(&self, height: u64) -> Result<FullCommit, TrustError> {
        let validators = self.fetch_validators(height)?;
        let header = self.fetch_commit(height)?;
        FullCommit::new(header, validators)
    }
}

/// A remote peer reached over HTTP+JSON.
pub struct HttpNode {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpNode {
    /// `base_url` without a trailing slash, e.g. `http://127.0.0.1:26657`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, TrustError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "fetching from peer");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| TrustError::Network(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TrustError::NotFound("peer has no data at this height"));
        }
        if !response.status().is_success() {
            return Err(TrustError::Network(format!(
                "peer returned status {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| TrustError::Encoding(e.to_string()))
    }
}

impl Node for HttpNode {
    fn fetch_commit(&self, height: u64) -> Result<SignedHeader, TrustError> {
        let body: wire::CommitResponse = self.get_json(&format!("/commit?height={height}"))?;
        body.try_into()
    }

    fn fetch_validators(&self, height: u64) -> Result<ValidatorSet, TrustError> {
        let body: wire::ValidatorsResponse =
            self.get_json(&format!("/validators?height={height}"))?;
        body.try_into()
    }

    fn latest_height(&self) -> Result<u64, TrustError> {
        let body: wire::CommitResponse = self.get_json("/commit")?;
        let header: SignedHeader = body.try_into()?;
        Ok(header.height)
    }
}

/// Wire shapes of the peer's JSON responses and of the persisted trust state.
///
/// Heights, rounds, indices and voting power arrive string-encoded; addresses
/// and hashes are hex; public keys and signatures are base64.
pub(crate) mod wire {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use ed25519_dalek::{Signature, VerifyingKey};
    use serde::{Deserialize, Serialize};

    use crate::commit::{BlockId, Commit, Precommit};
    use crate::errors::TrustError;
    use crate::hash::Hash256;
    use crate::validator::{Validator, ValidatorSet};

    pub(crate) fn bad(what: &str, detail: impl std::fmt::Display) -> TrustError {
        TrustError::Encoding(format!("{what}: {detail}"))
    }

    fn hex32(field: &str, s: &str) -> Result<Hash256, TrustError> {
        let bytes = hex::decode(s).map_err(|e| bad(field, e))?;
        bytes
            .try_into()
            .map_err(|_| bad(field, "expected 32 bytes"))
    }

    fn parse_u64(field: &str, s: &str) -> Result<u64, TrustError> {
        s.parse().map_err(|e| bad(field, e))
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct CommitResponse {
        pub signed_header: SignedHeaderJson,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct SignedHeaderJson {
        pub header: HeaderJson,
        pub commit: CommitJson,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct HeaderJson {
        pub height: String,
        pub chain_id: String,
        pub validators_hash: String,
        pub next_validators_hash: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct CommitJson {
        pub block_id: BlockIdJson,
        pub precommits: Vec<Option<PrecommitJson>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct BlockIdJson {
        pub hash: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct PrecommitJson {
        #[serde(rename = "type")]
        pub vote_type: u8,
        pub height: String,
        pub round: String,
        pub timestamp: String,
        pub block_id: BlockIdJson,
        pub validator_address: String,
        pub validator_index: String,
        pub signature: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct ValidatorsResponse {
        pub result: ValidatorsResult,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct ValidatorsResult {
        pub validators: Vec<ValidatorJson>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct ValidatorJson {
        pub address: String,
        pub pub_key: PubKeyJson,
        pub voting_power: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub(crate) struct PubKeyJson {
        #[serde(rename = "type")]
        pub key_type: String,
        pub value: String,
    }

    impl TryFrom<BlockIdJson> for BlockId {
        type Error = TrustError;
        fn try_from(value: BlockIdJson) -> Result<Self, TrustError> {
            Ok(Self {
                hash: hex32("block_id.hash", &value.hash)?,
            })
        }
    }

    impl TryFrom<PrecommitJson> for Precommit {
        type Error = TrustError;
        fn try_from(value: PrecommitJson) -> Result<Self, TrustError> {
            let signature = BASE64
                .decode(&value.signature)
                .map_err(|e| bad("precommit.signature", e))?;
            let signature: [u8; 64] = signature
                .try_into()
                .map_err(|_| bad("precommit.signature", "expected 64 bytes"))?;
            Ok(Self {
                vote_type: value.vote_type,
                height: parse_u64("precommit.height", &value.height)?,
                round: parse_u64("precommit.round", &value.round)?
                    .try_into()
                    .map_err(|_| bad("precommit.round", "out of range"))?,
                timestamp: value.timestamp,
                block_id: value.block_id.try_into()?,
                validator_address: hex::decode(&value.validator_address)
                    .map_err(|e| bad("precommit.validator_address", e))?,
                validator_index: parse_u64("precommit.validator_index", &value.validator_index)?
                    as usize,
                signature: Signature::from_bytes(&signature),
            })
        }
    }

    impl TryFrom<CommitResponse> for super::SignedHeader {
        type Error = TrustError;
        fn try_from(value: CommitResponse) -> Result<Self, TrustError> {
            let header = value.signed_header.header;
            let commit = value.signed_header.commit;
            let precommits = commit
                .precommits
                .into_iter()
                .map(|slot| slot.map(Precommit::try_from).transpose())
                .collect::<Result<Vec<_>, _>>()?;
            let block_id: BlockId = commit.block_id.try_into()?;
            Ok(Self {
                chain_id: header.chain_id,
                height: parse_u64("header.height", &header.height)?,
                validators_hash: hex32("header.validators_hash", &header.validators_hash)?,
                next_validators_hash: hex32(
                    "header.next_validators_hash",
                    &header.next_validators_hash,
                )?,
                block_id,
                commit: Commit {
                    block_id,
                    precommits,
                },
            })
        }
    }

    impl TryFrom<ValidatorJson> for Validator {
        type Error = TrustError;
        fn try_from(value: ValidatorJson) -> Result<Self, TrustError> {
            let key_bytes = BASE64
                .decode(&value.pub_key.value)
                .map_err(|e| bad("pub_key.value", e))?;
            let key_bytes: [u8; 32] = key_bytes
                .try_into()
                .map_err(|_| bad("pub_key.value", "expected 32 bytes"))?;
            Ok(Self {
                address: hex::decode(&value.address).map_err(|e| bad("validator.address", e))?,
                pub_key: VerifyingKey::from_bytes(&key_bytes)
                    .map_err(|e| bad("pub_key.value", e))?,
                voting_power: value
                    .voting_power
                    .parse()
                    .map_err(|e| bad("voting_power", e))?,
            })
        }
    }

    impl TryFrom<ValidatorsResponse> for ValidatorSet {
        type Error = TrustError;
        fn try_from(value: ValidatorsResponse) -> Result<Self, TrustError> {
            let validators = value
                .result
                .validators
                .into_iter()
                .map(Validator::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Self::new(validators)
        }
    }

    impl From<&Validator> for ValidatorJson {
        fn from(value: &Validator) -> Self {
            Self {
                address: hex::encode(&value.address),
                pub_key: PubKeyJson {
                    key_type: "ed25519".to_owned(),
                    value: BASE64.encode(value.pub_key.as_bytes()),
                },
                voting_power: value.voting_power.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_response_decodes() {
        let body = r#"{
            "signed_header": {
                "header": {
                    "height": "42",
                    "chain_id": "test-chain",
                    "validators_hash": "00000000000000000000000000000000000000000000000000000000000000aa",
                    "next_validators_hash": "00000000000000000000000000000000000000000000000000000000000000bb"
                },
                "commit": {
                    "block_id": { "hash": "00000000000000000000000000000000000000000000000000000000000000cc" },
                    "precommits": [null]
                }
            }
        }"#;
        let parsed: wire::CommitResponse = serde_json::from_str(body).unwrap();
        let header: SignedHeader = parsed.try_into().unwrap();
        assert_eq!(header.height, 42);
        assert_eq!(header.chain_id, "test-chain");
        assert_eq!(header.validators_hash[31], 0xAA);
        assert_eq!(header.block_id.hash[31], 0xCC);
        assert_eq!(header.commit.precommits.len(), 1);
    }

    #[test]
    fn malformed_hex_is_encoding_error() {
        let body = r#"{
            "signed_header": {
                "header": {
                    "height": "42",
                    "chain_id": "test-chain",
                    "validators_hash": "zz",
                    "next_validators_hash": ""
                },
                "commit": { "block_id": { "hash": "" }, "precommits": [] }
            }
        }"#;
        let parsed: wire::CommitResponse = serde_json::from_str(body).unwrap();
        let converted: Result<SignedHeader, _> = parsed.try_into();
        assert!(matches!(converted, Err(TrustError::Encoding(_))));
    }

    #[test]
    fn validators_response_decodes() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[1u8; 32]).verifying_key();
        let body = format!(
            r#"{{ "result": {{ "validators": [ {{
                "address": "0101010101010101010101010101010101010101",
                "pub_key": {{ "type": "ed25519", "value": "{}" }},
                "voting_power": "250"
            }} ] }} }}"#,
            {
                use base64::Engine as _;
                base64::engine::general_purpose::STANDARD.encode(key.as_bytes())
            }
        );
        let parsed: wire::ValidatorsResponse = serde_json::from_str(&body).unwrap();
        let set: ValidatorSet = parsed.try_into().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_voting_power(), 250);
    }
}
