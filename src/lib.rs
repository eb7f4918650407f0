#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc)]

//! Palisade - authenticated channels and light-client commit verification
//!
//! Two halves, sharing a hashing core:
//!
//! - A Noise XX handshake (`Noise_XX_25519_AESGCM_SHA256`) producing a
//!   [`xx::SecureChannel`] with mutual static-key authentication and
//!   per-direction AES-256-GCM transport keys.
//! - A light client that verifies block commits against a persisted trusted
//!   validator set and extends that trust across validator-set changes by
//!   bisection.
//!
//! Fixed cryptographic choices:
//! - Hash: SHA-256 (32-byte output)
//! - Handshake DH: X25519; AEAD: AES-256-GCM; KDF: HKDF-SHA256
//! - Consensus signatures: Ed25519, verified strictly
//! - Merkle tree: binary, halving split, domain-separated leaf/node tags

// Handshake modules
pub mod cipher;
pub mod dh;
pub mod errors;
pub mod kdf;
pub mod transcript;
pub mod xx;

// Light-client modules
pub mod commit;
pub mod hash;
pub mod merkle;
pub mod node;
pub mod store;
pub mod validator;
pub mod verifier;

// Re-export the types most callers touch
pub use errors::{ChannelError, TrustError};
pub use hash::{ct_eq_hash, h_tag, Hash256};
pub use node::{FullCommit, HttpNode, Node, SignedHeader};
pub use store::{FileStore, MemStore, TrustStore, TrustedCommit};
pub use validator::{Validator, ValidatorSet};
pub use verifier::{Verifier, MAX_BISECT_DEPTH};
pub use xx::{initiate, respond, FramedStream, Initiator, Responder, SecureChannel, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
