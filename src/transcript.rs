use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher;
use crate::errors::ChannelError;
use crate::kdf::{kdf, KEY_LEN};

/// SHA-256 digest width.
pub const SHA256_LEN: usize = 32;

/// The protocol name seeding both `h` and `ck`, zero-padded to 32 bytes.
pub const PROTOCOL_NAME: &[u8; SHA256_LEN] = b"Noise_XX_25519_AESGCM_SHA256\0\0\0\0";

/// Running symmetric state of one handshake: transcript hash `h`, chaining
/// key `ck`, and the current AEAD key `k` with its nonce counter `n`.
///
/// Every protocol element that crosses the wire is mixed into `h`, in strict
/// protocol order. Skipping a mix for any exchanged byte string silently
/// desynchronizes the two transcripts; the failure only surfaces at the next
/// AEAD operation. `n` resets to 0 each time `k` is rederived.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricState {
    h: [u8; SHA256_LEN],
    ck: [u8; KEY_LEN],
    k: Option<[u8; KEY_LEN]>,
    n: u64,
}

impl SymmetricState {
    /// Initialize `h` and `ck` from the protocol name and mix the empty
    /// prologue into `h`.
    #[must_use]
    pub fn new() -> Self {
        let mut state = Self {
            h: *PROTOCOL_NAME,
            ck: *PROTOCOL_NAME,
            k: None,
            n: 0,
        };
        state.mix_hash(&[]);
        state
    }

    /// `h = SHA256(h || data)`
    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.h);
        hasher.update(data);
        self.h = hasher.finalize().into();
    }

    /// `(ck, k) = KDF(ck, shared)`; resets the nonce counter.
    pub fn mix_key(&mut self, shared: &[u8]) {
        let (ck, k) = kdf(&self.ck, shared);
        self.ck = ck;
        self.k = Some(k);
        self.n = 0;
    }

    /// Encrypt under `(k, n++)` with the transcript hash as associated data,
    /// then mix the ciphertext into `h`.
    pub fn encrypt_and_mix(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let k = self
            .k
            .as_ref()
            .ok_or(ChannelError::Protocol("encrypt before key agreement"))?;
        let ciphertext = cipher::encrypt(k, self.n, &self.h, plaintext)?;
        self.n += 1;
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    /// Decrypt under `(k, n++)` with the transcript hash as associated data,
    /// then mix the *ciphertext* (not the plaintext) into `h`.
    pub fn decrypt_and_mix(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let k = self
            .k
            .as_ref()
            .ok_or(ChannelError::Protocol("decrypt before key agreement"))?;
        let plaintext = cipher::decrypt(k, self.n, &self.h, ciphertext)?;
        self.n += 1;
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    /// Derive the two transport keys: `(k1, k2) = KDF(ck, empty)`.
    #[must_use]
    pub fn split(&self) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
        kdf(&self.ck, &[])
    }

    #[must_use]
    pub const fn transcript_hash(&self) -> &[u8; SHA256_LEN] {
        &self.h
    }
}

impl Default for SymmetricState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fixed prologue digest shared by every conforming implementation.
    const PROLOGUE_H: [u8; 32] = [
        93, 247, 43, 103, 185, 101, 173, 209, 22, 143, 10, 108, 117, 109, 242, 28, 32, 79, 126,
        100, 252, 104, 43, 230, 163, 171, 75, 104, 44, 141, 182, 75,
    ];

    #[test]
    fn prologue_vector() {
        let state = SymmetricState::new();
        assert_eq!(*state.transcript_hash(), PROLOGUE_H);
        assert_eq!(state.ck, *PROTOCOL_NAME);
        assert_eq!(state.n, 0);
        assert!(state.k.is_none());
    }

    #[test]
    fn encrypt_without_key_is_protocol_error() {
        let mut state = SymmetricState::new();
        assert!(matches!(
            state.encrypt_and_mix(b"x"),
            Err(ChannelError::Protocol(_))
        ));
    }

    #[test]
    fn nonce_resets_on_mix_key() {
        let mut state = SymmetricState::new();
        state.mix_key(&[1u8; 32]);
        let _ = state.encrypt_and_mix(b"one").unwrap();
        let _ = state.encrypt_and_mix(b"two").unwrap();
        assert_eq!(state.n, 2);
        state.mix_key(&[2u8; 32]);
        assert_eq!(state.n, 0);
    }

    #[test]
    fn transcript_divergence_breaks_decryption() {
        let mut alice = SymmetricState::new();
        let mut bob = SymmetricState::new();
        alice.mix_key(&[7u8; 32]);
        bob.mix_key(&[7u8; 32]);
        // Bob misses one mix_hash that Alice performed.
        alice.mix_hash(b"m1");
        let ct = alice.encrypt_and_mix(b"hello").unwrap();
        assert!(matches!(
            bob.decrypt_and_mix(&ct),
            Err(ChannelError::Authentication)
        ));
    }
}
