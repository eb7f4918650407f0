use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::errors::ChannelError;
use crate::kdf::KEY_LEN;

/// AES-GCM authentication tag width.
pub const TAG_LEN: usize = 16;
/// AES-GCM nonce width.
pub const NONCE_LEN: usize = 12;

/// Build the 96-bit nonce: 4 zero bytes followed by the big-endian counter.
#[must_use]
pub fn nonce_bytes(n: u64) -> [u8; NONCE_LEN] {
    let mut out = [0u8; NONCE_LEN];
    out[4..].copy_from_slice(&n.to_be_bytes());
    out
}

/// AES-256-GCM encryption under counter nonce `n`.
///
/// Nonce reuse under the same key is a precondition violation on the caller;
/// the counter discipline lives in the symmetric state, not here.
pub fn encrypt(
    key: &[u8; KEY_LEN],
    n: u64,
    ad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = nonce_bytes(n);
    cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: ad,
            },
        )
        .map_err(|_| ChannelError::Protocol("AEAD seal failed"))
}

/// AES-256-GCM decryption under counter nonce `n`.
///
/// A tag mismatch is reported as [`ChannelError::Authentication`], never as
/// truncated or zero-filled plaintext.
pub fn decrypt(
    key: &[u8; KEY_LEN],
    n: u64,
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    if ciphertext.len() < TAG_LEN {
        return Err(ChannelError::ShortRead {
            expected: TAG_LEN,
            got: ciphertext.len(),
        });
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = nonce_bytes(n);
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: ciphertext,
                aad: ad,
            },
        )
        .map_err(|_| ChannelError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn nonce_layout() {
        let n = nonce_bytes(0x0102_0304_0506_0708);
        assert_eq!(&n[..4], &[0, 0, 0, 0]);
        assert_eq!(&n[4..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn round_trip() {
        let ct = encrypt(&KEY, 0, b"ad", b"attack at dawn").unwrap();
        assert_eq!(ct.len(), 14 + TAG_LEN);
        let pt = decrypt(&KEY, 0, b"ad", &ct).unwrap();
        assert_eq!(pt, b"attack at dawn");
    }

    #[test]
    fn wrong_counter_fails_auth() {
        let ct = encrypt(&KEY, 0, b"", b"payload").unwrap();
        assert!(matches!(
            decrypt(&KEY, 1, b"", &ct),
            Err(ChannelError::Authentication)
        ));
    }

    #[test]
    fn wrong_ad_fails_auth() {
        let ct = encrypt(&KEY, 3, b"transcript", b"payload").unwrap();
        assert!(matches!(
            decrypt(&KEY, 3, b"other", &ct),
            Err(ChannelError::Authentication)
        ));
    }

    #[test]
    fn flipped_byte_fails_auth() {
        let mut ct = encrypt(&KEY, 0, b"", b"payload").unwrap();
        ct[0] ^= 0x80;
        assert!(matches!(
            decrypt(&KEY, 0, b"", &ct),
            Err(ChannelError::Authentication)
        ));
    }

    #[test]
    fn truncated_ciphertext_is_short_read() {
        assert!(matches!(
            decrypt(&KEY, 0, b"", &[0u8; 7]),
            Err(ChannelError::ShortRead { expected: 16, got: 7 })
        ));
    }
}
