use hkdf::Hkdf;
use sha2::Sha256;

/// Symmetric key width shared by the chaining key and AEAD keys.
pub const KEY_LEN: usize = 32;

/// Derive two 32-byte keys from a chaining key and fresh input key material.
///
/// HKDF-SHA256 keyed by `salt` over `ikm` with an empty info string; the first
/// 32 output bytes become `k1`, the next 32 become `k2`. Deterministic:
/// byte-identical output for identical inputs.
#[must_use]
pub fn kdf(salt: &[u8], ikm: &[u8]) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 2 * KEY_LEN];
    // 64 bytes is far below the HKDF-SHA256 output ceiling (255 * 32).
    hk.expand(&[], &mut okm)
        .expect("okm length within HKDF-SHA256 bounds");
    let mut k1 = [0u8; KEY_LEN];
    let mut k2 = [0u8; KEY_LEN];
    k1.copy_from_slice(&okm[..KEY_LEN]);
    k2.copy_from_slice(&okm[KEY_LEN..]);
    (k1, k2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_is_deterministic() {
        let salt = [7u8; 32];
        let ikm = [9u8; 32];
        let (a1, a2) = kdf(&salt, &ikm);
        let (b1, b2) = kdf(&salt, &ikm);
        assert_eq!(a1, b1);
        assert_eq!(a2, b2);
    }

    #[test]
    fn kdf_halves_differ() {
        let (k1, k2) = kdf(&[1u8; 32], &[2u8; 32]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn kdf_is_salt_sensitive() {
        let ikm = [3u8; 32];
        let (a, _) = kdf(&[0u8; 32], &ikm);
        let (b, _) = kdf(&[1u8; 32], &ikm);
        assert_ne!(a, b);
    }
}
