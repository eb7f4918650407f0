use rand_core::CryptoRngCore;
use x25519_dalek::{PublicKey, StaticSecret};

/// Curve25519 public key width.
pub const DH_LEN: usize = 32;

/// An X25519 keypair owned by one party of a handshake.
///
/// Entropy is always injected by the caller; there is no ambient process-wide
/// RNG. Tests construct keypairs from fixed secret bytes, production passes a
/// cryptographically secure RNG.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the provided entropy source.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        let mut seed = [0u8; DH_LEN];
        rng.fill_bytes(&mut seed);
        Self::from_secret_bytes(seed)
    }

    /// Deterministic construction from 32 secret bytes (test vectors, storage).
    #[must_use]
    pub fn from_secret_bytes(bytes: [u8; DH_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    #[must_use]
    pub const fn public(&self) -> &PublicKey {
        &self.public
    }

    /// X25519 scalar multiplication with the remote public key.
    #[must_use]
    pub fn shared_secret(&self, their_public: &PublicKey) -> [u8; DH_LEN] {
        self.secret.diffie_hellman(their_public).to_bytes()
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Secret scalar intentionally not printed.
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_is_symmetric() {
        let a = KeyPair::from_secret_bytes([1u8; 32]);
        let b = KeyPair::from_secret_bytes([2u8; 32]);
        assert_eq!(a.shared_secret(b.public()), b.shared_secret(a.public()));
    }

    #[test]
    fn distinct_secrets_distinct_publics() {
        let a = KeyPair::from_secret_bytes([1u8; 32]);
        let b = KeyPair::from_secret_bytes([2u8; 32]);
        assert_ne!(a.public().as_bytes(), b.public().as_bytes());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = KeyPair::from_secret_bytes([0xAA; 32]);
        let dbg = format!("{kp:?}");
        assert!(!dbg.contains(&"aa".repeat(32)));
    }
}
