use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 32-byte hash (SHA-256 output).
pub type Hash256 = [u8; 32];

/// Domain tags used in consensus hashing. All are `palisade.*` namespaced.
pub const TAG_MERKLE_LEAF: &str = "palisade.merkle.leaf";
pub const TAG_MERKLE_NODE: &str = "palisade.merkle.node";
pub const TAG_VALIDATOR: &str = "palisade.validator";
pub const TAG_VOTE: &str = "palisade.vote";

/// Domain-tagged SHA-256 with length framing:
/// `H(tag, parts[]) = SHA256( UTF8(tag) || Σ ( LE(|p|, 8) || p ) )`
#[must_use]
pub fn h_tag(tag: &str, parts: &[&[u8]]) -> Hash256 {
    debug_assert!(
        tag.starts_with("palisade."),
        "non-palisade.* tag used in consensus hashing: {tag}"
    );
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    for p in parts {
        hasher.update((p.len() as u64).to_le_bytes());
        hasher.update(p);
    }
    hasher.finalize().into()
}

/// Constant-time equality for 32-byte digests.
#[must_use]
pub fn ct_eq_hash(a: &Hash256, b: &Hash256) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_is_injective_across_part_boundaries() {
        // ("ab", "c") and ("a", "bc") must hash differently.
        let x = h_tag(TAG_VOTE, &[b"ab", b"c"]);
        let y = h_tag(TAG_VOTE, &[b"a", b"bc"]);
        assert_ne!(x, y);
    }

    #[test]
    fn tags_separate_domains() {
        let x = h_tag(TAG_MERKLE_LEAF, &[b"payload"]);
        let y = h_tag(TAG_MERKLE_NODE, &[b"payload"]);
        assert_ne!(x, y);
    }

    #[test]
    fn ct_eq_matches_plain_eq() {
        let a = h_tag(TAG_VOTE, &[b"a"]);
        let mut b = a;
        assert!(ct_eq_hash(&a, &b));
        b[31] ^= 1;
        assert!(!ct_eq_hash(&a, &b));
    }
}
