//! Property tests over the crypto building blocks.

use proptest::prelude::*;

use palisade::cipher;
use palisade::kdf::kdf;
use palisade::merkle::{leaf_hash, simple_root, SimpleProof};
use palisade::ChannelError;

proptest! {
    #[test]
    fn aead_round_trips(
        key in any::<[u8; 32]>(),
        counter in any::<u64>(),
        ad in proptest::collection::vec(any::<u8>(), 0..64),
        msg in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let ct = cipher::encrypt(&key, counter, &ad, &msg).unwrap();
        prop_assert_eq!(ct.len(), msg.len() + cipher::TAG_LEN);
        prop_assert_eq!(cipher::decrypt(&key, counter, &ad, &ct).unwrap(), msg);
    }

    #[test]
    fn aead_rejects_any_flipped_bit(
        key in any::<[u8; 32]>(),
        msg in proptest::collection::vec(any::<u8>(), 1..128),
        bit in 0usize..8,
        pos_seed in any::<usize>(),
    ) {
        let mut ct = cipher::encrypt(&key, 0, &[], &msg).unwrap();
        let pos = pos_seed % ct.len();
        ct[pos] ^= 1 << bit;
        prop_assert!(matches!(
            cipher::decrypt(&key, 0, &[], &ct),
            Err(ChannelError::Authentication)
        ));
    }

    #[test]
    fn aead_binds_counter_and_ad(
        key in any::<[u8; 32]>(),
        counter in 0u64..u64::MAX,
        msg in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let ct = cipher::encrypt(&key, counter, b"ad", &msg).unwrap();
        prop_assert!(cipher::decrypt(&key, counter + 1, b"ad", &ct).is_err());
        prop_assert!(cipher::decrypt(&key, counter, b"da", &ct).is_err());
    }

    #[test]
    fn kdf_is_deterministic_with_distinct_halves(
        salt in proptest::collection::vec(any::<u8>(), 0..64),
        ikm in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let (a1, b1) = kdf(&salt, &ikm);
        let (a2, b2) = kdf(&salt, &ikm);
        prop_assert_eq!(a1, a2);
        prop_assert_eq!(b1, b2);
        prop_assert_ne!(a1, b1);
    }

    #[test]
    fn merkle_proofs_verify_for_any_shape(
        items in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..32),
            1..40,
        ),
    ) {
        let (root, proofs) = SimpleProof::from_items(&items);
        prop_assert_eq!(root, simple_root(&items));
        for (i, proof) in proofs.iter().enumerate() {
            prop_assert!(proof.verify(&root, &leaf_hash(&items[i])).is_ok());
        }
    }

    #[test]
    fn merkle_proof_is_position_bound(
        items in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 1..16),
            2..20,
        ),
        swap_seed in any::<usize>(),
    ) {
        prop_assume!(items.iter().collect::<std::collections::HashSet<_>>().len() == items.len());
        let (root, proofs) = SimpleProof::from_items(&items);
        let i = swap_seed % items.len();
        let j = (swap_seed + 1) % items.len();
        // A proof for leaf i never verifies some other leaf's payload.
        prop_assert!(proofs[i].verify(&root, &leaf_hash(&items[j])).is_err());
    }
}
