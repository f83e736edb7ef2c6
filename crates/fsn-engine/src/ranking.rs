//! Deterministic shard ranking.
//!
//! Addresses and shard ids are hashed onto the same 64-bit ring. A shard's
//! score for an address is `weight * (hash64(shard) XOR hash64(address))`
//! and shards are visited in ascending score order, ties broken by shard id.
//! The order depends only on the address and the shard set, never on the
//! order shards were attached.

use fsn_crypto::hash64;
use fsn_shard::ShardId;
use fsn_types::Address;

/// Score of one shard for the given address target. Lower ranks first.
pub fn score(shard: &ShardId, weight: u64, target: u64) -> u128 {
    let distance = hash64(shard.as_bytes()) ^ target;
    u128::from(weight.max(1)) * u128::from(distance)
}

/// Sort `items` into the visiting order for `address`.
///
/// `key` extracts the shard id and weight of each item.
pub fn rank<T>(items: &mut [T], address: &Address, key: impl Fn(&T) -> (ShardId, u64)) {
    let target = hash64(&address.to_bytes());
    items.sort_by_cached_key(|item| {
        let (id, weight) = key(item);
        (score(&id, weight, target), id)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsn_types::{ContainerId, ObjectId};
    use proptest::prelude::*;
    use rand::seq::SliceRandom;

    fn addr(n: u8) -> Address {
        Address::new(ContainerId::from_hash([7; 32]), ObjectId::from_hash([n; 32]))
    }

    fn ids(n: usize) -> Vec<(ShardId, u64)> {
        (0..n).map(|_| (ShardId::new(), 1)).collect()
    }

    #[test]
    fn repeated_calls_agree() {
        let shards = ids(5);
        let mut a = shards.clone();
        let mut b = shards.clone();
        rank(&mut a, &addr(1), |s| *s);
        rank(&mut b, &addr(1), |s| *s);
        assert_eq!(a, b);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let shards = ids(8);
        let mut expected = shards.clone();
        rank(&mut expected, &addr(3), |s| *s);
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let mut shuffled = shards.clone();
            shuffled.shuffle(&mut rng);
            rank(&mut shuffled, &addr(3), |s| *s);
            assert_eq!(shuffled, expected);
        }
    }

    #[test]
    fn different_addresses_spread_first_choice() {
        let shards = ids(4);
        let firsts: std::collections::HashSet<ShardId> = (0..64u8)
            .map(|n| {
                let mut s = shards.clone();
                rank(&mut s, &addr(n), |s| *s);
                s[0].0
            })
            .collect();
        assert!(firsts.len() > 1);
    }

    #[test]
    fn heavier_weight_scales_score() {
        let id = ShardId::new();
        let target = 12345;
        assert_eq!(score(&id, 3, target), 3 * score(&id, 1, target));
        assert_eq!(score(&id, 0, target), score(&id, 1, target));
    }

    proptest! {
        #[test]
        fn ranking_is_a_pure_function(n in 0u8..255, seed in 0usize..8) {
            let shards = ids(6);
            let mut a = shards.clone();
            a.rotate_left(seed % shards.len());
            let mut b = shards;
            rank(&mut a, &addr(n), |s| *s);
            rank(&mut b, &addr(n), |s| *s);
            prop_assert_eq!(a, b);
        }
    }
}
