//! The hash partitioner shared by every worker in a job.
//!
//! `p = hash(key) mod R`. The hash must be deterministic across a
//! single job's lifetime and identical across every worker in that
//! job's fleet, but need not be stable across coordinator restarts. We
//! satisfy both by hashing with a seed that the coordinator mints once
//! per job and carries on every `MapTask`, rather than relying on a
//! process-wide default that could vary between worker binaries.

use std::hash::{Hash, Hasher};

/// A `SipHash`-based keyed hasher, seeded per job. `DefaultHasher`
/// itself is keyed but its key is fixed per-process by the standard
/// library's `RandomState`; threading an explicit seed makes the
/// partition function identical across every worker process in a job
/// rather than merely within one.
pub fn partition_of(key: &str, seed: u64, num_partitions: u32) -> u32 {
    assert!(num_partitions > 0, "num_partitions must be positive");
    let mut hasher = seeded_hasher(seed);
    key.hash(&mut hasher);
    (hasher.finish() % num_partitions as u64) as u32
}

fn seeded_hasher(seed: u64) -> impl Hasher {
    std::collections::hash_map::DefaultHasher::new_with_seed(seed)
}

// `DefaultHasher` doesn't expose a seeded constructor in stable std, so
// we fold the seed into the hash ourselves via a small wrapper.
trait NewWithSeed {
    fn new_with_seed(seed: u64) -> Self;
}

impl NewWithSeed for std::collections::hash_map::DefaultHasher {
    fn new_with_seed(seed: u64) -> Self {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        seed.hash(&mut h);
        // Re-seed by hashing the seed's own hash back into a fresh
        // hasher; DefaultHasher has no public `with_seed`, so this is
        // the only portable way to vary its state deterministically.
        let folded = h.finish();
        let mut seeded = std::collections::hash_map::DefaultHasher::new();
        folded.hash(&mut seeded);
        seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_seed() {
        let p1 = partition_of("hello", 42, 4);
        let p2 = partition_of("hello", 42, 4);
        assert_eq!(p1, p2);
    }

    #[test]
    fn in_range() {
        for key in ["a", "b", "quick brown fox", ""] {
            let p = partition_of(key, 7, 4);
            assert!(p < 4);
        }
    }

    #[test]
    fn different_seeds_may_diverge() {
        let mut any_diff = false;
        for key in ["alpha", "beta", "gamma", "delta", "epsilon"] {
            if partition_of(key, 1, 4) != partition_of(key, 2, 4) {
                any_diff = true;
            }
        }
        assert!(any_diff, "expected at least one key to partition differently under a different seed");
    }
}
