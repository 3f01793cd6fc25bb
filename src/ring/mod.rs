//! Consistent hash ring construction and lookup.
//!
//! The ring is a sorted vector of `(hash, endpoint_index)` entries built
//! from a weighted address list. Hashing is bit-exact XXH64 with seed 0 over
//! `"{address_key}_{count}"`; interop with other ring-hash implementations
//! depends on that exact byte sequence, so the key must never be trimmed or
//! normalized here.

use crate::config::RingHashConfig;
use crate::endpoint::WeightedAddress;
use std::fmt::Write;
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

/// One position on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEntry {
    /// XXH64 of the entry's hash key.
    pub hash: u64,
    /// Index of the owning endpoint in the generation's endpoint set.
    pub endpoint_index: u32,
}

/// Immutable sorted ring over one endpoint generation.
pub struct Ring {
    entries: Vec<RingEntry>,
}

impl Ring {
    /// Materialize a ring from a weighted address list.
    ///
    /// Weights must be strictly positive (the policy filters weight-0
    /// addresses before calling this) and the list must be non-empty.
    ///
    /// The number of hashes per address is scaled so that the least-weighted
    /// address receives a whole number of hashes on a ring of at least
    /// `min_ring_size` entries, clamped to `max_ring_size`. Running integer
    /// and fractional totals keep the allocation near-proportional when
    /// weights are not integer multiples of the scale.
    pub fn build(addresses: &[WeightedAddress], config: &RingHashConfig) -> Ring {
        assert!(!addresses.is_empty(), "cannot build a ring from zero addresses");

        let sum: u64 = addresses.iter().map(|a| u64::from(a.weight)).sum();
        let normalized: Vec<f64> = addresses
            .iter()
            .map(|a| f64::from(a.weight) / sum as f64)
            .collect();
        let min_normalized = normalized.iter().copied().fold(f64::INFINITY, f64::min);

        let scale = ((min_normalized * config.min_ring_size as f64).ceil() / min_normalized)
            .min(config.max_ring_size as f64);
        let ring_size = scale.ceil() as usize;

        let mut entries = Vec::with_capacity(ring_size);
        let mut key = String::new();
        let mut current_hashes: u64 = 0;
        let mut target_hashes: f64 = 0.0;
        for (index, address) in addresses.iter().enumerate() {
            key.clear();
            key.push_str(address.address.as_key());
            key.push('_');
            let prefix_len = key.len();
            target_hashes += scale * normalized[index];
            let mut count: u64 = 0;
            while (current_hashes as f64) < target_hashes {
                key.truncate(prefix_len);
                let _ = write!(key, "{count}");
                entries.push(RingEntry {
                    hash: xxh64(key.as_bytes(), 0),
                    endpoint_index: index as u32,
                });
                count += 1;
                current_hashes += 1;
            }
        }
        // Stable sort keeps insertion order on hash ties.
        entries.sort_by_key(|entry| entry.hash);

        debug!(
            addresses = addresses.len(),
            ring_size = entries.len(),
            "built hash ring"
        );
        Ring { entries }
    }

    /// Number of entries on the ring.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted ascending by hash.
    pub fn entries(&self) -> &[RingEntry] {
        &self.entries
    }

    /// Find the index of the first entry whose hash is `>= hash`, wrapping
    /// to 0 past the maximum.
    ///
    /// Ported from ketama's `ketama_get_server`; the bisection relies on
    /// signed arithmetic, with the ring treated as circular at the wrap
    /// point.
    pub fn find(&self, hash: u64) -> usize {
        let len = self.entries.len() as i64;
        let mut lowp: i64 = 0;
        let mut highp: i64 = len;
        loop {
            let mid = (lowp + highp) / 2;
            if mid == len {
                return 0;
            }
            let midval = self.entries[mid as usize].hash;
            let midval1 = if mid == 0 {
                0
            } else {
                self.entries[mid as usize - 1].hash
            };
            if hash <= midval && hash > midval1 {
                return mid as usize;
            }
            if midval < hash {
                lowp = mid + 1;
            } else {
                highp = mid - 1;
            }
            if lowp > highp {
                return 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(weights: &[u32]) -> Vec<WeightedAddress> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &w)| WeightedAddress::new(format!("10.0.0.{i}:80"), w))
            .collect()
    }

    fn entry_counts(ring: &Ring, n: usize) -> Vec<usize> {
        let mut counts = vec![0usize; n];
        for entry in ring.entries() {
            counts[entry.endpoint_index as usize] += 1;
        }
        counts
    }

    #[test]
    fn test_xxh64_vectors() {
        // Published XXH64 reference vectors, seed 0.
        assert_eq!(xxh64(b"", 0), 0xef46_db37_51d8_e999);
        assert_eq!(xxh64(b"abc", 0), 0x44bc_2cf5_ad77_0999);
    }

    #[test]
    fn test_single_address_fills_min_ring_size() {
        let ring = Ring::build(&addresses(&[1]), &RingHashConfig::default());
        assert_eq!(ring.len(), 1024);
        assert!(ring.entries().iter().all(|e| e.endpoint_index == 0));
    }

    #[test]
    fn test_ring_is_sorted() {
        let ring = Ring::build(&addresses(&[1, 2, 3]), &RingHashConfig::default());
        assert!(ring.entries().windows(2).all(|w| w[0].hash <= w[1].hash));
    }

    #[test]
    fn test_equal_weights_split_evenly() {
        let config = RingHashConfig {
            min_ring_size: 1024,
            max_ring_size: 8192,
            ..RingHashConfig::default()
        };
        let ring = Ring::build(&addresses(&[1, 1]), &config);
        assert_eq!(ring.len(), 1024);
        let counts = entry_counts(&ring, 2);
        assert!(counts[0].abs_diff(512) <= 1, "counts: {counts:?}");
        assert!(counts[1].abs_diff(512) <= 1, "counts: {counts:?}");
    }

    #[test]
    fn test_weight_proportionality() {
        let ring = Ring::build(&addresses(&[1, 3]), &RingHashConfig::default());
        assert!(ring.len() >= 1024, "len: {}", ring.len());
        let counts = entry_counts(&ring, 2);
        let ratio = counts[1] as f64 / counts[0] as f64;
        assert!((ratio - 3.0).abs() < 0.05, "ratio: {ratio}");
        // Proportionality within one slot of ideal for each pair.
        let err = (counts[0] as f64 / counts[1] as f64 - 1.0 / 3.0).abs();
        assert!(err <= 1.0 / counts[0].min(counts[1]) as f64, "err: {err}");
    }

    #[test]
    fn test_max_ring_size_clamps() {
        let config = RingHashConfig {
            min_ring_size: 1024,
            max_ring_size: 2048,
            ..RingHashConfig::default()
        };
        // A weight spread this extreme wants a ~10000-entry ring so the
        // least-weighted address keeps a whole hash; the clamp wins instead.
        let ring = Ring::build(&addresses(&[1, 9999]), &config);
        assert_eq!(ring.len(), 2048);
        let counts = entry_counts(&ring, 2);
        assert!(counts[0] >= 1, "clamped ring dropped the light address");
    }

    #[test]
    fn test_build_is_deterministic() {
        let input = addresses(&[2, 5, 1]);
        let config = RingHashConfig::default();
        let a = Ring::build(&input, &config);
        let b = Ring::build(&input, &config);
        assert_eq!(a.entries(), b.entries());
    }

    #[test]
    fn test_find_selects_first_entry_at_or_above_hash() {
        let ring = Ring::build(&addresses(&[1, 1, 1]), &RingHashConfig::default());
        let entries = ring.entries();

        // Exact hit.
        let idx = ring.find(entries[10].hash);
        assert_eq!(entries[idx].hash, entries[10].hash);

        // Just above a hash lands on the next entry.
        let idx = ring.find(entries[10].hash + 1);
        assert_eq!(idx, 11);

        // Below the first entry lands on index 0.
        assert_eq!(ring.find(0), 0);

        // Past the maximum wraps to 0.
        assert_eq!(ring.find(u64::MAX), 0);
    }

    #[test]
    fn test_find_covers_whole_ring() {
        let ring = Ring::build(&addresses(&[1, 2]), &RingHashConfig::default());
        for (i, entry) in ring.entries().iter().enumerate() {
            assert_eq!(ring.find(entry.hash), i, "entry {i}");
        }
    }
}
