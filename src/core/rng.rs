//! Deterministic seeded randomness.
//!
//! Everything a rater sees — which cases, in which order, behind which
//! blinding letters — is a pure function of a seed string. The hash, the
//! generator recurrence, and the shuffle below are normative: changing any
//! of them silently reassigns every rater's sample, so they are pinned by
//! golden-value tests and must never be swapped for a library RNG.

/// Fold a key string into a 32-bit seed.
///
/// Multiply-xor fold over the key's Unicode scalar values:
/// `h = h * 31 ^ codepoint`, starting from 0. Not cryptographic; the only
/// promises are reproducibility and a roughly uniform spread across keys.
pub fn seed_from_key(key: &str) -> u32 {
    let mut h: u32 = 0;
    for ch in key.chars() {
        h = h.wrapping_mul(31) ^ (ch as u32);
    }
    h
}

/// Deterministic stream of floats in `[0, 1)` (mulberry32).
///
/// Constant-space recurrence over a single 32-bit state. Streams are split
/// by seeding from distinct keys, never by forking a running stream.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    /// Start a stream from a raw 32-bit seed.
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Start a stream from a seed key (see [`seed_from_key`]).
    pub fn from_key(key: &str) -> Self {
        Self::new(seed_from_key(key))
    }

    /// Next float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        f64::from(t ^ (t >> 14)) / 4_294_967_296.0
    }

    /// Next index in `0..bound` as `floor(next() * bound)`.
    ///
    /// `bound` must be non-zero. The generator never emits 1.0, so the
    /// result is always in range.
    pub fn next_index(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0, "next_index called with zero bound");
        (self.next_f64() * bound as f64) as usize
    }
}

/// In-place Fisher–Yates shuffle.
///
/// Iterates `i` from `n - 1` down to 1, draws `j = floor(next() * (i + 1))`
/// and swaps. This exact draw order is part of the reproducibility
/// contract: two shuffles of the same slice under the same seed are
/// identical element for element.
pub fn shuffle<T>(items: &mut [T], rng: &mut SeededRng) {
    if items.len() < 2 {
        return;
    }
    for i in (1..items.len()).rev() {
        let j = rng.next_index(i + 1);
        items.swap(i, j);
    }
}

/// Seed-key builders.
///
/// Keys concatenate their scoping strings with `::` and end in a fixed tag,
/// so streams for different purposes never collide even when the scoping
/// strings match.
pub mod keys {
    /// Presentation order of the data-quality phase.
    pub fn data_quality_order(user_id: &str) -> String {
        format!("{user_id}::data_quality_order")
    }

    /// Presentation order of one model-evaluation dataset.
    pub fn model_eval_order(user_id: &str, dataset: &str) -> String {
        format!("{user_id}::{dataset}::model_eval_order")
    }

    /// Replacement draws for the repair pass over one dataset.
    pub fn repair_stream(user_id: &str, dataset: &str) -> String {
        format!("{user_id}::{dataset}::repair")
    }

    /// Blinding permutation for one case.
    pub fn blind_order(user_id: &str, dataset: &str, case_id: &str) -> String {
        format!("{user_id}::{dataset}::{case_id}::blind")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_golden_values() {
        // Pinned forever: a change here means every rater's sample moved.
        assert_eq!(seed_from_key(""), 0);
        assert_eq!(seed_from_key("a"), 97);
        assert_eq!(seed_from_key("ab"), 3037);
        assert_eq!(seed_from_key("ba"), 3007);
    }

    #[test]
    fn seed_is_order_sensitive() {
        assert_ne!(
            seed_from_key("alice::data_quality_order"),
            seed_from_key("bob::data_quality_order")
        );
        assert_ne!(seed_from_key("ab"), seed_from_key("ba"));
    }

    #[test]
    fn stream_is_reproducible() {
        let mut a = SeededRng::from_key("alice::data_quality_order");
        let mut b = SeededRng::from_key("alice::data_quality_order");
        for _ in 0..64 {
            assert_eq!(a.next_f64().to_bits(), b.next_f64().to_bits());
        }
    }

    #[test]
    fn stream_stays_in_unit_interval() {
        let mut rng = SeededRng::new(0xDEAD_BEEF);
        for _ in 0..10_000 {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x), "out of range: {x}");
        }
    }

    #[test]
    fn distinct_seeds_diverge() {
        let mut a = SeededRng::from_key("alice::x");
        let mut b = SeededRng::from_key("bob::x");
        let seq_a: Vec<u64> = (0..16).map(|_| a.next_f64().to_bits()).collect();
        let seq_b: Vec<u64> = (0..16).map(|_| b.next_f64().to_bits()).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn next_index_respects_bound() {
        let mut rng = SeededRng::new(42);
        for bound in 1..=64usize {
            for _ in 0..200 {
                assert!(rng.next_index(bound) < bound);
            }
        }
    }

    #[test]
    fn shuffle_is_deterministic_permutation() {
        let original: Vec<u32> = (0..50).collect();

        let mut first = original.clone();
        shuffle(&mut first, &mut SeededRng::from_key("alice::shuffle"));

        let mut second = original.clone();
        shuffle(&mut second, &mut SeededRng::from_key("alice::shuffle"));

        assert_eq!(first, second);

        // Still the same multiset.
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, original);
    }

    #[test]
    fn shuffle_differs_across_seeds() {
        let original: Vec<u32> = (0..50).collect();

        let mut alice = original.clone();
        shuffle(&mut alice, &mut SeededRng::from_key("alice::shuffle"));

        let mut bob = original.clone();
        shuffle(&mut bob, &mut SeededRng::from_key("bob::shuffle"));

        assert_ne!(alice, bob);
    }

    #[test]
    fn shuffle_handles_degenerate_lengths() {
        let mut empty: Vec<u32> = vec![];
        shuffle(&mut empty, &mut SeededRng::new(1));
        assert!(empty.is_empty());

        let mut single = vec![7u32];
        shuffle(&mut single, &mut SeededRng::new(1));
        assert_eq!(single, vec![7]);
    }

    #[test]
    fn seed_keys_are_disjoint() {
        let order = keys::model_eval_order("alice", "medqa");
        let repair = keys::repair_stream("alice", "medqa");
        let blind = keys::blind_order("alice", "medqa", "case-1");
        assert_ne!(order, repair);
        assert_ne!(order, blind);
        assert_ne!(repair, blind);
    }
}
