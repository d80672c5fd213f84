//! Similarity Kernel (C5): Hamming-based similarity between two fingerprints.
//!
//! Pure function, no I/O — trivially proptest-able for the quantified
//! invariants in the spec's testable-properties section (reflexivity,
//! commutativity, range).

/// Compare two fingerprints and return a similarity percentage in `[0, 100]`.
///
/// 1. Truncate both vectors to `L = min(|a|, |b|)`.
/// 2. Sum the population count of `a[i] XOR b[i]` for `i < L`.
/// 3. `100 * (1 - sum / (32 * L))`.
/// 4. Empty input, or `L` below `minimum_length`, yields 0 — too little
///    material to compare reliably.
///
/// Commutative; reflexive (`similarity(f, f) == 100`); not a metric (the
/// triangle inequality need not hold).
pub fn similarity_percentage(a: &[u32], b: &[u32], minimum_length: usize) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let l = a.len().min(b.len());
    if l < minimum_length {
        return 0.0;
    }

    let total_bits = hamming_distance_sum(a, b, l);
    let max_bits = 32.0 * l as f64;
    (1.0 - total_bits as f64 / max_bits) * 100.0
}

fn hamming_distance_sum(a: &[u32], b: &[u32], l: usize) -> u32 {
    a.iter()
        .zip(b.iter())
        .take(l)
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIN_LEN: usize = 10;

    fn fp(n: usize, seed: u32) -> Vec<u32> {
        (0..n).map(|i| (i as u32).wrapping_mul(2654435761).wrapping_add(seed)).collect()
    }

    #[test]
    fn identical_fingerprints_are_100_percent_similar() {
        let f = fp(50, 7);
        assert_eq!(similarity_percentage(&f, &f, MIN_LEN), 100.0);
    }

    #[test]
    fn completely_opposite_bits_are_0_percent_similar() {
        let a = vec![0u32; 20];
        let b = vec![u32::MAX; 20];
        assert_eq!(similarity_percentage(&a, &b, MIN_LEN), 0.0);
    }

    #[test]
    fn empty_fingerprint_yields_zero() {
        let a: Vec<u32> = vec![];
        let b = fp(20, 1);
        assert_eq!(similarity_percentage(&a, &b, MIN_LEN), 0.0);
        assert_eq!(similarity_percentage(&b, &a, MIN_LEN), 0.0);
    }

    #[test]
    fn below_minimum_length_yields_zero_even_if_identical() {
        let f = fp(5, 3);
        assert_eq!(similarity_percentage(&f, &f, MIN_LEN), 0.0);
    }

    #[test]
    fn differing_lengths_compare_only_the_shared_prefix() {
        let a = fp(100, 9);
        let b = a[..40].to_vec();
        // identical over the shared prefix, so still 100% despite length mismatch
        assert_eq!(similarity_percentage(&a, &b, MIN_LEN), 100.0);
    }

    #[test]
    fn single_bit_flip_reduces_similarity_by_one_32l() {
        let mut a = fp(10, 5);
        let b = a.clone();
        a[0] ^= 1; // flip one bit
        let sim = similarity_percentage(&a, &b, MIN_LEN);
        let expected = (1.0 - 1.0 / (32.0 * 10.0)) * 100.0;
        assert!((sim - expected).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn similarity_is_reflexive(data in proptest::collection::vec(any::<u32>(), MIN_LEN..200)) {
            prop_assert_eq!(similarity_percentage(&data, &data, MIN_LEN), 100.0);
        }

        #[test]
        fn similarity_is_commutative(
            a in proptest::collection::vec(any::<u32>(), MIN_LEN..200),
            b in proptest::collection::vec(any::<u32>(), MIN_LEN..200),
        ) {
            prop_assert_eq!(
                similarity_percentage(&a, &b, MIN_LEN),
                similarity_percentage(&b, &a, MIN_LEN)
            );
        }

        #[test]
        fn similarity_is_bounded(
            a in proptest::collection::vec(any::<u32>(), 0..200),
            b in proptest::collection::vec(any::<u32>(), 0..200),
        ) {
            let sim = similarity_percentage(&a, &b, MIN_LEN);
            prop_assert!((0.0..=100.0).contains(&sim));
        }
    }
}
