//! Property-Based Tests for Histograms
//!
//! # Test Properties
//!
//! 1. **Monotonicity**: count, sum and buckets track exactly what was added
//! 2. **Label Isolation**: adding to one label never changes another

#![cfg(test)]

use proptest::prelude::*;

use super::{Histogram, HistogramVec};

/// Strategy for bucket upper bounds, unsorted and possibly repeated.
fn limits_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0001f64..10.0, 1..16)
}

/// Strategy for non-negative latency samples.
fn samples_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..20.0, 0..200)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: count, sum and every bucket match the recorded samples.
    #[test]
    fn prop_histogram_tracks_samples(
        limits in limits_strategy(),
        samples in samples_strategy(),
    ) {
        let histogram = Histogram::new(&limits)?;
        for &x in &samples {
            histogram.add(x);
        }

        let snapshot = histogram.snapshot();
        prop_assert_eq!(snapshot.count, samples.len() as u64);

        let total: f64 = samples.iter().sum();
        prop_assert!((snapshot.sum - total).abs() <= 1e-9 * total.max(1.0));

        for (limit, count) in snapshot.buckets {
            let expected = samples.iter().filter(|&&x| x <= limit).count() as u64;
            prop_assert_eq!(count, expected);
        }
    }

    /// Property: bucket counts never decrease as limits grow.
    #[test]
    fn prop_buckets_are_cumulative(
        limits in limits_strategy(),
        samples in samples_strategy(),
    ) {
        let histogram = Histogram::new(&limits)?;
        for &x in &samples {
            histogram.add(x);
        }

        let buckets = histogram.buckets();
        for pair in buckets.windows(2) {
            prop_assert!(pair[0].0 < pair[1].0);
            prop_assert!(pair[0].1 <= pair[1].1);
        }
        if let Some(&(_, last)) = buckets.last() {
            prop_assert!(last <= histogram.count());
        }
    }

    /// Property: samples for one label leave every other label untouched.
    #[test]
    fn prop_labels_are_isolated(
        a_samples in samples_strategy(),
        b_samples in samples_strategy(),
    ) {
        let hv = HistogramVec::new(&[0.01, 0.1, 1.0])?;
        hv.add("b", 0.5)?;
        let b_before = hv.histograms()["b"].clone();

        for &x in &a_samples {
            hv.add("a", x)?;
        }
        prop_assert_eq!(&hv.histograms()["b"], &b_before);

        for &x in &b_samples {
            hv.add("b", x)?;
        }
        prop_assert_eq!(
            hv.histograms().get("a").map(|h| h.count).unwrap_or(0),
            a_samples.len() as u64
        );
    }
}
