//! Latency Histograms
//!
//! Cumulative histograms that collect probe timings between scrapes.
//!
//! [`Histogram`] holds one series; [`HistogramVec`] keys many of them by label
//! and drops labels that are no longer probed. Both hand out owned snapshots
//! so no lock is held while metrics are encoded.

mod proptest;
mod vec;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

pub use vec::HistogramVec;

/// Validate, sort and deduplicate a set of bucket upper bounds.
///
/// A `+Inf` limit is dropped: that bucket is implicit and always equals the
/// sample count.
pub(crate) fn normalize_bucket_limits(bucket_limits: &[f64]) -> Result<Arc<[f64]>> {
    if bucket_limits.iter().any(|limit| limit.is_nan()) {
        return Err(Error::Config("bucket limits must not contain NaN".into()));
    }
    if bucket_limits.contains(&f64::NEG_INFINITY) {
        return Err(Error::Config("bucket limits must not contain -Inf".into()));
    }

    let mut limits: Vec<f64> = bucket_limits
        .iter()
        .copied()
        .filter(|limit| limit.is_finite())
        .collect();
    if limits.is_empty() {
        return Err(Error::Config("bucket limits must not be empty".into()));
    }

    limits.sort_by(f64::total_cmp);
    limits.dedup();

    Ok(limits.into())
}

/// Point-in-time copy of a [`Histogram`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Number of samples recorded
    pub count: u64,
    /// Sum of all samples recorded
    pub sum: f64,
    /// Upper bound and cumulative count per bucket, ascending by bound.
    /// The +Inf bucket is implicit and equals `count`.
    pub buckets: Vec<(f64, u64)>,
}

#[derive(Debug)]
struct HistogramState {
    count: u64,
    sum: f64,
    buckets: Vec<u64>,
}

/// A cumulative histogram safe for concurrent writers.
#[derive(Debug)]
pub struct Histogram {
    bucket_limits: Arc<[f64]>,
    state: Mutex<HistogramState>,
}

impl Histogram {
    /// Create a histogram with the given bucket upper bounds.
    pub fn new(bucket_limits: &[f64]) -> Result<Self> {
        Ok(Self::with_limits(normalize_bucket_limits(bucket_limits)?))
    }

    /// Create a histogram sharing already validated limits.
    pub(crate) fn with_limits(bucket_limits: Arc<[f64]>) -> Self {
        let buckets = vec![0; bucket_limits.len()];
        Self {
            bucket_limits,
            state: Mutex::new(HistogramState {
                count: 0,
                sum: 0.0,
                buckets,
            }),
        }
    }

    /// Record one sample. NaN and infinite samples are ignored.
    pub fn add(&self, x: f64) {
        if !x.is_finite() {
            return;
        }

        let mut state = self.state.lock();
        state.count += 1;
        state.sum += x;

        // Limits are sorted, so the first matching bucket starts the run.
        let first = self.bucket_limits.partition_point(|&limit| limit < x);
        for count in &mut state.buckets[first..] {
            *count += 1;
        }
    }

    /// Number of samples recorded.
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    /// Sum of all samples recorded.
    pub fn sum(&self) -> f64 {
        self.state.lock().sum
    }

    /// Copy of the bucket counts, ascending by upper bound.
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        let state = self.state.lock();
        self.zip_buckets(&state)
    }

    /// Consistent copy of count, sum and buckets.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.lock();
        HistogramSnapshot {
            count: state.count,
            sum: state.sum,
            buckets: self.zip_buckets(&state),
        }
    }

    /// The bucket upper bounds of this histogram.
    pub fn bucket_limits(&self) -> &[f64] {
        &self.bucket_limits
    }

    fn zip_buckets(&self, state: &HistogramState) -> Vec<(f64, u64)> {
        self.bucket_limits
            .iter()
            .copied()
            .zip(state.buckets.iter().copied())
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_new_rejects_empty_limits() {
        assert_matches!(Histogram::new(&[]), Err(Error::Config(_)));
    }

    #[test]
    fn test_new_rejects_nan_limit() {
        assert_matches!(Histogram::new(&[0.1, f64::NAN]), Err(Error::Config(_)));
    }

    #[test]
    fn test_infinite_limits() {
        let h = Histogram::new(&[1.0, f64::INFINITY]).unwrap();
        assert_eq!(h.bucket_limits(), &[1.0]);

        assert_matches!(Histogram::new(&[f64::INFINITY]), Err(Error::Config(_)));
        assert_matches!(
            Histogram::new(&[f64::NEG_INFINITY, 1.0]),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_add_ignores_non_finite_samples() {
        let h = Histogram::new(&[1.0]).unwrap();
        h.add(0.5);
        h.add(f64::NAN);
        h.add(f64::INFINITY);
        h.add(f64::NEG_INFINITY);

        assert_eq!(
            h.snapshot(),
            HistogramSnapshot {
                count: 1,
                sum: 0.5,
                buckets: vec![(1.0, 1)],
            }
        );
    }

    #[test]
    fn test_new_is_zeroed() {
        let h = Histogram::new(&[0.1, 1.0]).unwrap();
        assert_eq!(h.count(), 0);
        assert_eq!(h.sum(), 0.0);
        assert_eq!(h.buckets(), vec![(0.1, 0), (1.0, 0)]);
    }

    #[test]
    fn test_limits_sorted_and_deduplicated() {
        let h = Histogram::new(&[1.0, 0.1, 1.0, 0.5]).unwrap();
        assert_eq!(h.bucket_limits(), &[0.1, 0.5, 1.0]);
    }

    #[test]
    fn test_add_is_cumulative() {
        let h = Histogram::new(&[0.1, 0.5, 1.0]).unwrap();

        h.add(0.05);
        h.add(0.1);
        h.add(0.7);
        h.add(3.0);

        assert_eq!(h.count(), 4);
        assert!((h.sum() - 3.85).abs() < 1e-9);
        assert_eq!(h.buckets(), vec![(0.1, 2), (0.5, 2), (1.0, 3)]);
    }

    #[test]
    fn test_sample_on_boundary_counts_in_bucket() {
        let h = Histogram::new(&[0.5]).unwrap();
        h.add(0.5);
        assert_eq!(h.buckets(), vec![(0.5, 1)]);
    }

    #[test]
    fn test_buckets_is_a_copy() {
        let h = Histogram::new(&[1.0]).unwrap();
        h.add(0.5);

        let before = h.buckets();
        h.add(0.5);

        assert_eq!(before, vec![(1.0, 1)]);
        assert_eq!(h.buckets(), vec![(1.0, 2)]);
    }

    #[test]
    fn test_snapshot_consistent() {
        let h = Histogram::new(&[0.01, 0.1]).unwrap();
        h.add(0.005);
        h.add(0.05);

        let snapshot = h.snapshot();
        assert_eq!(snapshot.count, 2);
        assert!((snapshot.sum - 0.055).abs() < 1e-9);
        assert_eq!(snapshot.buckets, vec![(0.01, 1), (0.1, 2)]);
    }

    #[test]
    fn test_concurrent_adds() {
        let h = Arc::new(Histogram::new(&[0.5, 1.0]).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        h.add(0.25);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(h.count(), 8000);
        assert_eq!(h.buckets(), vec![(0.5, 8000), (1.0, 8000)]);
        assert!((h.sum() - 2000.0).abs() < 1e-6);
    }
}
