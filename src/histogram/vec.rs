//! Label-keyed histogram vector with stale-label eviction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{normalize_bucket_limits, Histogram, HistogramSnapshot};
use crate::error::{Error, Result};

/// A set of histograms keyed by label, sharing one bucket layout.
///
/// The label map is guarded by its own lock, held only to find or insert an
/// entry. Samples are then recorded under the per-histogram lock, so probes for
/// different labels never wait on each other.
#[derive(Debug)]
pub struct HistogramVec {
    bucket_limits: Arc<[f64]>,
    histograms: Mutex<HashMap<String, Arc<Histogram>>>,
}

impl HistogramVec {
    /// Create an empty vector whose histograms use `bucket_limits`.
    pub fn new(bucket_limits: &[f64]) -> Result<Self> {
        Ok(Self {
            bucket_limits: normalize_bucket_limits(bucket_limits)?,
            histograms: Mutex::new(HashMap::new()),
        })
    }

    /// Record `x` for `label`, creating its histogram on first use.
    pub fn add(&self, label: &str, x: f64) -> Result<()> {
        if !x.is_finite() || x < 0.0 {
            return Err(Error::InvalidSample(x));
        }

        let histogram = {
            let mut histograms = self.histograms.lock();
            match histograms.get(label) {
                Some(histogram) => Arc::clone(histogram),
                None => {
                    let histogram = Arc::new(Histogram::with_limits(Arc::clone(
                        &self.bucket_limits,
                    )));
                    histograms.insert(label.to_string(), Arc::clone(&histogram));
                    histogram
                }
            }
        };

        histogram.add(x);
        Ok(())
    }

    /// Drop every histogram whose label is not in `labels`.
    pub fn ensure<I, S>(&self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: HashSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();

        self.histograms
            .lock()
            .retain(|label, _| requested.contains(label));
    }

    /// Independent copy of every histogram, keyed by label.
    pub fn histograms(&self) -> HashMap<String, HistogramSnapshot> {
        let histograms: Vec<(String, Arc<Histogram>)> = self
            .histograms
            .lock()
            .iter()
            .map(|(label, histogram)| (label.clone(), Arc::clone(histogram)))
            .collect();

        histograms
            .into_iter()
            .map(|(label, histogram)| (label, histogram.snapshot()))
            .collect()
    }

    /// Number of labels currently held.
    pub fn len(&self) -> usize {
        self.histograms.lock().len()
    }

    /// Whether no labels are held.
    pub fn is_empty(&self) -> bool {
        self.histograms.lock().is_empty()
    }

    /// The bucket upper bounds shared by all histograms.
    pub fn bucket_limits(&self) -> &[f64] {
        &self.bucket_limits
    }
}

// =============================================================================
// Tests
// =============================================================================
