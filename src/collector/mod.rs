//! Probe Collectors
//!
//! Each collector owns its probe targets, a latency [`HistogramVec`] and its
//! error counters. One call to [`ProbeCollector::collect`] runs one full cycle:
//!
//! ```text
//! resolve targets ──► probe all concurrently ──► record ──► ensure ──► emit
//!                     (timeout per probe)        (success → histogram,
//!                                                 failure → error counter)
//! ```
//!
//! Cycles on the same collector never overlap.
//!
//! [`HistogramVec`]: crate::histogram::HistogramVec

mod dns;
mod network;
mod nstat;
mod ntp;

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType};

use crate::error::{Error, Result};
use crate::histogram::HistogramSnapshot;

pub use dns::{DnsCollector, DnsConfig};
pub use network::{DialOutcome, NetworkCollector, NetworkConfig};
pub use nstat::{NstatCollector, NstatConfig, NstatReport};
pub use ntp::{NtpCollector, NtpConfig};

/// A source of metric families that probes something on every scrape.
#[async_trait]
pub trait ProbeCollector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run one probe cycle and return the resulting families.
    ///
    /// Never fails: per-target failures are reported through error counters.
    async fn collect(&self) -> Vec<MetricFamily>;
}

/// Split a comma-separated list, trimming items and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// `count` bucket limits starting at `start`, each `factor` times the last.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Vec<f64> {
    std::iter::successors(Some(start), |limit| Some(limit * factor))
        .take(count)
        .collect()
}

/// Run `probe` bounded by `limit`, returning its value and elapsed time.
pub(crate) async fn timed<F, T>(target: &str, limit: Duration, probe: F) -> Result<(T, Duration)>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    match tokio::time::timeout(limit, probe).await {
        Ok(Ok(value)) => Ok((value, start.elapsed())),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::Timeout {
            target: target.to_string(),
            after: limit,
        }),
    }
}

pub(crate) fn validate_timeout(collector: &str, timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::Config(format!(
            "{} timeout must be greater than zero",
            collector
        )));
    }
    Ok(())
}

pub(crate) fn validate_targets(collector: &str, what: &str, targets: &[String]) -> Result<()> {
    if targets.is_empty() {
        return Err(Error::Config(format!(
            "{} {} must not be empty",
            collector, what
        )));
    }
    if targets.iter().any(|t| t.trim().is_empty()) {
        return Err(Error::Config(format!(
            "{} {} must not contain blank entries",
            collector, what
        )));
    }
    Ok(())
}

fn label_pair(name: &str, value: &str) -> LabelPair {
    let mut pair = LabelPair::default();
    pair.set_name(name.to_string());
    pair.set_value(value.to_string());
    pair
}

/// Build a histogram family with one series per label, sorted by label.
pub fn histogram_family(
    name: &str,
    help: &str,
    label_name: &str,
    snapshots: &HashMap<String, HistogramSnapshot>,
) -> MetricFamily {
    let mut labels: Vec<&String> = snapshots.keys().collect();
    labels.sort();

    let metrics = labels
        .into_iter()
        .map(|label| {
            let snapshot = &snapshots[label];

            let buckets = snapshot
                .buckets
                .iter()
                .map(|&(limit, count)| {
                    let mut bucket = proto::Bucket::default();
                    bucket.set_upper_bound(limit);
                    bucket.set_cumulative_count(count);
                    bucket
                })
                .collect();

            let mut histogram = proto::Histogram::default();
            histogram.set_sample_count(snapshot.count);
            histogram.set_sample_sum(snapshot.sum);
            histogram.set_bucket(buckets);

            let mut metric = Metric::default();
            metric.set_label(vec![label_pair(label_name, label)]);
            metric.set_histogram(histogram);
            metric
        })
        .collect();

    let mut family = MetricFamily::default();
    family.set_name(name.to_string());
    family.set_help(help.to_string());
    family.set_field_type(MetricType::HISTOGRAM);
    family.set_metric(metrics);
    family
}

/// Build an unlabelled gauge family.
pub fn gauge_family(name: &str, help: &str, value: f64) -> MetricFamily {
    let mut gauge = proto::Gauge::default();
    gauge.set_value(value);

    let mut metric = Metric::default();
    metric.set_gauge(gauge);

    let mut family = MetricFamily::default();
    family.set_name(name.to_string());
    family.set_help(help.to_string());
    family.set_field_type(MetricType::GAUGE);
    family.set_metric(vec![metric]);
    family
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;
    use assert_matches::assert_matches;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" giantswarm.io. ,kubernetes.default.svc.cluster.local.,,"),
            vec!["giantswarm.io.", "kubernetes.default.svc.cluster.local."]
        );
        assert!(split_list("").is_empty());
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_exponential_buckets() {
        assert_eq!(
            exponential_buckets(0.001, 2.0, 5),
            vec![0.001, 0.002, 0.004, 0.008, 0.016]
        );
        assert!(exponential_buckets(1.0, 2.0, 0).is_empty());
    }

    #[test]
    fn test_validate() {
        assert_matches!(
            validate_timeout("dns", Duration::ZERO),
            Err(Error::Config(_))
        );
        assert!(validate_timeout("dns", Duration::from_secs(1)).is_ok());

        assert_matches!(validate_targets("dns", "hosts", &[]), Err(Error::Config(_)));
        assert_matches!(
            validate_targets("dns", "hosts", &[" ".to_string()]),
            Err(Error::Config(_))
        );
        assert!(validate_targets("dns", "hosts", &["a".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_timed_success_and_timeout() {
        let (value, elapsed) = timed("fast", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(elapsed < Duration::from_secs(1));

        let result = timed("slow", Duration::from_millis(10), async {
            std::future::pending::<Result<()>>().await
        })
        .await;
        assert_matches!(result, Err(Error::Timeout { target, .. }) if target == "slow");

        let result = timed("bad", Duration::from_secs(1), async {
            Err::<(), _>(Error::probe("bad", "refused"))
        })
        .await;
        assert_matches!(result, Err(Error::Probe { .. }));
    }

    fn render(families: &[MetricFamily]) -> String {
        use prometheus::Encoder;

        let mut buf = Vec::new();
        prometheus::TextEncoder::new()
            .encode(families, &mut buf)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_histogram_family_sorted_labels() {
        let histogram = Histogram::new(&[1.0, 2.0]).unwrap();
        histogram.add(1.5);

        let mut snapshots = HashMap::new();
        snapshots.insert("b".to_string(), histogram.snapshot());
        snapshots.insert("a".to_string(), histogram.snapshot());

        let family = histogram_family("x_seconds", "Latency.", "host", &snapshots);
        assert_eq!(family.get_metric().len(), 2);

        let text = render(&[family]);
        assert!(text.contains("# TYPE x_seconds histogram"));
        assert!(text.contains(r#"x_seconds_bucket{host="a",le="1"} 0"#));
        assert!(text.contains(r#"x_seconds_bucket{host="a",le="2"} 1"#));
        assert!(text.contains(r#"x_seconds_count{host="b"} 1"#));
        assert!(text.find(r#"host="a""#) < text.find(r#"host="b""#));
    }

    #[test]
    fn test_gauge_family() {
        let family = gauge_family("nstat_TcpActiveOpens", "Active opens.", 12.0);

        let text = render(&[family]);
        assert!(text.contains("# TYPE nstat_TcpActiveOpens gauge"));
        assert!(text.contains("nstat_TcpActiveOpens 12"));
    }
}
