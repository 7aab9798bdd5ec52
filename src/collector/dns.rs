//! DNS resolution latency collector.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{IntCounterVec, Opts};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::{exponential_buckets, histogram_family, timed, validate_targets, validate_timeout};
use super::ProbeCollector;
use crate::domain::ports::Resolver;
use crate::error::Result;
use crate::histogram::HistogramVec;

const NAMESPACE: &str = "dns";

/// DNS collector configuration.
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// Hostnames to resolve every cycle
    pub hosts: Vec<String>,
    /// Upper bound for a single lookup
    pub timeout: Duration,
    /// Histogram bucket limits in seconds
    pub buckets: Vec<f64>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                "giantswarm.io.".to_string(),
                "kubernetes.default.svc.cluster.local.".to_string(),
            ],
            timeout: Duration::from_secs(5),
            buckets: exponential_buckets(0.001, 2.0, 10),
        }
    }
}

/// Measures how long the resolver takes to answer for each configured host.
pub struct DnsCollector {
    config: DnsConfig,
    resolver: Arc<dyn Resolver>,
    latency: HistogramVec,
    checks: IntCounterVec,
    check_errors: IntCounterVec,
    cycle: Mutex<()>,
}

impl std::fmt::Debug for DnsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DnsCollector {
    pub fn new(config: DnsConfig, resolver: Arc<dyn Resolver>) -> Result<Self> {
        validate_targets(NAMESPACE, "hosts", &config.hosts)?;
        validate_timeout(NAMESPACE, config.timeout)?;

        let latency = HistogramVec::new(&config.buckets)?;
        let checks = IntCounterVec::new(
            Opts::new("dns_check_total", "Total number of DNS checks."),
            &["host"],
        )?;
        let check_errors = IntCounterVec::new(
            Opts::new("dns_check_error_total", "Total number of failed DNS checks."),
            &["host"],
        )?;

        Ok(Self {
            config,
            resolver,
            latency,
            checks,
            check_errors,
            cycle: Mutex::new(()),
        })
    }

    async fn check(&self, host: &str) {
        self.checks.with_label_values(&[host]).inc();

        let lookup = timed(host, self.config.timeout, self.resolver.lookup(host)).await;
        match lookup {
            Ok((addrs, elapsed)) => {
                debug!(host = %host, addresses = addrs.len(), elapsed = ?elapsed, "Resolved host");
                if let Err(e) = self.latency.add(host, elapsed.as_secs_f64()) {
                    warn!(host = %host, error = %e, "Failed to record DNS latency");
                    self.check_errors.with_label_values(&[host]).inc();
                }
            }
            Err(e) => {
                warn!(host = %host, error = %e, "DNS check failed");
                self.check_errors.with_label_values(&[host]).inc();
            }
        }
    }
}

#[async_trait]
impl ProbeCollector for DnsCollector {
    fn name(&self) -> &'static str {
        NAMESPACE
    }

    #[instrument(skip(self), fields(collector = NAMESPACE))]
    async fn collect(&self) -> Vec<MetricFamily> {
        let _cycle = self.cycle.lock().await;

        join_all(self.config.hosts.iter().map(|host| self.check(host))).await;
        self.latency.ensure(&self.config.hosts);

        let mut families = vec![histogram_family(
            "dns_latency_seconds",
            "Histogram of latency of DNS resolution.",
            "host",
            &self.latency.histograms(),
        )];
        families.extend(self.checks.collect());
        families.extend(self.check_errors.collect());
        families
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ProbeOutcome, ScriptedProber};
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn config(hosts: &[&str]) -> DnsConfig {
        DnsConfig {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = DnsConfig::default();
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.buckets.len(), 10);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_debug_shows_config() {
        let collector = DnsCollector::new(config(&["a.example."]), Arc::new(ScriptedProber::new()))
            .unwrap();
        let debug = format!("{:?}", collector);
        assert!(debug.starts_with("DnsCollector"));
        assert!(debug.contains("a.example."));
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let resolver: Arc<dyn Resolver> = Arc::new(ScriptedProber::new());

        assert_matches!(
            DnsCollector::new(config(&[]), resolver.clone()),
            Err(Error::Config(_))
        );
        assert_matches!(
            DnsCollector::new(
                DnsConfig {
                    timeout: Duration::ZERO,
                    ..config(&["a"])
                },
                resolver.clone()
            ),
            Err(Error::Config(_))
        );
        assert_matches!(
            DnsCollector::new(
                DnsConfig {
                    buckets: vec![],
                    ..config(&["a"])
                },
                resolver
            ),
            Err(Error::Config(_))
        );
    }

    #[tokio::test]
    async fn test_collect_records_success_and_failure() {
        let prober = Arc::new(
            ScriptedProber::new()
                .with("bad.example.", ProbeOutcome::Fail("NXDOMAIN".into()))
                .with("slow.example.", ProbeOutcome::Hang),
        );
        let collector = DnsCollector::new(
            config(&["good.example.", "bad.example.", "slow.example."]),
            prober.clone(),
        )
        .unwrap();

        let families = collector.collect().await;
        assert_eq!(families.len(), 3);

        let histograms = collector.latency.histograms();
        assert_eq!(histograms.len(), 1);
        assert_eq!(histograms["good.example."].count, 1);

        for host in ["good.example.", "bad.example.", "slow.example."] {
            assert_eq!(collector.checks.with_label_values(&[host]).get(), 1);
        }
        assert_eq!(
            collector
                .check_errors
                .with_label_values(&["bad.example."])
                .get(),
            1
        );
        assert_eq!(
            collector
                .check_errors
                .with_label_values(&["slow.example."])
                .get(),
            1
        );
        assert_eq!(
            collector
                .check_errors
                .with_label_values(&["good.example."])
                .get(),
            0
        );
    }

    #[tokio::test]
    async fn test_collect_accumulates_across_cycles() {
        let prober = Arc::new(ScriptedProber::new());
        let collector = DnsCollector::new(config(&["a.example."]), prober.clone()).unwrap();

        collector.collect().await;
        collector.collect().await;

        assert_eq!(collector.latency.histograms()["a.example."].count, 2);
        assert_eq!(prober.call_count("a.example."), 2);
    }
}
