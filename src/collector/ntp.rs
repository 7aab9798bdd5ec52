//! NTP query latency collector.

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
use crate::domain::ports::TimeSource;
use crate::error::Result;
use crate::histogram::HistogramVec;

const NAMESPACE: &str = "ntp";

/// NTP collector configuration.
#[derive(Debug, Clone)]
pub struct NtpConfig {
    /// Servers to query every cycle, `host` or `host:port`
    pub servers: Vec<String>,
    pub timeout: Duration,
    pub buckets: Vec<f64>,
}

impl Default for NtpConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                "0.flatcar.pool.ntp.org".to_string(),
                "1.flatcar.pool.ntp.org".to_string(),
            ],
            timeout: Duration::from_secs(5),
            buckets: exponential_buckets(0.001, 2.0, 15),
        }
    }
}

/// Measures the wall-clock time of one NTP exchange per configured server.
pub struct NtpCollector {
    config: NtpConfig,
    source: Arc<dyn TimeSource>,
    latency: HistogramVec,
    sync_errors: IntCounterVec,
    cycle: Mutex<()>,
}

impl std::fmt::Debug for NtpCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtpCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NtpCollector {
    pub fn new(config: NtpConfig, source: Arc<dyn TimeSource>) -> Result<Self> {
        validate_targets(NAMESPACE, "servers", &config.servers)?;
        validate_timeout(NAMESPACE, config.timeout)?;

        let latency = HistogramVec::new(&config.buckets)?;
        let sync_errors = IntCounterVec::new(
            Opts::new("ntp_sync_error_total", "Total number of failed NTP syncs."),
            &["server"],
        )?;

        Ok(Self {
            config,
            source,
            latency,
            sync_errors,
            cycle: Mutex::new(()),
        })
    }

    async fn sync(&self, server: &str) {
        match timed(server, self.config.timeout, self.source.query(server)).await {
            Ok((response, elapsed)) => {
                debug!(
                    server = %server,
                    stratum = response.stratum,
                    offset = response.offset,
                    "NTP sync complete"
                );
                if let Err(e) = self.latency.add(server, elapsed.as_secs_f64()) {
                    warn!(server = %server, error = %e, "Failed to record NTP latency");
                    self.sync_errors.with_label_values(&[server]).inc();
                }
            }
            Err(e) => {
                warn!(server = %server, error = %e, "Could not sync time with NTP server");
                self.sync_errors.with_label_values(&[server]).inc();
            }
        }
    }
}

#[async_trait]
impl ProbeCollector for NtpCollector {
    fn name(&self) -> &'static str {
        NAMESPACE
    }

    #[instrument(skip(self), fields(collector = NAMESPACE))]
    async fn collect(&self) -> Vec<MetricFamily> {
        let _cycle = self.cycle.lock().await;

        join_all(self.config.servers.iter().map(|server| self.sync(server))).await;
        self.latency.ensure(&self.config.servers);

        let mut families = vec![histogram_family(
            "ntp_latency_seconds",
            "Histogram of latency of NTP sync requests.",
            "server",
            &self.latency.histograms(),
        )];
        families.extend(self.sync_errors.collect());
        families
    }
}
