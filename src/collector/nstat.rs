//! Kernel network counter collector backed by `nstat`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{IntCounter, Opts};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::{gauge_family, timed, validate_timeout, ProbeCollector};
use crate::domain::ports::CommandRunner;
use crate::error::{Error, Result};

const NAMESPACE: &str = "nstat";
const NSTAT_ARGS: &[&str] = &["-a", "--json"];

/// Output of `nstat -a --json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NstatReport {
    /// Counter name to absolute value
    pub kernel: BTreeMap<String, f64>,
}

impl NstatReport {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| Error::Parse(format!("nstat output: {}", e)))
    }
}

/// nstat collector configuration.
#[derive(Debug, Clone)]
pub struct NstatConfig {
    /// Path to the nstat binary
    pub path: String,
    pub timeout: Duration,
}

impl Default for NstatConfig {
    fn default() -> Self {
        Self {
            path: "/sbin/nstat".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Metric name for an nstat counter.
fn metric_name(field: &str) -> String {
    let sanitized: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}", NAMESPACE, sanitized)
}

/// Exposes every kernel counter reported by `nstat` as a gauge.
pub struct NstatCollector {
    config: NstatConfig,
    runner: Arc<dyn CommandRunner>,
    errors: IntCounter,
    cycle: Mutex<()>,
}

impl std::fmt::Debug for NstatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NstatCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NstatCollector {
    pub fn new(config: NstatConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        if config.path.trim().is_empty() {
            return Err(Error::Config("nstat path must not be empty".into()));
        }
        validate_timeout(NAMESPACE, config.timeout)?;

        let errors = IntCounter::with_opts(Opts::new(
            "nstat_error_total",
            "Total number of failed nstat runs.",
        ))?;

        Ok(Self {
            config,
            runner,
            errors,
            cycle: Mutex::new(()),
        })
    }

    async fn report(&self) -> Result<NstatReport> {
        let path = self.config.path.as_str();
        let (raw, _) = timed(path, self.config.timeout, self.runner.run(path, NSTAT_ARGS)).await?;
        NstatReport::parse(&raw)
    }
}

#[async_trait]
impl ProbeCollector for NstatCollector {
    fn name(&self) -> &'static str {
        NAMESPACE
    }

    #[instrument(skip(self), fields(collector = NAMESPACE))]
    async fn collect(&self) -> Vec<MetricFamily> {
        let _cycle = self.cycle.lock().await;

        let mut families = match self.report().await {
            Ok(report) => {
                debug!(counters = report.kernel.len(), "Read nstat counters");
                report
                    .kernel
                    .iter()
                    .map(|(field, &value)| {
                        gauge_family(
                            &metric_name(field),
                            &format!("Generated description for metric `{}`.", field),
                            value,
                        )
                    })
                    .collect()
            }
            Err(e) => {
                warn!(path = %self.config.path, error = %e, "Could not read nstat counters");
                self.errors.inc();
                Vec::new()
            }
        };

        families.extend(self.errors.collect());
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ProbeOutcome, ScriptedProber};
    use assert_matches::assert_matches;

    const SAMPLE: &[u8] = br#"{"kernel":{"IpInReceives":1024,"TcpActiveOpens":12,"TcpExtTCPHPHits":7}}"#;

    fn collector(outcome: ProbeOutcome) -> NstatCollector {
        let prober = Arc::new(ScriptedProber::new().with("/sbin/nstat", outcome));
        NstatCollector::new(NstatConfig::default(), prober).unwrap()
    }

    #[test]
    fn test_parse_report() {
        let report = NstatReport::parse(SAMPLE).unwrap();
        assert_eq!(report.kernel.len(), 3);
        assert_eq!(report.kernel["TcpActiveOpens"], 12.0);
    }

    #[test]
    fn test_parse_rejects_bad_schema() {
        assert_matches!(NstatReport::parse(b"not json"), Err(Error::Parse(_)));
        assert_matches!(NstatReport::parse(br#"{"net":{}}"#), Err(Error::Parse(_)));
        assert_matches!(
            NstatReport::parse(br#"{"kernel":{"IpInReceives":"many"}}"#),
            Err(Error::Parse(_))
        );
    }

    #[test]
    fn test_metric_name() {
        assert_eq!(metric_name("TcpActiveOpens"), "nstat_TcpActiveOpens");
        assert_eq!(metric_name("Ip6In.Receives"), "nstat_Ip6In_Receives");
    }

    #[test]
    fn test_debug_shows_config() {
        let debug = format!("{:?}", collector(ProbeOutcome::Succeed));
        assert!(debug.starts_with("NstatCollector"));
        assert!(debug.contains("/sbin/nstat"));
    }

    #[test]
    fn test_new_rejects_empty_path() {
        let config = NstatConfig {
            path: "".into(),
            ..Default::default()
        };
        assert_matches!(
            NstatCollector::new(config, Arc::new(ScriptedProber::new())),
            Err(Error::Config(_))
        );
    }

    #[tokio::test]
    async fn test_collect_emits_gauges() {
        let collector = collector(ProbeOutcome::Output(SAMPLE.to_vec()));

        let families = collector.collect().await;
        let names: Vec<&str> = families.iter().map(|f| f.name()).collect();

        assert_eq!(
            names,
            vec![
                "nstat_IpInReceives",
                "nstat_TcpActiveOpens",
                "nstat_TcpExtTCPHPHits",
                "nstat_error_total"
            ]
        );
        assert_eq!(collector.errors.get(), 0);
    }

    #[tokio::test]
    async fn test_collect_contains_failures() {
        let failing = collector(ProbeOutcome::Fail("not found".into()));
        failing.collect().await;
        assert_eq!(failing.errors.get(), 1);

        let garbled = collector(ProbeOutcome::Output(b"{".to_vec()));
        let families = garbled.collect().await;
        assert_eq!(garbled.errors.get(), 1);
        assert_eq!(families.len(), 1);
    }
}
