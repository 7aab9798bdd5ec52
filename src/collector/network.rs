//! In-cluster TCP reachability collector.
//!
//! Dials the exporter's own service and a handful of peer instances chosen by
//! [`calculate_neighbours`], recording connect latency per `ip:port`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{IntCounter, IntCounterVec, Opts};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::{exponential_buckets, histogram_family, timed, validate_timeout, ProbeCollector};
use crate::adapters::local_ip;
use crate::domain::ports::{Dialer, PodLookup, PodState, ServiceDiscovery};
use crate::error::{Error, Result};
use crate::histogram::HistogramVec;
use crate::neighbours::{calculate_neighbours, DEFAULT_NEIGHBOURS};

const NAMESPACE: &str = "network";

/// Network collector configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Namespace of the exporter service
    pub namespace: String,
    /// Name of the exporter service
    pub service: String,
    /// Port every exporter instance listens on
    pub port: u16,
    /// Upper bound for a single dial
    pub timeout: Duration,
    /// Number of peers to dial each cycle
    pub neighbours: usize,
    /// This instance's pod IP; detected from the default route when unset
    pub pod_ip: Option<String>,
    /// Histogram bucket limits in seconds
    pub buckets: Vec<f64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            namespace: "monitoring".to_string(),
            service: "net-exporter".to_string(),
            port: 8000,
            timeout: Duration::from_secs(5),
            neighbours: DEFAULT_NEIGHBOURS,
            pod_ip: None,
            buckets: exponential_buckets(0.001, 2.0, 5),
        }
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Config("network namespace must not be empty".into()));
        }
        if self.service.trim().is_empty() {
            return Err(Error::Config("network service must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("network port must not be zero".into()));
        }
        if matches!(&self.pod_ip, Some(ip) if ip.trim().is_empty()) {
            return Err(Error::Config("network pod IP must not be blank".into()));
        }
        validate_timeout(NAMESPACE, self.timeout)
    }
}

/// Result of dialing one target.
#[derive(Debug)]
pub enum DialOutcome {
    /// Connected; latency recorded
    Recorded(Duration),
    /// Failed and counted as a dial error
    Failed(Error),
    /// Failed against a pod that is gone or going; not counted
    Suppressed(PodState),
}

/// A single dial target for this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    /// `ip:port`, used as the histogram label
    address: String,
    /// Pod IP for peers; `None` for the service address
    peer_ip: Option<String>,
}

fn join_host_port(ip: &str, port: u16) -> String {
    if ip.contains(':') {
        format!("[{}]:{}", ip, port)
    } else {
        format!("{}:{}", ip, port)
    }
}

/// Measures TCP connect latency to the exporter service and its neighbours.
pub struct NetworkCollector {
    config: NetworkConfig,
    discovery: Arc<dyn ServiceDiscovery>,
    pods: Arc<dyn PodLookup>,
    dialer: Arc<dyn Dialer>,
    latency: HistogramVec,
    errors: IntCounter,
    dial_errors: IntCounterVec,
    cycle: Mutex<()>,
}

impl std::fmt::Debug for NetworkCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NetworkCollector {
    pub fn new(
        config: NetworkConfig,
        discovery: Arc<dyn ServiceDiscovery>,
        pods: Arc<dyn PodLookup>,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self> {
        config.validate()?;

        let latency = HistogramVec::new(&config.buckets)?;
        let errors = IntCounter::with_opts(Opts::new(
            "network_error_total",
            "Total number of internal errors.",
        ))?;
        let dial_errors = IntCounterVec::new(
            Opts::new("network_dial_error_total", "Total number of dial errors."),
            &["host"],
        )?;

        Ok(Self {
            config,
            discovery,
            pods,
            dialer,
            latency,
            errors,
            dial_errors,
            cycle: Mutex::new(()),
        })
    }

    fn self_ip(&self) -> Result<String> {
        match &self.config.pod_ip {
            Some(ip) => Ok(ip.clone()),
            None => Ok(local_ip()?.to_string()),
        }
    }

    /// Service address first, then the selected neighbours.
    async fn targets(&self) -> Result<Vec<Target>> {
        let namespace = &self.config.namespace;
        let service = &self.config.service;

        let service_ip = self.discovery.service_address(namespace, service).await?;
        let endpoints = self.discovery.endpoint_addresses(namespace, service).await?;
        let self_ip = self.self_ip()?;

        let neighbours = calculate_neighbours(self.config.neighbours, &self_ip, &endpoints);
        debug!(self_ip = %self_ip, neighbours = ?neighbours, "Computed neighbours");

        let mut targets = vec![Target {
            address: join_host_port(&service_ip, self.config.port),
            peer_ip: None,
        }];
        targets.extend(neighbours.into_iter().map(|ip| Target {
            address: join_host_port(&ip, self.config.port),
            peer_ip: Some(ip),
        }));

        Ok(targets)
    }

    async fn dial(&self, target: &Target) -> DialOutcome {
        let address = target.address.as_str();
        let dial_error = match timed(address, self.config.timeout, self.dialer.dial(address)).await
        {
            Ok(((), elapsed)) => return DialOutcome::Recorded(elapsed),
            Err(e) => e,
        };

        let Some(ip) = &target.peer_ip else {
            return DialOutcome::Failed(dial_error);
        };

        match self.pods.pod_state(&self.config.namespace, ip).await {
            Ok(state) if state.is_gone() => DialOutcome::Suppressed(state),
            Ok(_) => DialOutcome::Failed(dial_error),
            Err(e) => {
                error!(host = %address, error = %e, "Unable to check whether host still exists");
                DialOutcome::Failed(dial_error)
            }
        }
    }

    async fn probe(&self, target: &Target) {
        let address = target.address.as_str();
        match self.dial(target).await {
            DialOutcome::Recorded(elapsed) => {
                if let Err(e) = self.latency.add(address, elapsed.as_secs_f64()) {
                    warn!(host = %address, error = %e, "Failed to record network latency");
                    self.dial_errors.with_label_values(&[address]).inc();
                }
            }
            DialOutcome::Failed(e) => {
                warn!(host = %address, error = %e, "Could not dial host");
                self.dial_errors.with_label_values(&[address]).inc();
            }
            DialOutcome::Suppressed(state) => {
                info!(host = %address, pod = %state, "Ignoring dial error for departed pod");
            }
        }
    }

    fn families(&self) -> Vec<MetricFamily> {
        let mut families = vec![histogram_family(
            "network_latency_seconds",
            "Histogram of latency of network dials.",
            "host",
            &self.latency.histograms(),
        )];
        families.extend(self.errors.collect());
        families.extend(self.dial_errors.collect());
        families
    }
}

#[async_trait]
impl ProbeCollector for NetworkCollector {
    fn name(&self) -> &'static str {
        NAMESPACE
    }

    #[instrument(skip(self), fields(collector = NAMESPACE))]
    async fn collect(&self) -> Vec<MetricFamily> {
        let _cycle = self.cycle.lock().await;

        let targets = match self.targets().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(
                    namespace = %self.config.namespace,
                    service = %self.config.service,
                    error = %e,
                    "Could not resolve network targets"
                );
                self.errors.inc();
                let mut families: Vec<MetricFamily> = self.errors.collect();
                families.extend(self.dial_errors.collect());
                return families;
            }
        };

        join_all(targets.iter().map(|target| self.probe(target))).await;
        self.latency
            .ensure(targets.iter().map(|target| target.address.as_str()));

        self.families()
    }
}

// =============================================================================
// Tests
// =============================================================================
