//! In-Memory Adapters
//!
//! Scriptable implementations of every port, used by unit and integration
//! tests to drive collectors without a cluster or network.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ports::{
    CommandRunner, Dialer, NtpResponse, PodLookup, PodState, Resolver, ServiceDiscovery,
    TimeSource,
};
use crate::error::{Error, Result};

// =============================================================================
// Cluster
// =============================================================================

/// In-memory stand-in for the Kubernetes API.
///
/// Unknown pod IPs report [`PodState::Missing`].
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    service_address: RwLock<Option<String>>,
    endpoints: RwLock<Vec<String>>,
    pods: RwLock<HashMap<String, PodState>>,
    failing_lookups: RwLock<HashSet<String>>,
    discovery_down: RwLock<bool>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service cluster IP.
    pub fn set_service_address(&self, address: impl Into<String>) {
        *self.service_address.write() = Some(address.into());
    }

    /// Replace the endpoint list.
    pub fn set_endpoints<I, S>(&self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.endpoints.write() = addresses.into_iter().map(Into::into).collect();
    }

    /// Record the state of the pod owning `ip`.
    pub fn set_pod(&self, ip: impl Into<String>, state: PodState) {
        self.pods.write().insert(ip.into(), state);
    }

    /// Make pod lookups for `ip` fail.
    pub fn fail_pod_lookup(&self, ip: impl Into<String>) {
        self.failing_lookups.write().insert(ip.into());
    }

    /// Make service and endpoint discovery fail (or recover).
    pub fn set_discovery_down(&self, down: bool) {
        *self.discovery_down.write() = down;
    }
}

#[async_trait]
impl ServiceDiscovery for InMemoryCluster {
    async fn service_address(&self, namespace: &str, service: &str) -> Result<String> {
        if *self.discovery_down.read() {
            return Err(Error::Discovery(format!(
                "service {}/{} unavailable",
                namespace, service
            )));
        }

        self.service_address.read().clone().ok_or_else(|| {
            Error::Discovery(format!("service {}/{} has no cluster IP", namespace, service))
        })
    }

    async fn endpoint_addresses(&self, namespace: &str, service: &str) -> Result<Vec<String>> {
        if *self.discovery_down.read() {
            return Err(Error::Discovery(format!(
                "endpoints {}/{} unavailable",
                namespace, service
            )));
        }

        Ok(self.endpoints.read().clone())
    }
}

#[async_trait]
impl PodLookup for InMemoryCluster {
    async fn pod_state(&self, _namespace: &str, ip: &str) -> Result<PodState> {
        if self.failing_lookups.read().contains(ip) {
            return Err(Error::Discovery(format!("pod lookup for {} failed", ip)));
        }

        Ok(self
            .pods
            .read()
            .get(ip)
            .copied()
            .unwrap_or(PodState::Missing))
    }
}

// =============================================================================
// Probes
// =============================================================================

/// Scripted behaviour of one probe target.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Succeed immediately
    Succeed,
    /// Succeed after sleeping
    Delay(Duration),
    /// Fail with the given reason
    Fail(String),
    /// Never complete
    Hang,
    /// Succeed, returning these bytes from `CommandRunner::run`
    Output(Vec<u8>),
}

/// Scripted prober implementing every probe port.
///
/// Targets without a script succeed.
#[derive(Debug, Default)]
pub struct ScriptedProber {
    outcomes: RwLock<HashMap<String, ProbeOutcome>>,
    calls: RwLock<Vec<String>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for `target`.
    pub fn script(&self, target: impl Into<String>, outcome: ProbeOutcome) {
        self.outcomes.write().insert(target.into(), outcome);
    }

    /// Builder form of [`ScriptedProber::script`].
    pub fn with(self, target: impl Into<String>, outcome: ProbeOutcome) -> Self {
        self.script(target, outcome);
        self
    }

    /// Every target probed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    /// Number of probes made against `target`.
    pub fn call_count(&self, target: &str) -> usize {
        self.calls.read().iter().filter(|t| *t == target).count()
    }

    async fn play(&self, target: &str) -> Result<Vec<u8>> {
        self.calls.write().push(target.to_string());

        let outcome = self
            .outcomes
            .read()
            .get(target)
            .cloned()
            .unwrap_or(ProbeOutcome::Succeed);

        match outcome {
            ProbeOutcome::Succeed => Ok(Vec::new()),
            ProbeOutcome::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Vec::new())
            }
            ProbeOutcome::Fail(reason) => Err(Error::probe(target, reason)),
            ProbeOutcome::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
            ProbeOutcome::Output(bytes) => Ok(bytes),
        }
    }
}

#[async_trait]
impl Resolver for ScriptedProber {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.play(host).await?;
        Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
    }
}

#[async_trait]
impl Dialer for ScriptedProber {
    async fn dial(&self, address: &str) -> Result<()> {
        self.play(address).await?;
        Ok(())
    }
}

#[async_trait]
impl TimeSource for ScriptedProber {
    async fn query(&self, server: &str) -> Result<NtpResponse> {
        self.play(server).await?;
        Ok(NtpResponse {
            stratum: 2,
            offset: 0.0,
            round_trip: Duration::from_millis(1),
        })
    }
}

#[async_trait]
impl CommandRunner for ScriptedProber {
    async fn run(&self, program: &str, _args: &[&str]) -> Result<Vec<u8>> {
        self.play(program).await
    }
}

// =============================================================================
// Tests
// =============================================================================
