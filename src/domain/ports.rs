//! Domain Ports (Port/Adapter Pattern)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Collectors                              │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  ServiceDiscovery │ PodLookup │ Resolver │ Dialer   │    │
//! │  │  TimeSource │ CommandRunner                          │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  KubernetesDiscovery │ SystemResolver │ TcpDialer           │
//! │  SntpClient │ ProcessRunner │ in-memory doubles              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ports do not apply timeouts; collectors bound every call themselves.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// State of the pod owning an IP, as seen by the Kubernetes API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodState {
    /// No pod has this IP
    Missing,
    /// A pod has this IP and is not being deleted
    Running,
    /// A pod has this IP and carries a deletion timestamp
    Terminating,
}

impl PodState {
    /// Whether a dial failure against this pod is expected.
    pub fn is_gone(&self) -> bool {
        matches!(self, PodState::Missing | PodState::Terminating)
    }
}

impl std::fmt::Display for PodState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodState::Missing => write!(f, "missing"),
            PodState::Running => write!(f, "running"),
            PodState::Terminating => write!(f, "terminating"),
        }
    }
}

/// Result of a single NTP client exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct NtpResponse {
    /// Stratum reported by the server
    pub stratum: u8,
    /// Estimated local clock offset from the server, in seconds
    pub offset: f64,
    /// Round-trip delay reported by the exchange
    pub round_trip: Duration,
}

// =============================================================================
// Discovery Ports
// =============================================================================

/// Port for finding the exporter service and its peer instances.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Stable cluster address of the service.
    async fn service_address(&self, namespace: &str, service: &str) -> Result<String>;

    /// IPs of every ready endpoint behind the service, self included.
    async fn endpoint_addresses(&self, namespace: &str, service: &str) -> Result<Vec<String>>;
}

/// Port for checking whether the pod behind an IP still exists.
#[async_trait]
pub trait PodLookup: Send + Sync {
    /// State of the pod with `ip` in `namespace`.
    async fn pod_state(&self, namespace: &str, ip: &str) -> Result<PodState>;
}

// =============================================================================
// Probe Ports
// =============================================================================

/// Port for hostname resolution.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` to its addresses.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Port for TCP reachability checks.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a connection to `address` (`host:port`) and close it again.
    async fn dial(&self, address: &str) -> Result<()>;
}

/// Port for NTP time queries.
#[async_trait]
pub trait TimeSource: Send + Sync {
    /// Perform one client exchange with `server`.
    async fn query(&self, server: &str) -> Result<NtpResponse>;
}

/// Port for running a local command and capturing its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its stdout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_state_is_gone() {
        assert!(PodState::Missing.is_gone());
        assert!(PodState::Terminating.is_gone());
        assert!(!PodState::Running.is_gone());
    }

    #[test]
    fn test_pod_state_display() {
        assert_eq!(PodState::Missing.to_string(), "missing");
        assert_eq!(PodState::Running.to_string(), "running");
        assert_eq!(PodState::Terminating.to_string(), "terminating");
    }
}
