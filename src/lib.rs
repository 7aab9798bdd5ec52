//! net-exporter - Network health exporter for Kubernetes clusters
//!
//! Probes DNS resolution, in-cluster TCP reachability and NTP from every node
//! and exposes the results as Prometheus latency histograms and error counters.
//!
//! # Architecture
//!
//! Probing is pull-driven: each scrape runs one cycle of every collector.
//!
//! ```text
//! GET /metrics → Exporter → ┬─ DnsCollector ─────► Resolver
//!                           ├─ NetworkCollector ─► ServiceDiscovery, PodLookup, Dialer
//!                           ├─ NtpCollector ─────► TimeSource
//!                           └─ NstatCollector ───► CommandRunner
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Kubernetes, tokio and in-memory implementations of the ports
//! - [`collector`] - Probe collectors and metric family builders
//! - [`domain`] - Ports the collectors depend on
//! - [`error`] - Error types
//! - [`exporter`] - Collector composition and HTTP serving
//! - [`histogram`] - Cumulative histograms keyed by label
//! - [`neighbours`] - Ring-based peer selection

pub mod adapters;
pub mod collector;
pub mod domain;
pub mod error;
pub mod exporter;
pub mod histogram;
pub mod neighbours;

// Re-export commonly used types
pub use collector::{
    DnsCollector, DnsConfig, NetworkCollector, NetworkConfig, NstatCollector, NstatConfig,
    NtpCollector, NtpConfig, ProbeCollector,
};
pub use error::{Error, Result};
pub use exporter::Exporter;
pub use histogram::{Histogram, HistogramSnapshot, HistogramVec};
pub use neighbours::calculate_neighbours;
