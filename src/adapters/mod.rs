//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  ServiceDiscovery │ PodLookup │ Resolver │ Dialer          │ │
//! │  │  TimeSource │ CommandRunner                                 │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ KubernetesDiscovery │ SystemResolver │ TcpDialer           │ │
//! │  │ SntpClient │ ProcessRunner │ InMemoryCluster │ ScriptedProber│ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use net_exporter::adapters::{KubernetesDiscovery, TcpDialer};
//! use net_exporter::domain::ports::ServiceDiscovery;
//!
//! let discovery = KubernetesDiscovery::new(client);
//! let ips = discovery.endpoint_addresses("monitoring", "net-exporter").await?;
//! ```

mod kubernetes;
mod memory;
mod net;
mod ntp;
mod process;

pub use kubernetes::KubernetesDiscovery;
pub use memory::{InMemoryCluster, ProbeOutcome, ScriptedProber};
pub use net::{local_ip, SystemResolver, TcpDialer};
pub use ntp::{SntpClient, NTP_PORT};
pub use process::ProcessRunner;
