//! Domain Layer
//!
//! Trait abstractions (ports) for everything a probe cycle talks to: service
//! discovery, pod state, name resolution, TCP dialing, NTP and local commands.
//! Collectors depend only on these traits; [`crate::adapters`] provides the
//! Kubernetes, tokio and in-memory implementations.

pub mod ports;

pub use ports::{
    CommandRunner, Dialer, NtpResponse, PodLookup, PodState, Resolver, ServiceDiscovery,
    TimeSource,
};
