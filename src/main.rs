//! net-exporter
//!
//! Runs on every node and exposes network health metrics for Prometheus.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          net-exporter                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐         │
//! │  │   DNS    │  │ Network  │  │   NTP    │  │  nstat   │         │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘  └────┬─────┘         │
//! │       └─────────────┴──────┬──────┴─────────────┘               │
//! │                      ┌─────▼─────┐                               │
//! │                      │ Exporter  │ ◀── GET /metrics, /healthz    │
//! │                      └───────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use net_exporter::adapters::{
    local_ip, KubernetesDiscovery, ProcessRunner, SntpClient, SystemResolver, TcpDialer,
};
use net_exporter::collector::{split_list, ProbeCollector};
use net_exporter::error::{Error, Result};
use net_exporter::{
    DnsCollector, DnsConfig, Exporter, NetworkCollector, NetworkConfig, NstatCollector,
    NstatConfig, NtpCollector, NtpConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// net-exporter - DNS, network and NTP health metrics for Prometheus
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DNS hosts to resolve, comma-separated
    #[arg(
        long,
        env = "HOSTS",
        default_value = "giantswarm.io.,kubernetes.default.svc.cluster.local."
    )]
    hosts: String,

    /// Namespace of the net-exporter service
    #[arg(long, env = "NAMESPACE", default_value = "monitoring")]
    namespace: String,

    /// Name of the net-exporter service
    #[arg(long, env = "SERVICE", default_value = "net-exporter")]
    service: String,

    /// Port net-exporter instances listen on
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// NTP servers to query, comma-separated
    #[arg(
        long,
        env = "NTP_SERVERS",
        default_value = "0.flatcar.pool.ntp.org,1.flatcar.pool.ntp.org"
    )]
    ntp_servers: String,

    /// Per-probe timeout in seconds
    #[arg(long, env = "TIMEOUT_SECONDS", default_value = "5")]
    timeout_seconds: u64,

    /// Number of neighbours to dial each cycle
    #[arg(long, env = "NEIGHBOURS", default_value = "2")]
    neighbours: usize,

    /// This pod's IP (detected from the default route when unset)
    #[arg(long, env = "POD_IP")]
    pod_ip: Option<String>,

    /// Expose kernel counters from nstat
    #[arg(long, env = "ENABLE_NSTAT")]
    enable_nstat: bool,

    /// Path to the nstat binary
    #[arg(long, env = "NSTAT_PATH", default_value = "/sbin/nstat")]
    nstat_path: String,

    /// Metrics and health server bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    listen_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting net-exporter");
    info!("  DNS hosts: {}", args.hosts);
    info!("  NTP servers: {}", args.ntp_servers);
    info!("  Service: {}/{}:{}", args.namespace, args.service, args.port);
    info!("  Neighbours: {}", args.neighbours);
    info!("  nstat: {}", args.enable_nstat);

    let listen_addr: SocketAddr = args
        .listen_addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))?;
    let timeout = Duration::from_secs(args.timeout_seconds);

    let client = Client::try_default().await.map_err(|e| {
        error!("Failed to create Kubernetes client: {}", e);
        Error::Internal(format!("Kubernetes client creation failed: {}", e))
    })?;

    info!("Connected to Kubernetes cluster");

    let pod_ip = match args.pod_ip.clone() {
        Some(ip) => ip,
        None => {
            let ip = local_ip()?.to_string();
            warn!(pod_ip = %ip, "POD_IP not set, using default route address");
            ip
        }
    };

    let discovery = Arc::new(KubernetesDiscovery::new(client));

    let mut collectors: Vec<Arc<dyn ProbeCollector>> = vec![
        Arc::new(DnsCollector::new(
            DnsConfig {
                hosts: split_list(&args.hosts),
                timeout,
                ..Default::default()
            },
            Arc::new(SystemResolver::new()),
        )?),
        Arc::new(NetworkCollector::new(
            NetworkConfig {
                namespace: args.namespace.clone(),
                service: args.service.clone(),
                port: args.port,
                timeout,
                neighbours: args.neighbours,
                pod_ip: Some(pod_ip),
                ..Default::default()
            },
            discovery.clone(),
            discovery,
            Arc::new(TcpDialer::new()),
        )?),
        Arc::new(NtpCollector::new(
            NtpConfig {
                servers: split_list(&args.ntp_servers),
                timeout,
                ..Default::default()
            },
            Arc::new(SntpClient::new()),
        )?),
    ];

    if args.enable_nstat {
        collectors.push(Arc::new(NstatCollector::new(
            NstatConfig {
                path: args.nstat_path.clone(),
                timeout,
            },
            Arc::new(ProcessRunner::new()),
        )?));
    }

    let exporter = Exporter::new(collectors)?;
    info!(exporter = ?exporter, "Collectors initialized");

    tokio::select! {
        result = exporter.serve(listen_addr) => {
            if let Err(e) = &result {
                error!("Metrics server error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    info!("net-exporter shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level: LevelFilter = args
        .log_level
        .parse()
        .map_err(|e| Error::Config(format!("Invalid log level {}: {}", args.log_level, e)))?;

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        let directive: Directive = directive
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid log directive: {}", e)))?;
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
