//! Exporter
//!
//! Composes the probe collectors and serves them over HTTP.
//!
//! # Routes
//!
//! - `GET /metrics`: runs one cycle of every collector and returns the
//!   Prometheus text format
//! - `GET /healthz`: liveness, always `ok`
//! - anything else: 404

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{debug, error, info, instrument};

use crate::collector::ProbeCollector;
use crate::error::{Error, Result};

/// A fixed set of collectors gathered together on every scrape.
#[derive(Clone)]
pub struct Exporter {
    collectors: Arc<Vec<Arc<dyn ProbeCollector>>>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.collectors.iter().map(|c| c.name()).collect();
        f.debug_struct("Exporter")
            .field("collectors", &names)
            .finish()
    }
}

impl Exporter {
    pub fn new(collectors: Vec<Arc<dyn ProbeCollector>>) -> Result<Self> {
        if collectors.is_empty() {
            return Err(Error::Config("at least one collector is required".into()));
        }
        Ok(Self {
            collectors: Arc::new(collectors),
        })
    }

    /// Run every collector concurrently and merge their families.
    ///
    /// Families without samples are dropped.
    #[instrument(skip(self))]
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let results = join_all(self.collectors.iter().map(|c| c.collect())).await;

        let families: Vec<MetricFamily> = results
            .into_iter()
            .flatten()
            .filter(|family| !family.get_metric().is_empty())
            .collect();

        debug!(families = families.len(), "Gathered metric families");
        families
    }

    /// Gather and encode in the Prometheus text format.
    pub async fn encode(&self) -> Result<Vec<u8>> {
        let families = self.gather().await;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        match req.uri().path() {
            "/metrics" => match self.encode().await {
                Ok(body) => {
                    let mut response = Response::new(Full::new(Bytes::from(body)));
                    response.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static(prometheus::TEXT_FORMAT),
                    );
                    response
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode metrics");
                    status_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            },
            "/healthz" => status_response(StatusCode::OK, "ok"),
            _ => status_response(StatusCode::NOT_FOUND, "not found"),
        }
    }

    /// Bind `addr` and serve until the accept loop fails.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "Metrics server listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let exporter = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let exporter = exporter.clone();
                    async move { Ok::<_, Infallible>(exporter.handle(req).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(peer = %peer, error = %e, "Metrics server connection error");
                }
            });
        }
    }
}

fn status_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::gauge_family;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct Fixed(&'static str, f64);

    #[async_trait]
    impl ProbeCollector for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn collect(&self) -> Vec<MetricFamily> {
            let mut empty = MetricFamily::default();
            empty.set_name(format!("{}_empty", self.0));
            vec![gauge_family(self.0, "Fixed value.", self.1), empty]
        }
    }

    fn exporter() -> Exporter {
        Exporter::new(vec![
            Arc::new(Fixed("first", 1.0)),
            Arc::new(Fixed("second", 2.0)),
        ])
        .unwrap()
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_new_requires_collectors() {
        assert_matches!(Exporter::new(vec![]), Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_gather_drops_empty_families() {
        let names: Vec<String> = exporter()
            .gather()
            .await
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_encode_text_format() {
        let text = String::from_utf8(exporter().encode().await.unwrap()).unwrap();
        assert!(text.contains("# TYPE first gauge"));
        assert!(text.contains("second 2"));
        assert!(!text.contains("_empty"));
    }

    #[tokio::test]
    async fn test_serve_routes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(exporter().serve_on(listener));

        let metrics = get(addr, "/metrics").await;
        assert!(metrics.starts_with("HTTP/1.1 200"));
        assert!(metrics.contains("text/plain; version=0.0.4"));
        assert!(metrics.contains("first 1"));

        let health = get(addr, "/healthz").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.ends_with("ok"));

        let missing = get(addr, "/nope").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }
}
