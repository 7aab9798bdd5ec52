//! Kubernetes Discovery Adapter
//!
//! Implements `ServiceDiscovery` and `PodLookup` against the Kubernetes API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Pod, Service};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, instrument};

use crate::domain::ports::{PodLookup, PodState, ServiceDiscovery};
use crate::error::{Error, Result};

/// Kubernetes-backed discovery of the exporter's own service and pods.
#[derive(Clone)]
pub struct KubernetesDiscovery {
    client: Client,
}

impl KubernetesDiscovery {
    /// Create a new discovery adapter.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for KubernetesDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesDiscovery").finish_non_exhaustive()
    }
}

/// Pull endpoint IPs out of an Endpoints object.
fn endpoint_ips(endpoints: Endpoints) -> Vec<String> {
    endpoints
        .subsets
        .unwrap_or_default()
        .into_iter()
        .flat_map(|subset| subset.addresses.unwrap_or_default())
        .map(|address| address.ip)
        .collect()
}

/// Classify the pods matching a single pod IP.
fn classify_pods(ip: &str, pods: &[Pod]) -> Result<PodState> {
    match pods {
        [] => Ok(PodState::Missing),
        [pod] if pod.metadata.deletion_timestamp.is_some() => Ok(PodState::Terminating),
        [_] => Ok(PodState::Running),
        _ => Err(Error::Discovery(format!(
            "{} pods found with IP {}",
            pods.len(),
            ip
        ))),
    }
}

#[async_trait]
impl ServiceDiscovery for KubernetesDiscovery {
    #[instrument(skip(self))]
    async fn service_address(&self, namespace: &str, service: &str) -> Result<String> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);

        let svc = api.get(service).await.map_err(|e| {
            Error::Discovery(format!(
                "could not get service {}/{}: {}",
                namespace, service, e
            ))
        })?;

        let cluster_ip = svc
            .spec
            .and_then(|spec| spec.cluster_ip)
            .filter(|ip| !ip.is_empty() && ip != "None")
            .ok_or_else(|| {
                Error::Discovery(format!(
                    "service {}/{} has no cluster IP",
                    namespace, service
                ))
            })?;

        debug!(cluster_ip = %cluster_ip, "Resolved service address");
        Ok(cluster_ip)
    }

    #[instrument(skip(self))]
    async fn endpoint_addresses(&self, namespace: &str, service: &str) -> Result<Vec<String>> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);

        let endpoints = api.get(service).await.map_err(|e| {
            Error::Discovery(format!(
                "could not get endpoints for service {}/{}: {}",
                namespace, service, e
            ))
        })?;

        let ips = endpoint_ips(endpoints);
        debug!(count = ips.len(), "Listed service endpoints");
        Ok(ips)
    }
}

#[async_trait]
impl PodLookup for KubernetesDiscovery {
    #[instrument(skip(self))]
    async fn pod_state(&self, namespace: &str, ip: &str) -> Result<PodState> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let params = ListParams::default().fields(&format!("status.podIP={}", ip));
        let pods = api.list(&params).await.map_err(|e| {
            Error::Discovery(format!("could not list pods with IP {}: {}", ip, e))
        })?;

        classify_pods(ip, &pods.items)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn address(ip: &str) -> EndpointAddress {
        EndpointAddress {
            ip: ip.to_string(),
            ..Default::default()
        }
    }

    fn pod(deleting: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("net-exporter-abcde".into()),
                deletion_timestamp: deleting.then(|| Time(Default::default())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_ips_flattens_subsets() {
        let endpoints = Endpoints {
            subsets: Some(vec![
                EndpointSubset {
                    addresses: Some(vec![address("10.0.0.1"), address("10.0.0.2")]),
                    ..Default::default()
                },
                EndpointSubset {
                    addresses: None,
                    ..Default::default()
                },
                EndpointSubset {
                    addresses: Some(vec![address("10.0.1.1")]),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        assert_eq!(
            endpoint_ips(endpoints),
            vec!["10.0.0.1", "10.0.0.2", "10.0.1.1"]
        );
    }

    #[test]
    fn test_endpoint_ips_empty() {
        assert!(endpoint_ips(Endpoints::default()).is_empty());
    }

    #[test]
    fn test_classify_pods() {
        assert_eq!(classify_pods("10.0.0.1", &[]).unwrap(), PodState::Missing);
        assert_eq!(
            classify_pods("10.0.0.1", &[pod(false)]).unwrap(),
            PodState::Running
        );
        assert_eq!(
            classify_pods("10.0.0.1", &[pod(true)]).unwrap(),
            PodState::Terminating
        );
        assert_matches!(
            classify_pods("10.0.0.1", &[pod(false), pod(false)]),
            Err(Error::Discovery(_))
        );
    }
}
