//! Kubernetes client for clusterscope

use anyhow::{Context, Result};
use futures::AsyncBufRead;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::Api;
use kube::api::{ApiResource, DynamicObject, ListParams, LogParams};
use kube::config::KubeConfigOptions;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use clusterscope_types::{LogStart, ResourceInfo};

use crate::quantity::{parse_cpu_millis, parse_memory_bytes};

/// An open, line-oriented pod log stream
pub type LogReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Live resource usage of one node, from the metrics API
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeUsage {
    pub cpu_millis: u64,
    pub memory_bytes: u64,
}

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    /// Connect using in-cluster credentials, falling back to the local kubeconfig
    pub async fn connect() -> Result<Self> {
        let config = match kube::Config::incluster() {
            Ok(config) => {
                info!("Using in-cluster Kubernetes config");
                config
            }
            Err(err) => {
                warn!(error = %err, "In-cluster config failed, falling back to kubeconfig");
                kube::Config::from_kubeconfig(&KubeConfigOptions::default())
                    .await
                    .context("Failed to read kubeconfig. Is kubectl configured?")?
            }
        };

        let client =
            kube::Client::try_from(config).context("Failed to create Kubernetes client")?;
        info!("Kubernetes client initialised");

        Ok(Self { client })
    }

    /// Fetch all pods in a namespace with their node assignment
    pub async fn list_pods(&self, namespace: &str) -> Result<Vec<ResourceInfo>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default())
            .await
            .context(format!("Failed to list pods in {}", namespace))?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| ResourceInfo {
                namespace: pod
                    .metadata
                    .namespace
                    .unwrap_or_else(|| namespace.to_string()),
                name: pod.metadata.name.unwrap_or_default(),
                node_name: pod.spec.and_then(|s| s.node_name),
            })
            .collect())
    }

    /// Fetch every pod in the cluster
    pub async fn all_pods(&self) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default())
            .await
            .context("Failed to list pods")?;
        Ok(list.items)
    }

    /// Fetch every node in the cluster
    pub async fn all_nodes(&self) -> Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .context("Failed to list nodes")?;
        Ok(list.items)
    }

    /// Fetch node usage from the metrics server
    ///
    /// A cluster without metrics-server yields an empty map rather than an error.
    pub async fn node_usage(&self) -> Result<HashMap<String, NodeUsage>> {
        let ar = ApiResource::from_gvk(&kube::core::GroupVersionKind {
            group: "metrics.k8s.io".to_string(),
            version: "v1beta1".to_string(),
            kind: "NodeMetrics".to_string(),
        });
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);

        let list = match api.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!("Metrics server not available, continuing without node usage");
                return Ok(HashMap::new());
            }
            Err(err) => return Err(err).context("Failed to get node metrics"),
        };

        Ok(list
            .items
            .into_iter()
            .filter_map(|metric| {
                let name = metric.metadata.name.clone()?;
                let usage = metric.data.get("usage")?;
                let cpu = usage.get("cpu")?.as_str().and_then(parse_cpu_millis);
                let memory = usage.get("memory")?.as_str().and_then(parse_memory_bytes);
                Some((
                    name,
                    NodeUsage {
                        cpu_millis: cpu.unwrap_or(0),
                        memory_bytes: memory.unwrap_or(0),
                    },
                ))
            })
            .collect())
    }

    /// Open a following, timestamped log stream for one pod
    pub async fn log_stream(
        &self,
        namespace: &str,
        name: &str,
        start: LogStart,
    ) -> Result<LogReader> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = follow_params(start);

        let stream = pods
            .log_stream(name, &params)
            .await
            .context(format!("Failed to open log stream for {}/{}", namespace, name))?;
        Ok(Box::new(stream))
    }

    /// Fetch the last `tail_lines` lines of one pod's log
    pub async fn tail_logs(&self, namespace: &str, name: &str, tail_lines: i64) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            tail_lines: Some(tail_lines),
            ..Default::default()
        };

        pods.logs(name, &params)
            .await
            .context(format!("Failed to fetch logs for {}/{}", namespace, name))
    }
}

fn follow_params(start: LogStart) -> LogParams {
    let mut params = LogParams {
        follow: true,
        timestamps: true,
        ..Default::default()
    };
    match start {
        LogStart::Since(ts) => params.since_time = Some(ts),
        LogStart::Tail(lines) => params.tail_lines = Some(lines),
    }
    params
}
