use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use clusterscope_k8s::KubeClient;
use clusterscope_logs::{LogSource, ResourceDirectory, StreamConfig};
use clusterscope_snapshot::SnapshotStore;
use clusterscope_types::{NodeSummary, PodSummary};

/// Fetches the recent log output of one pod in a single request
#[async_trait]
pub trait LogTail: Send + Sync {
    async fn tail(&self, namespace: &str, name: &str, lines: i64) -> anyhow::Result<String>;
}

#[async_trait]
impl LogTail for KubeClient {
    async fn tail(&self, namespace: &str, name: &str, lines: i64) -> anyhow::Result<String> {
        self.tail_logs(namespace, name, lines).await
    }
}

/// Shared state of every request handler
#[derive(Clone)]
pub struct AppState {
    pub nodes: Arc<SnapshotStore<NodeSummary>>,
    pub pods: Arc<SnapshotStore<PodSummary>>,
    pub log_source: Arc<dyn LogSource>,
    pub directory: Arc<dyn ResourceDirectory>,
    pub log_tail: Arc<dyn LogTail>,
    pub stream_config: StreamConfig,
    /// Lines returned by the one-shot log endpoint
    pub tail_lines: i64,
    /// Live streams end when this fires
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State backed by one Kubernetes client for every capability
    pub fn new(
        client: KubeClient,
        nodes: Arc<SnapshotStore<NodeSummary>>,
        pods: Arc<SnapshotStore<PodSummary>>,
        stream_config: StreamConfig,
        tail_lines: i64,
        shutdown: CancellationToken,
    ) -> Self {
        let client = Arc::new(client);
        Self {
            nodes,
            pods,
            log_source: client.clone(),
            directory: client.clone(),
            log_tail: client,
            stream_config,
            tail_lines,
            shutdown,
        }
    }
}
