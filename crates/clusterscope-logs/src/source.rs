//! Capabilities the streamers need from the cluster

use async_trait::async_trait;

use clusterscope_k8s::{KubeClient, LogReader};
use clusterscope_types::{LogStart, ResourceInfo, ResourceKey};

/// An open, line-oriented log stream for one pod
pub type LogStream = LogReader;

/// Opens following, timestamp-prefixed log streams
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn open(&self, key: &ResourceKey, start: LogStart) -> anyhow::Result<LogStream>;
}

/// Lists the pods currently present in a namespace
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    async fn list(&self, namespace: &str) -> anyhow::Result<Vec<ResourceInfo>>;
}

#[async_trait]
impl LogSource for KubeClient {
    async fn open(&self, key: &ResourceKey, start: LogStart) -> anyhow::Result<LogStream> {
        self.log_stream(&key.namespace, &key.name, start).await
    }
}

#[async_trait]
impl ResourceDirectory for KubeClient {
    async fn list(&self, namespace: &str) -> anyhow::Result<Vec<ResourceInfo>> {
        self.list_pods(namespace).await
    }
}
