//! Snapshot builders backed by the Kubernetes API

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use clusterscope_k8s::{KubeClient, node_summaries, pod_summaries};
use clusterscope_types::{NodeSummary, PodSummary};

use crate::reconciler::SnapshotBuilder;

/// Builds node summaries from nodes, pods and node metrics
#[derive(Clone)]
pub struct NodeSnapshotBuilder {
    client: KubeClient,
}

impl NodeSnapshotBuilder {
    pub fn new(client: KubeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotBuilder for NodeSnapshotBuilder {
    type Item = NodeSummary;

    async fn build(&self) -> Result<Vec<NodeSummary>> {
        let (nodes, pods, usage) = tokio::join!(
            self.client.all_nodes(),
            self.client.all_pods(),
            self.client.node_usage(),
        );

        // Missing metrics degrade to zero usage instead of failing the snapshot
        let usage = usage.unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "Node metrics unavailable");
            Default::default()
        });

        Ok(node_summaries(&nodes?, &pods?, &usage, Utc::now()))
    }
}

/// Builds pod summaries for every scheduled pod in the cluster
#[derive(Clone)]
pub struct PodSnapshotBuilder {
    client: KubeClient,
}

impl PodSnapshotBuilder {
    pub fn new(client: KubeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotBuilder for PodSnapshotBuilder {
    type Item = PodSummary;

    async fn build(&self) -> Result<Vec<PodSummary>> {
        let pods = self.client.all_pods().await?;
        Ok(pod_summaries(&pods, Utc::now()))
    }
}
