//! Shared types for clusterscope
//!
//! This crate contains data structures used across multiple clusterscope crates.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Resource Identity
// ============================================================================

/// Unique identity of a log-producing pod
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A pod as reported by a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    pub namespace: String,
    pub name: String,
    /// Node the pod is assigned to, `None` while unscheduled
    pub node_name: Option<String>,
}

impl ResourceInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            node_name: None,
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node_name = Some(node.into());
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Whether the pod has a host assigned
    pub fn is_scheduled(&self) -> bool {
        self.node_name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// A single structured log line from one pod
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub namespace: String,
    #[serde(rename = "pod")]
    pub name: String,
    pub message: String,
    #[serde(serialize_with = "serialize_rfc3339_nano")]
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(key: &ResourceKey, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            message: message.into(),
            timestamp,
        }
    }
}

/// Where a log stream should begin
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStart {
    /// Only lines emitted at or after this instant
    Since(DateTime<Utc>),
    /// The last N lines, then follow
    Tail(i64),
}

/// Caller preferences for a live stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Replay recent history for pods that have no cursor yet
    pub from_start: bool,
    /// History depth used with `from_start`
    pub tail_lines: Option<i64>,
}

/// Format a timestamp as RFC3339 in UTC, keeping only significant
/// fractional-second digits (`2026-02-19T12:00:00.5Z`).
pub fn format_rfc3339_nano(ts: &DateTime<Utc>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = ts.timestamp_subsec_nanos();
    if nanos > 0 {
        let frac = format!("{:09}", nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('Z');
    out
}

fn serialize_rfc3339_nano<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_rfc3339_nano(ts))
}

// ============================================================================
// Snapshot Types
// ============================================================================

/// Used/total pair rendered with units (`"250m"`, `"512Mi"`)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub used: String,
    pub total: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub reason: String,
    pub message: String,
}

/// A controller and the number of its pods on one node
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Workload {
    pub namespace: String,
    pub name: String,
    pub pods: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeWorkloads {
    pub deployments: Vec<Workload>,
    pub stateful_sets: Vec<Workload>,
    /// Pod names from `kube-system`
    pub system: Vec<String>,
}

/// Point-in-time view of one node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub ready: bool,
    pub age: String,
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<String>,
    pub cpu: Usage,
    pub memory: Usage,
    pub conditions: Vec<NodeCondition>,
    pub workloads: NodeWorkloads,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub name: String,
    pub ready: bool,
    pub cpu_request: String,
    pub memory_request: String,
}

/// Point-in-time view of one scheduled pod
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PodSummary {
    pub name: String,
    pub namespace: String,
    pub node: String,
    pub phase: String,
    pub ready: bool,
    pub restarts: i32,
    pub age: String,
    pub containers: Vec<ContainerSummary>,
}
