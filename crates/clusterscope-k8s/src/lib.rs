//! Kubernetes client for clusterscope
//!
//! This crate provides Kubernetes API integration for listing pods and nodes,
//! opening pod log streams, and turning API objects into snapshot summaries.

mod client;
mod quantity;
mod summary;

pub use client::{KubeClient, LogReader, NodeUsage};
pub use quantity::{parse_cpu_millis, parse_memory_bytes};
pub use summary::{format_age, node_summaries, pod_summaries};

// Re-export types that are used in our public API
pub use clusterscope_types::{LogStart, NodeSummary, PodSummary, ResourceInfo};
