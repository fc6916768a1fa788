//! Mapping of Kubernetes API objects into flat snapshot summaries

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use clusterscope_types::{
    ContainerSummary, NodeCondition, NodeSummary, NodeWorkloads, PodSummary, Usage, Workload,
};

use crate::client::NodeUsage;
use crate::quantity::{parse_cpu_millis, parse_memory_bytes};

const SYSTEM_NAMESPACE: &str = "kube-system";
const MIB: u64 = 1024 * 1024;

/// Human-friendly age: `"3d 4h"`, `"2h 15m"`, `"7m"`
pub fn format_age(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created);
    let days = elapsed.num_days().max(0);
    let hours = elapsed.num_hours().max(0) % 24;
    let mins = elapsed.num_minutes().max(0) % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

fn age_of(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    created.map(|c| format_age(c, now)).unwrap_or_default()
}

/// Build one summary per node, attaching metrics usage and the workloads
/// scheduled on it
pub fn node_summaries(
    nodes: &[Node],
    pods: &[Pod],
    usage: &HashMap<String, NodeUsage>,
    now: DateTime<Utc>,
) -> Vec<NodeSummary> {
    let mut pods_by_node: HashMap<&str, Vec<&Pod>> = HashMap::new();
    for pod in pods {
        if let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) {
            if !node.is_empty() {
                pods_by_node.entry(node).or_default().push(pod);
            }
        }
    }

    nodes
        .iter()
        .map(|node| {
            let name = node.metadata.name.as_deref().unwrap_or_default();
            let node_pods = pods_by_node.get(name).map(Vec::as_slice).unwrap_or(&[]);
            node_summary(node, usage.get(name), workloads_for(node_pods), now)
        })
        .collect()
}

fn node_summary(
    node: &Node,
    usage: Option<&NodeUsage>,
    workloads: NodeWorkloads,
    now: DateTime<Utc>,
) -> NodeSummary {
    let status = node.status.as_ref();

    let mut ready = false;
    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| {
                    if c.type_ == "Ready" && c.status == "True" {
                        ready = true;
                    }
                    NodeCondition {
                        kind: c.type_.clone(),
                        status: c.status.clone(),
                        reason: c.reason.clone().unwrap_or_default(),
                        message: c.message.clone().unwrap_or_default(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let allocatable = status.and_then(|s| s.allocatable.as_ref());
    let cpu_total = allocatable
        .and_then(|a| a.get("cpu"))
        .and_then(|q| parse_cpu_millis(&q.0))
        .unwrap_or(0);
    let memory_total = allocatable
        .and_then(|a| a.get("memory"))
        .and_then(|q| parse_memory_bytes(&q.0))
        .unwrap_or(0);
    let usage = usage.copied().unwrap_or_default();

    let taints = node
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .map(|t| {
                    format!(
                        "{}={}:{}",
                        t.key,
                        t.value.as_deref().unwrap_or_default(),
                        t.effect
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    NodeSummary {
        name: node.metadata.name.clone().unwrap_or_default(),
        ready,
        age: age_of(node.metadata.creation_timestamp.as_ref().map(|t| t.0), now),
        labels: node.metadata.labels.clone().unwrap_or_default(),
        taints,
        cpu: Usage {
            used: format!("{}m", usage.cpu_millis),
            total: format!("{}m", cpu_total),
        },
        memory: Usage {
            used: format!("{}Mi", usage.memory_bytes / MIB),
            total: format!("{}Mi", memory_total / MIB),
        },
        conditions,
        workloads,
    }
}

/// Group a node's pods by owning controller
fn workloads_for(pods: &[&Pod]) -> NodeWorkloads {
    let mut deployments: BTreeMap<(String, String), u32> = BTreeMap::new();
    let mut stateful_sets: BTreeMap<(String, String), u32> = BTreeMap::new();
    let mut system = BTreeSet::new();

    for pod in pods {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();

        if namespace == SYSTEM_NAMESPACE {
            system.insert(name);
            continue;
        }

        for owner in pod.metadata.owner_references.iter().flatten() {
            match owner.kind.as_str() {
                "ReplicaSet" => {
                    // ReplicaSets are named <deployment>-<template-hash>
                    let deployment = match owner.name.rfind('-') {
                        Some(i) if i > 0 => &owner.name[..i],
                        _ => owner.name.as_str(),
                    };
                    *deployments
                        .entry((namespace.clone(), deployment.to_string()))
                        .or_default() += 1;
                }
                "StatefulSet" => {
                    *stateful_sets
                        .entry((namespace.clone(), owner.name.clone()))
                        .or_default() += 1;
                }
                _ => {}
            }
        }
    }

    let into_workloads = |m: BTreeMap<(String, String), u32>| {
        m.into_iter()
            .map(|((namespace, name), pods)| Workload {
                namespace,
                name,
                pods,
            })
            .collect()
    };

    NodeWorkloads {
        deployments: into_workloads(deployments),
        stateful_sets: into_workloads(stateful_sets),
        system: system.into_iter().collect(),
    }
}

/// Build one summary per scheduled, not-yet-completed pod
pub fn pod_summaries(pods: &[Pod], now: DateTime<Utc>) -> Vec<PodSummary> {
    pods.iter()
        .filter_map(|pod| {
            let node = pod.spec.as_ref()?.node_name.clone().filter(|n| !n.is_empty())?;
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_default();
            if phase == "Succeeded" {
                return None;
            }
            Some(pod_summary(pod, node, phase, now))
        })
        .collect()
}

fn pod_summary(pod: &Pod, node: String, phase: String, now: DateTime<Utc>) -> PodSummary {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or(&[]);
    let specs = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or(&[]);

    let request = |container: &str, resource: &str| {
        specs
            .iter()
            .find(|c| c.name == container)
            .and_then(|c| c.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get(resource))
            .map(|q| q.0.clone())
            .unwrap_or_default()
    };

    let containers: Vec<ContainerSummary> = statuses
        .iter()
        .map(|cs| ContainerSummary {
            name: cs.name.clone(),
            ready: cs.ready,
            cpu_request: request(&cs.name, "cpu"),
            memory_request: request(&cs.name, "memory"),
        })
        .collect();

    PodSummary {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        node,
        phase,
        ready: !statuses.is_empty() && statuses.iter().all(|cs| cs.ready),
        restarts: statuses.iter().map(|cs| cs.restart_count).sum(),
        age: age_of(pod.metadata.creation_timestamp.as_ref().map(|t| t.0), now),
        containers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 19, 12, 0, 0).unwrap()
    }

    fn pod(value: serde_json::Value) -> Pod {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_format_age() {
        let now = now();
        assert_eq!(format_age(now - chrono::Duration::minutes(7), now), "7m");
        assert_eq!(
            format_age(now - chrono::Duration::minutes(135), now),
            "2h 15m"
        );
        assert_eq!(format_age(now - chrono::Duration::hours(76), now), "3d 4h");
        assert_eq!(format_age(now + chrono::Duration::minutes(5), now), "0m");
    }

    #[test]
    fn test_pod_summaries_skip_unscheduled_and_succeeded() {
        let pods = vec![
            pod(json!({
                "metadata": {"name": "api-0", "namespace": "default",
                             "creationTimestamp": "2026-02-19T11:50:00Z"},
                "spec": {"nodeName": "node-a", "containers": [
                    {"name": "app", "resources": {"requests": {"cpu": "250m", "memory": "64Mi"}}}
                ]},
                "status": {"phase": "Running", "containerStatuses": [
                    {"name": "app", "ready": true, "restartCount": 2, "image": "x", "imageID": ""}
                ]}
            })),
            pod(json!({
                "metadata": {"name": "pending", "namespace": "default"},
                "spec": {"containers": []},
                "status": {"phase": "Pending"}
            })),
            pod(json!({
                "metadata": {"name": "job", "namespace": "default"},
                "spec": {"nodeName": "node-a", "containers": []},
                "status": {"phase": "Succeeded"}
            })),
        ];

        let summaries = pod_summaries(&pods, now());
        assert_eq!(summaries.len(), 1);
        let api = &summaries[0];
        assert_eq!(api.name, "api-0");
        assert_eq!(api.node, "node-a");
        assert!(api.ready);
        assert_eq!(api.restarts, 2);
        assert_eq!(api.age, "10m");
        assert_eq!(api.containers[0].cpu_request, "250m");
        assert_eq!(api.containers[0].memory_request, "64Mi");
    }

    #[test]
    fn test_pod_without_statuses_is_not_ready() {
        let pods = vec![pod(json!({
            "metadata": {"name": "api-1", "namespace": "default"},
            "spec": {"nodeName": "node-a", "containers": []},
            "status": {"phase": "Running"}
        }))];
        assert!(!pod_summaries(&pods, now())[0].ready);
    }

    #[test]
    fn test_node_summaries_group_workloads() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {"name": "node-a", "labels": {"zone": "a"},
                         "creationTimestamp": "2026-02-16T08:00:00Z"},
            "spec": {"taints": [{"key": "dedicated", "value": "db", "effect": "NoSchedule"}]},
            "status": {
                "allocatable": {"cpu": "4", "memory": "8Gi"},
                "conditions": [{"type": "Ready", "status": "True", "reason": "KubeletReady"}]
            }
        }))
        .unwrap();

        let owned = |name: &str, ns: &str, kind: &str, owner: &str| {
            pod(json!({
                "metadata": {"name": name, "namespace": ns, "ownerReferences": [
                    {"apiVersion": "apps/v1", "kind": kind, "name": owner, "uid": "1"}
                ]},
                "spec": {"nodeName": "node-a", "containers": []}
            }))
        };
        let pods = vec![
            owned("web-7d9f-a", "default", "ReplicaSet", "web-7d9f"),
            owned("web-7d9f-b", "default", "ReplicaSet", "web-7d9f"),
            owned("db-0", "default", "StatefulSet", "db"),
            owned("coredns-1", "kube-system", "ReplicaSet", "coredns-5d"),
        ];

        let mut usage = HashMap::new();
        usage.insert(
            "node-a".to_string(),
            NodeUsage {
                cpu_millis: 1200,
                memory_bytes: 512 * MIB,
            },
        );

        let summaries = node_summaries(&[node], &pods, &usage, now());
        let node = &summaries[0];
        assert!(node.ready);
        assert_eq!(node.age, "3d 4h");
        assert_eq!(node.taints, vec!["dedicated=db:NoSchedule".to_string()]);
        assert_eq!(node.cpu.used, "1200m");
        assert_eq!(node.cpu.total, "4000m");
        assert_eq!(node.memory.used, "512Mi");
        assert_eq!(node.memory.total, "8192Mi");
        assert_eq!(
            node.workloads.deployments,
            vec![Workload {
                namespace: "default".into(),
                name: "web".into(),
                pods: 2
            }]
        );
        assert_eq!(node.workloads.stateful_sets[0].name, "db");
        assert_eq!(node.workloads.system, vec!["coredns-1".to_string()]);
    }
}
