//! Cached cluster summaries for clusterscope
//!
//! A [`SnapshotStore`] holds the latest list of summaries and a [`Reconciler`]
//! rebuilds it in the background. Readers only ever see a complete list.

mod builders;
mod reconciler;
mod store;

pub use builders::{NodeSnapshotBuilder, PodSnapshotBuilder};
pub use reconciler::{Reconciler, SnapshotBuilder};
pub use store::SnapshotStore;

// Re-export types used in our public API
pub use clusterscope_types::{NodeSummary, PodSummary};
