use clusterscope_types::ResourceKey;
use thiserror::Error;

/// The record consumer can no longer accept records
#[derive(Debug, Error)]
#[error("record consumer closed: {reason}")]
pub struct SinkClosed {
    reason: String,
}

impl SinkClosed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Why a pod or namespace stream stopped without being canceled
#[derive(Debug, Error)]
pub enum StreamError {
    /// The very first connection attempt for a pod failed
    #[error("could not open log stream for {key}: {source:#}")]
    Connect {
        key: ResourceKey,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    SinkClosed(#[from] SinkClosed),
}
