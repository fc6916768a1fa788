//! Tuning for pod and namespace streaming

use std::time::Duration;

/// Delay between a broken pod stream and the next connection attempt
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// How often the namespace pod listing is re-read
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Records buffered between pod workers and the consumer
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// History replayed for a new pod when the caller asks to start from the beginning
pub const DEFAULT_FROM_START_TAIL_LINES: i64 = 300;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub retry_delay: Duration,
    pub reconcile_interval: Duration,
    /// Capacity of the fan-in queue. Producers block when it is full, so a
    /// slow consumer stalls every pod worker in the namespace.
    pub queue_capacity: usize,
    pub from_start_tail_lines: i64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            from_start_tail_lines: DEFAULT_FROM_START_TAIL_LINES,
        }
    }
}

const _: () = {
    assert!(DEFAULT_QUEUE_CAPACITY > 0, "DEFAULT_QUEUE_CAPACITY must be greater than 0");
    assert!(DEFAULT_FROM_START_TAIL_LINES > 0, "DEFAULT_FROM_START_TAIL_LINES must be greater than 0");
};
