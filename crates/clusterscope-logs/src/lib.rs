//! Live log streaming for clusterscope
//!
//! This crate tails every scheduled pod in a namespace, resumes each pod's
//! stream from a per-pod cursor across reconnects, and merges the output into
//! a single consumer.

mod clock;
mod config;
mod cursor;
mod error;
mod orchestrator;
mod parser;
mod sink;
mod source;
mod stream;

pub use clock::{Clock, SystemClock};
pub use config::StreamConfig;
pub use cursor::CursorTracker;
pub use error::{SinkClosed, StreamError};
pub use orchestrator::NamespaceStreamer;
pub use parser::{LogParser, ParsedLine};
pub use sink::{FnSink, RecordSink, sink_fn};
pub use source::{LogSource, LogStream, ResourceDirectory};
pub use stream::LogStreamer;

// Re-export types used in our public API
pub use clusterscope_types::{LogRecord, LogStart, ResourceInfo, ResourceKey, StreamOptions};
