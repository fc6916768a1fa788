use async_trait::async_trait;
use tokio::sync::mpsc;

use clusterscope_types::LogRecord;

use crate::error::SinkClosed;

/// Consumer of streamed log records
///
/// `deliver` may wait, which is how back-pressure reaches the pod workers.
/// Returning [`SinkClosed`] stops the stream that is feeding it.
#[async_trait]
pub trait RecordSink: Send {
    async fn deliver(&mut self, record: LogRecord) -> Result<(), SinkClosed>;
}

#[async_trait]
impl RecordSink for mpsc::Sender<LogRecord> {
    async fn deliver(&mut self, record: LogRecord) -> Result<(), SinkClosed> {
        self.send(record)
            .await
            .map_err(|_| SinkClosed::new("receiver dropped"))
    }
}

/// Adapter turning a closure into a [`RecordSink`]
pub struct FnSink<F>(F);

/// Wrap a closure as a [`RecordSink`]
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(LogRecord) -> Result<(), SinkClosed> + Send,
{
    FnSink(f)
}

#[async_trait]
impl<F> RecordSink for FnSink<F>
where
    F: FnMut(LogRecord) -> Result<(), SinkClosed> + Send,
{
    async fn deliver(&mut self, record: LogRecord) -> Result<(), SinkClosed> {
        (self.0)(record)
    }
}
