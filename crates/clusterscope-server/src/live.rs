//! Live namespace log stream over a chunked HTTP body

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use clusterscope_logs::{LogStreamer, NamespaceStreamer};
use clusterscope_types::LogRecord;

use crate::error::ApiError;
use crate::query::{StreamFormat, StreamQuery};
use crate::state::AppState;

/// GET /api/v1/pods/logs/stream
pub async fn stream_logs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let query = StreamQuery::from_params(&params)?;
    info!(
        namespace = %query.namespace,
        format = ?query.format,
        frequency_ms = query.frequency.as_millis() as u64,
        "Live log stream opened"
    );

    // Canceled when the client goes away or the server shuts down
    let cancel = state.shutdown.child_token();
    let (tx, rx) = mpsc::channel(state.stream_config.queue_capacity.max(1));

    let streamer = LogStreamer::new(state.log_source.clone(), &state.stream_config);
    let orchestrator = NamespaceStreamer::new(
        streamer,
        state.directory.clone(),
        query.namespace.clone(),
        &state.stream_config,
    );

    let options = query.options;
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut sink = tx;
        match orchestrator.run(options, &run_cancel, &mut sink).await {
            Ok(()) => debug!(namespace = %orchestrator.namespace(), "Live log stream finished"),
            Err(err) => debug!(namespace = %orchestrator.namespace(), error = %err, "Live log stream closed"),
        }
    });

    let max_pending = state.stream_config.queue_capacity.max(1);
    let body = Body::from_stream(flush_stream(
        rx,
        query.format,
        query.frequency,
        max_pending,
        cancel,
    ));
    Ok(([(CONTENT_TYPE, query.format.content_type())], body).into_response())
}

/// Buffered records plus the flush clock of one response body
struct FlushState {
    records: mpsc::Receiver<LogRecord>,
    ticker: Interval,
    format: StreamFormat,
    pending: Vec<u8>,
    pending_records: usize,
    max_pending: usize,
    closed: bool,
    _cancel_on_drop: DropGuard,
}

/// Batch records into at most one chunk per `frequency`
///
/// Ticks with nothing buffered emit nothing. At most `max_pending` records
/// are buffered; past that the channel fills and producers wait. The stream
/// ends once the producer is gone and the buffer is flushed; dropping it
/// cancels `cancel`.
fn flush_stream(
    records: mpsc::Receiver<LogRecord>,
    format: StreamFormat,
    frequency: Duration,
    max_pending: usize,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let mut ticker = tokio::time::interval(frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = FlushState {
        records,
        ticker,
        format,
        pending: Vec::new(),
        pending_records: 0,
        max_pending: max_pending.max(1),
        closed: false,
        _cancel_on_drop: cancel.drop_guard(),
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.closed && state.pending.is_empty() {
                return None;
            }

            // Tick first so a busy producer cannot postpone the flush
            tokio::select! {
                biased;
                _ = state.ticker.tick() => {
                    if !state.pending.is_empty() {
                        state.pending_records = 0;
                        let chunk = Bytes::from(std::mem::take(&mut state.pending));
                        return Some((Ok(chunk), state));
                    }
                }
                record = state.records.recv(), if !state.closed && state.pending_records < state.max_pending => match record {
                    Some(record) => {
                        encode_record(&record, state.format, &mut state.pending);
                        state.pending_records += 1;
                    }
                    None => state.closed = true,
                },
            }
        }
    })
}

/// Append one record in the wire format, newline terminated
pub(crate) fn encode_record(record: &LogRecord, format: StreamFormat, out: &mut Vec<u8>) {
    match format {
        StreamFormat::Text => out.extend_from_slice(record.message.as_bytes()),
        StreamFormat::Json => {
            if let Err(err) = serde_json::to_writer(&mut *out, record) {
                warn!(error = %err, "Failed to encode log record");
                return;
            }
        }
    }
    out.push(b'\n');
}
