use chrono::{DateTime, Utc};
use futures::AsyncBufReadExt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clusterscope_types::{LogStart, ResourceKey, StreamOptions};

use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::cursor::CursorTracker;
use crate::error::StreamError;
use crate::parser::LogParser;
use crate::sink::RecordSink;
use crate::source::{LogSource, LogStream};

/// Why an established connection stopped producing lines
#[derive(Debug)]
enum Disconnect {
    Canceled,
    EndOfStream,
    ReadFailed(io::Error),
}

/// Tails one pod's log forever, reconnecting after transient failures
///
/// Every (re)connect resumes strictly after the last record handed to the
/// sink. The API server only honours `since_time` to the second, so
/// timestamped lines at or before that record are dropped on arrival.
#[derive(Clone)]
pub struct LogStreamer {
    source: Arc<dyn LogSource>,
    cursors: Arc<CursorTracker>,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
    from_start_tail_lines: i64,
}

impl LogStreamer {
    pub fn new(source: Arc<dyn LogSource>, config: &StreamConfig) -> Self {
        Self {
            source,
            cursors: Arc::new(CursorTracker::new()),
            clock: Arc::new(SystemClock),
            retry_delay: config.retry_delay,
            from_start_tail_lines: config.from_start_tail_lines,
        }
    }

    /// Replace the wall clock used for "now" and for unprefixed lines
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a cursor table with other streamers
    pub fn with_cursors(mut self, cursors: Arc<CursorTracker>) -> Self {
        self.cursors = cursors;
        self
    }

    pub fn cursors(&self) -> &Arc<CursorTracker> {
        &self.cursors
    }

    /// Where the next connection for `key` should start
    ///
    /// A known cursor wins, then an explicit request for history, then "now".
    pub fn resume_start(&self, key: &ResourceKey, options: StreamOptions) -> LogStart {
        if let Some(since) = self.cursors.resume_point(key) {
            LogStart::Since(since)
        } else if options.from_start {
            LogStart::Tail(options.tail_lines.unwrap_or(self.from_start_tail_lines))
        } else {
            LogStart::Since(self.clock.now())
        }
    }

    /// Stream records for `key` into `sink` until `cancel` fires
    ///
    /// Returns `Ok(())` on cancellation. Fails only when the very first
    /// connection attempt fails or the sink refuses a record.
    pub async fn stream<S>(
        &self,
        key: &ResourceKey,
        options: StreamOptions,
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Result<(), StreamError>
    where
        S: RecordSink + ?Sized,
    {
        let mut connected = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let floor = self.cursors.last(key);
            let start = self.resume_start(key, options);
            debug!(namespace = %key.namespace, pod = %key.name, ?start, "Opening log stream");

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                opened = self.source.open(key, start) => opened,
            };

            match opened {
                Ok(reader) => {
                    if connected {
                        info!(namespace = %key.namespace, pod = %key.name, "Log stream reconnected");
                    } else {
                        debug!(namespace = %key.namespace, pod = %key.name, "Log stream connected");
                    }
                    connected = true;

                    match self.pump(key, reader, floor, cancel, sink).await? {
                        Disconnect::Canceled => return Ok(()),
                        Disconnect::EndOfStream => {
                            debug!(namespace = %key.namespace, pod = %key.name, "Log stream ended");
                        }
                        Disconnect::ReadFailed(err) => {
                            warn!(namespace = %key.namespace, pod = %key.name, error = %err, "Log stream read failed");
                        }
                    }
                }
                Err(source) if !connected => {
                    return Err(StreamError::Connect {
                        key: key.clone(),
                        source,
                    });
                }
                Err(err) => {
                    warn!(namespace = %key.namespace, pod = %key.name, error = %format!("{err:#}"), "Log stream disconnected");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    /// Forward lines from one open connection until it ends
    ///
    /// Timestamped lines at or before `floor` were already delivered.
    async fn pump<S>(
        &self,
        key: &ResourceKey,
        mut reader: LogStream,
        floor: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Result<Disconnect, StreamError>
    where
        S: RecordSink + ?Sized,
    {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Disconnect::Canceled),
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => return Ok(Disconnect::EndOfStream),
                Ok(_) => {}
                Err(err) => return Ok(Disconnect::ReadFailed(err)),
            }

            let text = LogParser::decode(&buf);
            let line = LogParser::split(&text);
            if let (Some(ts), Some(floor)) = (line.timestamp, floor) {
                if ts <= floor {
                    continue;
                }
            }

            let record = LogParser::record(line, key, self.clock.as_ref());
            let timestamp = record.timestamp;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Disconnect::Canceled),
                delivered = sink.deliver(record) => delivered?,
            }

            // Only records the sink accepted move the cursor
            self.cursors.update(key, timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkClosed;
    use async_trait::async_trait;
    use chrono::{SubsecRound, TimeZone};
    use clusterscope_types::LogRecord;
    use futures::{StreamExt, TryStreamExt};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// What the fake source does on one `open` call
    enum Outcome {
        /// Serve the first `n` log lines that match the start, then end
        Serve(usize),
        /// Serve one line then fail mid-read
        Break,
        Fail,
    }

    /// Source over a fixed log, honouring `since_time` and `tail_lines`
    ///
    /// Once the script runs out every open serves the whole matching log and
    /// then hangs like a live follow.
    struct ScriptedSource {
        log: Vec<(DateTime<Utc>, String)>,
        script: Mutex<VecDeque<Outcome>>,
        opens: Mutex<Vec<LogStart>>,
        whole_seconds: bool,
    }

    impl ScriptedSource {
        fn new(log: Vec<(DateTime<Utc>, &str)>, script: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self::build(log, script, false))
        }

        /// Like the API server, only honour `since_time` to the second
        fn whole_seconds(log: Vec<(DateTime<Utc>, &str)>, script: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self::build(log, script, true))
        }

        fn build(log: Vec<(DateTime<Utc>, &str)>, script: Vec<Outcome>, whole_seconds: bool) -> Self {
            Self {
                log: log.into_iter().map(|(ts, m)| (ts, m.to_string())).collect(),
                script: Mutex::new(script.into()),
                opens: Mutex::new(Vec::new()),
                whole_seconds,
            }
        }

        fn matching(&self, start: LogStart) -> Vec<String> {
            let lines = self
                .log
                .iter()
                .map(|(ts, message)| (ts, format!("{} {}", ts.to_rfc3339(), message)));
            match start {
                LogStart::Since(since) if self.whole_seconds => {
                    let since = since.trunc_subsecs(0);
                    lines.filter(|(ts, _)| **ts >= since).map(|(_, l)| l).collect()
                }
                LogStart::Since(since) => lines.filter(|(ts, _)| **ts >= since).map(|(_, l)| l).collect(),
                LogStart::Tail(n) => {
                    let all: Vec<_> = lines.map(|(_, l)| l).collect();
                    let skip = all.len().saturating_sub(n as usize);
                    all.into_iter().skip(skip).collect()
                }
            }
        }

        fn opens(&self) -> Vec<LogStart> {
            self.opens.lock().clone()
        }
    }

    fn chunks(lines: Vec<String>) -> Vec<io::Result<Vec<u8>>> {
        lines.into_iter().map(|l| Ok(format!("{l}\n").into_bytes())).collect()
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn open(&self, _key: &ResourceKey, start: LogStart) -> anyhow::Result<LogStream> {
            self.opens.lock().push(start);
            let outcome = self.script.lock().pop_front();
            let lines = self.matching(start);

            let stream: LogStream = match outcome {
                Some(Outcome::Fail) => anyhow::bail!("connection refused"),
                Some(Outcome::Serve(n)) => {
                    let lines = lines.into_iter().take(n).collect();
                    Box::new(futures::stream::iter(chunks(lines)).into_async_read())
                }
                Some(Outcome::Break) => {
                    let mut items = chunks(lines.into_iter().take(1).collect());
                    items.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
                    Box::new(futures::stream::iter(items).into_async_read())
                }
                None => Box::new(
                    futures::stream::iter(chunks(lines))
                        .chain(futures::stream::pending())
                        .into_async_read(),
                ),
            };
            Ok(stream)
        }
    }

    /// Collects records and cancels once it has seen `stop_after`
    struct Collector {
        records: Vec<LogRecord>,
        stop_after: usize,
        cancel: CancellationToken,
    }

    impl Collector {
        fn new(stop_after: usize, cancel: &CancellationToken) -> Self {
            Self {
                records: Vec::new(),
                stop_after,
                cancel: cancel.clone(),
            }
        }

        fn messages(&self) -> Vec<&str> {
            self.records.iter().map(|r| r.message.as_str()).collect()
        }
    }

    #[async_trait]
    impl RecordSink for Collector {
        async fn deliver(&mut self, record: LogRecord) -> Result<(), SinkClosed> {
            self.records.push(record);
            if self.records.len() >= self.stop_after {
                self.cancel.cancel();
            }
            Ok(())
        }
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 19, 12, 0, secs).unwrap()
    }

    fn config() -> StreamConfig {
        StreamConfig {
            retry_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn key() -> ResourceKey {
        ResourceKey::new("default", "api-0")
    }

    async fn run(
        streamer: &LogStreamer,
        options: StreamOptions,
        sink: &mut Collector,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        tokio::time::timeout(
            Duration::from_secs(5),
            streamer.stream(&key(), options, cancel, sink),
        )
        .await
        .expect("stream did not finish")
    }

    #[tokio::test]
    async fn test_reconnect_resumes_after_cursor_without_duplicates() {
        let source = ScriptedSource::new(
            vec![(at(0), "line1"), (at(1), "line2")],
            vec![Outcome::Serve(1), Outcome::Fail, Outcome::Fail, Outcome::Fail],
        );
        let streamer = LogStreamer::new(source.clone(), &config())
            .with_clock(Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 2, 19, 11, 0, 0).unwrap())));
        let cancel = CancellationToken::new();
        let mut sink = Collector::new(2, &cancel);

        run(&streamer, StreamOptions::default(), &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(sink.messages(), vec!["line1", "line2"]);
        assert_eq!(sink.records[0].timestamp, at(0));
        assert_eq!(sink.records[1].timestamp, at(1));

        // Every reconnect after line1 asks for strictly later records
        let opens = source.opens();
        assert_eq!(opens.len(), 5);
        let mut previous = None;
        for start in opens {
            let LogStart::Since(since) = start else {
                panic!("unexpected start {start:?}");
            };
            if let Some(previous) = previous {
                assert!(since >= previous);
            }
            previous = Some(since);
        }
        assert!(previous.unwrap() > at(0));
    }

    #[tokio::test]
    async fn test_each_record_delivered_once_across_reconnects() {
        let log = vec![(at(0), "a"), (at(1), "b"), (at(2), "c"), (at(3), "d")];
        let source = ScriptedSource::new(log, vec![Outcome::Serve(2), Outcome::Serve(1)]);
        let streamer = LogStreamer::new(source.clone(), &config());
        let cancel = CancellationToken::new();
        let mut sink = Collector::new(4, &cancel);
        let options = StreamOptions {
            from_start: true,
            tail_lines: Some(10),
        };

        run(&streamer, options, &mut sink, &cancel).await.unwrap();

        assert_eq!(sink.messages(), vec!["a", "b", "c", "d"]);
        assert_eq!(source.opens()[0], LogStart::Tail(10));
    }

    #[tokio::test]
    async fn test_second_granular_since_does_not_repeat_records() {
        let ms = |millis: i64| at(0) + chrono::Duration::milliseconds(millis);
        let log = vec![(ms(100), "line1"), (ms(500), "line2"), (at(1), "line3")];
        let source = ScriptedSource::whole_seconds(log, vec![Outcome::Break, Outcome::Serve(3)]);
        let streamer = LogStreamer::new(source.clone(), &config());
        let cancel = CancellationToken::new();
        let mut sink = Collector::new(3, &cancel);
        let options = StreamOptions {
            from_start: true,
            tail_lines: Some(10),
        };

        run(&streamer, options, &mut sink, &cancel).await.unwrap();

        assert_eq!(sink.messages(), vec!["line1", "line2", "line3"]);
        // The reconnect asked for 12:00:00.1 but was served line1 again
        assert_eq!(source.opens().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_delivered_not_retried() {
        struct RawBytesSource {
            opens: Mutex<usize>,
        }

        #[async_trait]
        impl LogSource for RawBytesSource {
            async fn open(&self, _key: &ResourceKey, _start: LogStart) -> anyhow::Result<LogStream> {
                *self.opens.lock() += 1;
                let bytes = b"2026-02-19T12:00:00Z first\n\
                              2026-02-19T12:00:01Z caf\xe9\r\n\
                              2026-02-19T12:00:02Z third\n"
                    .to_vec();
                let items: Vec<io::Result<Vec<u8>>> = vec![Ok(bytes)];
                Ok(Box::new(
                    futures::stream::iter(items)
                        .chain(futures::stream::pending())
                        .into_async_read(),
                ))
            }
        }

        let source = Arc::new(RawBytesSource { opens: Mutex::new(0) });
        let streamer = LogStreamer::new(source.clone(), &config());
        let cancel = CancellationToken::new();
        let mut sink = Collector::new(3, &cancel);

        run(&streamer, StreamOptions::default(), &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(sink.messages(), vec!["first", "caf\u{FFFD}", "third"]);
        assert_eq!(sink.records[2].timestamp, at(2));
        assert_eq!(*source.opens.lock(), 1);
    }

    #[tokio::test]
    async fn test_first_connect_failure_is_fatal() {
        let source = ScriptedSource::new(vec![], vec![Outcome::Fail]);
        let streamer = LogStreamer::new(source.clone(), &config());
        let cancel = CancellationToken::new();
        let mut sink = Collector::new(1, &cancel);

        let err = run(&streamer, StreamOptions::default(), &mut sink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Connect { .. }));
        let message = err.to_string();
        assert!(message.contains("could not open log stream for default/api-0"));
        assert!(message.contains("connection refused"));
        assert_eq!(source.opens().len(), 1);
    }

    #[tokio::test]
    async fn test_unprefixed_line_uses_receipt_time() {
        struct RawSource;

        #[async_trait]
        impl LogSource for RawSource {
            async fn open(&self, _key: &ResourceKey, _start: LogStart) -> anyhow::Result<LogStream> {
                Ok(Box::new(futures::io::Cursor::new(b"no-timestamp-here\n".to_vec())))
            }
        }

        let receipt = Utc.with_ymd_and_hms(2026, 2, 19, 13, 0, 0).unwrap();
        let streamer = LogStreamer::new(Arc::new(RawSource), &config())
            .with_clock(Arc::new(FixedClock(receipt)));
        streamer.cursors().update(&key(), at(0));

        let cancel = CancellationToken::new();
        let mut sink = Collector::new(1, &cancel);
        run(&streamer, StreamOptions::default(), &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(sink.messages(), vec!["no-timestamp-here"]);
        assert_eq!(sink.records[0].timestamp, receipt);
    }

    #[tokio::test]
    async fn test_read_error_triggers_reconnect() {
        let log = vec![(at(0), "before"), (at(1), "after")];
        let source = ScriptedSource::new(log, vec![Outcome::Break]);
        let streamer = LogStreamer::new(source.clone(), &config());
        let cancel = CancellationToken::new();
        let mut sink = Collector::new(2, &cancel);
        let options = StreamOptions {
            from_start: true,
            tail_lines: None,
        };

        run(&streamer, options, &mut sink, &cancel).await.unwrap();

        assert_eq!(sink.messages(), vec!["before", "after"]);
        let opens = source.opens();
        assert_eq!(opens[0], LogStart::Tail(config().from_start_tail_lines));
        assert_eq!(
            opens[1],
            LogStart::Since(at(0) + chrono::Duration::nanoseconds(1))
        );
    }

    #[tokio::test]
    async fn test_new_pod_starts_from_now() {
        let now = at(30);
        let source = ScriptedSource::new(vec![(at(0), "old")], vec![]);
        let streamer = LogStreamer::new(source.clone(), &config())
            .with_clock(Arc::new(FixedClock(now)));

        assert_eq!(
            streamer.resume_start(&key(), StreamOptions::default()),
            LogStart::Since(now)
        );
    }

    #[tokio::test]
    async fn test_cancel_while_streaming_returns_ok() {
        let source = ScriptedSource::new(vec![], vec![]);
        let streamer = LogStreamer::new(source.clone(), &config());
        let cancel = CancellationToken::new();
        let mut sink = Collector::new(usize::MAX, &cancel);

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });

        run(&streamer, StreamOptions::default(), &mut sink, &cancel)
            .await
            .unwrap();
        assert!(sink.records.is_empty());
        assert_eq!(source.opens().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_error_is_fatal() {
        let log = vec![(at(0), "a"), (at(1), "b")];
        let source = ScriptedSource::new(log, vec![]);
        let streamer = LogStreamer::new(source.clone(), &config());
        let cancel = CancellationToken::new();
        let mut sink = crate::sink::sink_fn(|_record: LogRecord| Err(SinkClosed::new("gone")));
        let options = StreamOptions {
            from_start: true,
            tail_lines: None,
        };

        let err = streamer
            .stream(&key(), options, &cancel, &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::SinkClosed(_)));
        assert_eq!(source.opens().len(), 1);
        // Nothing was accepted, so nothing moved the cursor
        assert_eq!(streamer.cursors().last(&key()), None);
    }
}
