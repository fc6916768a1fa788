use chrono::{DateTime, Utc};
use std::borrow::Cow;

use clusterscope_types::{LogRecord, ResourceKey};

use crate::clock::Clock;

/// A raw log line split into its kubelet timestamp and message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub timestamp: Option<DateTime<Utc>>,
    pub message: &'a str,
}

/// Parser for timestamp-prefixed container log lines
pub struct LogParser;

impl LogParser {
    /// Decode one raw line, dropping the line terminator
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn decode(raw: &[u8]) -> Cow<'_, str> {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        String::from_utf8_lossy(raw)
    }

    /// Split a line of the form `<RFC3339 timestamp> <message>`
    ///
    /// Lines without a leading valid timestamp come back whole, with no timestamp.
    pub fn split(raw: &str) -> ParsedLine<'_> {
        if let Some((prefix, message)) = raw.split_once(' ') {
            if !prefix.is_empty() {
                if let Ok(ts) = DateTime::parse_from_rfc3339(prefix) {
                    return ParsedLine {
                        timestamp: Some(ts.with_timezone(&Utc)),
                        message,
                    };
                }
            }
        }

        ParsedLine {
            timestamp: None,
            message: raw,
        }
    }

    /// Turn a raw line into a record, stamping unprefixed lines with the
    /// current time
    pub fn parse(raw: &str, key: &ResourceKey, clock: &dyn Clock) -> LogRecord {
        Self::record(Self::split(raw), key, clock)
    }

    /// Build a record from an already split line
    pub fn record(line: ParsedLine<'_>, key: &ResourceKey, clock: &dyn Clock) -> LogRecord {
        let timestamp = line.timestamp.unwrap_or_else(|| clock.now());
        LogRecord::new(key, line.message, timestamp)
    }
}
