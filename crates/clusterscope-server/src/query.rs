//! Query parameters of the live log stream endpoint

use std::collections::HashMap;
use std::time::Duration;

use clusterscope_types::StreamOptions;

use crate::error::ApiError;

pub const DEFAULT_FREQUENCY: Duration = Duration::from_millis(500);
pub const MIN_FREQUENCY_MS: u64 = 100;
pub const MAX_FREQUENCY_MS: u64 = 10_000;

/// Wire format of a live log stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamFormat {
    /// One message per line
    Text,
    /// One JSON record per line
    #[default]
    Json,
}

impl StreamFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Json => "application/x-ndjson",
        }
    }
}

/// Validated parameters of one live stream request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamQuery {
    pub namespace: String,
    pub format: StreamFormat,
    /// At most one body chunk is flushed per window of this length
    pub frequency: Duration,
    pub options: StreamOptions,
}

impl StreamQuery {
    /// Validate raw query parameters. Empty values count as absent.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ApiError> {
        let param = |name: &str| params.get(name).map(String::as_str).filter(|v| !v.is_empty());

        let namespace = param("namespace")
            .ok_or_else(|| ApiError::bad_request("namespace is required"))?
            .to_string();

        let format = match param("format") {
            None | Some("json") => StreamFormat::Json,
            Some("text") => StreamFormat::Text,
            Some(other) => return Err(ApiError::bad_request(format!("invalid format: {other}"))),
        };

        let frequency = match param("frequencyMs") {
            None => DEFAULT_FREQUENCY,
            Some(raw) => {
                let ms: i64 = raw
                    .parse()
                    .map_err(|err| ApiError::bad_request(format!("invalid frequencyMs: {err}")))?;
                if ms < MIN_FREQUENCY_MS as i64 || ms > MAX_FREQUENCY_MS as i64 {
                    return Err(ApiError::bad_request(format!(
                        "frequencyMs must be between {MIN_FREQUENCY_MS} and {MAX_FREQUENCY_MS}"
                    )));
                }
                Duration::from_millis(ms as u64)
            }
        };

        let from_start = match param("fromStart") {
            None => false,
            Some(raw) => parse_bool(raw)
                .ok_or_else(|| ApiError::bad_request(format!("invalid fromStart: {raw:?} is not a boolean")))?,
        };

        let tail_lines = match param("tailLines") {
            None => None,
            Some(raw) => {
                let lines: i64 = raw
                    .parse()
                    .map_err(|err| ApiError::bad_request(format!("invalid tailLines: {err}")))?;
                if lines < 1 {
                    return Err(ApiError::bad_request("tailLines must be >= 1"));
                }
                Some(lines)
            }
        };

        Ok(Self {
            namespace,
            format,
            frequency,
            options: StreamOptions {
                from_start,
                tail_lines,
            },
        })
    }
}

/// Boolean spellings accepted in query strings
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
