//! `clusterscope.toml` configuration

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use clusterscope_logs::StreamConfig;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub logs: LogsConfig,
    pub snapshot: SnapshotConfig,
    /// Default filter when `RUST_LOG` is unset
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8001)),
            shutdown_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogsConfig {
    pub retry_delay_ms: u64,
    pub reconcile_interval_ms: u64,
    pub queue_capacity: usize,
    pub from_start_tail_lines: i64,
    /// Lines returned by the one-shot pod log endpoint
    pub snapshot_tail_lines: i64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 2000,
            reconcile_interval_ms: 5000,
            queue_capacity: 256,
            from_start_tail_lines: 300,
            snapshot_tail_lines: 300,
        }
    }
}

impl LogsConfig {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            reconcile_interval: Duration::from_millis(self.reconcile_interval_ms),
            queue_capacity: self.queue_capacity,
            from_start_tail_lines: self.from_start_tail_lines,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    pub refresh_interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
        }
    }
}

impl SnapshotConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl Config {
    /// Read `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to read config file {}", path.display()))
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply the `PORT` environment variable to the bind address
    pub fn apply_port(&mut self, port: Option<&str>) -> Result<()> {
        if let Some(port) = port.filter(|p| !p.is_empty()) {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid PORT value {port:?}"))?;
            self.server.bind.set_port(port);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("server.shutdown_grace_secs", self.server.shutdown_grace_secs),
            ("logs.retry_delay_ms", self.logs.retry_delay_ms),
            ("logs.reconcile_interval_ms", self.logs.reconcile_interval_ms),
            ("logs.queue_capacity", self.logs.queue_capacity as u64),
            ("snapshot.refresh_interval_secs", self.snapshot.refresh_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                bail!("{name} must be greater than 0");
            }
        }

        if self.logs.from_start_tail_lines < 1 {
            bail!("logs.from_start_tail_lines must be greater than 0");
        }
        if self.logs.snapshot_tail_lines < 1 {
            bail!("logs.snapshot_tail_lines must be greater than 0");
        }
        if self.log_level.0.trim().is_empty() {
            bail!("log_level must not be empty");
        }
        Ok(())
    }
}
