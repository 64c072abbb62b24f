//! Client configuration: endpoint, session and polling settings.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9092;
/// Upper bound on bytes requested per fetch (1 MiB).
pub const DEFAULT_MAX_FETCH_SIZE: i32 = 1024 * 1024;
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(2);

/// Settings shared by producers and consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub partition: i32,
    /// Byte offset a consumer starts fetching from.
    pub offset: u64,
    pub max_fetch_size: i32,
    pub polling_interval_ms: u64,
    /// Socket receive timeout; `None` blocks indefinitely.
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            topic: String::new(),
            partition: 0,
            offset: 0,
            max_fetch_size: DEFAULT_MAX_FETCH_SIZE,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL.as_millis() as u64,
            read_timeout_ms: Some(30_000),
            write_timeout_ms: None,
            connect_timeout_ms: Some(10_000),
        }
    }
}

impl ClientConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn with_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Defaults overlaid with `THORSTREAM_*` environment variables.
    ///
    /// `THORSTREAM_ADDR` (host:port), `THORSTREAM_TOPIC`, `THORSTREAM_PARTITION`,
    /// `THORSTREAM_OFFSET`, `THORSTREAM_MAX_FETCH_SIZE`, `THORSTREAM_POLL_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(addr) = lookup("THORSTREAM_ADDR") {
            let (host, port) = parse_addr(&addr)?;
            config.host = host;
            config.port = port;
        }
        if let Some(topic) = lookup("THORSTREAM_TOPIC") {
            config.topic = topic;
        }
        if let Some(raw) = lookup("THORSTREAM_PARTITION") {
            config.partition = parse_var("THORSTREAM_PARTITION", &raw)?;
        }
        if let Some(raw) = lookup("THORSTREAM_OFFSET") {
            config.offset = parse_var("THORSTREAM_OFFSET", &raw)?;
        }
        if let Some(raw) = lookup("THORSTREAM_MAX_FETCH_SIZE") {
            config.max_fetch_size = parse_var("THORSTREAM_MAX_FETCH_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("THORSTREAM_POLL_MS") {
            config.polling_interval_ms = parse_var("THORSTREAM_POLL_MS", &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(ClientError::Config("topic must not be empty".into()));
        }
        if self.topic.len() > i16::MAX as usize {
            return Err(ClientError::Config(format!(
                "topic is {} bytes; at most {} allowed",
                self.topic.len(),
                i16::MAX
            )));
        }
        if self.max_fetch_size <= 0 {
            return Err(ClientError::Config(format!(
                "max_fetch_size must be positive, got {}",
                self.max_fetch_size
            )));
        }
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty".into()));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_addr(raw: &str) -> Result<(String, u16)> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| ClientError::Config(format!("THORSTREAM_ADDR {:?} is not host:port", raw)))?;
    let port = parse_var("THORSTREAM_ADDR", port)?;
    Ok((host.to_string(), port))
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ClientError::Config(format!("{}={:?}: {}", key, raw, e)))
}
