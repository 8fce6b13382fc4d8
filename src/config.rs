//! JSON configuration for the instrumentation layer and the demo server.
//!
//! Every field has a default, so `{}` is a valid config. Unknown fields are
//! rejected to catch typos.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, StatsError};

// ─── Instrumentation ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    /// Pending recording jobs held before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Worker tasks draining the recording queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Latency histogram lower bound (ms)
    #[serde(default = "default_latency_min_ms")]
    pub latency_min_ms: i64,

    /// Latency histogram upper bound (ms)
    #[serde(default = "default_latency_max_ms")]
    pub latency_max_ms: i64,

    /// When set, the request path is added to each request's tags under
    /// this key
    #[serde(default)]
    pub uri_tag: Option<String>,
}

fn default_queue_capacity() -> usize {
    1024
}
fn default_workers() -> usize {
    2
}
fn default_latency_min_ms() -> i64 {
    0
}
fn default_latency_max_ms() -> i64 {
    10_000
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            latency_min_ms: default_latency_min_ms(),
            latency_max_ms: default_latency_max_ms(),
            uri_tag: None,
        }
    }
}

impl StatsConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(StatsError::Config("queue_capacity must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(StatsError::Config("workers must be at least 1".into()));
        }
        if self.latency_min_ms >= self.latency_max_ms {
            return Err(StatsError::InvalidRange {
                min: self.latency_min_ms,
                max: self.latency_max_ms,
            });
        }
        if matches!(&self.uri_tag, Some(tag) if tag.is_empty()) {
            return Err(StatsError::Config("uri_tag must not be empty".into()));
        }
        Ok(())
    }
}

// ─── Demo server ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Address of the instrumented application
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Address of the scrape endpoint
    #[serde(default = "default_metrics_listen")]
    pub metrics_listen: String,

    /// Global tags attached to every HTTP series
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Upper bound of the random delay added by `GET /app`
    #[serde(default = "default_demo_max_delay_ms")]
    pub demo_max_delay_ms: u64,

    #[serde(default)]
    pub stats: StatsConfig,
}

fn default_listen() -> String {
    "0.0.0.0:3000".into()
}
fn default_metrics_listen() -> String {
    "0.0.0.0:8081".into()
}
fn default_demo_max_delay_ms() -> u64 {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_listen: default_metrics_listen(),
            tags: HashMap::new(),
            demo_max_delay_ms: default_demo_max_delay_ms(),
            stats: StatsConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.stats.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Fill in `host` from `$HOSTNAME` unless the config names one.
    pub fn with_host_tag(mut self) -> Self {
        self.tags.entry("host".into()).or_insert_with(|| {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into())
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg = StatsConfig::from_json("{}").unwrap();
        assert_eq!(cfg, StatsConfig::default());
        assert_eq!(cfg.latency_max_ms, 10_000);
    }

    #[test]
    fn unknown_field_rejected() {
        let err = StatsConfig::from_json(r#"{"queue_capacty": 5}"#).unwrap_err();
        assert!(matches!(err, StatsError::ConfigParse(_)));
    }

    #[test]
    fn inverted_latency_range_rejected() {
        let err = StatsConfig::from_json(r#"{"latency_min_ms": 50, "latency_max_ms": 10}"#)
            .unwrap_err();
        assert!(matches!(err, StatsError::InvalidRange { min: 50, max: 10 }));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = StatsConfig::from_json(r#"{"workers": 0}"#).unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));
    }

    #[test]
    fn app_config_nested_stats() {
        let cfg = AppConfig::from_json(
            r#"{"listen": "127.0.0.1:9000", "tags": {"host": "web-1"}, "stats": {"uri_tag": "uri"}}"#,
        )
        .unwrap()
        .with_host_tag();

        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(cfg.metrics_listen, "0.0.0.0:8081");
        assert_eq!(cfg.tags["host"], "web-1");
        assert_eq!(cfg.stats.uri_tag.as_deref(), Some("uri"));
    }

    #[test]
    fn host_tag_filled_in() {
        let cfg = AppConfig::default().with_host_tag();
        assert!(cfg.tags.contains_key("host"));
    }
}
