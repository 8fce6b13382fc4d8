//! In-process metrics for HTTP services.
//!
//! A [`Registry`] holds counters, gauges and histograms keyed by
//! `measurement[,tag=value]* field` and renders them in line protocol.
//! [`HttpStats`] provides a tower layer that records per-request method,
//! status, size and latency metrics into a registry.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;

pub use config::{AppConfig, StatsConfig};
pub use error::{Result, StatsError};
pub use metrics::{Counter, Gauge, Histogram, Registry, Snapshot, Tags};
pub use middleware::{HttpStats, ResponseObserver, StatsLayer};
