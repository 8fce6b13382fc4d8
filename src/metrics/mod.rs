//! Counters, gauges and histograms keyed by series identity, plus the
//! registry that snapshots them in line protocol.

pub mod counter;
pub mod gauge;
pub mod histogram;
pub mod percentiles;
pub mod registry;
pub mod series;
pub mod snapshot;

use std::collections::HashMap;

pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::{Histogram, DEFAULT_PRECISION};
pub use percentiles::PercentileSet;
pub use registry::Registry;
pub use snapshot::Snapshot;

/// Tag key → tag value qualifying a series.
pub type Tags = HashMap<String, String>;
