use hdrhistogram::Histogram;
use serde::Serialize;

/// Field suffixes and quantiles reported for every histogram.
pub const QUANTILES: [(&str, f64); 6] = [
    (".P50", 0.50),
    (".P75", 0.75),
    (".P90", 0.90),
    (".P95", 0.95),
    (".P99", 0.99),
    (".P999", 0.999),
];

/// The six reported quantiles for one histogram series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PercentileSet {
    pub p50: i64,
    pub p75: i64,
    pub p90: i64,
    pub p95: i64,
    pub p99: i64,
    pub p999: i64,
    pub count: u64,
}

impl PercentileSet {
    /// Extract the percentile set from an HdrHistogram whose values were
    /// recorded relative to `offset`.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>, offset: i64) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        let [p50, p75, p90, p95, p99, p999] =
            QUANTILES.map(|(_, q)| offset.saturating_add(hist.value_at_quantile(q) as i64));
        Self {
            p50,
            p75,
            p90,
            p95,
            p99,
            p999,
            count: hist.len(),
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            p50: 0,
            p75: 0,
            p90: 0,
            p95: 0,
            p99: 0,
            p999: 0,
            count: 0,
        }
    }

    /// `(suffix, value)` pairs in the order of [`QUANTILES`].
    pub fn fields(&self) -> [(&'static str, i64); 6] {
        [
            (QUANTILES[0].0, self.p50),
            (QUANTILES[1].0, self.p75),
            (QUANTILES[2].0, self.p90),
            (QUANTILES[3].0, self.p95),
            (QUANTILES[4].0, self.p99),
            (QUANTILES[5].0, self.p999),
        ]
    }
}
