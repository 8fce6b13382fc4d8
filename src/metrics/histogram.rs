use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hdrhistogram::Histogram as HdrHistogram;
use parking_lot::{Mutex, RwLock};

use super::percentiles::PercentileSet;
use super::registry::Registry;
use crate::error::{Result, StatsError};

/// Significant decimal digits kept when no precision is given.
pub const DEFAULT_PRECISION: u8 = 3;

pub(crate) struct HistogramCell {
    hist: Mutex<HdrHistogram<u64>>,
    min: i64,
    max: i64,
    precision: u8,
    retired: AtomicBool,
}

impl HistogramCell {
    /// Values are stored as `value - min`, so the backing histogram always
    /// covers `0..=max - min`.
    pub(crate) fn new(min: i64, max: i64, precision: u8) -> Result<Self> {
        if min >= max {
            return Err(StatsError::InvalidRange { min, max });
        }
        if !(1..=5).contains(&precision) {
            return Err(StatsError::InvalidPrecision(precision));
        }

        let span = (i128::from(max) - i128::from(min)) as u64;
        // hdrhistogram needs high >= 2 * low, with low fixed at 1.
        let hist = HdrHistogram::<u64>::new_with_max(span.max(2), precision)
            .map_err(|e| StatsError::Histogram(format!("{e:?}")))?;

        Ok(Self {
            hist: Mutex::new(hist),
            min,
            max,
            precision,
            retired: AtomicBool::new(false),
        })
    }

    fn record(&self, value: i64) {
        let offset = (i128::from(value.clamp(self.min, self.max)) - i128::from(self.min)) as u64;
        // In range by construction.
        let _ = self.hist.lock().record(offset);
    }

    pub(crate) fn percentiles(&self) -> PercentileSet {
        PercentileSet::from_histogram(&self.hist.lock(), self.min)
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Bounded-range distribution reporting approximate percentiles.
///
/// Values outside `[min, max]` are clamped to the nearest bound. Reported
/// percentiles are within `10^(1 - precision)` relative error of the true
/// value, measured from `min`. After `remove` or `reset` the next recorded
/// value re-creates the series with the same range and precision.
pub struct Histogram {
    series: String,
    cell: RwLock<Arc<HistogramCell>>,
    registry: Registry,
}

impl Clone for Histogram {
    fn clone(&self) -> Self {
        Self {
            series: self.series.clone(),
            cell: RwLock::new(self.cell.read().clone()),
            registry: self.registry.clone(),
        }
    }
}

impl Histogram {
    pub(crate) fn new(series: String, cell: Arc<HistogramCell>, registry: Registry) -> Self {
        Self {
            series,
            cell: RwLock::new(cell),
            registry,
        }
    }

    fn cell(&self) -> Arc<HistogramCell> {
        let cell = self.cell.read().clone();
        if !cell.is_retired() {
            return cell;
        }
        match self
            .registry
            .histogram_cell(&self.series, cell.min, cell.max, cell.precision)
        {
            Ok(fresh) => {
                *self.cell.write() = fresh.clone();
                fresh
            }
            Err(e) => {
                tracing::warn!(series = %self.series, error = %e, "histogram not re-created");
                cell
            }
        }
    }

    pub fn record_value(&self, value: i64) {
        self.cell().record(value);
    }

    pub fn remove(&self) {
        let cell = self.cell.read().clone();
        self.registry.remove_histogram(&self.series, &cell);
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn is_retired(&self) -> bool {
        self.cell.read().is_retired()
    }

    /// Inclusive `(min, max)` range this series clamps to.
    pub fn range(&self) -> (i64, i64) {
        let cell = self.cell.read();
        (cell.min, cell.max)
    }
}
