use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::counter::{BatchFn, Counter, CounterCell, CounterSource};
use super::gauge::{Gauge, GaugeCell};
use super::histogram::{Histogram, HistogramCell, DEFAULT_PRECISION};
use super::series;
use super::snapshot::Snapshot;
use super::Tags;
use crate::error::Result;

/// Thread-safe table of every live series.
///
/// Clone the handle to share it; all clones see the same series. Handles
/// returned by `counter`, `gauge` and `histogram` update their own series
/// without touching the table lock. Only creation, removal, `snapshot` and
/// `reset` lock the table.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    // Serialises snapshots so batch side effects never overlap.
    snapshot_lock: Mutex<()>,
}

#[derive(Default)]
struct Tables {
    counters: HashMap<String, Arc<CounterCell>>,
    gauges: HashMap<String, Arc<GaugeCell>>,
    histograms: HashMap<String, Arc<HistogramCell>>,
    batches: HashMap<String, BatchFn>,
}

// ─── Registry impl ───────────────────────────────────────────────

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `(name, tags, field)`, created at zero if absent.
    pub fn counter(&self, name: &str, tags: &Tags, field: &str) -> Counter {
        let series = series::encode(name, tags, field);
        let cell = self.counter_cell(&series);
        Counter::new(series, cell, self.clone())
    }

    /// Gauge for `(name, tags, field)`, created at zero if absent.
    pub fn gauge(&self, name: &str, tags: &Tags, field: &str) -> Gauge {
        let series = series::encode(name, tags, field);
        let cell = self.gauge_cell(&series);
        Gauge::new(series, cell, self.clone())
    }

    /// Histogram over `[min, max]` with [`DEFAULT_PRECISION`] digits.
    pub fn histogram(
        &self,
        name: &str,
        tags: &Tags,
        field: &str,
        min: i64,
        max: i64,
    ) -> Result<Histogram> {
        self.histogram_with_precision(name, tags, field, min, max, DEFAULT_PRECISION)
    }

    /// Histogram over `[min, max]` keeping `precision` significant digits.
    ///
    /// If the series already exists it is returned as is, with its original
    /// range and precision.
    pub fn histogram_with_precision(
        &self,
        name: &str,
        tags: &Tags,
        field: &str,
        min: i64,
        max: i64,
        precision: u8,
    ) -> Result<Histogram> {
        let series = series::encode(name, tags, field);
        let cell = self.histogram_cell(&series, min, max, precision)?;
        Ok(Histogram::new(series, cell, self.clone()))
    }

    /// Consistent copy of every live series.
    ///
    /// Poll functions and batch side effects run here, inside the snapshot
    /// critical section; they must not call back into this registry.
    pub fn snapshot(&self) -> Snapshot {
        let _serial = self.inner.snapshot_lock.lock();
        let tables = self.inner.tables.read();

        let batch_keys: BTreeSet<String> = tables
            .counters
            .values()
            .filter_map(|cell| cell.batch_key())
            .collect();
        for key in &batch_keys {
            if let Some(side_effect) = tables.batches.get(key) {
                side_effect();
            }
        }

        let mut snap = Snapshot::default();
        for (series, cell) in &tables.counters {
            snap.counters.insert(series.clone(), cell.read());
        }
        for (series, cell) in &tables.gauges {
            snap.gauges.insert(series.clone(), cell.read());
        }
        for (series, cell) in &tables.histograms {
            for (suffix, value) in cell.percentiles().fields() {
                snap.gauges.insert(format!("{series}{suffix}"), value);
            }
        }
        snap
    }

    /// Snapshot rendered in line protocol.
    pub fn snapshot_lines(&self) -> String {
        self.snapshot().to_lines()
    }

    /// Drop every series and batch function. Outstanding handles are retired
    /// and re-create their series from zero on their next update.
    pub fn reset(&self) {
        let mut tables = self.inner.tables.write();
        tables.counters.values().for_each(|c| c.retire());
        tables.gauges.values().for_each(|g| g.retire());
        tables.histograms.values().for_each(|h| h.retire());
        *tables = Tables::default();
        drop(tables);

        tracing::info!("metrics registry reset");
    }

    // ─── Crate-internal plumbing for handles ─────────────────────

    pub(crate) fn counter_cell(&self, series: &str) -> Arc<CounterCell> {
        if let Some(cell) = self.inner.tables.read().counters.get(series) {
            return cell.clone();
        }
        self.inner
            .tables
            .write()
            .counters
            .entry(series.to_owned())
            .or_insert_with(|| {
                tracing::debug!(%series, "counter registered");
                Arc::default()
            })
            .clone()
    }

    pub(crate) fn gauge_cell(&self, series: &str) -> Arc<GaugeCell> {
        if let Some(cell) = self.inner.tables.read().gauges.get(series) {
            return cell.clone();
        }
        self.inner
            .tables
            .write()
            .gauges
            .entry(series.to_owned())
            .or_insert_with(|| {
                tracing::debug!(%series, "gauge registered");
                Arc::default()
            })
            .clone()
    }

    pub(crate) fn histogram_cell(
        &self,
        series: &str,
        min: i64,
        max: i64,
        precision: u8,
    ) -> Result<Arc<HistogramCell>> {
        if let Some(cell) = self.inner.tables.read().histograms.get(series) {
            return Ok(cell.clone());
        }

        let mut tables = self.inner.tables.write();
        if let Some(cell) = tables.histograms.get(series) {
            return Ok(cell.clone());
        }
        let cell = Arc::new(HistogramCell::new(min, max, precision)?);
        tables.histograms.insert(series.to_owned(), cell.clone());
        tracing::debug!(%series, min, max, precision, "histogram registered");
        Ok(cell)
    }

    /// Swap a counter's value source. A batch side effect is registered in
    /// the same critical section, so no snapshot sees the source without it.
    pub(crate) fn set_counter_source(
        &self,
        cell: &CounterCell,
        source: CounterSource,
        side_effect: Option<BatchFn>,
    ) {
        let mut tables = self.inner.tables.write();
        if let (CounterSource::Batch { key, .. }, Some(side_effect)) = (&source, side_effect) {
            tables.batches.entry(key.clone()).or_insert(side_effect);
        }
        cell.set_source(source);
        prune_batches(&mut tables);
    }

    pub(crate) fn remove_counter(&self, series: &str, cell: &Arc<CounterCell>) {
        let mut tables = self.inner.tables.write();
        if remove_if_same(&mut tables.counters, series, cell) {
            cell.retire();
        }
        prune_batches(&mut tables);
    }

    pub(crate) fn remove_gauge(&self, series: &str, cell: &Arc<GaugeCell>) {
        if remove_if_same(&mut self.inner.tables.write().gauges, series, cell) {
            cell.retire();
        }
    }

    pub(crate) fn remove_histogram(&self, series: &str, cell: &Arc<HistogramCell>) {
        if remove_if_same(&mut self.inner.tables.write().histograms, series, cell) {
            cell.retire();
        }
    }
}

/// Forget batch functions no live counter references any more.
fn prune_batches(tables: &mut Tables) {
    let live: BTreeSet<String> = tables
        .counters
        .values()
        .filter_map(|c| c.batch_key())
        .collect();
    tables.batches.retain(|key, _| live.contains(key));
}

/// Remove `series` only if it still maps to `cell`, so a stale handle never
/// drops a series that was re-created after it.
fn remove_if_same<T>(map: &mut HashMap<String, Arc<T>>, series: &str, cell: &Arc<T>) -> bool {
    match map.get(series) {
        Some(current) if Arc::ptr_eq(current, cell) => {
            map.remove(series);
            true
        }
        _ => false,
    }
}
