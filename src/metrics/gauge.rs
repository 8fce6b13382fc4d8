use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::registry::Registry;

/// Poll function backing a derived gauge.
pub type GaugeFn = Arc<dyn Fn() -> i64 + Send + Sync>;

pub(crate) struct GaugeCell {
    value: AtomicI64,
    func: RwLock<Option<GaugeFn>>,
    retired: AtomicBool,
}

impl Default for GaugeCell {
    fn default() -> Self {
        Self {
            value: AtomicI64::new(0),
            func: RwLock::new(None),
            retired: AtomicBool::new(false),
        }
    }
}

impl GaugeCell {
    pub(crate) fn read(&self) -> i64 {
        match &*self.func.read() {
            Some(f) => f(),
            None => self.value.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Instantaneous signed value identified by its series.
///
/// Like [`Counter`](super::Counter), a held handle re-creates its series on
/// the next update after `remove` or `reset`.
pub struct Gauge {
    series: String,
    cell: RwLock<Arc<GaugeCell>>,
    registry: Registry,
}

impl Clone for Gauge {
    fn clone(&self) -> Self {
        Self {
            series: self.series.clone(),
            cell: RwLock::new(self.cell.read().clone()),
            registry: self.registry.clone(),
        }
    }
}

impl Gauge {
    pub(crate) fn new(series: String, cell: Arc<GaugeCell>, registry: Registry) -> Self {
        Self {
            series,
            cell: RwLock::new(cell),
            registry,
        }
    }

    fn cell(&self) -> Arc<GaugeCell> {
        let cell = self.cell.read().clone();
        if !cell.is_retired() {
            return cell;
        }
        let fresh = self.registry.gauge_cell(&self.series);
        *self.cell.write() = fresh.clone();
        fresh
    }

    pub fn set(&self, value: i64) {
        self.cell().value.store(value, Ordering::Relaxed);
    }

    /// Poll `f` at snapshot time instead of reporting the last `set`.
    pub fn set_func<F>(&self, f: F)
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        *self.cell().func.write() = Some(Arc::new(f));
    }

    pub fn remove(&self) {
        let cell = self.cell.read().clone();
        self.registry.remove_gauge(&self.series, &cell);
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn is_retired(&self) -> bool {
        self.cell.read().is_retired()
    }
}
