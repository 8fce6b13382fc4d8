use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::registry::Registry;

/// Poll function backing a derived counter.
pub type CounterFn = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Side effect shared by every counter registered under one batch key.
pub type BatchFn = Arc<dyn Fn() + Send + Sync>;

/// Where a counter's reported value comes from.
pub(crate) enum CounterSource {
    /// Accumulated `add` / `add_n` state.
    Direct,
    /// Value returned by a poll function at snapshot time.
    Func(CounterFn),
    /// Value derived after the batch side effect for `key` has run.
    Batch { key: String, value: CounterFn },
}

/// Per-series state shared between the registry and every handle.
pub(crate) struct CounterCell {
    value: AtomicU64,
    source: RwLock<CounterSource>,
    retired: AtomicBool,
}

impl Default for CounterCell {
    fn default() -> Self {
        Self {
            value: AtomicU64::new(0),
            source: RwLock::new(CounterSource::Direct),
            retired: AtomicBool::new(false),
        }
    }
}

impl CounterCell {
    /// Batch key this cell depends on, if any.
    pub(crate) fn batch_key(&self) -> Option<String> {
        match &*self.source.read() {
            CounterSource::Batch { key, .. } => Some(key.clone()),
            _ => None,
        }
    }

    /// Current value. Batch side effects must already have run.
    pub(crate) fn read(&self) -> u64 {
        match &*self.source.read() {
            CounterSource::Direct => self.value.load(Ordering::Relaxed),
            CounterSource::Func(f) => f(),
            CounterSource::Batch { value, .. } => value(),
        }
    }

    pub(crate) fn set_source(&self, source: CounterSource) {
        *self.source.write() = source;
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Monotonically increasing counter identified by its series.
///
/// Handles are cheap to clone; every handle for the same live series shares
/// one accumulator. A handle outlives `remove` and `reset`: its next update
/// re-creates the series from zero.
pub struct Counter {
    series: String,
    cell: RwLock<Arc<CounterCell>>,
    registry: Registry,
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        Self {
            series: self.series.clone(),
            cell: RwLock::new(self.cell.read().clone()),
            registry: self.registry.clone(),
        }
    }
}

impl Counter {
    pub(crate) fn new(series: String, cell: Arc<CounterCell>, registry: Registry) -> Self {
        Self {
            series,
            cell: RwLock::new(cell),
            registry,
        }
    }

    /// Live cell for this series, looked up again once the held one retired.
    fn cell(&self) -> Arc<CounterCell> {
        let cell = self.cell.read().clone();
        if !cell.is_retired() {
            return cell;
        }
        let fresh = self.registry.counter_cell(&self.series);
        *self.cell.write() = fresh.clone();
        fresh
    }

    /// Increment by one.
    pub fn add(&self) {
        self.add_n(1);
    }

    /// Increment by `delta`.
    pub fn add_n(&self, delta: u64) {
        self.cell().value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Report `f()` on every snapshot instead of the accumulated value.
    pub fn set_func<F>(&self, f: F)
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.registry
            .set_counter_source(&self.cell(), CounterSource::Func(Arc::new(f)), None);
    }

    /// Derive this counter from a side effect shared under `key`.
    ///
    /// On each snapshot `side_effect` runs once for all live counters using
    /// `key`, then each counter reports its own `value()`. The first side
    /// effect registered for a key is the one that runs.
    pub fn set_batch_func<S, F>(&self, key: &str, side_effect: S, value: F)
    where
        S: Fn() + Send + Sync + 'static,
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        let source = CounterSource::Batch {
            key: key.to_owned(),
            value: Arc::new(value),
        };
        self.registry
            .set_counter_source(&self.cell(), source, Some(Arc::new(side_effect)));
    }

    /// Drop the series from the registry. Later updates start from zero.
    pub fn remove(&self) {
        let cell = self.cell.read().clone();
        self.registry.remove_counter(&self.series, &cell);
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    /// True once the series was removed or reset and not yet updated again.
    pub fn is_retired(&self) -> bool {
        self.cell.read().is_retired()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::metrics::Tags;

    fn tags() -> Tags {
        Tags::from([("bar".to_string(), "baz".to_string())])
    }

    #[test]
    fn add_and_add_n() {
        let registry = Registry::new();
        let c = registry.counter("foo", &tags(), "value");
        c.add();
        c.add_n(10);

        assert_eq!(registry.snapshot_lines(), "foo,bar=baz value=11\n");
    }

    #[test]
    fn handles_share_state() {
        let registry = Registry::new();
        registry.counter("foo", &tags(), "value").add();
        registry.counter("foo", &tags(), "value").add_n(2);

        assert_eq!(registry.snapshot().counters["foo,bar=baz value"], 3);
    }

    #[test]
    fn func_overrides_direct_state() {
        let registry = Registry::new();
        let c = registry.counter("foo", &tags(), "value");
        c.add_n(7);
        c.set_func(|| 100);
        c.add();

        assert_eq!(registry.snapshot_lines(), "foo,bar=baz value=100\n");
        assert_eq!(registry.snapshot_lines(), "foo,bar=baz value=100\n");
    }

    #[test]
    fn batch_side_effect_runs_once_per_snapshot() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(parking_lot::Mutex::new((0u64, 0u64)));

        let refresh = {
            let calls = calls.clone();
            let state = state.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                *state.lock() = (1, 2);
            }
        };

        let a = registry.counter("foo", &tags(), "value");
        let read_a = state.clone();
        a.set_batch_func("yay", refresh.clone(), move || read_a.lock().0);

        let b = registry.counter(
            "foo1",
            &Tags::from([("bar1".to_string(), "baz1".to_string())]),
            "value1",
        );
        let read_b = state.clone();
        b.set_batch_func("yay", refresh, move || read_b.lock().1);

        let lines = registry.snapshot_lines();
        assert!(lines.contains("foo,bar=baz value=1\n"), "{lines}");
        assert!(lines.contains("foo1,bar1=baz1 value1=2\n"), "{lines}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batch_side_effect_skipped_once_all_users_removed() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = registry.counter("foo", &tags(), "value");
        let counted = calls.clone();
        c.set_batch_func(
            "k",
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
            },
            || 5,
        );
        c.remove();

        assert_eq!(registry.snapshot_lines(), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_hides_series_and_restarts_from_zero() {
        let registry = Registry::new();
        let c = registry.counter("foo", &tags(), "value");
        c.add_n(5);
        c.remove();

        assert!(c.is_retired());
        assert_eq!(registry.snapshot_lines(), "");

        c.add();
        assert!(!c.is_retired());
        assert_eq!(registry.snapshot_lines(), "foo,bar=baz value=1\n");

        registry.counter("foo", &tags(), "value").add();
        assert_eq!(registry.snapshot_lines(), "foo,bar=baz value=2\n");
    }

    #[test]
    fn held_handle_keeps_counting_after_reset() {
        let registry = Registry::new();
        let c = registry.counter("foo", &Tags::new(), "v");
        let clone = c.clone();
        c.add();

        registry.reset();
        c.add();
        clone.add();

        assert_eq!(registry.snapshot_lines(), "foo v=2\n");
    }

    #[test]
    fn switching_to_func_forgets_batch_side_effect() {
        let registry = Registry::new();
        let stale = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let c = registry.counter("foo", &tags(), "value");
        let counted = stale.clone();
        c.set_batch_func(
            "k",
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
            },
            || 1,
        );
        c.set_func(|| 9);
        assert_eq!(registry.snapshot_lines(), "foo,bar=baz value=9\n");
        assert_eq!(stale.load(Ordering::SeqCst), 0);

        let d = registry.counter("bar", &tags(), "value");
        let counted = current.clone();
        d.set_batch_func(
            "k",
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
            },
            || 2,
        );
        registry.snapshot();

        assert_eq!(stale.load(Ordering::SeqCst), 0);
        assert_eq!(current.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_handle_does_not_remove_new_series() {
        let registry = Registry::new();
        let old = registry.counter("foo", &tags(), "value");
        old.remove();

        let fresh = registry.counter("foo", &tags(), "value");
        fresh.add_n(4);
        old.remove();

        assert_eq!(registry.snapshot_lines(), "foo,bar=baz value=4\n");
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        const THREADS: u64 = 8;
        const ADDS: u64 = 10_000;

        let registry = Registry::new();
        let c = registry.counter("foo", &tags(), "value");

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                let c = c.clone();
                s.spawn(move || {
                    for _ in 0..ADDS {
                        c.add();
                    }
                });
            }
        });

        assert_eq!(
            registry.snapshot().counters["foo,bar=baz value"],
            THREADS * ADDS
        );
    }
}
