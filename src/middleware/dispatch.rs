use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// A unit of recording work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded fire-and-forget queue drained by a fixed set of worker tasks.
///
/// `dispatch` never waits: when the queue is full the job is dropped and
/// counted. A panicking job is caught and logged; the worker keeps going.
/// Jobs still queued when the runtime shuts down are lost.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
    dropped: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Spawn `workers` tasks on the current tokio runtime.
    ///
    /// Panics if called outside a runtime.
    pub fn spawn(capacity: usize, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            tokio::spawn(worker(worker_id, rx.clone()));
        }

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue `job`. Returns `false` if it was dropped.
    pub fn dispatch(&self, job: Job) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total == 1 || total % 1024 == 0 {
                    tracing::warn!(dropped = total, "recording queue full, jobs dropped");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("recording workers gone, job dropped");
                false
            }
        }
    }

    /// Jobs dropped since this dispatcher was spawned.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(id: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = rx.lock().await.recv().await;
        let Some(job) = job else { break };

        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(worker = id, "recording job panicked");
        }
    }
    tracing::debug!(worker = id, "recording worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn runs_jobs() {
        let dispatcher = Dispatcher::spawn(16, 2);
        let ran = Arc::new(AtomicU64::new(0));

        for _ in 0..10 {
            let ran = ran.clone();
            assert!(dispatcher.dispatch(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })));
        }

        wait_until(|| ran.load(Ordering::SeqCst) == 10).await;
        assert_eq!(dispatcher.dropped(), 0);
    }

    #[tokio::test]
    async fn survives_panicking_job() {
        let dispatcher = Dispatcher::spawn(4, 1);
        let ran = Arc::new(AtomicU64::new(0));

        dispatcher.dispatch(Box::new(|| panic!("recorder bug")));
        let after = ran.clone();
        dispatcher.dispatch(Box::new(move || {
            after.fetch_add(1, Ordering::SeqCst);
        }));

        wait_until(|| ran.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn drops_when_full() {
        // The worker cannot run until this test yields, so the queue fills.
        let dispatcher = Dispatcher::spawn(2, 1);

        assert!(dispatcher.dispatch(Box::new(|| {})));
        assert!(dispatcher.dispatch(Box::new(|| {})));
        assert!(!dispatcher.dispatch(Box::new(|| {})));
        assert_eq!(dispatcher.dropped(), 1);
    }
}
