//! C10 — Progress / Dispatcher: a work-stealing thread pool with the two
//! iteration idioms from spec §4.10, a subject/observer progress object, and
//! cooperative cancellation (spec §5).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use colored::Colorize;
use rayon::prelude::*;

use crate::error::GraphError;

/// A shared flag checked at batch boundaries (spec §5 "Cancellation and
/// timeout"). Cloning shares the same underlying flag.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A snapshot of how much of an estimated total amount of work has been
/// done.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
}

impl Progress {
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * (self.done as f64) / (self.total as f64)
        }
    }
}

/// A single atomic counter against a fixed estimated total; listeners read
/// it lock-free (spec §5 "Progress counter").
#[derive(Debug)]
pub struct WorkProgress {
    done: AtomicU64,
    total: u64,
}

impl WorkProgress {
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            done: AtomicU64::new(0),
            total,
        }
    }

    pub fn tick(&self, delta: u64) {
        self.done.fetch_add(delta, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> Progress {
        Progress {
            done: self.done.load(Ordering::Relaxed),
            total: self.total,
        }
    }
}

/// Subject/observer relation for progress reporting (spec §4.10).
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, phase: &str, progress: Progress);
}

/// Plain colored stderr output, the default listener.
#[derive(Debug, Default)]
pub struct TextProgressListener;

impl ProgressListener for TextProgressListener {
    fn on_progress(&self, phase: &str, progress: Progress) {
        eprintln!(
            "{} {} {:.1}%",
            "==>".bold().blue(),
            phase,
            progress.percent()
        );
    }
}

#[cfg(feature = "tracing")]
#[derive(Debug, Default)]
pub struct TracingProgressListener;

#[cfg(feature = "tracing")]
impl ProgressListener for TracingProgressListener {
    fn on_progress(&self, phase: &str, progress: Progress) {
        tracing::info!(phase, done = progress.done, total = progress.total, percent = progress.percent(), "progress");
    }
}

/// A work-stealing thread pool capped at `min(configured_cores,
/// detected_cores)` (spec §4.10).
pub struct Dispatcher {
    pool: rayon::ThreadPool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(requested_cores: usize) -> Self {
        let available = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        let workers = requested_cores.clamp(1, available);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .unwrap_or_else(|_| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(1)
                    .build()
                    .expect("single-threaded pool always builds")
            });
        Self { pool }
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Batched sequence iteration: hands items to workers ~1000 at a time
    /// (spec §4.10). On the first worker error, sets `cancel` and the first
    /// observed error is returned after all workers finish.
    pub fn dispatch_sequences<T, F>(
        &self,
        items: &[T],
        cancel: &CancellationToken,
        work: F,
    ) -> Result<(), GraphError>
    where
        T: Sync,
        F: Fn(&T) -> Result<(), GraphError> + Sync,
    {
        const BATCH_SIZE: usize = 1000;
        let first_error: Mutex<Option<GraphError>> = Mutex::new(None);

        self.pool.install(|| {
            items.par_chunks(BATCH_SIZE).for_each(|batch| {
                if cancel.is_cancelled() {
                    return;
                }
                for item in batch {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if let Err(e) = work(item) {
                        cancel.cancel();
                        let mut guard = first_error.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        if guard.is_none() {
                            *guard = Some(e);
                        }
                        break;
                    }
                }
            });
        });

        self.finish(cancel, first_error)
    }

    /// Per-partition iteration: the `N` partitions are distributed across
    /// workers by a shared counter (spec §4.10).
    pub fn dispatch_partitions<F>(
        &self,
        partition_count: u32,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<(), GraphError>
    where
        F: Fn(u32) -> Result<(), GraphError> + Sync,
    {
        let first_error: Mutex<Option<GraphError>> = Mutex::new(None);

        self.pool.install(|| {
            (0..partition_count).into_par_iter().for_each(|n| {
                if cancel.is_cancelled() {
                    return;
                }
                if let Err(e) = work(n) {
                    cancel.cancel();
                    let mut guard = first_error.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    if guard.is_none() {
                        *guard = Some(e);
                    }
                }
            });
        });

        self.finish(cancel, first_error)
    }

    fn finish(&self, cancel: &CancellationToken, first_error: Mutex<Option<GraphError>>) -> Result<(), GraphError> {
        if cancel.is_cancelled() {
            let mut guard = first_error.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            return Err(guard.take().unwrap_or(GraphError::Cancelled));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn work_progress_reports_percent() {
        let progress = WorkProgress::new(200);
        progress.tick(50);
        assert!((progress.snapshot().percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn cancellation_token_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn dispatch_sequences_visits_every_item_when_no_errors() {
        let dispatcher = Dispatcher::new(4);
        let cancel = CancellationToken::new();
        let items: Vec<u32> = (0..10_000).collect();
        let visited = AtomicUsize::new(0);
        dispatcher
            .dispatch_sequences(&items, &cancel, |_| {
                visited.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();
        assert_eq!(visited.load(Ordering::Relaxed), items.len());
    }

    #[test]
    fn dispatch_sequences_surfaces_first_error_and_cancels() {
        let dispatcher = Dispatcher::new(4);
        let cancel = CancellationToken::new();
        let items: Vec<u32> = (0..1000).collect();
        let result = dispatcher.dispatch_sequences(&items, &cancel, |&i| {
            if i == 500 {
                Err(GraphError::Invariant("boom".into()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn dispatch_partitions_visits_every_partition() {
        let dispatcher = Dispatcher::new(4);
        let cancel = CancellationToken::new();
        let visited = AtomicUsize::new(0);
        dispatcher
            .dispatch_partitions(16, &cancel, |_| {
                visited.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();
        assert_eq!(visited.load(Ordering::Relaxed), 16);
    }
}
