//! Execution services that run worker tasks.
//!
//! The runner only needs `submit`; where and when a job runs is up to the
//! implementation. A job that is dropped without running still signals its
//! runner, so an executor may discard work without hanging the join.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use tracing::warn;

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor {
    fn submit(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for &E {
    fn submit(&self, job: Job) {
        (**self).submit(job)
    }
}

/// Runs each job immediately on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn submit(&self, job: Job) {
        job()
    }
}

/// Spawns one OS thread per job, named `{prefix}-{n}` like pool workers.
#[derive(Clone, Debug)]
pub struct ThreadPerTask {
    name_prefix: String,
    stack_size: Option<usize>,
    spawned: Arc<AtomicUsize>,
}

impl ThreadPerTask {
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            stack_size: None,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Default for ThreadPerTask {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_THREAD_NAME_PREFIX)
    }
}

impl Executor for ThreadPerTask {
    fn submit(&self, job: Job) {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder = thread::Builder::new().name(format!("{}-{}", self.name_prefix, n));
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        // On spawn failure the job is dropped and its task reports itself abandoned.
        if let Err(e) = builder.spawn(job) {
            warn!(error = %e, "failed to spawn worker thread");
        }
    }
}

#[cfg(feature = "rayon-pool")]
impl Executor for rayon::ThreadPool {
    fn submit(&self, job: Job) {
        self.spawn(job)
    }
}

/// Build a rayon pool with `threads` named workers.
#[cfg(feature = "rayon-pool")]
pub fn build_pool(threads: usize, name_prefix: &str) -> crate::Result<rayon::ThreadPool> {
    let prefix = name_prefix.to_string();
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("{}-{}", prefix, i))
        .build()
        .map_err(|e| crate::Error::config("poolThreads", format!("failed to create thread pool: {}", e)))
}

#[cfg(feature = "rayon-pool")]
static DEFAULT_POOL: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();

#[cfg(not(feature = "rayon-pool"))]
static DEFAULT_THREADS: OnceLock<ThreadPerTask> = OnceLock::new();

/// Process-wide executor used by the convenience entry points.
///
/// With `rayon-pool` this is a lazily built pool sized to the CPU count;
/// if the pool cannot be built, or without the feature, jobs get their own
/// threads.
pub fn default_executor() -> &'static (dyn Executor + Sync) {
    #[cfg(feature = "rayon-pool")]
    {
        let pool = DEFAULT_POOL.get_or_init(|| {
            let config = crate::config::ParallelConfig::default();
            match build_pool(config.pool_threads(), &config.thread_name_prefix) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "falling back to thread-per-task executor");
                    None
                }
            }
        });
        if let Some(pool) = pool {
            return pool;
        }
        static FALLBACK: OnceLock<ThreadPerTask> = OnceLock::new();
        FALLBACK.get_or_init(ThreadPerTask::default)
    }
    #[cfg(not(feature = "rayon-pool"))]
    {
        DEFAULT_THREADS.get_or_init(ThreadPerTask::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_inline_runs_before_returning() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        InlineExecutor.submit(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_per_task_numbers_threads() {
        let (tx, rx) = crossbeam::channel::bounded(2);
        let executor = ThreadPerTask::new("named").with_stack_size(256 * 1024);
        for _ in 0..2 {
            let tx = tx.clone();
            executor.submit(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                let _ = tx.send(name);
            }));
        }
        let mut names: Vec<String> = (0..2)
            .map(|_| {
                rx.recv_timeout(Duration::from_secs(5))
                    .expect("job ran")
                    .expect("thread name")
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["named-0", "named-1"]);
    }

    #[cfg(feature = "rayon-pool")]
    #[test]
    fn test_rayon_pool_runs_jobs() {
        let pool = build_pool(2, "test-pool").expect("pool");
        let (tx, rx) = crossbeam::channel::bounded(4);
        for i in 0..4 {
            let tx = tx.clone();
            pool.submit(Box::new(move || {
                let _ = tx.send(i);
            }));
        }
        let mut got: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("job ran"))
            .collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_default_executor_is_shared() {
        let a = default_executor() as *const _ as *const ();
        let b = default_executor() as *const _ as *const ();
        assert_eq!(a, b);
    }
}
