//! Convenience entry points: pick a task count, fork only when worth it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::combiner::Combiner;
use crate::config::{ParallelConfig, DEFAULT_TASK_RATIO};
use crate::error::{BoxError, Error, Result, TaskPanicked};
use crate::executor::Executor;
use crate::runner::TaskRunner;
use crate::section::Section;
use crate::visitor::{Visitor, VisitorFactory};

/// Available CPUs times [`DEFAULT_TASK_RATIO`].
pub fn default_task_count() -> usize {
    num_cpus::get().max(1) * DEFAULT_TASK_RATIO
}

/// One task per `batch_size` elements, at least one.
pub fn calculate_task_count(len: usize, batch_size: usize) -> usize {
    (len / batch_size.max(1)).max(1)
}

/// Visit `input` and merge the results into `combiner`.
///
/// Inputs shorter than `config.min_fork_size` are handled by a single
/// visitor on the calling thread; anything larger goes through a
/// [`TaskRunner`] with `min(len, task_count)` tasks.
pub fn for_each<T, V, C, E, F>(
    executor: &E,
    factory: &F,
    mut combiner: C,
    input: impl Into<Arc<[T]>>,
    config: &ParallelConfig,
) -> Result<C>
where
    T: Send + Sync + 'static,
    V: Visitor<T> + 'static,
    C: Combiner<V>,
    E: Executor + ?Sized,
    F: VisitorFactory<V> + ?Sized,
{
    config.validate()?;
    let input: Arc<[T]> = input.into();
    let len = input.len();

    if len < config.min_fork_size {
        debug!(len, min_fork_size = config.min_fork_size, "visiting serially");
        let mut visitor = factory.create();
        // A panicking visitor fails the call here too, as it does on a worker.
        let visited = panic::catch_unwind(AssertUnwindSafe(|| -> std::result::Result<(), BoxError> {
            for item in input.iter() {
                visitor.visit(item).map_err(|e| Box::new(e) as BoxError)?;
            }
            Ok(())
        }));
        let failure = match visited {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(Box::new(TaskPanicked::from_payload(payload)) as BoxError),
        };
        if let Some(source) = failure {
            return Err(Error::TasksFailed {
                section: Section::new(0, 0, len),
                source,
            });
        }
        if combiner.use_combine_one() {
            combiner.combine_one(visitor);
        } else {
            combiner.combine_all(vec![visitor]);
        }
        return Ok(combiner);
    }

    let task_count = config.task_count_for(len).min(len).max(1);
    TaskRunner::new(combiner, task_count)?.execute_and_combine(executor, factory, input)
}

/// [`for_each`] on the process-wide default executor.
pub fn for_each_default<T, V, C, F>(
    factory: &F,
    combiner: C,
    input: impl Into<Arc<[T]>>,
    config: &ParallelConfig,
) -> Result<C>
where
    T: Send + Sync + 'static,
    V: Visitor<T> + 'static,
    C: Combiner<V>,
    F: VisitorFactory<V> + ?Sized,
{
    for_each(crate::executor::default_executor(), factory, combiner, input, config)
}
