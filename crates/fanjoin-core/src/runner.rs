//! Task runner: partition, dispatch, join, combine.
//!
//! A [`TaskRunner`] serves exactly one run. It asks its combiner once, at
//! construction, which merge mode to use and allocates the matching join
//! primitive:
//!
//! - incremental: a bounded channel with room for every task; the joining
//!   thread takes finished visitors off it and merges them one by one.
//! - barrier: a wait group plus one result slot per section; the joining
//!   thread waits for all tasks, then merges every visitor in section order.
//!
//! `execute_and_combine` consumes the runner, so it cannot be reused.

use std::sync::{Arc, Mutex};

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use tracing::debug;

use crate::combiner::{Combiner, MergeMode};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::section::{partition, Section};
use crate::task::{ErrorSlot, Finished, Reporter, Signal, WorkerTask};
use crate::visitor::{Visitor, VisitorFactory};

enum Join<V> {
    Incremental {
        tx: Sender<Finished<V>>,
        rx: Receiver<Finished<V>>,
    },
    Barrier {
        done: WaitGroup,
        slots: Vec<Arc<Mutex<Option<V>>>>,
    },
}

pub struct TaskRunner<C, V> {
    combiner: C,
    task_count: usize,
    join: Join<V>,
    errors: Arc<ErrorSlot>,
}

impl<C, V> TaskRunner<C, V>
where
    C: Combiner<V>,
    V: Send + 'static,
{
    pub fn new(combiner: C, task_count: usize) -> Result<Self> {
        if task_count == 0 {
            return Err(Error::InvalidTaskCount(task_count));
        }
        let join = match combiner.mode() {
            MergeMode::Incremental => {
                let (tx, rx) = bounded(task_count);
                Join::Incremental { tx, rx }
            }
            MergeMode::Barrier => Join::Barrier {
                done: WaitGroup::new(),
                slots: (0..task_count).map(|_| Arc::new(Mutex::new(None))).collect(),
            },
        };
        Ok(Self {
            combiner,
            task_count,
            join,
            errors: Arc::new(ErrorSlot::default()),
        })
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn mode(&self) -> MergeMode {
        match self.join {
            Join::Incremental { .. } => MergeMode::Incremental,
            Join::Barrier { .. } => MergeMode::Barrier,
        }
    }

    /// Visit `input` with `task_count` parallel visitors and merge them.
    ///
    /// Blocks until every task has reported. Returns the combiner on
    /// success; if any visitor failed, returns [`Error::TasksFailed`] with
    /// the first recorded failure and never calls `combine_all`.
    pub fn execute_and_combine<T, E, F>(
        self,
        executor: &E,
        factory: &F,
        input: impl Into<Arc<[T]>>,
    ) -> Result<C>
    where
        T: Send + Sync + 'static,
        V: Visitor<T>,
        E: Executor + ?Sized,
        F: VisitorFactory<V> + ?Sized,
    {
        let TaskRunner {
            mut combiner,
            task_count,
            join,
            errors,
        } = self;
        let input: Arc<[T]> = input.into();
        let sections = partition(input.len(), task_count);
        debug!(len = input.len(), task_count, mode = ?combiner.mode(), "dispatching sections");

        match join {
            Join::Incremental { tx, rx } => {
                for section in &sections {
                    let signal = Signal::Queue(tx.clone());
                    dispatch(executor, factory, &input, *section, &errors, signal);
                }
                // Only task-held senders remain, so a disconnect means lost tasks.
                drop(tx);
                join_incremental(&mut combiner, &rx, task_count)?;
                check_failed(&errors)?;
            }
            Join::Barrier { done, slots } => {
                for (section, slot) in sections.iter().zip(&slots) {
                    let signal = Signal::Latch {
                        slot: Arc::clone(slot),
                        done: done.clone(),
                    };
                    dispatch(executor, factory, &input, *section, &errors, signal);
                }
                done.wait();
                debug!(task_count, "all tasks reported");
                check_failed(&errors)?;
                let partials = collect_slots(slots)?;
                combiner.combine_all(partials);
            }
        }
        Ok(combiner)
    }
}

fn dispatch<T, V, E, F>(
    executor: &E,
    factory: &F,
    input: &Arc<[T]>,
    section: Section,
    errors: &Arc<ErrorSlot>,
    signal: Signal<V>,
) where
    T: Send + Sync + 'static,
    V: Visitor<T> + 'static,
    E: Executor + ?Sized,
    F: VisitorFactory<V> + ?Sized,
{
    let reporter = Reporter::new(section, Arc::clone(errors), signal);
    let task = WorkerTask::new(Arc::clone(input), section, factory.create(), reporter);
    executor.submit(Box::new(move || task.run()));
}

/// Take one finished task at a time and merge it, `task_count` times.
/// Once a failure has been seen, later visitors are drained but not merged.
/// Every reporter signals even when dropped, so a closed channel here means
/// an executor leaked or tore down tasks behind the runner's back.
fn join_incremental<C, V>(
    combiner: &mut C,
    rx: &Receiver<Finished<V>>,
    task_count: usize,
) -> Result<()>
where
    C: Combiner<V>,
{
    let mut failed = false;
    for remaining in (0..task_count).rev() {
        let finished = rx.recv().map_err(|_| Error::CombineFailed {
            reason: format!("completion channel closed with {} task(s) unreported", remaining + 1),
        })?;
        match finished.visitor {
            Some(visitor) if !failed => combiner.combine_one(visitor),
            Some(_) => debug!(section = %finished.section, "skipping merge after failure"),
            None => failed = true,
        }
    }
    debug!(task_count, failed, "all tasks reported");
    Ok(())
}

fn check_failed(errors: &ErrorSlot) -> Result<()> {
    match errors.take() {
        Some((section, source)) => Err(Error::TasksFailed { section, source }),
        None => Ok(()),
    }
}

/// Poisoned or empty slots only show up if an executor broke the reporting
/// contract; they fail the join instead of panicking the caller.
fn collect_slots<V>(slots: Vec<Arc<Mutex<Option<V>>>>) -> Result<Vec<V>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            let mut guard = slot.lock().map_err(|_| Error::CombineFailed {
                reason: format!("result slot {} poisoned", index),
            })?;
            guard.take().ok_or_else(|| Error::CombineFailed {
                reason: format!("task {} reported success without a result", index),
            })
        })
        .collect()
}
