//! Worker tasks: one section, one visitor, one outcome report.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crossbeam::channel::Sender;
use crossbeam::sync::WaitGroup;
use tracing::{trace, warn};

use crate::error::{BoxError, TaskAbandoned, TaskPanicked};
use crate::section::Section;
use crate::visitor::Visitor;

/// First failure recorded by any task of a run. Later failures are dropped.
#[derive(Default)]
pub(crate) struct ErrorSlot {
    first: Mutex<Option<(Section, BoxError)>>,
}

impl ErrorSlot {
    /// Returns `true` if this was the first failure.
    pub(crate) fn record(&self, section: Section, error: BoxError) -> bool {
        let mut first = match self.first.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if first.is_some() {
            return false;
        }
        *first = Some((section, error));
        true
    }

    pub(crate) fn take(&self) -> Option<(Section, BoxError)> {
        match self.first.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Message a task sends in incremental mode. `visitor` is `None` on failure.
pub(crate) struct Finished<V> {
    pub section: Section,
    pub visitor: Option<V>,
}

/// Where a task signals its completion; one variant per merge mode.
pub(crate) enum Signal<V> {
    Queue(Sender<Finished<V>>),
    Latch {
        slot: Arc<Mutex<Option<V>>>,
        done: WaitGroup,
    },
}

/// Completion handle owned by one task. Consumed by [`Reporter::report`];
/// if dropped unconsumed it reports the task as abandoned, so every task
/// signals exactly once.
pub(crate) struct Reporter<V> {
    section: Section,
    errors: Arc<ErrorSlot>,
    signal: Option<Signal<V>>,
}

impl<V> Reporter<V> {
    pub(crate) fn new(section: Section, errors: Arc<ErrorSlot>, signal: Signal<V>) -> Self {
        Self {
            section,
            errors,
            signal: Some(signal),
        }
    }

    pub(crate) fn report(mut self, outcome: Result<V, BoxError>) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: Result<V, BoxError>) {
        let Some(signal) = self.signal.take() else {
            return;
        };
        let visitor = match outcome {
            Ok(visitor) => {
                trace!(section = %self.section, "task finished");
                Some(visitor)
            }
            Err(error) => {
                warn!(section = %self.section, error = %error, "parallel task failed");
                self.errors.record(self.section, error);
                None
            }
        };
        match signal {
            Signal::Queue(tx) => {
                // The receiver outlives every task of the run; a send error
                // means the runner itself is gone and nobody is waiting.
                let _ = tx.send(Finished {
                    section: self.section,
                    visitor,
                });
            }
            Signal::Latch { slot, done } => {
                if let Some(visitor) = visitor {
                    match slot.lock() {
                        Ok(mut guard) => *guard = Some(visitor),
                        Err(poisoned) => *poisoned.into_inner() = Some(visitor),
                    }
                }
                drop(done);
            }
        }
    }
}

impl<V> Drop for Reporter<V> {
    fn drop(&mut self) {
        if self.signal.is_some() {
            self.finish(Err(Box::new(TaskAbandoned)));
        }
    }
}

/// Visits one section of the shared input and reports the result.
pub(crate) struct WorkerTask<T, V> {
    input: Arc<[T]>,
    section: Section,
    visitor: V,
    reporter: Reporter<V>,
}

impl<T, V> WorkerTask<T, V>
where
    T: Send + Sync + 'static,
    V: Visitor<T> + 'static,
{
    pub(crate) fn new(input: Arc<[T]>, section: Section, visitor: V, reporter: Reporter<V>) -> Self {
        Self {
            input,
            section,
            visitor,
            reporter,
        }
    }

    pub(crate) fn run(self) {
        let WorkerTask {
            input,
            section,
            mut visitor,
            reporter,
        } = self;

        let visited = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), BoxError> {
            for item in &input[section.range()] {
                visitor.visit(item).map_err(|e| Box::new(e) as BoxError)?;
            }
            Ok(())
        }));

        let outcome = match visited {
            Ok(Ok(())) => Ok(visitor),
            Ok(Err(e)) => Err(e),
            Err(payload) => Err(Box::new(TaskPanicked::from_payload(payload)) as BoxError),
        };
        reporter.report(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;
    use std::fmt;

    #[derive(Debug)]
    struct Negative(i64);

    impl fmt::Display for Negative {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "negative value {}", self.0)
        }
    }

    impl std::error::Error for Negative {}

    #[derive(Default)]
    struct Sum {
        total: i64,
        seen: Vec<i64>,
    }

    impl Visitor<i64> for Sum {
        type Error = Negative;

        fn visit(&mut self, item: &i64) -> Result<(), Negative> {
            if *item < 0 {
                return Err(Negative(*item));
            }
            if *item == 99 {
                panic!("ninety-nine");
            }
            self.total += item;
            self.seen.push(*item);
            Ok(())
        }
    }

    fn queue_task(
        input: &Arc<[i64]>,
        section: Section,
        errors: &Arc<ErrorSlot>,
        tx: &Sender<Finished<Sum>>,
    ) -> WorkerTask<i64, Sum> {
        let reporter = Reporter::new(section, Arc::clone(errors), Signal::Queue(tx.clone()));
        WorkerTask::new(Arc::clone(input), section, Sum::default(), reporter)
    }

    #[test]
    fn test_visits_only_its_section() {
        let input: Arc<[i64]> = vec![1, 2, 3, 4, 5, 6].into();
        let errors = Arc::new(ErrorSlot::default());
        let (tx, rx) = bounded(1);

        queue_task(&input, Section::new(1, 2, 5), &errors, &tx).run();

        let finished = rx.try_recv().expect("reported");
        let visitor = finished.visitor.expect("success");
        assert_eq!(visitor.seen, vec![3, 4, 5]);
        assert_eq!(visitor.total, 12);
        assert!(errors.take().is_none());
    }

    #[test]
    fn test_error_is_recorded_and_still_signals() {
        let input: Arc<[i64]> = vec![1, -2, 3].into();
        let errors = Arc::new(ErrorSlot::default());
        let (tx, rx) = bounded(1);

        queue_task(&input, Section::new(0, 0, 3), &errors, &tx).run();

        let finished = rx.try_recv().expect("completion still signalled");
        assert!(finished.visitor.is_none());
        let (section, error) = errors.take().expect("error recorded");
        assert_eq!(section.index, 0);
        assert_eq!(error.to_string(), "negative value -2");
    }

    #[test]
    fn test_panic_becomes_task_error() {
        let input: Arc<[i64]> = vec![1, 99].into();
        let errors = Arc::new(ErrorSlot::default());
        let (tx, rx) = bounded(1);

        queue_task(&input, Section::new(0, 0, 2), &errors, &tx).run();

        assert!(rx.try_recv().expect("signalled").visitor.is_none());
        let (_, error) = errors.take().expect("error recorded");
        assert_eq!(error.to_string(), "visitor panicked: ninety-nine");
    }

    #[test]
    fn test_dropped_task_reports_abandoned() {
        let input: Arc<[i64]> = vec![1].into();
        let errors = Arc::new(ErrorSlot::default());
        let (tx, rx) = bounded(1);

        drop(queue_task(&input, Section::new(3, 0, 1), &errors, &tx));

        let finished = rx.try_recv().expect("drop signals completion");
        assert_eq!(finished.section.index, 3);
        assert!(finished.visitor.is_none());
        let (_, error) = errors.take().expect("error recorded");
        assert_eq!(error.to_string(), "task was dropped before it ran");
    }

    #[test]
    fn test_latch_signal_fills_slot() {
        let input: Arc<[i64]> = vec![4, 5].into();
        let errors = Arc::new(ErrorSlot::default());
        let slot = Arc::new(Mutex::new(None));
        let group = WaitGroup::new();
        let signal = Signal::Latch {
            slot: Arc::clone(&slot),
            done: group.clone(),
        };
        let reporter = Reporter::new(Section::new(0, 0, 2), Arc::clone(&errors), signal);
        WorkerTask::new(input, Section::new(0, 0, 2), Sum::default(), reporter).run();

        group.wait();
        let visitor = slot.lock().unwrap().take().expect("slot filled");
        assert_eq!(visitor.total, 9);
    }

    #[test]
    fn test_error_slot_keeps_first() {
        let errors = ErrorSlot::default();
        assert!(errors.record(Section::new(0, 0, 1), Box::new(Negative(-1))));
        assert!(!errors.record(Section::new(1, 1, 2), Box::new(Negative(-2))));
        let (section, error) = errors.take().expect("first");
        assert_eq!(section.index, 0);
        assert_eq!(error.to_string(), "negative value -1");
    }
}
