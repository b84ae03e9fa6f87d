//! Core library for fanjoin: split a sequence into contiguous sections,
//! visit each section on its own worker, and merge the partial results.
//! Used by the CLI binary; usable directly from other crates.

pub mod combiner;
pub mod config;
pub mod error;
pub mod executor;
pub mod parallel;
pub mod runner;
pub mod section;
pub mod visitor;

mod task;

pub use combiner::{CollectAll, Combiner, Discard, Fold, MergeMode};
pub use config::{load_config, ParallelConfig};
pub use error::{BoxError, Error, Result, TaskAbandoned, TaskPanicked};
#[cfg(feature = "rayon-pool")]
pub use executor::build_pool;
pub use executor::{default_executor, Executor, InlineExecutor, Job, ThreadPerTask};
pub use parallel::{calculate_task_count, default_task_count, for_each, for_each_default};
pub use runner::TaskRunner;
pub use section::{partition, Section};
pub use visitor::{Visitor, VisitorFactory};
