//! Merge strategies for the partial results of a run.
//!
//! A combiner declares once whether it wants partials one at a time as they
//! arrive ([`MergeMode::Incremental`]) or all together after every task has
//! finished ([`MergeMode::Barrier`]). The runner only ever calls it from the
//! joining thread, so implementations need no internal synchronization.

use serde::{Deserialize, Serialize};

/// How a runner waits for and hands over partial results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Merge each partial as soon as its task reports.
    Incremental,
    /// Wait for all tasks, then merge every partial in section order.
    Barrier,
}

impl MergeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "incremental" | "one" => Some(MergeMode::Incremental),
            "barrier" | "all" => Some(MergeMode::Barrier),
            _ => None,
        }
    }
}

pub trait Combiner<V> {
    /// `true` selects incremental merging. Must not change during a run.
    fn use_combine_one(&self) -> bool;

    /// Merge one partial. Incremental mode only.
    fn combine_one(&mut self, partial: V);

    /// Merge all partials, ordered by section index. Barrier mode only.
    fn combine_all(&mut self, partials: Vec<V>);

    fn mode(&self) -> MergeMode {
        if self.use_combine_one() {
            MergeMode::Incremental
        } else {
            MergeMode::Barrier
        }
    }
}

impl<V, C> Combiner<V> for &mut C
where
    C: Combiner<V> + ?Sized,
{
    fn use_combine_one(&self) -> bool {
        (**self).use_combine_one()
    }

    fn combine_one(&mut self, partial: V) {
        (**self).combine_one(partial)
    }

    fn combine_all(&mut self, partials: Vec<V>) {
        (**self).combine_all(partials)
    }
}

/// Ignores partial results. For visitors that work purely by side effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct Discard;

impl<V> Combiner<V> for Discard {
    fn use_combine_one(&self) -> bool {
        false
    }

    fn combine_one(&mut self, _partial: V) {}

    fn combine_all(&mut self, _partials: Vec<V>) {}
}

/// Keeps every partial, in section order.
#[derive(Debug)]
pub struct CollectAll<V> {
    partials: Vec<V>,
}

impl<V> CollectAll<V> {
    pub fn new() -> Self {
        Self {
            partials: Vec::new(),
        }
    }

    pub fn partials(&self) -> &[V] {
        &self.partials
    }

    pub fn into_partials(self) -> Vec<V> {
        self.partials
    }
}

impl<V> Default for CollectAll<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Combiner<V> for CollectAll<V> {
    fn use_combine_one(&self) -> bool {
        false
    }

    fn combine_one(&mut self, partial: V) {
        self.partials.push(partial);
    }

    fn combine_all(&mut self, partials: Vec<V>) {
        self.partials.extend(partials);
    }
}

/// Folds each partial into an accumulator as it arrives.
pub struct Fold<A, F> {
    acc: A,
    f: F,
}

impl<A, F> Fold<A, F> {
    pub fn new(init: A, f: F) -> Self {
        Self { acc: init, f }
    }

    pub fn value(&self) -> &A {
        &self.acc
    }

    pub fn into_value(self) -> A {
        self.acc
    }
}

impl<V, A, F> Combiner<V> for Fold<A, F>
where
    F: FnMut(&mut A, V),
{
    fn use_combine_one(&self) -> bool {
        true
    }

    fn combine_one(&mut self, partial: V) {
        (self.f)(&mut self.acc, partial);
    }

    fn combine_all(&mut self, partials: Vec<V>) {
        for partial in partials {
            (self.f)(&mut self.acc, partial);
        }
    }
}
