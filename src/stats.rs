//! Built-in visitor/combiner pair used by `fanjoin stats`: count, sum, min, max.

use std::fmt;

use fanjoin_core::{Combiner, MergeMode};
use indicatif::ProgressBar;
use serde_json::{json, Value};

/// Running summary of a run of integers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub count: u64,
    pub sum: i128,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Stats {
    pub fn add(&mut self, value: i64) {
        self.count += 1;
        self.sum += i128::from(value);
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn merge(&mut self, other: &Stats) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }

    pub fn to_json(&self) -> Value {
        // sums beyond i64 are emitted as strings
        let sum = i64::try_from(self.sum)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(self.sum.to_string()));
        json!({
            "count": self.count,
            "sum": sum,
            "min": self.min,
            "max": self.max,
            "mean": self.mean(),
        })
    }
}

/// Raised by `--fail-on` to exercise the failure path.
#[derive(Debug)]
pub struct InjectedFailure(pub i64);

impl fmt::Display for InjectedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "injected failure at value {}", self.0)
    }
}

impl std::error::Error for InjectedFailure {}

pub struct StatsVisitor {
    stats: Stats,
    fail_on: Option<i64>,
}

impl StatsVisitor {
    pub fn new(fail_on: Option<i64>) -> Self {
        Self {
            stats: Stats::default(),
            fail_on,
        }
    }
}

impl fanjoin_core::Visitor<i64> for StatsVisitor {
    type Error = InjectedFailure;

    fn visit(&mut self, item: &i64) -> Result<(), InjectedFailure> {
        if self.fail_on == Some(*item) {
            return Err(InjectedFailure(*item));
        }
        self.stats.add(*item);
        Ok(())
    }
}

/// Merges visitor summaries; ticks a progress bar per merged section.
pub struct StatsCombiner {
    mode: MergeMode,
    total: Stats,
    merged: usize,
    progress: Option<ProgressBar>,
}

impl StatsCombiner {
    pub fn new(mode: MergeMode, progress: Option<ProgressBar>) -> Self {
        Self {
            mode,
            total: Stats::default(),
            merged: 0,
            progress,
        }
    }

    pub fn total(&self) -> &Stats {
        &self.total
    }

    pub fn merged(&self) -> usize {
        self.merged
    }

    fn absorb(&mut self, visitor: StatsVisitor) {
        self.total.merge(&visitor.stats);
        self.merged += 1;
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }
}

impl Combiner<StatsVisitor> for StatsCombiner {
    fn use_combine_one(&self) -> bool {
        self.mode == MergeMode::Incremental
    }

    fn combine_one(&mut self, partial: StatsVisitor) {
        self.absorb(partial);
    }

    fn combine_all(&mut self, partials: Vec<StatsVisitor>) {
        for partial in partials {
            self.absorb(partial);
        }
    }
}

/// Parse one integer per line; blank lines and `#` comments are skipped.
pub fn parse_values(text: &str) -> Result<Vec<i64>, String> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(i, line)| {
            line.parse::<i64>()
                .map_err(|e| format!("line {}: {:?} is not an integer ({})", i + 1, line, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanjoin_core::{InlineExecutor, TaskRunner, Visitor};

    #[test]
    fn test_merge_with_empty_side() {
        let mut a = Stats::default();
        let mut b = Stats::default();
        b.add(5);
        b.add(-3);
        a.merge(&b);
        assert_eq!(a.count, 2);
        assert_eq!(a.sum, 2);
        assert_eq!(a.min, Some(-3));
        assert_eq!(a.max, Some(5));
        assert_eq!(a.mean(), Some(1.0));
        assert_eq!(Stats::default().mean(), None);
    }

    #[test]
    fn test_injected_failure() {
        let mut v = StatsVisitor::new(Some(7));
        assert!(v.visit(&6).is_ok());
        let err = v.visit(&7).unwrap_err();
        assert_eq!(err.to_string(), "injected failure at value 7");
    }

    #[test]
    fn test_combiner_through_runner() {
        for mode in [MergeMode::Incremental, MergeMode::Barrier] {
            let values: Vec<i64> = (1..=100).collect();
            let combiner = TaskRunner::new(StatsCombiner::new(mode, None), 7)
                .unwrap()
                .execute_and_combine(&InlineExecutor, &|| StatsVisitor::new(None), values)
                .unwrap();
            assert_eq!(combiner.merged(), 7);
            assert_eq!(combiner.total().sum, 5050);
            assert_eq!(combiner.total().min, Some(1));
            assert_eq!(combiner.total().max, Some(100));
        }
    }

    #[test]
    fn test_parse_values() {
        let values = parse_values("1\n\n# comment\n -4 \n10\n").unwrap();
        assert_eq!(values, vec![1, -4, 10]);
        let err = parse_values("1\nx\n").unwrap_err();
        assert!(err.starts_with("line 2:"));
    }

    #[test]
    fn test_json_large_sum_is_string() {
        let mut s = Stats::default();
        s.add(i64::MAX);
        s.add(i64::MAX);
        assert!(s.to_json()["sum"].is_string());
        let mut s = Stats::default();
        s.add(3);
        assert_eq!(s.to_json()["sum"], 3);
    }
}
