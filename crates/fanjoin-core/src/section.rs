//! Contiguous sections of the input, one per worker task.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Half-open index range `[start, end)` assigned to the task at `index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Section {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Section {
    pub fn new(index: usize, start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { index, start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}[{}, {})", self.index, self.start, self.end)
    }
}

/// Split `[0, len)` into `task_count` sections.
///
/// Every section but the last holds `len / task_count` elements; the last
/// one absorbs the remainder. With `task_count > len` the leading sections
/// are empty and the last holds everything.
pub fn partition(len: usize, task_count: usize) -> Vec<Section> {
    if task_count == 0 {
        return Vec::new();
    }
    let section_size = len / task_count;
    (0..task_count)
        .map(|index| {
            let start = index * section_size;
            if index == task_count - 1 {
                Section::new(index, start, len)
            } else {
                Section::new(index, start, start + section_size)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(sections: &[Section]) -> Vec<(usize, usize)> {
        sections.iter().map(|s| (s.start, s.end)).collect()
    }

    #[test]
    fn test_ten_by_three() {
        let sections = partition(10, 3);
        assert_eq!(bounds(&sections), vec![(0, 3), (3, 6), (6, 10)]);
    }

    #[test]
    fn test_more_tasks_than_elements() {
        let sections = partition(2, 5);
        assert_eq!(
            bounds(&sections),
            vec![(0, 0), (0, 0), (0, 0), (0, 0), (0, 2)]
        );
        assert_eq!(sections.iter().filter(|s| s.is_empty()).count(), 4);
    }

    #[test]
    fn test_empty_input() {
        let sections = partition(0, 4);
        assert_eq!(sections.len(), 4);
        assert!(sections.iter().all(Section::is_empty));
    }

    #[test]
    fn test_single_task_takes_everything() {
        assert_eq!(bounds(&partition(7, 1)), vec![(0, 7)]);
    }

    #[test]
    fn test_partition_covers_exactly() {
        for len in 0..64 {
            for task_count in 1..12 {
                let sections = partition(len, task_count);
                assert_eq!(sections.len(), task_count);

                let mut covered = 0;
                for (i, s) in sections.iter().enumerate() {
                    assert_eq!(s.index, i);
                    if !s.is_empty() {
                        assert_eq!(s.start, covered, "gap or overlap at len={len} tasks={task_count}");
                        covered = s.end;
                    }
                }
                assert_eq!(covered, len);

                let base = len / task_count;
                for s in &sections[..task_count - 1] {
                    assert_eq!(s.len(), base);
                }
                let last = sections[task_count - 1].len();
                assert!(last >= base && last - base < task_count);
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Section::new(1, 3, 6).to_string(), "#1[3, 6)");
    }
}
