//! Fragment-overlap counting engines.
//!
//! [`PeakMatrix`] and [`TileMatrix`] ride a sorted fragment stream and
//! emit a sparse count matrix with one column per peak (or tile), cells
//! as rows. Both follow the endpoint convention of the insertion-based
//! counters: a fragment `[s, e)` contributes one count for each of its
//! two insertion points `s` and `e - 1` that falls inside an interval.
//!
//! Intervals are reconciled with the stream by chromosome *name*:
//! stream chromosomes without intervals are drained and skipped, and
//! interval chromosomes the stream never delivers produce empty columns
//! once the stream is exhausted.

use std::collections::{BTreeMap, HashMap};

use crate::matrix::MatrixEntry;

mod peaks;
mod tiles;

pub use peaks::PeakMatrix;
pub use tiles::TileMatrix;

/// Start-sorted interval set for one chromosome.
///
/// Containment queries walk start-descending from the insertion point and
/// stop at the prefix maximum of interval ends, the same pruning the
/// augmented-interval-list search uses. Completion is tracked through a
/// second ordering by interval end: once the stream's start coordinate
/// reaches an interval's end, no future insertion point can land inside
/// it (every future endpoint is at least the current start).
pub(crate) struct ChromWindow {
    starts: Vec<u32>,
    ends: Vec<u32>,
    payload: Vec<u32>,
    prefix_max_end: Vec<u32>,
    by_end: Vec<u32>,
    done: usize,
}

impl ChromWindow {
    /// Build from `(start, end, payload)` triples in any order.
    pub(crate) fn new(mut items: Vec<(u32, u32, u32)>) -> ChromWindow {
        items.sort_by_key(|&(start, _, _)| start);
        let starts: Vec<u32> = items.iter().map(|&(s, _, _)| s).collect();
        let ends: Vec<u32> = items.iter().map(|&(_, e, _)| e).collect();
        let payload: Vec<u32> = items.iter().map(|&(_, _, p)| p).collect();

        let mut prefix_max_end = Vec::with_capacity(ends.len());
        let mut max = 0u32;
        for &e in ends.iter() {
            max = max.max(e);
            prefix_max_end.push(max);
        }

        let mut by_end: Vec<u32> = (0..ends.len() as u32).collect();
        by_end.sort_by_key(|&i| ends[i as usize]);

        ChromWindow {
            starts,
            ends,
            payload,
            prefix_max_end,
            by_end,
            done: 0,
        }
    }

    /// Invoke `hit` with the payload of every interval containing `x`.
    pub(crate) fn hits(&self, x: u32, mut hit: impl FnMut(u32)) {
        let ub = self.starts.partition_point(|&s| s <= x);
        for i in (0..ub).rev() {
            if self.prefix_max_end[i] <= x {
                break;
            }
            if self.ends[i] > x {
                hit(self.payload[i]);
            }
        }
    }

    /// Invoke `complete` for every interval whose end is at or below the
    /// current start coordinate; each fires exactly once.
    pub(crate) fn complete_until(&mut self, start: u32, mut complete: impl FnMut(u32)) {
        while self.done < self.by_end.len() {
            let i = self.by_end[self.done] as usize;
            if self.ends[i] > start {
                break;
            }
            complete(self.payload[i]);
            self.done += 1;
        }
    }

    /// Invoke `complete` for every interval not yet completed.
    pub(crate) fn drain(&mut self, mut complete: impl FnMut(u32)) {
        while self.done < self.by_end.len() {
            let i = self.by_end[self.done] as usize;
            complete(self.payload[i]);
            self.done += 1;
        }
    }
}

/// In-order release of finished columns.
///
/// Columns finish out of order (a short peak completes before an earlier,
/// longer one) but must be emitted in input order; finished columns queue
/// here until every earlier column is accounted for. Once the fragment
/// stream is exhausted, columns never seen resolve as empty.
pub(crate) struct ColumnQueue {
    ready: BTreeMap<u32, Vec<MatrixEntry<u32>>>,
    next_out: u32,
    total: u32,
}

impl ColumnQueue {
    pub(crate) fn new(total: u32) -> ColumnQueue {
        ColumnQueue {
            ready: BTreeMap::new(),
            next_out: 0,
            total,
        }
    }

    pub(crate) fn finished(&self) -> bool {
        self.next_out >= self.total
    }

    pub(crate) fn insert(&mut self, col: u32, entries: Vec<MatrixEntry<u32>>) {
        self.ready.insert(col, entries);
    }

    /// Pop the next column in input order, if resolvable.
    pub(crate) fn try_pop(&mut self, stream_done: bool) -> Option<(u32, Vec<MatrixEntry<u32>>)> {
        if self.finished() {
            return None;
        }
        if let Some(entries) = self.ready.remove(&self.next_out) {
            let col = self.next_out;
            self.next_out += 1;
            return Some((col, entries));
        }
        if stream_done {
            let col = self.next_out;
            self.next_out += 1;
            return Some((col, Vec::new()));
        }
        None
    }

    pub(crate) fn reset(&mut self) {
        self.ready.clear();
        self.next_out = 0;
    }
}

/// Sparse per-cell counts for one column, sorted into row order.
pub(crate) fn sorted_entries(counts: HashMap<u32, u32>) -> Vec<MatrixEntry<u32>> {
    let mut entries: Vec<MatrixEntry<u32>> = counts
        .into_iter()
        .map(|(row, value)| MatrixEntry { row, value })
        .collect();
    entries.sort_by_key(|e| e.row);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn window_finds_containing_intervals() {
        let window = ChromWindow::new(vec![(1, 5, 0), (3, 7, 1), (6, 10, 2), (8, 12, 3)]);
        let mut found = Vec::new();
        window.hits(4, |p| found.push(p));
        found.sort();
        assert_eq!(found, vec![0, 1]);

        let mut found = Vec::new();
        window.hits(9, |p| found.push(p));
        found.sort();
        assert_eq!(found, vec![2, 3]);

        let mut found = Vec::new();
        window.hits(14, |p| found.push(p));
        assert_eq!(found, Vec::<u32>::new());
    }

    #[test]
    fn completion_follows_interval_ends() {
        let mut window = ChromWindow::new(vec![(0, 4, 0), (2, 100, 1), (3, 6, 2)]);
        let mut completed = Vec::new();
        window.complete_until(6, |p| completed.push(p));
        assert_eq!(completed, vec![0, 2]);
        window.complete_until(7, |p| completed.push(p));
        assert_eq!(completed, vec![0, 2]);
        window.drain(|p| completed.push(p));
        assert_eq!(completed, vec![0, 2, 1]);
    }

    #[test]
    fn queue_releases_in_input_order() {
        let mut queue = ColumnQueue::new(3);
        queue.insert(1, vec![MatrixEntry { row: 0, value: 7 }]);
        assert!(queue.try_pop(false).is_none());
        queue.insert(0, Vec::new());
        assert_eq!(queue.try_pop(false).unwrap().0, 0);
        assert_eq!(queue.try_pop(false).unwrap().0, 1);
        // Column 2 never finished: resolves empty once the stream ends.
        assert!(queue.try_pop(false).is_none());
        let (col, entries) = queue.try_pop(true).unwrap();
        assert_eq!((col, entries.len()), (2, 0));
        assert!(queue.finished());
        assert!(queue.try_pop(true).is_none());
    }
}
