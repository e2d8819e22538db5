//! Per-peak fragment counting.

use std::collections::HashMap;

use crate::consts::DEFAULT_LOAD_CAPACITY;
use crate::errors::{Error, Result};
use crate::fragments::{FragmentChunk, Fragments};
use crate::matrix::{MatrixEntry, MatrixSource};

use super::{sorted_entries, ChromWindow, ColumnQueue};

/// Count fragment insertion points per (cell, peak) over a sorted
/// fragment stream.
///
/// Output shape is cells x peaks, one column per peak in input order.
/// Peak chromosome ids index into the caller's `chr_names` table and are
/// matched against the stream's chromosome names.
pub struct PeakMatrix<F: Fragments> {
    frags: F,
    groups: HashMap<String, Vec<(u32, u32, u32)>>,
    pending: HashMap<String, Vec<(u32, u32, u32)>>,
    queue: ColumnQueue,
    window: Option<ChromWindow>,
    accum: HashMap<u32, HashMap<u32, u32>>,
    chunk: FragmentChunk,
    stream_done: bool,
    row_names: Option<Vec<String>>,
    current: Vec<MatrixEntry<u32>>,
    cursor: usize,
    col: u32,
    cols_total: u32,
    interrupt: Option<Box<dyn FnMut() -> bool>>,
}

impl<F: Fragments> PeakMatrix<F> {
    pub fn new(
        frags: F,
        peak_chr: &[u32],
        peak_start: &[u32],
        peak_end: &[u32],
        chr_names: &[String],
    ) -> Result<PeakMatrix<F>> {
        if peak_chr.len() != peak_start.len() || peak_chr.len() != peak_end.len() {
            return Err(Error::Shape(format!(
                "peak arrays disagree in length: {} chr, {} start, {} end",
                peak_chr.len(),
                peak_start.len(),
                peak_end.len()
            )));
        }
        let mut groups: HashMap<String, Vec<(u32, u32, u32)>> = HashMap::new();
        for (i, ((&chr, &start), &end)) in peak_chr
            .iter()
            .zip(peak_start.iter())
            .zip(peak_end.iter())
            .enumerate()
        {
            if start >= end {
                return Err(Error::Shape(format!(
                    "peak {i} is empty: [{start}, {end})"
                )));
            }
            let name = chr_names.get(chr as usize).ok_or_else(|| {
                Error::Shape(format!(
                    "peak {i} names chromosome {chr}, but only {} names were given",
                    chr_names.len()
                ))
            })?;
            groups
                .entry(name.clone())
                .or_default()
                .push((start, end, i as u32));
        }
        let pending = groups.clone();
        Ok(PeakMatrix {
            frags,
            groups,
            pending,
            queue: ColumnQueue::new(peak_chr.len() as u32),
            window: None,
            accum: HashMap::new(),
            chunk: FragmentChunk::with_capacity(DEFAULT_LOAD_CAPACITY),
            stream_done: false,
            row_names: None,
            current: Vec::new(),
            cursor: 0,
            col: 0,
            cols_total: peak_chr.len() as u32,
            interrupt: None,
        })
    }

    /// Install a cancellation hook, polled roughly every loaded batch.
    pub fn with_interrupt(mut self, hook: Box<dyn FnMut() -> bool>) -> Self {
        self.interrupt = Some(hook);
        self
    }

    fn fill_row_names(&mut self) {
        let Some(n) = self.frags.cell_count() else {
            return;
        };
        let mut names = Vec::with_capacity(n);
        for i in 0..n {
            match self.frags.cell_name(i as u32) {
                Some(name) => names.push(name.to_string()),
                None => return,
            }
        }
        self.row_names = Some(names);
    }

    /// Advance the fragment stream by one step: enter a chromosome, or
    /// process one batch of fragments, or close out the chromosome.
    fn pump(&mut self) -> Result<()> {
        if let Some(check) = self.interrupt.as_mut() {
            if check() {
                return Err(Error::Cancelled);
            }
        }
        if self.window.is_none() {
            if !self.frags.next_chr()? {
                self.stream_done = true;
                self.fill_row_names();
                return Ok(());
            }
            let chr = self.frags.current_chr();
            let list = self
                .frags
                .chr_name(chr)
                .and_then(|name| self.pending.remove(name));
            match list {
                Some(list) => self.window = Some(ChromWindow::new(list)),
                None => {
                    // Nothing to count here: drain the chromosome.
                    while self.frags.load(&mut self.chunk)? > 0 {}
                }
            }
            return Ok(());
        }

        let n = self.frags.load(&mut self.chunk)?;
        let Some(window) = self.window.as_mut() else {
            return Ok(());
        };
        let accum = &mut self.accum;
        let queue = &mut self.queue;
        if n == 0 {
            window.drain(|col| {
                queue.insert(col, sorted_entries(accum.remove(&col).unwrap_or_default()));
            });
            self.window = None;
            return Ok(());
        }
        for i in 0..n {
            let (s, e, cell) = (self.chunk.start[i], self.chunk.end[i], self.chunk.cell[i]);
            window.complete_until(s, |col| {
                queue.insert(col, sorted_entries(accum.remove(&col).unwrap_or_default()));
            });
            let mut bump = |col: u32| {
                *accum.entry(col).or_default().entry(cell).or_insert(0) += 1;
            };
            window.hits(s, &mut bump);
            window.hits(e - 1, &mut bump);
        }
        Ok(())
    }
}

impl<F: Fragments> MatrixSource for PeakMatrix<F> {
    type Value = u32;

    fn next_col(&mut self) -> Result<bool> {
        loop {
            if let Some((col, entries)) = self.queue.try_pop(self.stream_done) {
                self.col = col;
                self.current = entries;
                self.cursor = 0;
                return Ok(true);
            }
            if self.queue.finished() {
                return Ok(false);
            }
            self.pump()?;
        }
    }

    fn current_col(&self) -> u32 {
        self.col
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<u32>>> {
        if self.cursor >= self.current.len() {
            return Ok(None);
        }
        let entry = self.current[self.cursor];
        self.cursor += 1;
        Ok(Some(entry))
    }

    fn rows(&self) -> Option<usize> {
        self.frags.cell_count()
    }

    fn cols(&self) -> Option<usize> {
        Some(self.cols_total as usize)
    }

    fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    fn col_names(&self) -> Option<&[String]> {
        None
    }

    fn restart(&mut self) -> Result<()> {
        self.frags.restart()?;
        self.pending = self.groups.clone();
        self.queue.reset();
        self.window = None;
        self.accum.clear();
        self.stream_done = false;
        self.current.clear();
        self.cursor = 0;
        self.col = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::{ByteStore, MemStore};
    use crate::fragments::StoredFragments;
    use pretty_assertions::assert_eq;
    use rstest::*;

    /// The five-cell, two-chromosome fixture: on chr1, for start j in
    /// 0..5 and cell i <= j, i+1 copies of (cell i, start j, end 1002+i);
    /// chr2 carries four fragments at starts 9-10 ending 20-21.
    fn toy_fragments() -> MemStore {
        let store = MemStore::new();
        let mut w_start = store.writer::<u32>("start").unwrap();
        let mut w_end = store.writer::<u32>("end").unwrap();
        let mut w_cell = store.writer::<u32>("cell").unwrap();
        let mut count = 0u32;
        let mut end_max = 0u32;
        for j in 0..5u32 {
            for i in 0..=j {
                for _ in 0..=i {
                    w_cell.push(i).unwrap();
                    w_start.push(j).unwrap();
                    w_end.push(1002 + i).unwrap();
                    end_max = end_max.max(1002 + i);
                    count += 1;
                }
            }
        }
        let chr1_count = count;
        for (cell, start, end) in [(0u32, 9u32, 21u32), (1, 9, 20), (2, 10, 21), (3, 10, 20)] {
            w_cell.push(cell).unwrap();
            w_start.push(start).unwrap();
            w_end.push(end).unwrap();
            end_max = end_max.max(end);
            count += 1;
        }
        w_start.finalize().unwrap();
        w_end.finalize().unwrap();
        w_cell.finalize().unwrap();

        let mut w = store.writer::<u32>("end_max").unwrap();
        w.push(end_max).unwrap();
        w.finalize().unwrap();
        let mut w = store.writer::<u32>("chr_ptr").unwrap();
        w.extend(&[0, chr1_count, chr1_count, count]).unwrap();
        w.finalize().unwrap();
        store
            .write_str_array("chr_names", &["chr1".to_string(), "chr2".to_string()])
            .unwrap();
        store
            .write_str_array(
                "cell_names",
                &["c0", "c1", "c2", "c3", "c4"].map(String::from),
            )
            .unwrap();
        store.set_version("unpacked-fragments-v1").unwrap();
        store
    }

    fn triplets(mat: &mut impl MatrixSource<Value = u32>) -> Vec<(u32, u32, u32)> {
        let mut out = Vec::new();
        while mat.next_col().unwrap() {
            let col = mat.current_col();
            while let Some(e) = mat.next_value().unwrap() {
                out.push((e.row, col, e.value));
            }
        }
        out
    }

    #[rstest]
    fn counts_match_the_reference_vectors() {
        let store = toy_fragments();
        let frags = StoredFragments::open_unpacked(&store).unwrap();

        let chr = vec![0u32, 0, 0, 1];
        let start = vec![2u32, 1002, 1004, 10];
        let end = vec![4u32, 1005, 1006, 20];
        let names = vec!["chr1".to_string(), "chr2".to_string()];
        let mut peaks = PeakMatrix::new(frags, &chr, &start, &end, &names).unwrap();
        assert_eq!(peaks.cols(), Some(4));

        let expected = vec![
            (0, 0, 2),
            (1, 0, 4),
            (2, 0, 6),
            (3, 0, 4),
            (1, 1, 8),
            (2, 1, 9),
            (3, 1, 8),
            (3, 2, 8),
            (4, 2, 5),
            (1, 3, 1),
            (2, 3, 1),
            (3, 3, 2),
        ];
        assert_eq!(triplets(&mut peaks), expected);
        assert_eq!(peaks.rows(), Some(5));
        assert_eq!(
            peaks.row_names().unwrap(),
            ["c0", "c1", "c2", "c3", "c4"]
        );
    }

    #[rstest]
    fn restart_reproduces_the_counts() {
        let store = toy_fragments();
        let frags = StoredFragments::open_unpacked(&store).unwrap();
        let names = vec!["chr1".to_string(), "chr2".to_string()];
        let mut peaks =
            PeakMatrix::new(frags, &[0, 1], &[2, 10], &[4, 20], &names).unwrap();
        let first = triplets(&mut peaks);
        peaks.restart().unwrap();
        assert_eq!(triplets(&mut peaks), first);
    }

    #[rstest]
    fn absent_chromosomes_give_empty_columns() {
        let store = toy_fragments();
        let frags = StoredFragments::open_unpacked(&store).unwrap();
        // chrX never appears in the stream; chr2 carries no peaks and is
        // skipped.
        let names = vec!["chr1".to_string(), "chrX".to_string()];
        let mut peaks =
            PeakMatrix::new(frags, &[1, 0], &[5, 2], &[9, 4], &names).unwrap();
        let got = triplets(&mut peaks);
        assert_eq!(
            got,
            vec![(0, 1, 2), (1, 1, 4), (2, 1, 6), (3, 1, 4)]
        );
    }

    #[rstest]
    fn input_order_is_kept_for_unsorted_peaks() {
        let store = toy_fragments();
        let frags = StoredFragments::open_unpacked(&store).unwrap();
        let names = vec!["chr1".to_string(), "chr2".to_string()];
        // Peaks deliberately out of start order: columns must follow
        // input order anyway.
        let mut peaks = PeakMatrix::new(
            frags,
            &[0, 0],
            &[1002, 2],
            &[1005, 4],
            &names,
        )
        .unwrap();
        let got = triplets(&mut peaks);
        assert_eq!(
            got,
            vec![
                (1, 0, 8),
                (2, 0, 9),
                (3, 0, 8),
                (0, 1, 2),
                (1, 1, 4),
                (2, 1, 6),
                (3, 1, 4)
            ]
        );
    }

    #[rstest]
    fn invalid_construction_is_rejected() {
        let store = toy_fragments();
        let names = vec!["chr1".to_string()];
        let frags = StoredFragments::open_unpacked(&store).unwrap();
        assert!(matches!(
            PeakMatrix::new(frags, &[0, 0], &[1], &[2], &names),
            Err(crate::errors::Error::Shape(_))
        ));
        let frags = StoredFragments::open_unpacked(&store).unwrap();
        assert!(matches!(
            PeakMatrix::new(frags, &[1], &[1], &[2], &names),
            Err(crate::errors::Error::Shape(_))
        ));
        let frags = StoredFragments::open_unpacked(&store).unwrap();
        assert!(matches!(
            PeakMatrix::new(frags, &[0], &[5], &[5], &names),
            Err(crate::errors::Error::Shape(_))
        ));
    }
}
