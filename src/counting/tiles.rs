//! Fixed-width tile counting over genomic regions.

use std::collections::HashMap;

use crate::consts::DEFAULT_LOAD_CAPACITY;
use crate::errors::{Error, Result};
use crate::fragments::{FragmentChunk, Fragments};
use crate::matrix::{MatrixEntry, MatrixSource};

use super::{sorted_entries, ChromWindow, ColumnQueue};

#[derive(Debug, Clone, Copy)]
struct Region {
    start: u32,
    end: u32,
    width: u32,
    col_base: u32,
}

impl Region {
    fn tiles(&self) -> u32 {
        (self.end - self.start).div_ceil(self.width)
    }
}

/// Release every tile column of a finished region, in tile order.
fn finish_region(
    region: &Region,
    accum: &mut HashMap<u32, HashMap<u32, u32>>,
    queue: &mut ColumnQueue,
) {
    for tile in 0..region.tiles() {
        let col = region.col_base + tile;
        queue.insert(col, sorted_entries(accum.remove(&col).unwrap_or_default()));
    }
}

/// Count fragment insertion points per (cell, tile) over a sorted
/// fragment stream.
///
/// Each region `[start, end)` is cut into `tile_width`-sized tiles, the
/// last one truncated at the region end. Columns follow region input
/// order, tiles laid out sequentially within each region. An insertion
/// point `x` inside a region lands in tile `(x - start) / tile_width`;
/// the two insertion points of one fragment are counted independently.
pub struct TileMatrix<F: Fragments> {
    frags: F,
    groups: HashMap<String, Vec<Region>>,
    pending: HashMap<String, Vec<Region>>,
    regions: Vec<Region>,
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

impl<F: Fragments> TileMatrix<F> {
    pub fn new(
        frags: F,
        region_chr: &[u32],
        region_start: &[u32],
        region_end: &[u32],
        tile_width: &[u32],
        chr_names: &[String],
    ) -> Result<TileMatrix<F>> {
        if region_chr.len() != region_start.len()
            || region_chr.len() != region_end.len()
            || region_chr.len() != tile_width.len()
        {
            return Err(Error::Shape(format!(
                "region arrays disagree in length: {} chr, {} start, {} end, {} width",
                region_chr.len(),
                region_start.len(),
                region_end.len(),
                tile_width.len()
            )));
        }
        let mut groups: HashMap<String, Vec<Region>> = HashMap::new();
        let mut col_base = 0u32;
        for (i, &chr) in region_chr.iter().enumerate() {
            let region = Region {
                start: region_start[i],
                end: region_end[i],
                width: tile_width[i],
                col_base,
            };
            if region.start >= region.end {
                return Err(Error::Shape(format!(
                    "region {i} is empty: [{}, {})",
                    region.start, region.end
                )));
            }
            if region.width == 0 {
                return Err(Error::Shape(format!("region {i} has zero tile width")));
            }
            let name = chr_names.get(chr as usize).ok_or_else(|| {
                Error::Shape(format!(
                    "region {i} names chromosome {chr}, but only {} names were given",
                    chr_names.len()
                ))
            })?;
            groups.entry(name.clone()).or_default().push(region);
            col_base += region.tiles();
        }
        let pending = groups.clone();
        Ok(TileMatrix {
            frags,
            groups,
            pending,
            regions: Vec::new(),
            queue: ColumnQueue::new(col_base),
            window: None,
            accum: HashMap::new(),
            chunk: FragmentChunk::with_capacity(DEFAULT_LOAD_CAPACITY),
            stream_done: false,
            row_names: None,
            current: Vec::new(),
            cursor: 0,
            col: 0,
            cols_total: col_base,
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
                Some(regions) => {
                    let items = regions
                        .iter()
                        .enumerate()
                        .map(|(k, r)| (r.start, r.end, k as u32))
                        .collect();
                    self.regions = regions;
                    self.window = Some(ChromWindow::new(items));
                }
                None => {
                    while self.frags.load(&mut self.chunk)? > 0 {}
                }
            }
            return Ok(());
        }

        let n = self.frags.load(&mut self.chunk)?;
        let Some(window) = self.window.as_mut() else {
            return Ok(());
        };
        let regions = &self.regions;
        let accum = &mut self.accum;
        let queue = &mut self.queue;
        if n == 0 {
            window.drain(|k| finish_region(&regions[k as usize], accum, queue));
            self.window = None;
            self.regions = Vec::new();
            return Ok(());
        }
        for i in 0..n {
            let (s, e, cell) = (self.chunk.start[i], self.chunk.end[i], self.chunk.cell[i]);
            window.complete_until(s, |k| finish_region(&regions[k as usize], accum, queue));
            let mut bump = |k: u32, x: u32| {
                let region = &regions[k as usize];
                let col = region.col_base + (x - region.start) / region.width;
                *accum.entry(col).or_default().entry(cell).or_insert(0) += 1;
            };
            window.hits(s, |k| bump(k, s));
            window.hits(e - 1, |k| bump(k, e - 1));
        }
        Ok(())
    }
}

impl<F: Fragments> MatrixSource for TileMatrix<F> {
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
        self.regions = Vec::new();
        self.accum.clear();
        self.stream_done = false;
        self.current.clear();
        self.cursor = 0;
        self.col = 0;
        Ok(())
    }
}
