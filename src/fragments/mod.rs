//! Chromosome-ordered fragment streams.
//!
//! A fragment is a half-open genomic interval tagged with a cell id.
//! Sources deliver fragments through the pull-based [`Fragments`]
//! protocol: the consumer advances chromosome by chromosome with
//! [`Fragments::next_chr`] and drains each chromosome through
//! [`Fragments::load`] into a reusable [`FragmentChunk`] of parallel
//! arrays. Within a chromosome, start coordinates are non-decreasing;
//! chromosome ids ascend within a stream. Violations surface as
//! [`Error::Sort`](crate::errors::Error::Sort).

use crate::errors::{Error, Result};

mod bed;
mod import;
mod stored;

pub use bed::{BedFragments, BedFragmentsWriter};
pub use import::import_fragment_file;
pub use stored::{write_fragments, write_fragments_packed, StoredFragments};

/// Parallel-array buffer filled by [`Fragments::load`].
#[derive(Debug, Clone)]
pub struct FragmentChunk {
    pub start: Vec<u32>,
    pub end: Vec<u32>,
    pub cell: Vec<u32>,
    capacity: usize,
}

impl FragmentChunk {
    pub fn with_capacity(capacity: usize) -> FragmentChunk {
        FragmentChunk {
            start: Vec::with_capacity(capacity),
            end: Vec::with_capacity(capacity),
            cell: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty()
    }

    pub fn clear(&mut self) {
        self.start.clear();
        self.end.clear();
        self.cell.clear();
    }

    pub(crate) fn push(&mut self, start: u32, end: u32, cell: u32) {
        self.start.push(start);
        self.end.push(end);
        self.cell.push(cell);
    }
}

/// Pull protocol over chromosome-sorted, cell-tagged genomic fragments.
pub trait Fragments {
    /// Advance to the next chromosome; `false` once the stream is
    /// exhausted.
    fn next_chr(&mut self) -> Result<bool>;

    /// Id of the chromosome most recently entered by [`next_chr`].
    ///
    /// [`next_chr`]: Fragments::next_chr
    fn current_chr(&self) -> u32;

    /// Fill `chunk` with up to `chunk.capacity()` fragments from the
    /// current chromosome. Returns the number loaded; 0 means the
    /// chromosome is exhausted.
    fn load(&mut self, chunk: &mut FragmentChunk) -> Result<usize>;

    /// Number of chromosomes, once known. Sources reading a text stream
    /// only learn this at exhaustion.
    fn chr_count(&self) -> Option<usize>;

    /// Number of cells, once known.
    fn cell_count(&self) -> Option<usize>;

    fn chr_name(&self, id: u32) -> Option<&str>;

    fn cell_name(&self, id: u32) -> Option<&str>;

    fn seekable(&self) -> bool {
        false
    }

    /// Position just before the first fragment of `chr` with
    /// start >= `base`.
    fn seek(&mut self, _chr: u32, _base: u32) -> Result<()> {
        Err(Error::Unsupported("this fragment source cannot seek"))
    }

    fn restart(&mut self) -> Result<()> {
        Err(Error::Unsupported("this fragment source cannot restart"))
    }
}
