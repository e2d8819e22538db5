//! Fragment storage over a backing store.
//!
//! Unpacked layout (`unpacked-fragments-v1`): plain `u32` datasets
//! `start`, `end`, `cell`, plus `end_max` (max end per 128-fragment
//! block), `chr_ptr` (open/close fragment offsets per chromosome) and the
//! `chr_names`/`cell_names` string tables.
//!
//! Packed layout (`packed-fragments-v1`): the same semantic arrays, with
//! `start` delta-coded, `end` stored as the fragment width (`end - start`)
//! raw-coded, and `cell` raw-coded through the chunk codec.

use crate::backing::{ArrayRead, ArrayWrite, ByteStore};
use crate::consts::{
    DEFAULT_LOAD_CAPACITY, INTERRUPT_STRIDE, PACKED_FRAGMENTS_VERSION, UNPACKED_FRAGMENTS_VERSION,
};
use crate::errors::{Error, Result};
use crate::packing::{PackedReader, PackedWriter, Packing, CHUNK};

use super::{FragmentChunk, Fragments};

/// Reader over a stored fragment set, unpacked or packed.
pub struct StoredFragments {
    start: Box<dyn ArrayRead<u32>>,
    end: Box<dyn ArrayRead<u32>>,
    cell: Box<dyn ArrayRead<u32>>,
    end_is_width: bool,
    chr_ptr: Vec<u32>,
    chr_names: Vec<String>,
    cell_names: Vec<String>,
    current: Option<usize>,
    pos: u64,
    chr_end: u64,
    last_start: u32,
}

impl StoredFragments {
    pub fn open_unpacked(store: &impl ByteStore) -> Result<StoredFragments> {
        crate::backing::check_version(store, UNPACKED_FRAGMENTS_VERSION)?;
        if !store.has("end_max") {
            return Err(Error::NotFound("end_max".to_string()));
        }
        StoredFragments::with_readers(
            store,
            store.reader::<u32>("start")?,
            store.reader::<u32>("end")?,
            store.reader::<u32>("cell")?,
            false,
        )
    }

    pub fn open_packed(store: &impl ByteStore) -> Result<StoredFragments> {
        crate::backing::check_version(store, PACKED_FRAGMENTS_VERSION)?;
        if !store.has("end_max") {
            return Err(Error::NotFound("end_max".to_string()));
        }
        let chr_ptr = store.reader::<u32>("chr_ptr")?.read_all()?;
        let total = chr_ptr.last().copied().unwrap_or(0) as u64;
        StoredFragments::with_readers(
            store,
            Box::new(PackedReader::open(store, "start", Packing::Delta, total)?),
            Box::new(PackedReader::open(store, "end", Packing::Raw, total)?),
            Box::new(PackedReader::open(store, "cell", Packing::Raw, total)?),
            true,
        )
    }

    fn with_readers(
        store: &impl ByteStore,
        start: Box<dyn ArrayRead<u32>>,
        end: Box<dyn ArrayRead<u32>>,
        cell: Box<dyn ArrayRead<u32>>,
        end_is_width: bool,
    ) -> Result<StoredFragments> {
        let chr_ptr = store.reader::<u32>("chr_ptr")?.read_all()?;
        if chr_ptr.len() % 2 != 0 {
            return Err(Error::Parse(format!(
                "chr_ptr holds {} entries, expected an open/close pair per chromosome",
                chr_ptr.len()
            )));
        }
        let chr_names = store.read_str_array("chr_names")?;
        let cell_names = store.read_str_array("cell_names")?;
        if chr_names.len() * 2 != chr_ptr.len() {
            return Err(Error::Parse(format!(
                "{} chromosome names for {} chr_ptr pairs",
                chr_names.len(),
                chr_ptr.len() / 2
            )));
        }
        Ok(StoredFragments {
            start,
            end,
            cell,
            end_is_width,
            chr_ptr,
            chr_names,
            cell_names,
            current: None,
            pos: 0,
            chr_end: 0,
            last_start: 0,
        })
    }

    fn chr_bounds(&self, chr: usize) -> (u64, u64) {
        (
            self.chr_ptr[2 * chr] as u64,
            self.chr_ptr[2 * chr + 1] as u64,
        )
    }
}

impl Fragments for StoredFragments {
    fn next_chr(&mut self) -> Result<bool> {
        let next = self.current.map(|c| c + 1).unwrap_or(0);
        if next >= self.chr_names.len() {
            return Ok(false);
        }
        let (open, close) = self.chr_bounds(next);
        self.current = Some(next);
        self.pos = open;
        self.chr_end = close;
        self.last_start = 0;
        Ok(true)
    }

    fn current_chr(&self) -> u32 {
        self.current.unwrap_or(0) as u32
    }

    fn load(&mut self, chunk: &mut FragmentChunk) -> Result<usize> {
        chunk.clear();
        let n = (chunk.capacity() as u64).min(self.chr_end.saturating_sub(self.pos)) as usize;
        if n == 0 {
            return Ok(0);
        }
        chunk.start.resize(n, 0);
        chunk.end.resize(n, 0);
        chunk.cell.resize(n, 0);

        if self.start.pos() != self.pos {
            self.start.seek(self.pos)?;
            self.end.seek(self.pos)?;
            self.cell.seek(self.pos)?;
        }
        self.start.read_exact(&mut chunk.start)?;
        self.end.read_exact(&mut chunk.end)?;
        self.cell.read_exact(&mut chunk.cell)?;
        self.pos += n as u64;

        if self.end_is_width {
            for i in 0..n {
                chunk.end[i] += chunk.start[i];
            }
        }
        for &s in chunk.start.iter() {
            if s < self.last_start {
                return Err(Error::unsorted("stored fragments", self.last_start, s));
            }
            self.last_start = s;
        }
        Ok(n)
    }

    fn chr_count(&self) -> Option<usize> {
        Some(self.chr_names.len())
    }

    fn cell_count(&self) -> Option<usize> {
        Some(self.cell_names.len())
    }

    fn chr_name(&self, id: u32) -> Option<&str> {
        self.chr_names.get(id as usize).map(String::as_str)
    }

    fn cell_name(&self, id: u32) -> Option<&str> {
        self.cell_names.get(id as usize).map(String::as_str)
    }

    fn seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, chr: u32, base: u32) -> Result<()> {
        if chr as usize >= self.chr_names.len() {
            return Err(Error::NotFound(format!("chromosome id {chr}")));
        }
        let (open, close) = self.chr_bounds(chr as usize);
        let (mut lo, mut hi) = (open, close);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.start.read_one_at(mid)? < base {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        self.current = Some(chr as usize);
        self.pos = lo;
        self.chr_end = close;
        self.last_start = 0;
        // Force a reposition on the next load.
        self.start.seek(lo)?;
        self.end.seek(lo)?;
        self.cell.seek(lo)?;
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.current = None;
        self.pos = 0;
        self.chr_end = 0;
        self.last_start = 0;
        Ok(())
    }
}

struct FragmentSink {
    start: Box<dyn ArrayWrite<u32>>,
    end: Box<dyn ArrayWrite<u32>>,
    cell: Box<dyn ArrayWrite<u32>>,
    end_max: Box<dyn ArrayWrite<u32>>,
    chr_ptr: Box<dyn ArrayWrite<u32>>,
    end_as_width: bool,
}

/// Stream `source` into `store` in the unpacked layout. Returns the
/// fragment count.
pub fn write_fragments(
    source: &mut impl Fragments,
    store: &impl ByteStore,
    interrupt: Option<&mut dyn FnMut() -> bool>,
) -> Result<u64> {
    let sink = FragmentSink {
        start: store.writer::<u32>("start")?,
        end: store.writer::<u32>("end")?,
        cell: store.writer::<u32>("cell")?,
        end_max: store.writer::<u32>("end_max")?,
        chr_ptr: store.writer::<u32>("chr_ptr")?,
        end_as_width: false,
    };
    write_into(source, store, sink, UNPACKED_FRAGMENTS_VERSION, interrupt)
}

/// Stream `source` into `store` in the packed layout.
pub fn write_fragments_packed(
    source: &mut impl Fragments,
    store: &impl ByteStore,
    interrupt: Option<&mut dyn FnMut() -> bool>,
) -> Result<u64> {
    let sink = FragmentSink {
        start: Box::new(PackedWriter::create(store, "start", Packing::Delta)?),
        end: Box::new(PackedWriter::create(store, "end", Packing::Raw)?),
        cell: Box::new(PackedWriter::create(store, "cell", Packing::Raw)?),
        end_max: store.writer::<u32>("end_max")?,
        chr_ptr: store.writer::<u32>("chr_ptr")?,
        end_as_width: true,
    };
    write_into(source, store, sink, PACKED_FRAGMENTS_VERSION, interrupt)
}

fn write_into(
    source: &mut impl Fragments,
    store: &impl ByteStore,
    mut sink: FragmentSink,
    version: &str,
    mut interrupt: Option<&mut dyn FnMut() -> bool>,
) -> Result<u64> {
    let mut chunk = FragmentChunk::with_capacity(DEFAULT_LOAD_CAPACITY);
    let mut count: u64 = 0;
    let mut block_max: u32 = 0;
    let mut chromosomes = 0usize;
    let mut max_cell: i64 = -1;

    while source.next_chr()? {
        let open = count;
        let mut last_start = 0u32;
        loop {
            let n = source.load(&mut chunk)?;
            if n == 0 {
                break;
            }
            for i in 0..n {
                let (s, e, c) = (chunk.start[i], chunk.end[i], chunk.cell[i]);
                if s < last_start {
                    return Err(Error::unsorted("fragment starts", last_start, s));
                }
                last_start = s;
                if s >= e {
                    return Err(Error::Parse(format!(
                        "fragment start {s} is not below its end {e}"
                    )));
                }
                sink.start.push(s)?;
                sink.end.push(if sink.end_as_width { e - s } else { e })?;
                sink.cell.push(c)?;
                max_cell = max_cell.max(c as i64);
                block_max = block_max.max(e);
                count += 1;
                if count % CHUNK as u64 == 0 {
                    sink.end_max.push(block_max)?;
                    block_max = 0;
                }
                if count % INTERRUPT_STRIDE as u64 == 0 {
                    if let Some(check) = interrupt.as_mut() {
                        if check() {
                            return Err(Error::Cancelled);
                        }
                    }
                }
            }
        }
        sink.chr_ptr.push(open as u32)?;
        sink.chr_ptr.push(count as u32)?;
        chromosomes += 1;
    }
    if count % CHUNK as u64 != 0 {
        sink.end_max.push(block_max)?;
    }

    let n_chr = source.chr_count().unwrap_or(chromosomes);
    let mut chr_names = Vec::with_capacity(n_chr);
    for i in 0..n_chr {
        let name = source
            .chr_name(i as u32)
            .ok_or_else(|| Error::NotFound(format!("chromosome name {i}")))?;
        chr_names.push(name.to_string());
    }
    let n_cell = source.cell_count().unwrap_or((max_cell + 1) as usize);
    let mut cell_names = Vec::with_capacity(n_cell);
    for i in 0..n_cell {
        let name = source
            .cell_name(i as u32)
            .ok_or_else(|| Error::NotFound(format!("cell name {i}")))?;
        cell_names.push(name.to_string());
    }

    sink.start.finalize()?;
    sink.end.finalize()?;
    sink.cell.finalize()?;
    sink.end_max.finalize()?;
    sink.chr_ptr.finalize()?;
    store.write_str_array("chr_names", &chr_names)?;
    store.write_str_array("cell_names", &cell_names)?;
    store.set_version(version)?;
    Ok(count)
}
