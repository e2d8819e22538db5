//! Chunk-aligned bit-packed integer codec.
//!
//! Logical `u32` arrays are split into chunks of [`CHUNK`] values; each
//! chunk is packed at its own bit-width. A packed array `name` occupies
//! three datasets in the backing store:
//!
//! - `{name}_data`: the packed payload, whole little-endian `u32` words;
//! - `{name}_idx`: word offset of every chunk (chunks + 1 entries);
//! - `{name}_starts`: one anchor value per chunk (delta policy only).
//!
//! The per-chunk bit-width is not stored: a chunk holding 128 values at
//! `w` bits spans exactly `4 * w` words, so `w = (idx[k+1] - idx[k]) / 4`.
//! The final partial chunk is padded by repeating its last value; the true
//! element count travels outside the codec (shape, chr_ptr, indptr).
//!
//! The delta policy zig-zag-encodes wrapping first differences against the
//! chunk anchor, so monotone streams pack tightly while streams with
//! occasional resets (row indices across column boundaries, fragment
//! starts across chromosome boundaries) still round-trip exactly. The raw
//! policy packs the values themselves and suits bounded ranges such as
//! cell ids.

use crate::backing::{ArrayRead, ArrayWrite, ByteStore};
use crate::errors::{Error, Result};

/// Values per packed chunk.
pub const CHUNK: usize = 128;

/// Per-dataset encoding policy, fixed at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    /// Zig-zag delta against a per-chunk anchor.
    Delta,
    /// Plain bit-packing of the values.
    Raw,
}

#[inline]
fn bit_width(max: u32) -> u32 {
    32 - max.leading_zeros()
}

#[inline]
fn zigzag(d: i32) -> u32 {
    ((d << 1) ^ (d >> 31)) as u32
}

#[inline]
fn unzigzag(z: u32) -> i32 {
    ((z >> 1) as i32) ^ -((z & 1) as i32)
}

/// Append `values` packed at `width` bits to `out`. `width * CHUNK` is a
/// whole number of words, so the output is always word-aligned.
fn pack_words(values: &[u32; CHUNK], width: u32, out: &mut Vec<u32>) {
    if width == 0 {
        return;
    }
    let mut acc: u64 = 0;
    let mut bits: u32 = 0;
    for &v in values.iter() {
        acc |= (v as u64) << bits;
        bits += width;
        while bits >= 32 {
            out.push(acc as u32);
            acc >>= 32;
            bits -= 32;
        }
    }
    debug_assert_eq!(bits, 0);
}

fn unpack_words(words: &[u32], width: u32, out: &mut [u32; CHUNK]) {
    if width == 0 {
        out.fill(0);
        return;
    }
    let mask: u32 = if width == 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    };
    let mut acc: u64 = 0;
    let mut bits: u32 = 0;
    let mut next = 0usize;
    for slot in out.iter_mut() {
        if bits < width {
            acc |= (words[next] as u64) << bits;
            next += 1;
            bits += 32;
        }
        *slot = (acc as u32) & mask;
        acc >>= width;
        bits -= width;
    }
}

fn chunk_count(len: u64) -> u64 {
    len.div_ceil(CHUNK as u64)
}

/// Writer that packs a logical `u32` array into the three framing
/// datasets. Implements [`ArrayWrite`], so packed and unpacked columns
/// share one write path.
pub struct PackedWriter {
    data: Box<dyn ArrayWrite<u32>>,
    idx: Box<dyn ArrayWrite<u32>>,
    starts: Option<Box<dyn ArrayWrite<u32>>>,
    packing: Packing,
    pending: Vec<u32>,
    words: u32,
    count: u64,
    scratch: Vec<u32>,
}

impl PackedWriter {
    pub fn create(store: &impl ByteStore, name: &str, packing: Packing) -> Result<PackedWriter> {
        let data = store.writer::<u32>(&format!("{name}_data"))?;
        let mut idx = store.writer::<u32>(&format!("{name}_idx"))?;
        idx.push(0)?;
        let starts = match packing {
            Packing::Delta => Some(store.writer::<u32>(&format!("{name}_starts"))?),
            Packing::Raw => None,
        };
        Ok(PackedWriter {
            data,
            idx,
            starts,
            packing,
            pending: Vec::with_capacity(CHUNK),
            words: 0,
            count: 0,
            scratch: Vec::with_capacity(CHUNK),
        })
    }

    fn flush_chunk(&mut self) -> Result<()> {
        debug_assert_eq!(self.pending.len(), CHUNK);
        let mut values = [0u32; CHUNK];

        match self.packing {
            Packing::Delta => {
                let anchor = self.pending[0];
                if let Some(starts) = self.starts.as_mut() {
                    starts.push(anchor)?;
                }
                let mut prev = anchor;
                for (slot, &v) in values.iter_mut().zip(self.pending.iter()).skip(1) {
                    *slot = zigzag(v.wrapping_sub(prev) as i32);
                    prev = v;
                }
            }
            Packing::Raw => values.copy_from_slice(&self.pending),
        }

        let width = bit_width(values.iter().copied().max().unwrap_or(0));
        self.scratch.clear();
        pack_words(&values, width, &mut self.scratch);
        self.data.extend(&self.scratch)?;
        self.words += self.scratch.len() as u32;
        self.idx.push(self.words)?;
        self.pending.clear();
        Ok(())
    }
}

impl ArrayWrite<u32> for PackedWriter {
    fn push(&mut self, v: u32) -> Result<()> {
        self.pending.push(v);
        self.count += 1;
        if self.pending.len() == CHUNK {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn extend(&mut self, vals: &[u32]) -> Result<()> {
        for &v in vals {
            self.push(v)?;
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.count
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        if !self.pending.is_empty() {
            let last = *self.pending.last().unwrap_or(&0);
            while self.pending.len() < CHUNK {
                self.pending.push(last);
            }
            self.flush_chunk()?;
        }
        self.data.finalize()?;
        self.idx.finalize()?;
        if let Some(starts) = self.starts {
            starts.finalize()?;
        }
        Ok(())
    }
}

/// Reader over a packed array. Holds one decoded chunk; chunk seek is
/// O(1) through the `{name}_idx` offsets.
pub struct PackedReader {
    data: Box<dyn ArrayRead<u32>>,
    idx: Box<dyn ArrayRead<u32>>,
    starts: Option<Box<dyn ArrayRead<u32>>>,
    packing: Packing,
    len: u64,
    pos: u64,
    decoded: [u32; CHUNK],
    decoded_chunk: Option<u64>,
    scratch: Vec<u32>,
}

impl PackedReader {
    /// Open a packed array. `len` is the logical element count carried by
    /// the enclosing layout.
    pub fn open(
        store: &impl ByteStore,
        name: &str,
        packing: Packing,
        len: u64,
    ) -> Result<PackedReader> {
        let data = store.reader::<u32>(&format!("{name}_data"))?;
        let idx = store.reader::<u32>(&format!("{name}_idx"))?;
        let chunks = chunk_count(len);
        if idx.len() != chunks + 1 {
            return Err(Error::Parse(format!(
                "packed array '{name}': {} index entries for {} chunks",
                idx.len(),
                chunks
            )));
        }
        let starts = match packing {
            Packing::Delta => {
                let starts = store.reader::<u32>(&format!("{name}_starts"))?;
                if starts.len() != chunks {
                    return Err(Error::Parse(format!(
                        "packed array '{name}': {} anchors for {} chunks",
                        starts.len(),
                        chunks
                    )));
                }
                Some(starts)
            }
            Packing::Raw => None,
        };
        Ok(PackedReader {
            data,
            idx,
            starts,
            packing,
            len,
            pos: 0,
            decoded: [0u32; CHUNK],
            decoded_chunk: None,
            scratch: vec![0u32; CHUNK],
        })
    }

    fn decode_chunk(&mut self, chunk: u64) -> Result<()> {
        self.idx.seek(chunk)?;
        let w0 = self.idx.read_one()?;
        let w1 = self.idx.read_one()?;
        let nwords = w1.checked_sub(w0).filter(|n| n % 4 == 0).ok_or_else(|| {
            Error::Parse(format!("corrupt packed chunk offsets: {w0}..{w1}"))
        })? as usize;
        let width = (nwords / 4) as u32;
        if width > 32 {
            return Err(Error::Parse(format!("packed chunk width {width} exceeds 32")));
        }
        self.data.seek(w0 as u64)?;
        self.scratch.resize(nwords, 0);
        self.data.read_exact(&mut self.scratch)?;
        unpack_words(&self.scratch, width, &mut self.decoded);

        if self.packing == Packing::Delta {
            let anchor = match self.starts.as_mut() {
                Some(starts) => starts.read_one_at(chunk)?,
                None => 0,
            };
            let mut prev = anchor;
            self.decoded[0] = anchor;
            for slot in self.decoded.iter_mut().skip(1) {
                prev = prev.wrapping_add(unzigzag(*slot) as u32);
                *slot = prev;
            }
        }
        self.decoded_chunk = Some(chunk);
        Ok(())
    }
}

impl ArrayRead<u32> for PackedReader {
    fn len(&self) -> u64 {
        self.len
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("seek to {pos} past end ({})", self.len),
            )));
        }
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, out: &mut [u32]) -> Result<usize> {
        let mut filled = 0;
        while filled < out.len() && self.pos < self.len {
            let chunk = self.pos / CHUNK as u64;
            if self.decoded_chunk != Some(chunk) {
                self.decode_chunk(chunk)?;
            }
            let offset = (self.pos % CHUNK as u64) as usize;
            let in_chunk = CHUNK - offset;
            let remaining = (self.len - self.pos) as usize;
            let n = (out.len() - filled).min(in_chunk).min(remaining);
            out[filled..filled + n].copy_from_slice(&self.decoded[offset..offset + n]);
            filled += n;
            self.pos += n as u64;
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::MemStore;
    use pretty_assertions::assert_eq;
    use rand::prelude::*;
    use rstest::*;

    fn roundtrip(values: &[u32], packing: Packing) -> Vec<u32> {
        let store = MemStore::new();
        let mut w = Box::new(PackedWriter::create(&store, "x", packing).unwrap());
        w.extend(values).unwrap();
        w.finalize().unwrap();

        let mut r = PackedReader::open(&store, "x", packing, values.len() as u64).unwrap();
        r.read_all().unwrap()
    }

    #[rstest]
    #[case::delta(Packing::Delta)]
    #[case::raw(Packing::Raw)]
    fn empty_array(#[case] packing: Packing) {
        assert_eq!(roundtrip(&[], packing), Vec::<u32>::new());
    }

    #[rstest]
    #[case::delta(Packing::Delta)]
    #[case::raw(Packing::Raw)]
    fn partial_and_exact_chunks(#[case] packing: Packing) {
        for len in [1usize, 7, 127, 128, 129, 255, 256, 1000] {
            let values: Vec<u32> = (0..len as u32).map(|i| i * 3 + 1).collect();
            assert_eq!(roundtrip(&values, packing), values, "len {len}");
        }
    }

    #[test]
    fn monotone_stream_packs_small() {
        // Non-decreasing starts with diffs <= 2: zig-zag stays below 8,
        // so a chunk spans at most 3 bits -> 12 words.
        let mut values = Vec::new();
        let mut v = 0u32;
        for i in 0..1024u32 {
            v += i % 3;
            values.push(v);
        }
        let store = MemStore::new();
        let mut w = Box::new(PackedWriter::create(&store, "x", Packing::Delta).unwrap());
        w.extend(&values).unwrap();
        w.finalize().unwrap();

        let data = store.reader::<u32>("x_data").unwrap().len();
        assert!(data <= (1024 / CHUNK as u64) * 12, "payload was {data} words");

        let mut r = PackedReader::open(&store, "x", Packing::Delta, 1024).unwrap();
        assert_eq!(r.read_all().unwrap(), values);
    }

    #[test]
    fn constant_chunk_occupies_zero_words() {
        let values = vec![42u32; CHUNK];
        let store = MemStore::new();
        let mut w = Box::new(PackedWriter::create(&store, "x", Packing::Delta).unwrap());
        w.extend(&values).unwrap();
        w.finalize().unwrap();
        assert_eq!(store.reader::<u32>("x_data").unwrap().len(), 0);

        let mut r = PackedReader::open(&store, "x", Packing::Delta, CHUNK as u64).unwrap();
        assert_eq!(r.read_all().unwrap(), values);
    }

    #[test]
    fn random_streams_roundtrip() {
        let mut rng = StdRng::seed_from_u64(125124);
        for _ in 0..4 {
            let len = rng.gen_range(1..2000);
            let values: Vec<u32> = (0..len).map(|_| rng.gen()).collect();
            assert_eq!(roundtrip(&values, Packing::Delta), values);
            assert_eq!(roundtrip(&values, Packing::Raw), values);
        }
    }

    #[test]
    fn descending_resets_roundtrip() {
        // Column-boundary pattern: ascending runs that reset to zero.
        let mut values = Vec::new();
        for _ in 0..10 {
            values.extend((0..50u32).map(|i| i * 7));
        }
        assert_eq!(roundtrip(&values, Packing::Delta), values);
    }

    #[test]
    fn seek_matches_linear_scan() {
        let values: Vec<u32> = (0..1000u32).map(|i| i * i % 4093).collect();
        let store = MemStore::new();
        let mut w = Box::new(PackedWriter::create(&store, "x", Packing::Raw).unwrap());
        w.extend(&values).unwrap();
        w.finalize().unwrap();

        let mut r = PackedReader::open(&store, "x", Packing::Raw, 1000).unwrap();
        for pos in [999u64, 0, 517, 128, 127, 400] {
            assert_eq!(r.read_one_at(pos).unwrap(), values[pos as usize]);
        }
    }
}
