//! Fragment text files: `chrom \t start \t end \t barcode [\t ...]`,
//! optionally gzip-compressed.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::consts::{DEFAULT_COMMENT_PREFIX, INTERRUPT_STRIDE};
use crate::errors::{Error, Result};

use super::{FragmentChunk, Fragments};

/// Get a reader for either a gzip'd or non-gzip'd file.
fn get_dynamic_reader(path: &Path) -> Result<BufReader<Box<dyn Read>>> {
    let is_gzipped = path.extension() == Some(OsStr::new("gz"));
    let file = File::open(path).map_err(|_| Error::NotFound(path.display().to_string()))?;

    let file: Box<dyn Read> = match is_gzipped {
        true => Box::new(MultiGzDecoder::new(file)),
        false => Box::new(file),
    };

    Ok(BufReader::new(file))
}

/// Streaming reader over a fragment text file.
///
/// Cell ids are assigned densely in order of first appearance; chromosome
/// ids in order of appearance. Chromosomes must be contiguous in the file
/// and starts non-decreasing within a chromosome. Counts are unknown
/// until the stream is exhausted; the source is not seekable but can be
/// restarted (the file is reopened).
pub struct BedFragments {
    path: PathBuf,
    comment_prefix: String,
    reader: BufReader<Box<dyn Read>>,
    line: String,
    lineno: u64,
    current_chr: String,
    current_chr_id: u32,
    chr_lookup: HashMap<String, u32>,
    chr_names: Vec<String>,
    cell_lookup: HashMap<String, u32>,
    cell_names: Vec<String>,
    last_start: u32,
}

struct ParsedLine {
    start: u32,
    end: u32,
    cell: u32,
}

impl BedFragments {
    pub fn open(path: impl AsRef<Path>) -> Result<BedFragments> {
        BedFragments::open_with_comment(path, DEFAULT_COMMENT_PREFIX)
    }

    /// Open with a custom comment prefix; an empty prefix disables
    /// comment skipping.
    pub fn open_with_comment(path: impl AsRef<Path>, comment_prefix: &str) -> Result<BedFragments> {
        let mut frags = BedFragments {
            path: path.as_ref().to_path_buf(),
            comment_prefix: comment_prefix.to_string(),
            reader: get_dynamic_reader(path.as_ref())?,
            line: String::new(),
            lineno: 0,
            current_chr: String::new(),
            current_chr_id: 0,
            chr_lookup: HashMap::new(),
            chr_names: Vec::new(),
            cell_lookup: HashMap::new(),
            cell_names: Vec::new(),
            last_start: 0,
        };
        frags.prime()?;
        Ok(frags)
    }

    fn prime(&mut self) -> Result<()> {
        self.read_line()?;
        if !self.comment_prefix.is_empty() {
            while !self.line.is_empty() && self.line.starts_with(&self.comment_prefix) {
                self.read_line()?;
            }
        }
        Ok(())
    }

    /// Read the next line into `self.line`; an empty buffer marks the end
    /// of the stream.
    fn read_line(&mut self) -> Result<()> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line)?;
        if n > 0 {
            self.lineno += 1;
        }
        while self.line.ends_with('\n') || self.line.ends_with('\r') {
            self.line.pop();
        }
        Ok(())
    }

    fn parse_error(&self, what: &str) -> Error {
        Error::Parse(format!(
            "{} at {}:{}: '{}'",
            what,
            self.path.display(),
            self.lineno,
            self.line
        ))
    }

    /// Parse `self.line`, registering the cell barcode. Returns the
    /// chromosome field through `chrom` to avoid borrowing tangles.
    fn parse_line(&mut self, chrom: &mut String) -> Result<ParsedLine> {
        let mut fields = self.line.split('\t');
        let chr_field = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| self.parse_error("missing chromosome field"))?;
        chrom.clear();
        chrom.push_str(chr_field);

        let start: u32 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| self.parse_error("invalid start coordinate"))?;
        let end: u32 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| self.parse_error("invalid end coordinate"))?;
        if start >= end {
            return Err(self.parse_error("fragment start is not below its end"));
        }
        let barcode = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| self.parse_error("missing cell barcode field"))?;

        let cell = match self.cell_lookup.get(barcode) {
            Some(&id) => id,
            None => {
                let id = self.cell_names.len() as u32;
                self.cell_lookup.insert(barcode.to_string(), id);
                self.cell_names.push(barcode.to_string());
                id
            }
        };
        Ok(ParsedLine { start, end, cell })
    }

    fn check_sorted(&self, start: u32) -> Result<()> {
        if start < self.last_start {
            return Err(Error::Sort(format!(
                "fragment file not sorted by (chromosome, start) at {}:{}: start {} follows {}",
                self.path.display(),
                self.lineno,
                start,
                self.last_start
            )));
        }
        Ok(())
    }
}

impl Fragments for BedFragments {
    fn next_chr(&mut self) -> Result<bool> {
        let mut chrom = String::new();
        loop {
            if self.line.is_empty() {
                return Ok(false);
            }
            let parsed = self.parse_line(&mut chrom)?;
            if chrom != self.current_chr {
                break;
            }
            // Drain fragments the consumer never loaded.
            self.check_sorted(parsed.start)?;
            self.last_start = parsed.start;
            self.read_line()?;
        }

        if self.chr_lookup.contains_key(&chrom) {
            return Err(Error::Sort(format!(
                "fragment file not sorted by (chromosome, start): chromosome '{chrom}' appears twice"
            )));
        }
        let id = self.chr_names.len() as u32;
        self.chr_lookup.insert(chrom.clone(), id);
        self.chr_names.push(chrom.clone());
        self.current_chr = chrom;
        self.current_chr_id = id;
        self.last_start = 0;
        Ok(true)
    }

    fn current_chr(&self) -> u32 {
        self.current_chr_id
    }

    fn load(&mut self, chunk: &mut FragmentChunk) -> Result<usize> {
        chunk.clear();
        let mut chrom = String::new();
        while chunk.len() < chunk.capacity() {
            if self.line.is_empty() {
                break;
            }
            let parsed = self.parse_line(&mut chrom)?;
            if chrom != self.current_chr {
                break;
            }
            self.check_sorted(parsed.start)?;
            self.last_start = parsed.start;
            chunk.push(parsed.start, parsed.end, parsed.cell);
            self.read_line()?;
        }
        Ok(chunk.len())
    }

    fn chr_count(&self) -> Option<usize> {
        if self.line.is_empty() {
            Some(self.chr_names.len())
        } else {
            None
        }
    }

    fn cell_count(&self) -> Option<usize> {
        if self.line.is_empty() {
            Some(self.cell_names.len())
        } else {
            None
        }
    }

    fn chr_name(&self, id: u32) -> Option<&str> {
        self.chr_names.get(id as usize).map(String::as_str)
    }

    fn cell_name(&self, id: u32) -> Option<&str> {
        self.cell_names.get(id as usize).map(String::as_str)
    }

    fn restart(&mut self) -> Result<()> {
        self.reader = get_dynamic_reader(&self.path)?;
        self.line.clear();
        self.lineno = 0;
        self.current_chr.clear();
        self.current_chr_id = 0;
        self.chr_lookup.clear();
        self.chr_names.clear();
        self.cell_lookup.clear();
        self.cell_names.clear();
        self.last_start = 0;
        self.prime()
    }
}

/// Writer for fragment text files; gzip output when the path ends in
/// `.gz`.
pub struct BedFragmentsWriter {
    path: PathBuf,
    append_fifth_column: bool,
}

impl BedFragmentsWriter {
    pub fn new(path: impl AsRef<Path>, append_fifth_column: bool) -> BedFragmentsWriter {
        BedFragmentsWriter {
            path: path.as_ref().to_path_buf(),
            append_fifth_column,
        }
    }

    /// Drain `source`, writing one line per fragment. Returns the number
    /// of fragments written.
    pub fn write(
        &mut self,
        source: &mut impl Fragments,
        mut interrupt: Option<&mut dyn FnMut() -> bool>,
    ) -> Result<u64> {
        let file = File::create(&self.path)?;
        let out: Box<dyn Write> = if self.path.extension() == Some(OsStr::new("gz")) {
            Box::new(GzEncoder::new(file, Compression::default()))
        } else {
            Box::new(file)
        };
        let mut out = BufWriter::new(out);

        let mut chunk = FragmentChunk::with_capacity(crate::consts::DEFAULT_LOAD_CAPACITY);
        let mut total: u64 = 0;
        while source.next_chr()? {
            let chr_id = source.current_chr();
            loop {
                if source.load(&mut chunk)? == 0 {
                    break;
                }
                for i in 0..chunk.len() {
                    let chr_name = source
                        .chr_name(chr_id)
                        .ok_or_else(|| Error::NotFound(format!("chromosome name {chr_id}")))?;
                    let cell_name = source
                        .cell_name(chunk.cell[i])
                        .ok_or_else(|| Error::NotFound(format!("cell name {}", chunk.cell[i])))?;
                    if self.append_fifth_column {
                        writeln!(
                            out,
                            "{}\t{}\t{}\t{}\t0",
                            chr_name, chunk.start[i], chunk.end[i], cell_name
                        )?;
                    } else {
                        writeln!(
                            out,
                            "{}\t{}\t{}\t{}",
                            chr_name, chunk.start[i], chunk.end[i], cell_name
                        )?;
                    }
                    total += 1;
                    if total % INTERRUPT_STRIDE as u64 == 0 {
                        if let Some(check) = interrupt.as_mut() {
                            if check() {
                                return Err(Error::Cancelled);
                            }
                        }
                    }
                }
            }
        }
        out.flush()?;
        Ok(total)
    }
}
