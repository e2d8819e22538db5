//! Directory-backed store: one self-describing binary file per dataset.
//!
//! Each file starts with the magic `FMAT`, a one-byte element-type tag and
//! a little-endian element count, followed by the raw little-endian
//! payload. String arrays length-prefix every entry. The group version
//! tag lives in a reserved `_version` entry.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::consts::{DEFAULT_READ_BUFFER, DEFAULT_WRITE_BUFFER};
use crate::errors::{Error, Result};

use super::{ArrayRead, ArrayWrite, ByteStore, Scalar, ScalarKind};

const MAGIC: &[u8; 4] = b"FMAT";
const STR_TAG: u8 = 4;
const HEADER_LEN: u64 = 4 + 1 + 8;
const VERSION_NAME: &str = "_version";

/// Backing store over a directory of dataset files.
pub struct DirStore {
    path: PathBuf,
}

impl DirStore {
    /// Create a fresh group. An existing non-empty directory is a
    /// `Conflict`.
    pub fn create(path: impl AsRef<Path>) -> Result<DirStore> {
        let path = path.as_ref();
        if path.exists() {
            if !path.is_dir() {
                return Err(Error::Conflict(format!(
                    "{} exists and is not a directory",
                    path.display()
                )));
            }
            if std::fs::read_dir(path)?.next().is_some() {
                return Err(Error::Conflict(format!(
                    "directory {} is not empty",
                    path.display()
                )));
            }
        } else {
            std::fs::create_dir_all(path)?;
        }
        Ok(DirStore {
            path: path.to_path_buf(),
        })
    }

    /// Open an existing group.
    pub fn open(path: impl AsRef<Path>) -> Result<DirStore> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::NotFound(format!("{}", path.display())));
        }
        Ok(DirStore {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dataset_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name == VERSION_NAME || name.contains(['/', '\\']) {
            return Err(Error::Parse(format!("invalid dataset name '{name}'")));
        }
        Ok(self.path.join(name))
    }

    fn read_header(file: &mut impl Read, name: &str) -> Result<(u8, u64)> {
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Parse(format!("'{name}' is not a fragmat dataset")));
        }
        let tag = file.read_u8()?;
        let count = file.read_u64::<LittleEndian>()?;
        Ok((tag, count))
    }

    fn read_strings(path: &Path, name: &str) -> Result<Vec<String>> {
        let file = File::open(path).map_err(|_| Error::NotFound(name.to_string()))?;
        let mut r = BufReader::with_capacity(DEFAULT_READ_BUFFER, file);
        let (tag, count) = DirStore::read_header(&mut r, name)?;
        if tag != STR_TAG {
            return Err(Error::Type {
                name: name.to_string(),
                stored: tag_name(tag),
                requested: "string",
            });
        }
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = r.read_u32::<LittleEndian>()? as usize;
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            let s = String::from_utf8(buf)
                .map_err(|_| Error::Parse(format!("invalid UTF-8 in string array '{name}'")))?;
            out.push(s);
        }
        Ok(out)
    }

    fn write_strings(path: &Path, name: &str, vals: &[String]) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    Error::Conflict(format!("dataset '{name}' already exists"))
                }
                _ => Error::Io(e),
            })?;
        let mut w = BufWriter::with_capacity(DEFAULT_WRITE_BUFFER, file);
        w.write_all(MAGIC)?;
        w.write_u8(STR_TAG)?;
        w.write_u64::<LittleEndian>(vals.len() as u64)?;
        for s in vals {
            w.write_u32::<LittleEndian>(s.len() as u32)?;
            w.write_all(s.as_bytes())?;
        }
        w.flush()?;
        Ok(())
    }
}

fn tag_name(tag: u8) -> &'static str {
    match ScalarKind::from_tag(tag) {
        Some(kind) => kind.name(),
        None if tag == STR_TAG => "string",
        None => "unknown",
    }
}

impl ByteStore for DirStore {
    fn reader<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayRead<T>>> {
        let path = self.dataset_path(name)?;
        let file = File::open(&path).map_err(|_| Error::NotFound(name.to_string()))?;
        let mut r = BufReader::with_capacity(DEFAULT_READ_BUFFER, file);
        let (tag, count) = DirStore::read_header(&mut r, name)?;
        if tag != T::KIND.tag() {
            return Err(Error::Type {
                name: name.to_string(),
                stored: tag_name(tag),
                requested: T::KIND.name(),
            });
        }
        Ok(Box::new(DirReader::<T> {
            r,
            len: count,
            pos: 0,
            _marker: std::marker::PhantomData,
        }))
    }

    fn writer<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayWrite<T>>> {
        let path = self.dataset_path(name)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    Error::Conflict(format!("dataset '{name}' already exists"))
                }
                _ => Error::Io(e),
            })?;
        let mut w = BufWriter::with_capacity(DEFAULT_WRITE_BUFFER, file);
        w.write_all(MAGIC)?;
        w.write_u8(T::KIND.tag())?;
        w.write_u64::<LittleEndian>(0)?;
        Ok(Box::new(DirWriter::<T> {
            w,
            count: 0,
            _marker: std::marker::PhantomData,
        }))
    }

    fn read_str_array(&self, name: &str) -> Result<Vec<String>> {
        let path = self.dataset_path(name)?;
        DirStore::read_strings(&path, name)
    }

    fn write_str_array(&self, name: &str, vals: &[String]) -> Result<()> {
        let path = self.dataset_path(name)?;
        DirStore::write_strings(&path, name, vals)
    }

    fn version(&self) -> Result<String> {
        let path = self.path.join(VERSION_NAME);
        let mut vals = DirStore::read_strings(&path, VERSION_NAME)?;
        vals.pop()
            .ok_or_else(|| Error::NotFound("version".to_string()))
    }

    fn set_version(&self, version: &str) -> Result<()> {
        let path = self.path.join(VERSION_NAME);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        DirStore::write_strings(&path, VERSION_NAME, &[version.to_string()])
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if name != VERSION_NAME {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn has(&self, name: &str) -> bool {
        match self.dataset_path(name) {
            Ok(path) => path.is_file(),
            Err(_) => false,
        }
    }
}

struct DirReader<T> {
    r: BufReader<File>,
    len: u64,
    pos: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> ArrayRead<T> for DirReader<T> {
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
        let byte = HEADER_LEN + pos * T::KIND.size() as u64;
        self.r.seek(SeekFrom::Start(byte))?;
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, out: &mut [T]) -> Result<usize> {
        let n = out.len().min((self.len - self.pos) as usize);
        T::read_from(&mut self.r, &mut out[..n])?;
        self.pos += n as u64;
        Ok(n)
    }
}

struct DirWriter<T> {
    w: BufWriter<File>,
    count: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> ArrayWrite<T> for DirWriter<T> {
    fn push(&mut self, v: T) -> Result<()> {
        T::write_to(&mut self.w, &[v])?;
        self.count += 1;
        Ok(())
    }

    fn extend(&mut self, vals: &[T]) -> Result<()> {
        T::write_to(&mut self.w, vals)?;
        self.count += vals.len() as u64;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.count
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        self.w.flush()?;
        let file = self.w.get_mut();
        file.seek(SeekFrom::Start(4 + 1))?;
        file.write_u64::<LittleEndian>(self.count)?;
        file.flush()?;
        Ok(())
    }
}
