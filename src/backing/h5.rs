//! HDF5-backed store (cargo feature `hdf5`).
//!
//! Datasets live inside one HDF5 group; the version tag is the group's
//! `version` string attribute. Writers buffer in memory and materialize
//! the dataset on finalize.

use hdf5::types::VarLenUnicode;
use hdf5::{File, Group};

use crate::errors::{Error, Result};

use super::{ArrayRead, ArrayWrite, ByteStore, Scalar};

/// Backing store over an HDF5 group.
pub struct H5Store {
    group: Group,
}

impl H5Store {
    /// Create `group_path` inside `path`, creating the file as needed.
    /// An existing non-empty group is a `Conflict`.
    pub fn create(path: impl AsRef<std::path::Path>, group_path: &str) -> Result<H5Store> {
        let file = File::append(path)?;
        if file.link_exists(group_path) {
            let group = file.group(group_path)?;
            if !group.member_names()?.is_empty() {
                return Err(Error::Conflict(format!(
                    "HDF5 group '{group_path}' is not empty"
                )));
            }
            return Ok(H5Store { group });
        }
        Ok(H5Store {
            group: file.create_group(group_path)?,
        })
    }

    /// Open an existing group read-only.
    pub fn open(path: impl AsRef<std::path::Path>, group_path: &str) -> Result<H5Store> {
        let file = File::open(path)?;
        let group = file
            .group(group_path)
            .map_err(|_| Error::NotFound(group_path.to_string()))?;
        Ok(H5Store { group })
    }

    /// Wrap a group handle obtained elsewhere.
    pub fn from_group(group: Group) -> H5Store {
        H5Store { group }
    }
}

impl ByteStore for H5Store {
    fn reader<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayRead<T>>> {
        let ds = self
            .group
            .dataset(name)
            .map_err(|_| Error::NotFound(name.to_string()))?;
        let len = ds.size() as u64;
        Ok(Box::new(H5Reader::<T> {
            ds,
            len,
            pos: 0,
            _marker: std::marker::PhantomData,
        }))
    }

    fn writer<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayWrite<T>>> {
        if self.group.link_exists(name) {
            return Err(Error::Conflict(format!("dataset '{name}' already exists")));
        }
        Ok(Box::new(H5Writer::<T> {
            group: self.group.clone(),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    fn read_str_array(&self, name: &str) -> Result<Vec<String>> {
        let ds = self
            .group
            .dataset(name)
            .map_err(|_| Error::NotFound(name.to_string()))?;
        let values = ds.read_1d::<VarLenUnicode>()?;
        Ok(values.iter().map(|s| s.to_string()).collect())
    }

    fn write_str_array(&self, name: &str, vals: &[String]) -> Result<()> {
        if self.group.link_exists(name) {
            return Err(Error::Conflict(format!("dataset '{name}' already exists")));
        }
        let values: Vec<VarLenUnicode> = vals
            .iter()
            .map(|s| {
                s.parse::<VarLenUnicode>()
                    .map_err(|_| Error::Parse(format!("string '{s}' is not valid unicode")))
            })
            .collect::<Result<_>>()?;
        self.group
            .new_dataset_builder()
            .with_data(&values)
            .create(name)?;
        Ok(())
    }

    fn version(&self) -> Result<String> {
        let attr = self
            .group
            .attr("version")
            .map_err(|_| Error::NotFound("version".to_string()))?;
        Ok(attr.read_scalar::<VarLenUnicode>()?.to_string())
    }

    fn set_version(&self, version: &str) -> Result<()> {
        let value = version
            .parse::<VarLenUnicode>()
            .map_err(|_| Error::Parse(format!("version '{version}' is not valid unicode")))?;
        let attr = self.group.new_attr::<VarLenUnicode>().create("version")?;
        attr.write_scalar(&value)?;
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = self.group.member_names()?;
        names.sort();
        Ok(names)
    }

    fn has(&self, name: &str) -> bool {
        self.group.link_exists(name)
    }
}

struct H5Reader<T> {
    ds: hdf5::Dataset,
    len: u64,
    pos: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> ArrayRead<T> for H5Reader<T> {
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

    fn read(&mut self, out: &mut [T]) -> Result<usize> {
        let n = out.len().min((self.len - self.pos) as usize);
        if n == 0 {
            return Ok(0);
        }
        let vals = T::h5_read(&self.ds, self.pos as usize, n)?;
        out[..n].copy_from_slice(&vals);
        self.pos += n as u64;
        Ok(n)
    }
}

struct H5Writer<T> {
    group: Group,
    name: String,
    buf: Vec<T>,
}

impl<T: Scalar> ArrayWrite<T> for H5Writer<T> {
    fn push(&mut self, v: T) -> Result<()> {
        self.buf.push(v);
        Ok(())
    }

    fn extend(&mut self, vals: &[T]) -> Result<()> {
        self.buf.extend_from_slice(vals);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        T::h5_write(&self.group, &self.name, &self.buf)
    }
}
