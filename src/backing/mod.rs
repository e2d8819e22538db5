//! Keyed backing stores for typed 1-D arrays.
//!
//! A [`ByteStore`] maps dataset names to typed arrays of `u32`/`u64`/`f32`
//! elements or to string arrays, and carries a free-form version tag that
//! readers use to gate on-disk layouts. Two implementations ship by
//! default: [`MemStore`] for in-memory pipelines and tests, and
//! [`DirStore`] backed by one self-describing binary file per dataset.
//! The `hdf5` feature adds a third over HDF5 groups.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{Error, Result};

mod dir;
mod mem;

#[cfg(feature = "hdf5")]
mod h5;

pub use dir::DirStore;
pub use mem::MemStore;

#[cfg(feature = "hdf5")]
pub use h5::H5Store;

/// Element kinds a store can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    U32,
    U64,
    F32,
}

impl ScalarKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ScalarKind::U32 => 1,
            ScalarKind::U64 => 2,
            ScalarKind::F32 => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<ScalarKind> {
        match tag {
            1 => Some(ScalarKind::U32),
            2 => Some(ScalarKind::U64),
            3 => Some(ScalarKind::F32),
            _ => None,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
        }
    }

    pub(crate) fn size(self) -> usize {
        match self {
            ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::U64 => 8,
        }
    }
}

/// In-memory column payload shared by [`MemStore`] handles. Public only
/// because the sealed [`Scalar`] hooks mention it.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub enum ColumnData {
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    Str(Vec<String>),
}

impl ColumnData {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            ColumnData::U32(_) => "u32",
            ColumnData::U64(_) => "u64",
            ColumnData::F32(_) => "f32",
            ColumnData::Str(_) => "string",
        }
    }
}

/// Element types storable in a [`ByteStore`].
///
/// Sealed over `u32`, `u64` and `f32`; the per-type hooks keep the store
/// implementations free of per-element `match`es.
pub trait Scalar: Copy + Default + PartialEq + std::fmt::Debug + Send + 'static {
    const KIND: ScalarKind;

    /// Write `vals` little-endian.
    fn write_to<W: Write>(w: &mut W, vals: &[Self]) -> std::io::Result<()>;

    /// Fill `out` little-endian; the caller never requests past the end.
    fn read_from<R: Read>(r: &mut R, out: &mut [Self]) -> std::io::Result<()>;

    #[doc(hidden)]
    fn column_slice(col: &ColumnData) -> Option<&[Self]>;

    #[doc(hidden)]
    fn into_column(vals: Vec<Self>) -> ColumnData;

    #[cfg(feature = "hdf5")]
    #[doc(hidden)]
    fn h5_read(ds: &hdf5::Dataset, start: usize, count: usize) -> Result<Vec<Self>>;

    #[cfg(feature = "hdf5")]
    #[doc(hidden)]
    fn h5_write(group: &hdf5::Group, name: &str, vals: &[Self]) -> Result<()>;
}

macro_rules! impl_scalar {
    ($ty:ty, $kind:expr, $variant:ident, $write:ident, $read:ident) => {
        impl Scalar for $ty {
            const KIND: ScalarKind = $kind;

            fn write_to<W: Write>(w: &mut W, vals: &[Self]) -> std::io::Result<()> {
                for &v in vals {
                    w.$write::<LittleEndian>(v)?;
                }
                Ok(())
            }

            fn read_from<R: Read>(r: &mut R, out: &mut [Self]) -> std::io::Result<()> {
                r.$read::<LittleEndian>(out)
            }

            fn column_slice(col: &ColumnData) -> Option<&[Self]> {
                match col {
                    ColumnData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_column(vals: Vec<Self>) -> ColumnData {
                ColumnData::$variant(vals)
            }

            #[cfg(feature = "hdf5")]
            fn h5_read(ds: &hdf5::Dataset, start: usize, count: usize) -> Result<Vec<Self>> {
                let arr = ds.read_slice_1d::<Self, _>(start..start + count)?;
                Ok(arr.to_vec())
            }

            #[cfg(feature = "hdf5")]
            fn h5_write(group: &hdf5::Group, name: &str, vals: &[Self]) -> Result<()> {
                group.new_dataset_builder().with_data(vals).create(name)?;
                Ok(())
            }
        }
    };
}

impl_scalar!(u32, ScalarKind::U32, U32, write_u32, read_u32_into);
impl_scalar!(u64, ScalarKind::U64, U64, write_u64, read_u64_into);
impl_scalar!(f32, ScalarKind::F32, F32, write_f32, read_f32_into);

/// Positioned reader over one typed dataset.
pub trait ArrayRead<T: Scalar> {
    /// Total element count.
    fn len(&self) -> u64;

    /// Current element position.
    fn pos(&self) -> u64;

    /// Reposition to an absolute element index.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Fill up to `out.len()` elements, returning how many were read.
    /// Returns 0 only at the end of the dataset.
    fn read(&mut self, out: &mut [T]) -> Result<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly one element at the current position.
    fn read_one(&mut self) -> Result<T> {
        let mut buf = [T::default()];
        if self.read(&mut buf)? != 1 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of dataset",
            )));
        }
        Ok(buf[0])
    }

    /// Read exactly one element at an absolute position.
    fn read_one_at(&mut self, pos: u64) -> Result<T> {
        self.seek(pos)?;
        self.read_one()
    }

    /// Fill `out` completely or fail.
    fn read_exact(&mut self, out: &mut [T]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read(&mut out[filled..])?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "read past end of dataset",
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Materialize the whole dataset.
    fn read_all(&mut self) -> Result<Vec<T>> {
        self.seek(0)?;
        let mut out = vec![T::default(); self.len() as usize];
        self.read_exact(&mut out)?;
        Ok(out)
    }
}

/// Append-only writer over one typed dataset. Data becomes visible to
/// readers only after [`ArrayWrite::finalize`].
pub trait ArrayWrite<T: Scalar> {
    fn push(&mut self, v: T) -> Result<()>;

    fn extend(&mut self, vals: &[T]) -> Result<()>;

    /// Elements written so far.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finalize(self: Box<Self>) -> Result<()>;
}

/// A named group of typed arrays, string arrays, and a version tag.
pub trait ByteStore {
    /// Open a dataset for reading. `NotFound` when absent, `Type` on an
    /// element-type mismatch.
    fn reader<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayRead<T>>>;

    /// Create a dataset for appending. `Conflict` when the name exists.
    fn writer<T: Scalar>(&self, name: &str) -> Result<Box<dyn ArrayWrite<T>>>;

    fn read_str_array(&self, name: &str) -> Result<Vec<String>>;

    fn write_str_array(&self, name: &str, vals: &[String]) -> Result<()>;

    fn version(&self) -> Result<String>;

    fn set_version(&self, version: &str) -> Result<()>;

    /// Dataset names, sorted, version tag excluded.
    fn names(&self) -> Result<Vec<String>>;

    fn has(&self, name: &str) -> bool;
}

/// Reject any version tag other than `expected`.
pub(crate) fn check_version(store: &impl ByteStore, expected: &str) -> Result<()> {
    let found = store.version()?;
    if found != expected {
        return Err(Error::Parse(format!(
            "unknown storage version '{found}' (expected '{expected}')"
        )));
    }
    Ok(())
}
