//! Column-ordered sparse matrix streams.
//!
//! A [`MatrixSource`] delivers a compressed-sparse-column matrix one
//! column at a time: the consumer advances with
//! [`MatrixSource::next_col`] and drains `(row, value)` entries with
//! [`MatrixSource::next_value`]. Rows are strictly ascending within a
//! column and zero entries are never emitted. Seekable sources can enter
//! an arbitrary column directly with [`MatrixSource::seek_col`].

use num_traits::NumCast;

use crate::errors::{Error, Result};

mod concat;
mod convert;
mod csc;
mod select;
mod stored;

pub use concat::{ConcatCols, ConcatRows};
pub use convert::MatrixConverter;
pub use csc::{CscIter, CscMatrix};
pub use select::{ColSelect, RowSelect};
pub use stored::{write_matrix, write_matrix_packed, StoredMatrix};

/// Value types a matrix stream can carry.
pub trait MatrixValue:
    Copy + Default + PartialEq + std::fmt::Debug + NumCast + Send + 'static
{
}

impl MatrixValue for u32 {}
impl MatrixValue for u64 {}
impl MatrixValue for f32 {}
impl MatrixValue for f64 {}

/// One non-zero matrix entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixEntry<T> {
    pub row: u32,
    pub value: T,
}

/// Pull protocol over sparse matrix columns.
pub trait MatrixSource {
    type Value: MatrixValue;

    /// Advance to the next column; `false` once the matrix is exhausted.
    fn next_col(&mut self) -> Result<bool>;

    /// Index of the column being drained.
    fn current_col(&self) -> u32;

    /// Next entry of the current column, rows strictly ascending; `None`
    /// once the column is exhausted.
    fn next_value(&mut self) -> Result<Option<MatrixEntry<Self::Value>>>;

    fn rows(&self) -> Option<usize>;

    fn cols(&self) -> Option<usize>;

    fn row_names(&self) -> Option<&[String]>;

    fn col_names(&self) -> Option<&[String]>;

    fn seekable(&self) -> bool {
        false
    }

    /// Enter column `j` directly: `current_col` becomes `j` and
    /// [`next_value`](MatrixSource::next_value) drains its entries.
    fn seek_col(&mut self, _j: u32) -> Result<()> {
        Err(Error::Unsupported("this matrix source cannot seek"))
    }

    fn restart(&mut self) -> Result<()> {
        Err(Error::Unsupported("this matrix source cannot restart"))
    }
}

impl<S: MatrixSource + ?Sized> MatrixSource for &mut S {
    type Value = S::Value;

    fn next_col(&mut self) -> Result<bool> {
        (**self).next_col()
    }

    fn current_col(&self) -> u32 {
        (**self).current_col()
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<Self::Value>>> {
        (**self).next_value()
    }

    fn rows(&self) -> Option<usize> {
        (**self).rows()
    }

    fn cols(&self) -> Option<usize> {
        (**self).cols()
    }

    fn row_names(&self) -> Option<&[String]> {
        (**self).row_names()
    }

    fn col_names(&self) -> Option<&[String]> {
        (**self).col_names()
    }

    fn seekable(&self) -> bool {
        (**self).seekable()
    }

    fn seek_col(&mut self, j: u32) -> Result<()> {
        (**self).seek_col(j)
    }

    fn restart(&mut self) -> Result<()> {
        (**self).restart()
    }
}

/// Restart both sources and compare them entry by entry.
pub fn matrix_identical<T: MatrixValue>(
    a: &mut (impl MatrixSource<Value = T> + ?Sized),
    b: &mut (impl MatrixSource<Value = T> + ?Sized),
) -> Result<bool> {
    a.restart()?;
    b.restart()?;
    loop {
        let more_a = a.next_col()?;
        let more_b = b.next_col()?;
        if more_a != more_b {
            return Ok(false);
        }
        if !more_a {
            return Ok(true);
        }
        if a.current_col() != b.current_col() {
            return Ok(false);
        }
        loop {
            let ea = a.next_value()?;
            let eb = b.next_value()?;
            if ea != eb {
                return Ok(false);
            }
            if ea.is_none() {
                break;
            }
        }
    }
}
