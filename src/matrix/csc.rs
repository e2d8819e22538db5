//! Owned compressed-sparse-column matrix.
//!
//! [`CscMatrix`] is the in-memory terminal of a matrix pipeline: it can
//! be collected from any [`MatrixSource`] and re-iterated (seekable and
//! restartable) through [`CscMatrix::iter`]. Dense conversion exists for
//! tests and small matrices.

use crate::errors::{Error, Result};

use super::{MatrixEntry, MatrixSource, MatrixValue};

#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix<T> {
    rows: usize,
    cols: usize,
    indptr: Vec<u64>,
    indices: Vec<u32>,
    data: Vec<T>,
    row_names: Option<Vec<String>>,
    col_names: Option<Vec<String>>,
}

impl<T: MatrixValue> CscMatrix<T> {
    /// Build from raw CSC arrays, validating the column pointers and the
    /// strictly-ascending row invariant.
    pub fn from_parts(
        rows: usize,
        cols: usize,
        indptr: Vec<u64>,
        indices: Vec<u32>,
        data: Vec<T>,
    ) -> Result<CscMatrix<T>> {
        if indptr.len() != cols + 1 || indptr.first() != Some(&0) {
            return Err(Error::Shape(format!(
                "indptr holds {} entries for {} columns",
                indptr.len(),
                cols
            )));
        }
        if *indptr.last().unwrap_or(&0) != indices.len() as u64 || indices.len() != data.len() {
            return Err(Error::Shape(format!(
                "indptr covers {} entries but {} indices and {} values are present",
                indptr.last().unwrap_or(&0),
                indices.len(),
                data.len()
            )));
        }
        for j in 0..cols {
            let (lo, hi) = (indptr[j] as usize, indptr[j + 1] as usize);
            if hi < lo {
                return Err(Error::Shape(format!("indptr decreases at column {j}")));
            }
            let mut last: i64 = -1;
            for &r in &indices[lo..hi] {
                if (r as i64) <= last || (r as usize) >= rows {
                    return Err(Error::Sort(format!(
                        "row {r} out of order or out of range in column {j}"
                    )));
                }
                last = r as i64;
            }
        }
        Ok(CscMatrix {
            rows,
            cols,
            indptr,
            indices,
            data,
            row_names: None,
            col_names: None,
        })
    }

    /// Attach name tables; lengths must match the shape.
    pub fn with_names(
        mut self,
        row_names: Option<Vec<String>>,
        col_names: Option<Vec<String>>,
    ) -> Result<CscMatrix<T>> {
        if let Some(names) = &row_names {
            if names.len() != self.rows {
                return Err(Error::Shape(format!(
                    "{} row names for {} rows",
                    names.len(),
                    self.rows
                )));
            }
        }
        if let Some(names) = &col_names {
            if names.len() != self.cols {
                return Err(Error::Shape(format!(
                    "{} column names for {} columns",
                    names.len(),
                    self.cols
                )));
            }
        }
        self.row_names = row_names;
        self.col_names = col_names;
        Ok(self)
    }

    /// Build from a dense row-major table, dropping zero entries.
    pub fn from_dense(dense: &[Vec<T>]) -> CscMatrix<T> {
        let rows = dense.len();
        let cols = dense.first().map(Vec::len).unwrap_or(0);
        let mut indptr = Vec::with_capacity(cols + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for j in 0..cols {
            for (i, row) in dense.iter().enumerate() {
                if row[j] != T::default() {
                    indices.push(i as u32);
                    data.push(row[j]);
                }
            }
            indptr.push(indices.len() as u64);
        }
        CscMatrix {
            rows,
            cols,
            indptr,
            indices,
            data,
            row_names: None,
            col_names: None,
        }
    }

    pub fn to_dense(&self) -> Vec<Vec<T>> {
        let mut dense = vec![vec![T::default(); self.cols]; self.rows];
        for j in 0..self.cols {
            let (lo, hi) = (self.indptr[j] as usize, self.indptr[j + 1] as usize);
            for k in lo..hi {
                dense[self.indices[k] as usize][j] = self.data[k];
            }
        }
        dense
    }

    /// Drain `source` into an owned matrix.
    pub fn from_source(
        source: &mut (impl MatrixSource<Value = T> + ?Sized),
    ) -> Result<CscMatrix<T>> {
        let mut indptr: Vec<u64> = vec![0];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        let mut max_row: i64 = -1;
        while source.next_col()? {
            // Tolerate sources that skip empty trailing columns.
            while (indptr.len() as u32) <= source.current_col() {
                indptr.push(indices.len() as u64);
            }
            let mut last: i64 = -1;
            while let Some(MatrixEntry { row, value }) = source.next_value()? {
                if (row as i64) <= last {
                    return Err(Error::Sort(format!(
                        "row {row} out of order in column {}",
                        source.current_col()
                    )));
                }
                last = row as i64;
                max_row = max_row.max(row as i64);
                indices.push(row);
                data.push(value);
            }
            indptr.push(indices.len() as u64);
        }
        let cols = source.cols().unwrap_or(indptr.len() - 1);
        while indptr.len() < cols + 1 {
            indptr.push(indices.len() as u64);
        }
        let rows = source.rows().unwrap_or((max_row + 1) as usize);
        let row_names = source.row_names().map(<[String]>::to_vec);
        let col_names = source.col_names().map(<[String]>::to_vec);
        CscMatrix::from_parts(rows, cols, indptr, indices, data)?
            .with_names(row_names, col_names)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    pub fn col_names(&self) -> Option<&[String]> {
        self.col_names.as_deref()
    }

    /// Borrowing, seekable, restartable iterator over the columns.
    pub fn iter(&self) -> CscIter<'_, T> {
        CscIter {
            mat: self,
            col: None,
            pos: 0,
            col_end: 0,
        }
    }
}

/// Streaming view over a [`CscMatrix`].
pub struct CscIter<'a, T> {
    mat: &'a CscMatrix<T>,
    col: Option<u32>,
    pos: u64,
    col_end: u64,
}

impl<T: MatrixValue> MatrixSource for CscIter<'_, T> {
    type Value = T;

    fn next_col(&mut self) -> Result<bool> {
        let next = self.col.map(|c| c + 1).unwrap_or(0);
        if next as usize >= self.mat.cols {
            return Ok(false);
        }
        self.col = Some(next);
        self.pos = self.mat.indptr[next as usize];
        self.col_end = self.mat.indptr[next as usize + 1];
        Ok(true)
    }

    fn current_col(&self) -> u32 {
        self.col.unwrap_or(0)
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<T>>> {
        if self.pos >= self.col_end {
            return Ok(None);
        }
        let k = self.pos as usize;
        self.pos += 1;
        Ok(Some(MatrixEntry {
            row: self.mat.indices[k],
            value: self.mat.data[k],
        }))
    }

    fn rows(&self) -> Option<usize> {
        Some(self.mat.rows)
    }

    fn cols(&self) -> Option<usize> {
        Some(self.mat.cols)
    }

    fn row_names(&self) -> Option<&[String]> {
        self.mat.row_names.as_deref()
    }

    fn col_names(&self) -> Option<&[String]> {
        self.mat.col_names.as_deref()
    }

    fn seekable(&self) -> bool {
        true
    }

    fn seek_col(&mut self, j: u32) -> Result<()> {
        if j as usize >= self.mat.cols {
            return Err(Error::Shape(format!(
                "column {j} out of range for {} columns",
                self.mat.cols
            )));
        }
        self.col = Some(j);
        self.pos = self.mat.indptr[j as usize];
        self.col_end = self.mat.indptr[j as usize + 1];
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.col = None;
        self.pos = 0;
        self.col_end = 0;
        Ok(())
    }
}
