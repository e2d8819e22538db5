//! Row-wise and column-wise matrix concatenation.
//!
//! Both transforms borrow their inputs for the lifetime of the iterator
//! and validate shape and name compatibility at construction.

use crate::errors::{Error, Result};

use super::{MatrixEntry, MatrixSource, MatrixValue};

fn names_agree(expected: &Option<Vec<String>>, found: Option<&[String]>) -> bool {
    // An absent table is a wildcard.
    match (expected, found) {
        (Some(a), Some(b)) => a.as_slice() == b,
        _ => true,
    }
}

/// Row-stack sources sharing a column space: for each column, source 0's
/// rows come first, then source 1's offset by `rows(0)`, and so on.
pub struct ConcatRows<'a, T: MatrixValue> {
    sources: Vec<&'a mut dyn MatrixSource<Value = T>>,
    offsets: Vec<u32>,
    rows: usize,
    cols: usize,
    row_names: Option<Vec<String>>,
    col_names: Option<Vec<String>>,
    active: usize,
    col: Option<u32>,
}

impl<'a, T: MatrixValue> ConcatRows<'a, T> {
    pub fn new(sources: Vec<&'a mut dyn MatrixSource<Value = T>>) -> Result<ConcatRows<'a, T>> {
        if sources.is_empty() {
            return Err(Error::Shape("no sources to concatenate".to_string()));
        }
        let cols = sources[0]
            .cols()
            .ok_or_else(|| Error::Shape("source column count unknown".to_string()))?;
        let mut col_names: Option<Vec<String>> = None;
        let mut offsets = Vec::with_capacity(sources.len());
        let mut rows = 0usize;
        let mut row_names: Option<Vec<String>> = Some(Vec::new());
        for (k, source) in sources.iter().enumerate() {
            if source.cols() != Some(cols) {
                return Err(Error::Shape(format!(
                    "source {k} has {:?} columns, expected {cols}",
                    source.cols()
                )));
            }
            if !names_agree(&col_names, source.col_names()) {
                return Err(Error::Shape(format!(
                    "source {k} carries different column names"
                )));
            }
            if col_names.is_none() {
                col_names = source.col_names().map(<[String]>::to_vec);
            }
            offsets.push(rows as u32);
            let source_rows = source
                .rows()
                .ok_or_else(|| Error::Shape(format!("source {k} row count unknown")))?;
            rows += source_rows;
            row_names = match (row_names, source.row_names()) {
                (Some(mut acc), Some(names)) => {
                    acc.extend_from_slice(names);
                    Some(acc)
                }
                _ => None,
            };
        }
        Ok(ConcatRows {
            sources,
            offsets,
            rows,
            cols,
            row_names,
            col_names,
            active: 0,
            col: None,
        })
    }

    fn advance_all(&mut self, j: Option<u32>) -> Result<bool> {
        let mut any = false;
        for source in self.sources.iter_mut() {
            let more = match j {
                Some(j) => {
                    source.seek_col(j)?;
                    true
                }
                None => source.next_col()?,
            };
            any |= more;
        }
        self.active = 0;
        Ok(any)
    }
}

impl<T: MatrixValue> MatrixSource for ConcatRows<'_, T> {
    type Value = T;

    fn next_col(&mut self) -> Result<bool> {
        let next = self.col.map(|c| c + 1).unwrap_or(0);
        if next as usize >= self.cols {
            return Ok(false);
        }
        if !self.advance_all(None)? {
            return Ok(false);
        }
        self.col = Some(next);
        Ok(true)
    }

    fn current_col(&self) -> u32 {
        self.col.unwrap_or(0)
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<T>>> {
        while self.active < self.sources.len() {
            match self.sources[self.active].next_value()? {
                Some(entry) => {
                    return Ok(Some(MatrixEntry {
                        row: entry.row + self.offsets[self.active],
                        value: entry.value,
                    }))
                }
                None => self.active += 1,
            }
        }
        Ok(None)
    }

    fn rows(&self) -> Option<usize> {
        Some(self.rows)
    }

    fn cols(&self) -> Option<usize> {
        Some(self.cols)
    }

    fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    fn col_names(&self) -> Option<&[String]> {
        self.col_names.as_deref()
    }

    fn seekable(&self) -> bool {
        self.sources.iter().all(|s| s.seekable())
    }

    fn seek_col(&mut self, j: u32) -> Result<()> {
        if j as usize >= self.cols {
            return Err(Error::Shape(format!(
                "column {j} out of range for {} columns",
                self.cols
            )));
        }
        self.advance_all(Some(j))?;
        self.col = Some(j);
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        for source in self.sources.iter_mut() {
            source.restart()?;
        }
        self.active = 0;
        self.col = None;
        Ok(())
    }
}

/// Concatenate sources sharing a row space along the column axis.
pub struct ConcatCols<'a, T: MatrixValue> {
    sources: Vec<&'a mut dyn MatrixSource<Value = T>>,
    col_offsets: Vec<u32>,
    rows: usize,
    cols: usize,
    row_names: Option<Vec<String>>,
    col_names: Option<Vec<String>>,
    active: usize,
    col: Option<u32>,
}

impl<'a, T: MatrixValue> ConcatCols<'a, T> {
    pub fn new(sources: Vec<&'a mut dyn MatrixSource<Value = T>>) -> Result<ConcatCols<'a, T>> {
        if sources.is_empty() {
            return Err(Error::Shape("no sources to concatenate".to_string()));
        }
        let rows = sources[0]
            .rows()
            .ok_or_else(|| Error::Shape("source row count unknown".to_string()))?;
        let mut row_names: Option<Vec<String>> = None;
        let mut col_offsets = Vec::with_capacity(sources.len());
        let mut cols = 0usize;
        let mut col_names: Option<Vec<String>> = Some(Vec::new());
        for (k, source) in sources.iter().enumerate() {
            if source.rows() != Some(rows) {
                return Err(Error::Shape(format!(
                    "source {k} has {:?} rows, expected {rows}",
                    source.rows()
                )));
            }
            if !names_agree(&row_names, source.row_names()) {
                return Err(Error::Shape(format!("source {k} carries different row names")));
            }
            if row_names.is_none() {
                row_names = source.row_names().map(<[String]>::to_vec);
            }
            col_offsets.push(cols as u32);
            let source_cols = source
                .cols()
                .ok_or_else(|| Error::Shape(format!("source {k} column count unknown")))?;
            cols += source_cols;
            col_names = match (col_names, source.col_names()) {
                (Some(mut acc), Some(names)) => {
                    acc.extend_from_slice(names);
                    Some(acc)
                }
                _ => None,
            };
        }
        Ok(ConcatCols {
            sources,
            col_offsets,
            rows,
            cols,
            row_names,
            col_names,
            active: 0,
            col: None,
        })
    }
}

impl<T: MatrixValue> MatrixSource for ConcatCols<'_, T> {
    type Value = T;

    fn next_col(&mut self) -> Result<bool> {
        while self.active < self.sources.len() {
            if self.sources[self.active].next_col()? {
                self.col =
                    Some(self.col_offsets[self.active] + self.sources[self.active].current_col());
                return Ok(true);
            }
            self.active += 1;
        }
        Ok(false)
    }

    fn current_col(&self) -> u32 {
        self.col.unwrap_or(0)
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<T>>> {
        if self.active >= self.sources.len() {
            return Ok(None);
        }
        self.sources[self.active].next_value()
    }

    fn rows(&self) -> Option<usize> {
        Some(self.rows)
    }

    fn cols(&self) -> Option<usize> {
        Some(self.cols)
    }

    fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    fn col_names(&self) -> Option<&[String]> {
        self.col_names.as_deref()
    }

    fn seekable(&self) -> bool {
        self.sources.iter().all(|s| s.seekable())
    }

    /// Seek into the owning source; later sources are restarted so that a
    /// forward iteration continues from their first column.
    fn seek_col(&mut self, j: u32) -> Result<()> {
        if j as usize >= self.cols {
            return Err(Error::Shape(format!(
                "column {j} out of range for {} columns",
                self.cols
            )));
        }
        let target = self
            .col_offsets
            .partition_point(|&offset| offset <= j)
            .saturating_sub(1);
        self.sources[target].seek_col(j - self.col_offsets[target])?;
        for source in self.sources[target + 1..].iter_mut() {
            source.restart()?;
        }
        self.active = target;
        self.col = Some(j);
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        for source in self.sources.iter_mut() {
            source.restart()?;
        }
        self.active = 0;
        self.col = None;
        Ok(())
    }
}
