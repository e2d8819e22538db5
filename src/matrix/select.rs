//! Row and column selection transforms.

use std::collections::HashMap;

use crate::errors::{Error, Result};

use super::{MatrixEntry, MatrixSource};

/// Reorder, repeat or drop columns of a seekable source.
///
/// Output column `c` is source column `idx[c]`; the selection may repeat
/// columns and need not be sorted.
pub struct ColSelect<S: MatrixSource> {
    source: S,
    idx: Vec<u32>,
    col_names: Option<Vec<String>>,
    col: Option<u32>,
}

impl<S: MatrixSource> ColSelect<S> {
    pub fn new(source: S, idx: Vec<u32>) -> Result<ColSelect<S>> {
        if !source.seekable() {
            return Err(Error::Unsupported(
                "column selection requires a seekable source",
            ));
        }
        if let Some(cols) = source.cols() {
            if let Some(&bad) = idx.iter().find(|&&j| j as usize >= cols) {
                return Err(Error::Shape(format!(
                    "selected column {bad} out of range for {cols} columns"
                )));
            }
        }
        let col_names = source
            .col_names()
            .map(|names| idx.iter().map(|&j| names[j as usize].clone()).collect());
        Ok(ColSelect {
            source,
            idx,
            col_names,
            col: None,
        })
    }
}

impl<S: MatrixSource> MatrixSource for ColSelect<S> {
    type Value = S::Value;

    fn next_col(&mut self) -> Result<bool> {
        let next = self.col.map(|c| c + 1).unwrap_or(0);
        if next as usize >= self.idx.len() {
            return Ok(false);
        }
        self.source.seek_col(self.idx[next as usize])?;
        self.col = Some(next);
        Ok(true)
    }

    fn current_col(&self) -> u32 {
        self.col.unwrap_or(0)
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<S::Value>>> {
        self.source.next_value()
    }

    fn rows(&self) -> Option<usize> {
        self.source.rows()
    }

    fn cols(&self) -> Option<usize> {
        Some(self.idx.len())
    }

    fn row_names(&self) -> Option<&[String]> {
        self.source.row_names()
    }

    fn col_names(&self) -> Option<&[String]> {
        self.col_names.as_deref()
    }

    fn seekable(&self) -> bool {
        true
    }

    fn seek_col(&mut self, j: u32) -> Result<()> {
        if j as usize >= self.idx.len() {
            return Err(Error::Shape(format!(
                "column {j} out of range for {} selected columns",
                self.idx.len()
            )));
        }
        self.source.seek_col(self.idx[j as usize])?;
        self.col = Some(j);
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.col = None;
        Ok(())
    }
}

/// Reorder, repeat or drop rows.
///
/// Output row `r` is source row `idx[r]`. One source column is buffered
/// at a time and re-sorted into the selection order, so the source does
/// not need to be seekable.
pub struct RowSelect<S: MatrixSource> {
    source: S,
    idx: Vec<u32>,
    mapping: HashMap<u32, Vec<u32>>,
    row_names: Option<Vec<String>>,
    buffer: Vec<MatrixEntry<S::Value>>,
    buf_pos: usize,
}

impl<S: MatrixSource> RowSelect<S> {
    pub fn new(source: S, idx: Vec<u32>) -> Result<RowSelect<S>> {
        if let Some(rows) = source.rows() {
            if let Some(&bad) = idx.iter().find(|&&i| i as usize >= rows) {
                return Err(Error::Shape(format!(
                    "selected row {bad} out of range for {rows} rows"
                )));
            }
        }
        let mut mapping: HashMap<u32, Vec<u32>> = HashMap::new();
        for (new, &old) in idx.iter().enumerate() {
            mapping.entry(old).or_default().push(new as u32);
        }
        let row_names = source
            .row_names()
            .map(|names| idx.iter().map(|&i| names[i as usize].clone()).collect());
        Ok(RowSelect {
            source,
            idx,
            mapping,
            row_names,
            buffer: Vec::new(),
            buf_pos: 0,
        })
    }

    fn fill_buffer(&mut self) -> Result<()> {
        self.buffer.clear();
        self.buf_pos = 0;
        while let Some(entry) = self.source.next_value()? {
            if let Some(positions) = self.mapping.get(&entry.row) {
                for &new_row in positions {
                    self.buffer.push(MatrixEntry {
                        row: new_row,
                        value: entry.value,
                    });
                }
            }
        }
        self.buffer.sort_by_key(|e| e.row);
        Ok(())
    }
}

impl<S: MatrixSource> MatrixSource for RowSelect<S> {
    type Value = S::Value;

    fn next_col(&mut self) -> Result<bool> {
        if !self.source.next_col()? {
            return Ok(false);
        }
        self.fill_buffer()?;
        Ok(true)
    }

    fn current_col(&self) -> u32 {
        self.source.current_col()
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<S::Value>>> {
        if self.buf_pos >= self.buffer.len() {
            return Ok(None);
        }
        let entry = self.buffer[self.buf_pos];
        self.buf_pos += 1;
        Ok(Some(entry))
    }

    fn rows(&self) -> Option<usize> {
        Some(self.idx.len())
    }

    fn cols(&self) -> Option<usize> {
        self.source.cols()
    }

    fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    fn col_names(&self) -> Option<&[String]> {
        self.source.col_names()
    }

    fn seekable(&self) -> bool {
        self.source.seekable()
    }

    fn seek_col(&mut self, j: u32) -> Result<()> {
        self.source.seek_col(j)?;
        self.fill_buffer()
    }

    fn restart(&mut self) -> Result<()> {
        self.source.restart()?;
        self.buffer.clear();
        self.buf_pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CscMatrix;
    use pretty_assertions::assert_eq;
    use rstest::*;

    /// M[i][j] = j + 5*i over 6x5.
    #[fixture]
    fn mat() -> CscMatrix<u32> {
        let dense: Vec<Vec<u32>> = (0..6).map(|i| (0..5).map(|j| j + 5 * i).collect()).collect();
        CscMatrix::from_dense(&dense)
    }

    #[rstest]
    fn row_select_preserves_selection_order(mat: CscMatrix<u32>) {
        let dense = mat.to_dense();
        let mut select = RowSelect::new(mat.iter(), vec![0, 4, 2]).unwrap();
        let out = CscMatrix::from_source(&mut select).unwrap();
        let expected: Vec<Vec<u32>> = [0usize, 4, 2].iter().map(|&i| dense[i].clone()).collect();
        assert_eq!(out.to_dense(), expected);

        let mut sorted = RowSelect::new(mat.iter(), vec![0, 2, 4]).unwrap();
        let out = CscMatrix::from_source(&mut sorted).unwrap();
        let expected: Vec<Vec<u32>> = [0usize, 2, 4].iter().map(|&i| dense[i].clone()).collect();
        assert_eq!(out.to_dense(), expected);
    }

    #[rstest]
    fn col_select_with_duplicates(mat: CscMatrix<u32>) {
        let dense = mat.to_dense();
        let mut select = ColSelect::new(mat.iter(), vec![2, 0, 2]).unwrap();
        let out = CscMatrix::from_source(&mut select).unwrap();
        let expected: Vec<Vec<u32>> = dense
            .iter()
            .map(|row| vec![row[2], row[0], row[2]])
            .collect();
        assert_eq!(out.to_dense(), expected);
    }

    #[rstest]
    fn col_select_seeks(mat: CscMatrix<u32>) {
        let selection = vec![0u32, 4, 2];
        let mut select = ColSelect::new(mat.iter(), selection.clone()).unwrap();
        for j in [2u32, 0, 1] {
            select.seek_col(j).unwrap();
            let e = select.next_value().unwrap().unwrap();
            // First non-zero of source column c is row 1 for c == 0.
            let source_col = selection[j as usize];
            if source_col == 0 {
                assert_eq!(e.row, 1);
                assert_eq!(e.value, 5);
            } else {
                assert_eq!(e.row, 0);
                assert_eq!(e.value, source_col);
            }
        }
    }

    #[rstest]
    fn out_of_range_selection_is_rejected(mat: CscMatrix<u32>) {
        assert!(matches!(
            ColSelect::new(mat.iter(), vec![5]),
            Err(crate::errors::Error::Shape(_))
        ));
        assert!(matches!(
            RowSelect::new(mat.iter(), vec![6]),
            Err(crate::errors::Error::Shape(_))
        ));
    }

    #[rstest]
    fn names_follow_the_selection(mat: CscMatrix<u32>) {
        let named = mat
            .with_names(
                Some((0..6).map(|i| format!("r{i}")).collect()),
                Some((0..5).map(|j| format!("c{j}")).collect()),
            )
            .unwrap();
        let select = ColSelect::new(named.iter(), vec![2, 0, 2]).unwrap();
        assert_eq!(select.col_names().unwrap(), ["c2", "c0", "c2"]);
        let select = RowSelect::new(named.iter(), vec![5, 1]).unwrap();
        assert_eq!(select.row_names().unwrap(), ["r5", "r1"]);
    }
}
