//! Streaming element-type conversion.

use std::marker::PhantomData;

use crate::errors::{Error, Result};

use super::{MatrixEntry, MatrixSource, MatrixValue};

/// Convert matrix values to another element type on the fly.
///
/// Integer/float widenings are lossless; fractional floats truncate
/// toward zero on the way to an integer type, and out-of-range, negative
/// or non-finite values raise a `Type` error.
pub struct MatrixConverter<To, S> {
    source: S,
    _marker: PhantomData<To>,
}

impl<To: MatrixValue, S: MatrixSource> MatrixConverter<To, S> {
    pub fn new(source: S) -> MatrixConverter<To, S> {
        MatrixConverter {
            source,
            _marker: PhantomData,
        }
    }
}

impl<To: MatrixValue, S: MatrixSource> MatrixSource for MatrixConverter<To, S> {
    type Value = To;

    fn next_col(&mut self) -> Result<bool> {
        self.source.next_col()
    }

    fn current_col(&self) -> u32 {
        self.source.current_col()
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<To>>> {
        match self.source.next_value()? {
            Some(entry) => {
                let value: To = num_traits::cast(entry.value).ok_or_else(|| Error::Type {
                    name: format!("value {:?} in column {}", entry.value, self.current_col()),
                    stored: std::any::type_name::<S::Value>(),
                    requested: std::any::type_name::<To>(),
                })?;
                Ok(Some(MatrixEntry {
                    row: entry.row,
                    value,
                }))
            }
            None => Ok(None),
        }
    }

    fn rows(&self) -> Option<usize> {
        self.source.rows()
    }

    fn cols(&self) -> Option<usize> {
        self.source.cols()
    }

    fn row_names(&self) -> Option<&[String]> {
        self.source.row_names()
    }

    fn col_names(&self) -> Option<&[String]> {
        self.source.col_names()
    }

    fn seekable(&self) -> bool {
        self.source.seekable()
    }

    fn seek_col(&mut self, j: u32) -> Result<()> {
        self.source.seek_col(j)
    }

    fn restart(&mut self) -> Result<()> {
        self.source.restart()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{matrix_identical, CscMatrix};
    use pretty_assertions::assert_eq;

    fn toy() -> CscMatrix<u32> {
        let dense: Vec<Vec<u32>> = (0..4)
            .map(|i| (0..3).map(|j| (i as u32 + 1) * (j as u32 + 1)).collect())
            .collect();
        CscMatrix::from_dense(&dense)
    }

    #[test]
    fn u32_through_f64_is_identity() {
        let mat = toy();
        let to_f64 = MatrixConverter::<f64, _>::new(mat.iter());
        let mut back = MatrixConverter::<u32, _>::new(to_f64);
        let out = CscMatrix::from_source(&mut back).unwrap();
        assert_eq!(out, mat);
    }

    #[test]
    fn u32_to_u64_and_f32_are_lossless() {
        let mat = toy();
        let mut wide = MatrixConverter::<u64, _>::new(mat.iter());
        let out = CscMatrix::from_source(&mut wide).unwrap();
        assert_eq!(out.to_dense()[3][2], 12u64);

        let mut floats = MatrixConverter::<f32, _>::new(mat.iter());
        let out = CscMatrix::from_source(&mut floats).unwrap();
        assert_eq!(out.to_dense()[3][2], 12.0f32);
    }

    #[test]
    fn fractional_floats_truncate() {
        let dense = vec![vec![1.5f32, 2.9], vec![0.0, 7.1]];
        let mat = CscMatrix::from_dense(&dense);
        let mut conv = MatrixConverter::<u32, _>::new(mat.iter());
        let out = CscMatrix::from_source(&mut conv).unwrap();
        assert_eq!(out.to_dense(), vec![vec![1u32, 2], vec![0, 7]]);
    }

    #[test]
    fn negative_and_overflowing_values_raise() {
        let dense = vec![vec![-1.0f32]];
        let mat = CscMatrix::from_dense(&dense);
        let mut conv = MatrixConverter::<u32, _>::new(mat.iter());
        conv.next_col().unwrap();
        assert!(matches!(
            conv.next_value(),
            Err(crate::errors::Error::Type { .. })
        ));

        let dense = vec![vec![1.0e12f32]];
        let mat = CscMatrix::from_dense(&dense);
        let mut conv = MatrixConverter::<u32, _>::new(mat.iter());
        conv.next_col().unwrap();
        assert!(matches!(
            conv.next_value(),
            Err(crate::errors::Error::Type { .. })
        ));
    }

    #[test]
    fn converter_preserves_seek_and_restart() {
        let mat = toy();
        let mut conv = MatrixConverter::<f64, _>::new(mat.iter());
        assert!(conv.seekable());
        conv.seek_col(2).unwrap();
        assert_eq!(conv.next_value().unwrap().unwrap().value, 3.0);

        let mut conv2 = MatrixConverter::<f64, _>::new(mat.iter());
        let reference = CscMatrix::from_source(&mut conv2).unwrap();
        assert!(matrix_identical(&mut conv, &mut reference.iter()).unwrap());
    }
}
