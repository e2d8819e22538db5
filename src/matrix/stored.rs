//! Sparse matrix storage over a backing store.
//!
//! Unpacked layout (`unpacked-matrix-v1`): `indices` (u32 row ids),
//! `data` (u32 or f32 values), `indptr` (u64, cols + 1), `shape`
//! (u32 `[rows, cols]`), plus optional `row_names`/`col_names` string
//! tables.
//!
//! Packed layout (`packed-matrix-v1`, u32 values): row ids delta-coded as
//! `row_data`/`row_idx`/`row_starts`, values raw bit-packed as
//! `val_data`/`val_idx`, and the column pointers delta-coded as
//! `col_ptr_data`/`col_ptr_idx`/`col_ptr_starts`.

use crate::backing::{ArrayRead, ArrayWrite, ByteStore, Scalar};
use crate::consts::{INTERRUPT_STRIDE, PACKED_MATRIX_VERSION, UNPACKED_MATRIX_VERSION};
use crate::errors::{Error, Result};
use crate::packing::{PackedReader, PackedWriter, Packing};

use super::{MatrixEntry, MatrixSource, MatrixValue};

/// Reader over a stored CSC matrix.
pub struct StoredMatrix<T: Scalar + MatrixValue> {
    indices: Box<dyn ArrayRead<u32>>,
    data: Box<dyn ArrayRead<T>>,
    indptr: Box<dyn ArrayRead<u64>>,
    rows: usize,
    cols: usize,
    row_names: Option<Vec<String>>,
    col_names: Option<Vec<String>>,
    col: Option<u32>,
    pos: u64,
    col_end: u64,
    last_row: i64,
}

fn read_shape(store: &impl ByteStore) -> Result<(usize, usize)> {
    let shape = store.reader::<u32>("shape")?.read_all()?;
    if shape.len() != 2 {
        return Err(Error::Parse(format!(
            "shape holds {} entries, expected [rows, cols]",
            shape.len()
        )));
    }
    Ok((shape[0] as usize, shape[1] as usize))
}

fn read_names(store: &impl ByteStore, name: &str) -> Result<Option<Vec<String>>> {
    if store.has(name) {
        Ok(Some(store.read_str_array(name)?))
    } else {
        Ok(None)
    }
}

impl<T: Scalar + MatrixValue> StoredMatrix<T> {
    pub fn open_unpacked(store: &impl ByteStore) -> Result<StoredMatrix<T>> {
        crate::backing::check_version(store, UNPACKED_MATRIX_VERSION)?;
        let (rows, cols) = read_shape(store)?;
        let indptr = store.reader::<u64>("indptr")?;
        if indptr.len() != cols as u64 + 1 {
            return Err(Error::Parse(format!(
                "indptr holds {} entries for {cols} columns",
                indptr.len()
            )));
        }
        StoredMatrix::assemble(
            store,
            store.reader::<u32>("indices")?,
            store.reader::<T>("data")?,
            indptr,
            rows,
            cols,
        )
    }

    fn assemble(
        store: &impl ByteStore,
        indices: Box<dyn ArrayRead<u32>>,
        data: Box<dyn ArrayRead<T>>,
        indptr: Box<dyn ArrayRead<u64>>,
        rows: usize,
        cols: usize,
    ) -> Result<StoredMatrix<T>> {
        Ok(StoredMatrix {
            indices,
            data,
            indptr,
            rows,
            cols,
            row_names: read_names(store, "row_names")?,
            col_names: read_names(store, "col_names")?,
            col: None,
            pos: 0,
            col_end: 0,
            last_row: -1,
        })
    }

    fn enter_col(&mut self, j: u32) -> Result<()> {
        self.pos = self.indptr.read_one_at(j as u64)?;
        self.col_end = self.indptr.read_one()?;
        if self.col_end < self.pos {
            return Err(Error::Parse(format!("indptr decreases at column {j}")));
        }
        self.indices.seek(self.pos)?;
        self.data.seek(self.pos)?;
        self.col = Some(j);
        self.last_row = -1;
        Ok(())
    }
}

impl StoredMatrix<u32> {
    pub fn open_packed(store: &impl ByteStore) -> Result<StoredMatrix<u32>> {
        crate::backing::check_version(store, PACKED_MATRIX_VERSION)?;
        let (rows, cols) = read_shape(store)?;
        let mut indptr = PackedReader::open(store, "col_ptr", Packing::Delta, cols as u64 + 1)?;
        let nnz = indptr.read_one_at(cols as u64)? as u64;
        StoredMatrix::assemble(
            store,
            Box::new(PackedReader::open(store, "row", Packing::Delta, nnz)?),
            Box::new(PackedReader::open(store, "val", Packing::Raw, nnz)?),
            Box::new(WidenU64 {
                inner: Box::new(indptr),
            }),
            rows,
            cols,
        )
    }
}

impl<T: Scalar + MatrixValue> MatrixSource for StoredMatrix<T> {
    type Value = T;

    fn next_col(&mut self) -> Result<bool> {
        let next = self.col.map(|c| c + 1).unwrap_or(0);
        if next as usize >= self.cols {
            return Ok(false);
        }
        self.enter_col(next)?;
        Ok(true)
    }

    fn current_col(&self) -> u32 {
        self.col.unwrap_or(0)
    }

    fn next_value(&mut self) -> Result<Option<MatrixEntry<T>>> {
        if self.pos >= self.col_end {
            return Ok(None);
        }
        let row = self.indices.read_one()?;
        let value = self.data.read_one()?;
        self.pos += 1;
        if (row as i64) <= self.last_row {
            return Err(Error::Sort(format!(
                "stored rows out of order in column {}: {row} follows {}",
                self.current_col(),
                self.last_row
            )));
        }
        self.last_row = row as i64;
        Ok(Some(MatrixEntry { row, value }))
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
        true
    }

    fn seek_col(&mut self, j: u32) -> Result<()> {
        if j as usize >= self.cols {
            return Err(Error::Shape(format!(
                "column {j} out of range for {} columns",
                self.cols
            )));
        }
        self.enter_col(j)
    }

    fn restart(&mut self) -> Result<()> {
        self.col = None;
        self.pos = 0;
        self.col_end = 0;
        self.last_row = -1;
        Ok(())
    }
}

/// `u64` view over a packed `u32` dataset (column pointers).
struct WidenU64 {
    inner: Box<dyn ArrayRead<u32>>,
}

impl ArrayRead<u64> for WidenU64 {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn pos(&self) -> u64 {
        self.inner.pos()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(pos)
    }

    fn read(&mut self, out: &mut [u64]) -> Result<usize> {
        let mut buf = vec![0u32; out.len()];
        let n = self.inner.read(&mut buf)?;
        for (slot, &v) in out.iter_mut().zip(buf.iter()).take(n) {
            *slot = v as u64;
        }
        Ok(n)
    }
}

/// Checked `u64` writer over a packed `u32` dataset.
struct NarrowU64 {
    inner: Box<dyn ArrayWrite<u32>>,
}

impl ArrayWrite<u64> for NarrowU64 {
    fn push(&mut self, v: u64) -> Result<()> {
        let v = u32::try_from(v).map_err(|_| {
            Error::Shape(format!("packed matrices hold at most {} entries", u32::MAX))
        })?;
        self.inner.push(v)
    }

    fn extend(&mut self, vals: &[u64]) -> Result<()> {
        for &v in vals {
            self.push(v)?;
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        self.inner.finalize()
    }
}

struct MatrixSink<T> {
    indices: Box<dyn ArrayWrite<u32>>,
    data: Box<dyn ArrayWrite<T>>,
    indptr: Box<dyn ArrayWrite<u64>>,
}

/// Stream `source` into `store` in the unpacked layout. Returns the
/// number of stored entries.
pub fn write_matrix<T: Scalar + MatrixValue>(
    source: &mut (impl MatrixSource<Value = T> + ?Sized),
    store: &impl ByteStore,
    interrupt: Option<&mut dyn FnMut() -> bool>,
) -> Result<u64> {
    let sink = MatrixSink {
        indices: store.writer::<u32>("indices")?,
        data: store.writer::<T>("data")?,
        indptr: store.writer::<u64>("indptr")?,
    };
    write_into(source, store, sink, UNPACKED_MATRIX_VERSION, interrupt)
}

/// Stream `source` into `store` in the packed layout.
pub fn write_matrix_packed(
    source: &mut (impl MatrixSource<Value = u32> + ?Sized),
    store: &impl ByteStore,
    interrupt: Option<&mut dyn FnMut() -> bool>,
) -> Result<u64> {
    let sink = MatrixSink {
        indices: Box::new(PackedWriter::create(store, "row", Packing::Delta)?),
        data: Box::new(PackedWriter::create(store, "val", Packing::Raw)?),
        indptr: Box::new(NarrowU64 {
            inner: Box::new(PackedWriter::create(store, "col_ptr", Packing::Delta)?),
        }),
    };
    write_into(source, store, sink, PACKED_MATRIX_VERSION, interrupt)
}

fn write_into<T: Scalar + MatrixValue>(
    source: &mut (impl MatrixSource<Value = T> + ?Sized),
    store: &impl ByteStore,
    mut sink: MatrixSink<T>,
    version: &str,
    mut interrupt: Option<&mut dyn FnMut() -> bool>,
) -> Result<u64> {
    let mut nnz: u64 = 0;
    let mut written_cols: u32 = 0;
    let mut max_row: i64 = -1;
    sink.indptr.push(0)?;

    while source.next_col()? {
        // Account for sources that skip empty columns.
        while written_cols < source.current_col() {
            sink.indptr.push(nnz)?;
            written_cols += 1;
        }
        let mut last_row: i64 = -1;
        while let Some(MatrixEntry { row, value }) = source.next_value()? {
            if (row as i64) <= last_row {
                return Err(Error::Sort(format!(
                    "rows out of order in column {}: {row} follows {last_row}",
                    source.current_col()
                )));
            }
            last_row = row as i64;
            max_row = max_row.max(row as i64);
            sink.indices.push(row)?;
            sink.data.push(value)?;
            nnz += 1;
            if nnz % INTERRUPT_STRIDE as u64 == 0 {
                if let Some(check) = interrupt.as_mut() {
                    if check() {
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
        sink.indptr.push(nnz)?;
        written_cols += 1;
    }

    let cols = source.cols().unwrap_or(written_cols as usize);
    while (written_cols as usize) < cols {
        sink.indptr.push(nnz)?;
        written_cols += 1;
    }
    let rows = source.rows().unwrap_or((max_row + 1) as usize);

    sink.indices.finalize()?;
    sink.data.finalize()?;
    sink.indptr.finalize()?;

    let mut shape = store.writer::<u32>("shape")?;
    shape.extend(&[rows as u32, cols as u32])?;
    shape.finalize()?;
    if let Some(names) = source.row_names() {
        store.write_str_array("row_names", names)?;
    }
    if let Some(names) = source.col_names() {
        store.write_str_array("col_names", names)?;
    }
    store.set_version(version)?;
    Ok(nnz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::{DirStore, MemStore};
    use crate::matrix::{matrix_identical, CscMatrix};
    use pretty_assertions::assert_eq;
    use rand::prelude::*;
    use rstest::*;

    /// Random sparse matrix in the style of the reference fixtures:
    /// roughly 1-in-5 entries non-zero, values in [1, 20].
    fn generate(rows: usize, cols: usize, seed: u64) -> CscMatrix<u32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dense: Vec<Vec<u32>> = (0..rows)
            .map(|_| {
                (0..cols)
                    .map(|_| {
                        if rng.gen_range(0..5) == 0 {
                            rng.gen_range(1..=20)
                        } else {
                            0
                        }
                    })
                    .collect()
            })
            .collect();
        CscMatrix::from_dense(&dense)
    }

    #[rstest]
    fn unpacked_roundtrip_mem() {
        let mat = generate(10, 10, 125124)
            .with_names(
                Some((0..10).map(|i| format!("r{i}")).collect()),
                Some((0..10).map(|j| format!("c{j}")).collect()),
            )
            .unwrap();
        let store = MemStore::new();
        write_matrix(&mut mat.iter(), &store, None).unwrap();
        assert_eq!(store.version().unwrap(), "unpacked-matrix-v1");

        let mut reread = StoredMatrix::<u32>::open_unpacked(&store).unwrap();
        assert_eq!(reread.row_names().unwrap()[3], "r3");
        assert!(matrix_identical(&mut mat.iter(), &mut reread).unwrap());
    }

    #[rstest]
    fn unpacked_roundtrip_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mat = generate(20, 7, 7345);
        let store = DirStore::create(tmp.path().join("mat")).unwrap();
        write_matrix(&mut mat.iter(), &store, None).unwrap();

        let reopened = DirStore::open(tmp.path().join("mat")).unwrap();
        let mut reread = StoredMatrix::<u32>::open_unpacked(&reopened).unwrap();
        assert!(matrix_identical(&mut mat.iter(), &mut reread).unwrap());
    }

    #[rstest]
    fn float_values_roundtrip() {
        let dense: Vec<Vec<f32>> = (0..4)
            .map(|i| (0..3).map(|j| (i * 3 + j) as f32 / 2.0).collect())
            .collect();
        let mat = CscMatrix::from_dense(&dense);
        let store = MemStore::new();
        write_matrix(&mut mat.iter(), &store, None).unwrap();
        let mut reread = StoredMatrix::<f32>::open_unpacked(&store).unwrap();
        assert!(matrix_identical(&mut mat.iter(), &mut reread).unwrap());
    }

    #[rstest]
    fn packed_unpacked_cross_roundtrip() {
        // 1024 x 256 at sparsity 0.2, values in [1, 20].
        let mat = generate(1024, 256, 92568);
        let unpacked = MemStore::new();
        write_matrix(&mut mat.iter(), &unpacked, None).unwrap();

        let packed = MemStore::new();
        let mut from_unpacked = StoredMatrix::<u32>::open_unpacked(&unpacked).unwrap();
        write_matrix_packed(&mut from_unpacked, &packed, None).unwrap();
        assert_eq!(packed.version().unwrap(), "packed-matrix-v1");

        let mut reread = StoredMatrix::<u32>::open_packed(&packed).unwrap();
        assert!(matrix_identical(&mut mat.iter(), &mut reread).unwrap());

        // Packed back out to unpacked is bit-for-bit identical.
        let unpacked2 = MemStore::new();
        reread.restart().unwrap();
        write_matrix(&mut reread, &unpacked2, None).unwrap();
        assert_eq!(
            unpacked.reader::<u32>("indices").unwrap().read_all().unwrap(),
            unpacked2.reader::<u32>("indices").unwrap().read_all().unwrap()
        );
        assert_eq!(
            unpacked.reader::<u32>("data").unwrap().read_all().unwrap(),
            unpacked2.reader::<u32>("data").unwrap().read_all().unwrap()
        );
        assert_eq!(
            unpacked.reader::<u64>("indptr").unwrap().read_all().unwrap(),
            unpacked2.reader::<u64>("indptr").unwrap().read_all().unwrap()
        );
    }

    #[rstest]
    #[case::unpacked(false)]
    #[case::packed(true)]
    fn seek_visits_the_same_entries(#[case] packed: bool) {
        // Column j starts with value j+1 at row j+1 (shifted so nothing
        // is dropped as zero).
        let mut dense = vec![vec![0u32; 5]; 6];
        for j in 0..5usize {
            for i in (j + 1)..6 {
                dense[i][j] = j as u32 + 1;
            }
        }
        let mat = CscMatrix::from_dense(&dense);
        let store = MemStore::new();
        if packed {
            write_matrix_packed(&mut mat.iter(), &store, None).unwrap();
        } else {
            write_matrix(&mut mat.iter(), &store, None).unwrap();
        }
        let mut reread = if packed {
            StoredMatrix::<u32>::open_packed(&store).unwrap()
        } else {
            StoredMatrix::<u32>::open_unpacked(&store).unwrap()
        };

        for j in [4u32, 1, 3, 0, 2] {
            reread.seek_col(j).unwrap();
            assert_eq!(reread.current_col(), j);
            let e = reread.next_value().unwrap().unwrap();
            assert_eq!(e.row, j + 1);
            assert_eq!(e.value, j + 1);
        }
    }

    #[rstest]
    fn unknown_version_is_rejected() {
        let store = MemStore::new();
        let mat = generate(5, 5, 1);
        write_matrix(&mut mat.iter(), &store, None).unwrap();
        assert!(StoredMatrix::<u32>::open_packed(&store).is_err());
    }

    #[rstest]
    fn type_mismatch_on_open() {
        let store = MemStore::new();
        let mat = generate(5, 5, 2);
        write_matrix(&mut mat.iter(), &store, None).unwrap();
        assert!(matches!(
            StoredMatrix::<f32>::open_unpacked(&store),
            Err(crate::errors::Error::Type { .. })
        ));
    }
}
