//! 10x Genomics HDF5 feature-barcode matrix reader.

use crate::errors::{Error, Result};
use crate::matrix::CscMatrix;

use super::{narrow_indices, read_str_dataset, read_u64_dataset};

/// Read a 10x Genomics matrix file into an owned CSC matrix (features as
/// rows, barcodes as columns).
///
/// Modern files keep everything under `/matrix` with feature metadata in
/// `/matrix/features`; older single-genome files use one top-level group
/// holding `genes`/`gene_names` instead.
pub fn read_10x_matrix(path: impl AsRef<std::path::Path>) -> Result<CscMatrix<u32>> {
    let file = hdf5::File::open(path)?;

    if file.link_exists("matrix") {
        let group = file.group("matrix")?;
        let features = group.group("features")?;
        let row_names = read_str_dataset(&features, "id")?;
        let col_names = read_str_dataset(&group, "barcodes")?;
        return assemble(&group, row_names, col_names);
    }

    // Legacy layout: the first group holding a `data` dataset is the
    // single-genome matrix.
    for name in file.member_names()? {
        let Ok(group) = file.group(&name) else {
            continue;
        };
        if !group.link_exists("data") {
            continue;
        }
        let row_names = read_str_dataset(&group, "genes")?;
        let col_names = read_str_dataset(&group, "barcodes")?;
        return assemble(&group, row_names, col_names);
    }
    Err(Error::Parse(
        "no /matrix group and no legacy single-genome group found".to_string(),
    ))
}

fn assemble(
    group: &hdf5::Group,
    row_names: Vec<String>,
    col_names: Vec<String>,
) -> Result<CscMatrix<u32>> {
    let shape = read_u64_dataset(group, "shape")?;
    if shape.len() != 2 {
        return Err(Error::Parse(format!(
            "shape holds {} entries, expected [rows, cols]",
            shape.len()
        )));
    }
    let (rows, cols) = (shape[0] as usize, shape[1] as usize);
    let data = group
        .dataset("data")
        .map_err(|_| Error::NotFound("data".to_string()))?
        .read_raw::<u32>()?;
    let indices = narrow_indices("indices", read_u64_dataset(group, "indices")?)?;
    let indptr = read_u64_dataset(group, "indptr")?;
    CscMatrix::from_parts(rows, cols, indptr, indices, data)?
        .with_names(Some(row_names), Some(col_names))
}
