//! AnnData sparse matrix group reader.

use hdf5::types::VarLenUnicode;

use crate::backing::Scalar;
use crate::errors::{Error, Result};
use crate::matrix::{CscMatrix, MatrixValue};

use super::{narrow_indices, read_u64_dataset};

enum SparseFormat {
    Csr,
    Csc,
}

/// Read an AnnData sparse matrix group into an owned CSC matrix.
///
/// Modern groups carry `encoding-type` (`csr_matrix` or `csc_matrix`) and
/// `shape` attributes; legacy groups use `h5sparse_format` and
/// `h5sparse_shape`. CSR input is exposed as the CSC of its transpose:
/// the arrays are taken as-is and only the axes swap, so no data is
/// rewritten.
pub fn read_anndata_matrix<T: Scalar + MatrixValue>(
    path: impl AsRef<std::path::Path>,
    group_path: &str,
) -> Result<CscMatrix<T>> {
    let file = hdf5::File::open(path)?;
    let group = file
        .group(group_path)
        .map_err(|_| Error::NotFound(group_path.to_string()))?;

    let (format, shape) = sparse_layout(&group)?;
    if shape.len() != 2 {
        return Err(Error::Parse(format!(
            "sparse shape holds {} entries, expected two",
            shape.len()
        )));
    }

    let data = {
        let ds = group
            .dataset("data")
            .map_err(|_| Error::NotFound("data".to_string()))?;
        let n = ds.size();
        T::h5_read(&ds, 0, n)?
    };
    let indices = narrow_indices("indices", read_u64_dataset(&group, "indices")?)?;
    let indptr = read_u64_dataset(&group, "indptr")?;

    // A CSR matrix read verbatim is the CSC form of its transpose.
    let (rows, cols) = match format {
        SparseFormat::Csc => (shape[0] as usize, shape[1] as usize),
        SparseFormat::Csr => (shape[1] as usize, shape[0] as usize),
    };
    CscMatrix::from_parts(rows, cols, indptr, indices, data)
}

fn sparse_layout(group: &hdf5::Group) -> Result<(SparseFormat, Vec<u64>)> {
    let (format_attr, shape_attr) = if group.attr("encoding-type").is_ok() {
        ("encoding-type", "shape")
    } else if group.attr("h5sparse_format").is_ok() {
        ("h5sparse_format", "h5sparse_shape")
    } else {
        return Err(Error::Parse(
            "group carries neither AnnData nor h5sparse attributes".to_string(),
        ));
    };

    let format = group
        .attr(format_attr)?
        .read_scalar::<VarLenUnicode>()?
        .to_string();
    let format = match format.as_str() {
        "csr_matrix" | "csr" => SparseFormat::Csr,
        "csc_matrix" | "csc" => SparseFormat::Csc,
        other => {
            return Err(Error::Parse(format!(
                "unsupported sparse encoding '{other}'"
            )))
        }
    };
    let shape = group.attr(shape_attr)?.read_raw::<u64>()?;
    Ok((format, shape))
}
