//! Read-only importers for third-party HDF5 matrix layouts.

use hdf5::types::{FixedAscii, VarLenUnicode};

use crate::errors::{Error, Result};

mod anndata;
mod tenx;

pub use anndata::read_anndata_matrix;
pub use tenx::read_10x_matrix;

/// Read a string dataset that may be stored variable- or fixed-length.
fn read_str_dataset(group: &hdf5::Group, name: &str) -> Result<Vec<String>> {
    let ds = group
        .dataset(name)
        .map_err(|_| Error::NotFound(name.to_string()))?;
    if let Ok(values) = ds.read_1d::<VarLenUnicode>() {
        return Ok(values.iter().map(|s| s.to_string()).collect());
    }
    let values = ds.read_1d::<FixedAscii<256>>()?;
    Ok(values.iter().map(|s| s.as_str().to_string()).collect())
}

/// Read a numeric dataset as u64, whatever integer width it is stored at.
fn read_u64_dataset(group: &hdf5::Group, name: &str) -> Result<Vec<u64>> {
    let ds = group
        .dataset(name)
        .map_err(|_| Error::NotFound(name.to_string()))?;
    Ok(ds.read_raw::<u64>()?)
}

fn narrow_indices(name: &str, values: Vec<u64>) -> Result<Vec<u32>> {
    values
        .into_iter()
        .map(|v| {
            u32::try_from(v).map_err(|_| {
                Error::Type {
                    name: name.to_string(),
                    stored: "u64",
                    requested: "u32",
                }
            })
        })
        .collect()
}
