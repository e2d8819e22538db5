//! # fragmat: *<small>Streaming fragments and sparse matrices for single-cell genomics.</small>*
//!
//! `fragmat` moves large single-cell datasets through composable,
//! pull-based pipelines: chromosome-ordered streams of genomic fragments
//! on one side, column-ordered streams of sparse count matrices on the
//! other, and chunked, optionally bit-packed columnar storage underneath
//! both.
//!
//! The main pieces:
//!
//! - [`fragments`]: the [`Fragments`](fragments::Fragments) pull
//!   protocol, a gzip fragment-file reader/writer, and durable fragment
//!   storage in unpacked and bit-packed layouts.
//! - [`matrix`]: the [`MatrixSource`](matrix::MatrixSource) pull
//!   protocol, durable CSC storage, and streaming transforms: row/column
//!   selection, row/column concatenation, and element-type conversion.
//! - [`counting`]: [`PeakMatrix`](counting::PeakMatrix) and
//!   [`TileMatrix`](counting::TileMatrix), interval-overlap engines that
//!   turn a fragment stream into a cells-by-intervals count matrix.
//! - [`backing`]: the keyed typed-array store the durable layouts sit
//!   on, with in-memory, directory-of-files and (behind the `hdf5`
//!   feature) HDF5 implementations.
//! - [`packing`]: the chunk-aligned bit-packing codec shared by the
//!   packed layouts.
//!
//! A typical flow reads a sorted fragment file, stores it packed, and
//! derives a peak-by-cell count matrix:
//!
//! ```no_run
//! use fragmat::backing::DirStore;
//! use fragmat::counting::PeakMatrix;
//! use fragmat::fragments::{import_fragment_file, StoredFragments};
//! use fragmat::matrix::write_matrix;
//!
//! # fn main() -> fragmat::Result<()> {
//! let store = DirStore::create("fragments")?;
//! import_fragment_file("fragments.tsv.gz", &store, true, false)?;
//!
//! let frags = StoredFragments::open_packed(&store)?;
//! let names = vec!["chr1".to_string(), "chr2".to_string()];
//! let mut peaks = PeakMatrix::new(frags, &[0, 1], &[100, 5000], &[600, 5600], &names)?;
//!
//! let out = DirStore::create("peak_matrix")?;
//! write_matrix(&mut peaks, &out, None)?;
//! # Ok(())
//! # }
//! ```

pub mod backing;
pub mod consts;
pub mod counting;
pub mod errors;
pub mod fragments;
pub mod matrix;
pub mod packing;

#[cfg(feature = "hdf5")]
pub mod adapters;

pub use errors::{Error, Result};
