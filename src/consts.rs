//! Default sizes and storage version tags.

/// Write-side buffer for backing-store files.
pub const DEFAULT_WRITE_BUFFER: usize = 1 << 20;

/// Read-side buffer for backing-store files.
pub const DEFAULT_READ_BUFFER: usize = 64 << 10;

/// Default number of fragments requested per `load` call.
pub const DEFAULT_LOAD_CAPACITY: usize = 1024;

/// How many fragments or matrix entries pass between interrupt checks.
pub const INTERRUPT_STRIDE: usize = 1024;

/// Default comment prefix skipped at the top of fragment text files.
pub const DEFAULT_COMMENT_PREFIX: &str = "#";

pub const UNPACKED_FRAGMENTS_VERSION: &str = "unpacked-fragments-v1";
pub const PACKED_FRAGMENTS_VERSION: &str = "packed-fragments-v1";
pub const UNPACKED_MATRIX_VERSION: &str = "unpacked-matrix-v1";
pub const PACKED_MATRIX_VERSION: &str = "packed-matrix-v1";
