//! One-call import of a fragment text file into a backing store.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::backing::ByteStore;
use crate::errors::Result;

use super::{write_fragments, write_fragments_packed, BedFragments};

/// Parse a (possibly gzip'd) fragment file and store it, unpacked or
/// packed. A spinner reports progress on long imports when
/// `show_progress` is set. Returns the number of fragments imported.
pub fn import_fragment_file(
    path: impl AsRef<Path>,
    store: &impl ByteStore,
    packed: bool,
    show_progress: bool,
) -> Result<u64> {
    let mut frags = BedFragments::open(path.as_ref())?;

    let spinner = if show_progress {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message("Importing fragments...");
        Some(spinner)
    } else {
        None
    };

    let mut processed: u64 = 0;
    let mut tick = |spinner: &Option<ProgressBar>| {
        processed += crate::consts::INTERRUPT_STRIDE as u64;
        if let Some(spinner) = spinner {
            spinner.set_message(format!("Imported {processed} fragments"));
            spinner.tick();
        }
        false
    };
    let mut hook = || tick(&spinner);

    let count = if packed {
        write_fragments_packed(&mut frags, store, Some(&mut hook))?
    } else {
        write_fragments(&mut frags, store, Some(&mut hook))?
    };

    if let Some(spinner) = spinner {
        spinner.finish_with_message(format!("Imported {count} fragments"));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::{ByteStore, MemStore};
    use crate::fragments::{FragmentChunk, Fragments, StoredFragments};
    use pretty_assertions::assert_eq;

    #[test]
    fn import_lands_in_the_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("frags.tsv");
        std::fs::write(&path, "chr1\t5\t10\tAAA\nchr1\t6\t12\tBBB\nchr2\t1\t4\tAAA\n").unwrap();

        let store = MemStore::new();
        assert_eq!(import_fragment_file(&path, &store, false, false).unwrap(), 3);
        assert_eq!(store.version().unwrap(), "unpacked-fragments-v1");

        let mut frags = StoredFragments::open_unpacked(&store).unwrap();
        let mut chunk = FragmentChunk::with_capacity(8);
        assert!(frags.next_chr().unwrap());
        assert_eq!(frags.load(&mut chunk).unwrap(), 2);
        assert_eq!(chunk.start, vec![5, 6]);
        assert_eq!(frags.cell_name(1), Some("BBB"));

        let packed = MemStore::new();
        assert_eq!(import_fragment_file(&path, &packed, true, false).unwrap(), 3);
        assert_eq!(packed.version().unwrap(), "packed-fragments-v1");
    }
}
