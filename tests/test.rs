use std::io::Write;
use std::path::PathBuf;

use rstest::*;

use fragmat::backing::{DirStore, MemStore};
use fragmat::counting::{PeakMatrix, TileMatrix};
use fragmat::fragments::{
    import_fragment_file, BedFragments, BedFragmentsWriter, FragmentChunk, Fragments,
    StoredFragments,
};
use fragmat::matrix::{
    matrix_identical, write_matrix, write_matrix_packed, ConcatCols, ConcatRows, CscMatrix,
    MatrixConverter, RowSelect, StoredMatrix,
};

#[fixture]
fn workdir() -> tempfile::TempDir {
    tempfile::TempDir::new().unwrap()
}

/// Two chromosomes, three cells, gzip-compressed, with a comment header.
fn write_toy_bed(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("fragments.tsv.gz");
    let mut enc = flate2::write::GzEncoder::new(
        std::fs::File::create(&path).unwrap(),
        flate2::Compression::default(),
    );
    let mut body = String::from("# sorted fragment fixture\n");
    for j in 0..40u32 {
        body.push_str(&format!("chr1\t{}\t{}\tCELL{}\n", 10 + j, 100 + 2 * j, j % 3));
    }
    for j in 0..10u32 {
        body.push_str(&format!("chr2\t{}\t{}\tCELL{}\n", 5 * j, 5 * j + 9, j % 3));
    }
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
    path
}

fn drain_fragments(frags: &mut impl Fragments) -> Vec<(u32, u32, u32, u32)> {
    let mut out = Vec::new();
    let mut chunk = FragmentChunk::with_capacity(32);
    while frags.next_chr().unwrap() {
        let chr = frags.current_chr();
        while frags.load(&mut chunk).unwrap() > 0 {
            for i in 0..chunk.len() {
                out.push((chr, chunk.start[i], chunk.end[i], chunk.cell[i]));
            }
        }
    }
    out
}

#[rstest]
fn bed_to_store_to_bed(workdir: tempfile::TempDir) {
    let bed = write_toy_bed(&workdir);

    // Import packed onto disk.
    let store = DirStore::create(workdir.path().join("frags")).unwrap();
    assert_eq!(import_fragment_file(&bed, &store, true, false).unwrap(), 50);

    // Fragments survive a disk round-trip.
    let mut original = BedFragments::open(&bed).unwrap();
    let reopened = DirStore::open(workdir.path().join("frags")).unwrap();
    let mut stored = StoredFragments::open_packed(&reopened).unwrap();
    assert_eq!(drain_fragments(&mut stored), drain_fragments(&mut original));

    // And back out to text.
    let out_path = workdir.path().join("roundtrip.tsv.gz");
    stored.restart().unwrap();
    BedFragmentsWriter::new(&out_path, false)
        .write(&mut stored, None)
        .unwrap();
    let mut rewritten = BedFragments::open(&out_path).unwrap();
    original.restart().unwrap();
    assert_eq!(
        drain_fragments(&mut rewritten),
        drain_fragments(&mut original)
    );
}

#[rstest]
fn bed_to_peak_matrix_pipeline(workdir: tempfile::TempDir) {
    let bed = write_toy_bed(&workdir);
    let store = MemStore::new();
    import_fragment_file(&bed, &store, false, false).unwrap();

    let frags = StoredFragments::open_unpacked(&store).unwrap();
    let names = vec!["chr1".to_string(), "chr2".to_string()];
    // chr1 peak covering starts 10..30; chr2 peak covering 0..14.
    let mut peaks = PeakMatrix::new(frags, &[0, 1], &[10, 0], &[30, 14], &names).unwrap();

    let mat_store = MemStore::new();
    write_matrix(&mut peaks, &mat_store, None).unwrap();
    let mut stored_mat = StoredMatrix::<u32>::open_unpacked(&mat_store).unwrap();
    let mat = CscMatrix::from_source(&mut stored_mat).unwrap();
    assert_eq!(mat.rows(), 3);
    assert_eq!(mat.cols(), 2);

    // Count the toy fixture by hand: chr1 starts 10+j for j in 0..40,
    // starts 10..30 are j in 0..20, cell j % 3; ends 100+2j never land
    // inside the peak.
    let mut expected = vec![vec![0u32; 2]; 3];
    for j in 0..20u32 {
        expected[(j % 3) as usize][0] += 1;
    }
    // chr2: fragment j has insertion points 5j and 5j+8.
    for j in 0..10u32 {
        for x in [5 * j, 5 * j + 8] {
            if x < 14 {
                expected[(j % 3) as usize][1] += 1;
            }
        }
    }
    assert_eq!(mat.to_dense(), expected);
    assert_eq!(mat.row_names().unwrap(), ["CELL0", "CELL1", "CELL2"]);
}

#[rstest]
fn tile_matrix_through_packed_store(workdir: tempfile::TempDir) {
    let bed = write_toy_bed(&workdir);
    let store = MemStore::new();
    import_fragment_file(&bed, &store, true, false).unwrap();

    let frags = StoredFragments::open_packed(&store).unwrap();
    let names = vec!["chr1".to_string(), "chr2".to_string()];
    let tiles = TileMatrix::new(frags, &[1], &[0], &[50], &[10], &names).unwrap();

    // Convert to f32 on the fly and store.
    let mut floats = MatrixConverter::<f32, _>::new(tiles);
    let mat_store = MemStore::new();
    write_matrix(&mut floats, &mat_store, None).unwrap();

    let mut reread = StoredMatrix::<f32>::open_unpacked(&mat_store).unwrap();
    let mat = CscMatrix::from_source(&mut reread).unwrap();
    assert_eq!(mat.cols(), 5);

    // chr2 fragment j covers insertion points 5j and 5j+8.
    let mut expected = vec![vec![0f32; 5]; 3];
    for j in 0..10u32 {
        for x in [5 * j, 5 * j + 8] {
            if x < 50 {
                expected[(j % 3) as usize][(x / 10) as usize] += 1.0;
            }
        }
    }
    assert_eq!(mat.to_dense(), expected);
}

#[rstest]
fn concat_and_select_compose_over_stores() {
    let mut rows_a: Vec<Vec<u32>> = Vec::new();
    let mut rows_b: Vec<Vec<u32>> = Vec::new();
    for i in 0..6u32 {
        rows_a.push((0..4).map(|j| (i * 4 + j) % 7).collect());
        rows_b.push((0..4).map(|j| (i + j) % 5).collect());
    }
    let a = CscMatrix::from_dense(&rows_a);
    let b = CscMatrix::from_dense(&rows_b);

    let store_a = MemStore::new();
    let store_b = MemStore::new();
    write_matrix_packed(&mut a.iter(), &store_a, None).unwrap();
    write_matrix_packed(&mut b.iter(), &store_b, None).unwrap();

    let mut ra = StoredMatrix::<u32>::open_packed(&store_a).unwrap();
    let mut rb = StoredMatrix::<u32>::open_packed(&store_b).unwrap();

    // Row-stack, then pick rows crossing the seam.
    let concat = ConcatRows::new(vec![&mut ra, &mut rb]).unwrap();
    let mut select = RowSelect::new(concat, vec![11, 0, 6]).unwrap();
    let picked = CscMatrix::from_source(&mut select).unwrap();

    let expected = vec![
        rows_b[5].clone(),
        rows_a[0].clone(),
        rows_b[0].clone(),
    ];
    assert_eq!(picked.to_dense(), expected);

    // Column concatenation across the two stores.
    let mut ra = StoredMatrix::<u32>::open_packed(&store_a).unwrap();
    let mut rb = StoredMatrix::<u32>::open_packed(&store_b).unwrap();
    let mut concat = ConcatCols::new(vec![&mut ra, &mut rb]).unwrap();
    let wide = CscMatrix::from_source(&mut concat).unwrap();
    let expected: Vec<Vec<u32>> = (0..6usize)
        .map(|i| {
            let mut row = rows_a[i].clone();
            row.extend_from_slice(&rows_b[i]);
            row
        })
        .collect();
    assert_eq!(wide.to_dense(), expected);
}

#[rstest]
fn converter_roundtrip_through_disk(workdir: tempfile::TempDir) {
    let dense: Vec<Vec<u32>> = (0..8)
        .map(|i| {
            (0..6)
                .map(|j| if (i + j) % 3 == 0 { i * 6 + j } else { 0 })
                .collect()
        })
        .collect();
    let mat = CscMatrix::from_dense(&dense);

    let store = DirStore::create(workdir.path().join("m")).unwrap();
    let mut as_f64 = MatrixConverter::<f64, _>::new(mat.iter());
    let mut back_to_u32 = MatrixConverter::<u32, _>::new(&mut as_f64);
    write_matrix(&mut back_to_u32, &store, None).unwrap();

    let mut reread = StoredMatrix::<u32>::open_unpacked(&store).unwrap();
    assert!(matrix_identical(&mut mat.iter(), &mut reread).unwrap());
}

#[rstest]
fn write_to_used_store_conflicts(workdir: tempfile::TempDir) {
    let bed = write_toy_bed(&workdir);
    let store = MemStore::new();
    import_fragment_file(&bed, &store, false, false).unwrap();
    assert!(matches!(
        import_fragment_file(&bed, &store, false, false),
        Err(fragmat::Error::Conflict(_))
    ));

    DirStore::create(workdir.path().join("g")).unwrap();
    std::fs::write(workdir.path().join("g").join("marker"), b"x").unwrap();
    assert!(matches!(
        DirStore::create(workdir.path().join("g")),
        Err(fragmat::Error::Conflict(_))
    ));
}
