use ndarray as nd;
use proptest::prelude::*;
use smpl_core::codec::vertex_table::{read_vertex_table, write_vertex_table};
use smpl_core::metrics::vertex_compare::{compare, DEFAULT_TOLERANCE, MAX_REPORTED_MISMATCHES};
use smpl_core::SmplError;
use std::io::Write;
use tempfile::NamedTempFile;

fn table_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn matching_files() {
    let a = table_file("0.0 0.0 0.0\n1.0 1.0 1.0\n");
    let b = table_file("0.0 0.0 0.0\n1.0 1.0 1.0\n");
    let cmp = compare(&read_vertex_table(a.path()).unwrap().view(), &read_vertex_table(b.path()).unwrap().view(), DEFAULT_TOLERANCE).unwrap();
    assert_eq!(cmp.report_string("A", "B"), "All vertices match up to 5 decimal places!\n");
}

#[test]
fn one_vertex_off_in_files() {
    let a = table_file("0.0 0.0 0.0\n1.0 1.0 1.0\n");
    let b = table_file("0.0 0.0 0.0\n1.0 1.0 1.1\n");
    let cmp = compare(&read_vertex_table(a.path()).unwrap().view(), &read_vertex_table(b.path()).unwrap().view(), DEFAULT_TOLERANCE).unwrap();
    assert_eq!(cmp.mismatch_count, 1);
    let report = cmp.report_string("A", "B");
    assert!(report.starts_with("Mismatches found at 1 vertices (difference above 1e-5):\n"));
    assert!(report.contains("Vertex 1: A = [1 1 1], B = [1 1 1.1]"));
}

#[test]
fn files_of_different_length() {
    let a = table_file("0 0 0\n1 1 1\n2 2 2\n");
    let b = table_file("0 0 0\n1 1 1\n");
    let err = compare(&read_vertex_table(a.path()).unwrap().view(), &read_vertex_table(b.path()).unwrap().view(), DEFAULT_TOLERANCE).unwrap_err();
    assert!(matches!(err, SmplError::ShapeMismatch { lhs: (3, 3), rhs: (2, 3) }));
}

#[test]
fn missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.txt");
    match read_vertex_table(&missing) {
        Err(SmplError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected an io error, got {other:?}"),
    }
}

#[test]
fn written_tables_compare_equal_at_their_precision() {
    let verts = nd::array![[0.123_456_789_f32, -1.5, 3.25], [10.0, 0.0, -0.000_000_1]];
    let mut file = NamedTempFile::new().unwrap();
    write_vertex_table(&mut file, &verts.view(), 8).unwrap();
    file.flush().unwrap();
    let read_back = read_vertex_table(file.path()).unwrap();
    let expected = verts.mapv(f64::from);
    assert!(compare(&read_back.view(), &expected.view(), 1e-7).unwrap().passed());
}

fn table_pair() -> impl Strategy<Value = (nd::Array2<f64>, nd::Array2<f64>)> {
    (1usize..40, 1usize..4).prop_flat_map(|(rows, cols)| {
        let len = rows * cols;
        (
            prop::collection::vec(-100.0f64..100.0, len),
            prop::collection::vec(prop_oneof![3 => Just(0.0f64), 1 => -1e-4f64..1e-4], len),
        )
            .prop_map(move |(values, offsets)| {
                let a = nd::Array2::from_shape_vec((rows, cols), values).unwrap();
                let delta = nd::Array2::from_shape_vec((rows, cols), offsets).unwrap();
                let b = &a + &delta;
                (a, b)
            })
    })
}

proptest! {
    #[test]
    fn success_iff_every_difference_is_within_tolerance((a, b) in table_pair()) {
        let cmp = compare(&a.view(), &b.view(), DEFAULT_TOLERANCE).unwrap();
        let all_close = a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= DEFAULT_TOLERANCE);
        prop_assert_eq!(cmp.passed(), all_close);
    }

    #[test]
    fn count_is_exact_and_list_is_truncated((a, b) in table_pair()) {
        let cmp = compare(&a.view(), &b.view(), DEFAULT_TOLERANCE).unwrap();
        let expected: Vec<usize> = a
            .rows()
            .into_iter()
            .zip(b.rows())
            .enumerate()
            .filter(|(_, (ra, rb))| ra.iter().zip(rb.iter()).any(|(x, y)| (x - y).abs() > DEFAULT_TOLERANCE))
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(cmp.mismatch_count, expected.len());
        prop_assert_eq!(cmp.mismatches.len(), expected.len().min(MAX_REPORTED_MISMATCHES));
        let listed: Vec<usize> = cmp.mismatches.iter().map(|m| m.index).collect();
        prop_assert_eq!(&listed[..], &expected[..listed.len()]);
    }

    #[test]
    fn comparison_is_symmetric((a, b) in table_pair()) {
        let ab = compare(&a.view(), &b.view(), DEFAULT_TOLERANCE).unwrap();
        let ba = compare(&b.view(), &a.view(), DEFAULT_TOLERANCE).unwrap();
        prop_assert_eq!(ab.mismatch_count, ba.mismatch_count);
        let idx_ab: Vec<usize> = ab.mismatches.iter().map(|m| m.index).collect();
        let idx_ba: Vec<usize> = ba.mismatches.iter().map(|m| m.index).collect();
        prop_assert_eq!(idx_ab, idx_ba);
    }

    #[test]
    fn comparison_is_idempotent((a, b) in table_pair()) {
        let first = compare(&a.view(), &b.view(), DEFAULT_TOLERANCE).unwrap();
        let second = compare(&a.view(), &b.view(), DEFAULT_TOLERANCE).unwrap();
        prop_assert_eq!(first, second);
        prop_assert!(compare(&a.view(), &a.view(), DEFAULT_TOLERANCE).unwrap().passed());
    }
}
