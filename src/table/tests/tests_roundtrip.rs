use rand::Rng;
use tempfile::TempDir;

use crate::codec::Value;
use crate::db::Mode;
use crate::error::Error;
use crate::schema::{ElementCount, MAX_NUM_ELEMENTS, int_bounds, uint_bounds};
use crate::table::Table;
use crate::table::tests::helpers::{mixed_table, sample_rows, sealed_mixed_table};

#[test]
fn sealed_rows_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let rows = sample_rows();
    let t = sealed_mixed_table(&tmp, &rows);
    assert_eq!(t.num_rows().unwrap(), 2);

    let r0 = t.get_row(0).unwrap();
    assert_eq!(r0[0], Value::Uint(0));
    assert_eq!(&r0[1..], &rows[0][1..]);

    let r1 = t.get_row(1).unwrap();
    assert_eq!(r1[0], Value::Uint(1));
    assert_eq!(&r1[1..], &rows[1][1..]);
}

#[test]
fn commit_without_inserts_yields_missing_row() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    t.commit_row().unwrap();
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    let row = t.get_row(0).unwrap();
    assert_eq!(row[0], Value::Uint(0));
    for value in &row[1..] {
        assert_eq!(*value, Value::Missing);
    }
}

#[test]
fn staged_value_can_be_replaced_before_commit() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    t.insert_element(1, &Value::Uint(1)).unwrap();
    t.insert_element(1, &Value::Uint(2)).unwrap();
    // clearing via Missing
    t.insert_element(2, &Value::Int(5)).unwrap();
    t.insert_element(2, &Value::Missing).unwrap();
    t.commit_row().unwrap();
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    let row = t.get_row(0).unwrap();
    assert_eq!(row[1], Value::Uint(2));
    assert_eq!(row[2], Value::Missing);
}

#[test]
fn failed_append_leaves_table_unchanged() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    t.append(&sample_rows()[0]).unwrap();
    // wrong element count for the fixed char column
    let mut bad = sample_rows()[0].clone();
    bad[4] = Value::Char(b"ab".to_vec());
    assert!(matches!(
        t.append(&bad),
        Err(Error::CountMismatch { .. })
    ));
    assert_eq!(t.num_rows().unwrap(), 1);
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    assert_eq!(t.num_rows().unwrap(), 1);
}

#[test]
fn text_inserts_match_typed_inserts() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    // row 0 typed
    t.insert_element(1, &Value::Uint(7)).unwrap();
    t.insert_element(2, &Value::Int(-9)).unwrap();
    t.insert_element(3, &Value::Float(2.25)).unwrap();
    t.insert_element(4, &Value::Char(b"dna".to_vec())).unwrap();
    t.insert_element(6, &Value::Uints(vec![Some(5), Some(6)])).unwrap();
    t.commit_row().unwrap();
    // row 1 textual
    t.insert_encoded_element(1, b"7").unwrap();
    t.insert_encoded_element(2, b"-9").unwrap();
    t.insert_encoded_element(3, b"2.25").unwrap();
    t.insert_encoded_element(4, b"dna").unwrap();
    t.insert_encoded_element(6, b"5,6").unwrap();
    t.commit_row().unwrap();
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    let r0 = t.get_row(0).unwrap();
    let r1 = t.get_row(1).unwrap();
    assert_eq!(&r0[1..], &r1[1..]);
}

#[test]
fn random_rows_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let mut t = Table::new(tmp.path());
    t.add_id_column(4).unwrap();
    for size in 1..=8usize {
        t.add_int_column(&format!("i{size}"), "", size, ElementCount::Fixed(1))
            .unwrap();
        t.add_uint_column(&format!("u{size}"), "", size, ElementCount::Fixed(1))
            .unwrap();
        t.add_int_column(&format!("iv{size}"), "", size, ElementCount::Variable)
            .unwrap();
    }
    t.open(Mode::Write).unwrap();

    let mut rng = rand::rng();
    let mut expected: Vec<Vec<Value>> = Vec::new();
    for _ in 0..25 {
        let mut row = vec![Value::Missing];
        for size in 1..=8usize {
            let (imin, imax) = int_bounds(size);
            let (_, umax) = uint_bounds(size);
            row.push(Value::Int(rng.random_range(imin..=imax)));
            row.push(Value::Uint(rng.random_range(0..=umax)));
            let n = rng.random_range(0..=MAX_NUM_ELEMENTS.min(9));
            row.push(Value::Ints(
                (0..n).map(|_| Some(rng.random_range(imin..=imax))).collect(),
            ));
        }
        t.append(&row).unwrap();
        expected.push(row);
    }
    t.close().unwrap();
    t.open(Mode::Read).unwrap();

    assert_eq!(t.num_rows().unwrap(), 25);
    for (j, want) in expected.iter().enumerate() {
        let got = t.get_row(j as u64).unwrap();
        assert_eq!(got[0], Value::Uint(j as u64));
        for (g, w) in got[1..].iter().zip(&want[1..]) {
            // empty variable sequences decode as empty, not missing
            match w {
                Value::Ints(vs) if vs.is_empty() => assert_eq!(*g, Value::Ints(Vec::new())),
                other => assert_eq!(g, other),
            }
        }
    }
}

#[test]
fn float_precision_per_size() {
    let tmp = TempDir::new().unwrap();
    let mut t = Table::new(tmp.path());
    t.add_id_column(4).unwrap();
    t.add_float_column("h", "", 2, ElementCount::Fixed(1)).unwrap();
    t.add_float_column("s", "", 4, ElementCount::Fixed(1)).unwrap();
    t.add_float_column("d", "", 8, ElementCount::Fixed(1)).unwrap();
    t.open(Mode::Write).unwrap();

    let values = [-3.75, -0.125, 0.0, 0.625, 12.5, 100.25];
    for v in values {
        t.append(&[
            Value::Missing,
            Value::Float(v),
            Value::Float(v),
            Value::Float(v),
        ])
        .unwrap();
    }
    t.close().unwrap();
    t.open(Mode::Read).unwrap();

    for (j, v) in values.iter().enumerate() {
        let row = t.get_row(j as u64).unwrap();
        let Value::Float(h) = row[1] else { panic!() };
        let Value::Float(s) = row[2] else { panic!() };
        let Value::Float(d) = row[3] else { panic!() };
        assert!((h - v).abs() < 5e-3, "half {h} vs {v}");
        assert!((s - v).abs() < 5e-7, "single {s} vs {v}");
        assert_eq!(d, *v, "double");
    }
}

#[test]
fn variable_char_lengths_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let mut t = Table::new(tmp.path());
    t.add_id_column(4).unwrap();
    t.add_char_column("s", "", ElementCount::Variable).unwrap();
    t.open(Mode::Write).unwrap();
    let mut expected = Vec::new();
    for n in 0..50usize {
        let s: Vec<u8> = (0..n).map(|j| b'a' + (j % 26) as u8).collect();
        t.append(&[Value::Missing, Value::Char(s.clone())]).unwrap();
        expected.push(s);
    }
    // one fully missing row
    t.commit_row().unwrap();
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    for (j, want) in expected.iter().enumerate() {
        assert_eq!(t.get_row(j as u64).unwrap()[1], Value::Char(want.clone()));
    }
    assert_eq!(t.get_row(50).unwrap()[1], Value::Missing);
}

#[test]
fn large_row_batches_cross_buffer_flushes() {
    let tmp = TempDir::new().unwrap();
    let mut t = Table::new(tmp.path());
    t.add_id_column(4).unwrap();
    t.add_char_column("payload", "", ElementCount::Variable).unwrap();
    t.open(Mode::Write).unwrap();
    // ~230 bytes per packed row, 8000 rows: the 1 MiB pending region
    // flushes to the data file more than once
    let payload = vec![b'x'; 200];
    for _ in 0..8000 {
        t.append(&[Value::Missing, Value::Char(payload.clone())]).unwrap();
    }
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    assert_eq!(t.num_rows().unwrap(), 8000);
    assert_eq!(t.get_row(7999).unwrap()[1], Value::Char(payload));
}
