use tempfile::TempDir;

use crate::codec::Value;
use crate::error::Error;
use crate::index::tests::helpers::{built_index, row_ids, scalar_table};

#[test]
fn spec_single_column_scenario() {
    // two rows, index on u with no bucketing
    let tmp = TempDir::new().unwrap();
    let t = scalar_table(&tmp, &[(3, -2, 0.5, b"abc"), (10, 7, 1.5, b"xyz")]);
    let index = built_index(&t, "u", &[("u", 0.0)]);

    let keys: Vec<_> = index
        .distinct_keys_iterator()
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(keys, vec![vec![Value::Uint(3)], vec![Value::Uint(10)]]);

    assert_eq!(index.num_rows(&[Value::Uint(3)]).unwrap(), 1);
    assert_eq!(index.get_min(&[]).unwrap(), vec![Value::Uint(3)]);
    assert_eq!(index.get_max(&[]).unwrap(), vec![Value::Uint(10)]);

    let mut it = index.row_iterator(&[0]).unwrap();
    it.set_min(&[Value::Uint(3)]).unwrap();
    it.set_max(&[Value::Uint(10)]).unwrap();
    let ids: Vec<u64> = it
        .map(|r| match r.unwrap()[0] {
            Value::Uint(id) => id,
            _ => panic!(),
        })
        .collect();
    assert_eq!(ids, vec![0]);
}

#[test]
fn spec_two_column_scenario() {
    let tmp = TempDir::new().unwrap();
    let t = scalar_table(&tmp, &[(3, -2, 0.5, b"abc"), (10, 7, 1.5, b"xyz")]);
    let index = built_index(&t, "i_u", &[("i", 0.0), ("u", 0.0)]);
    // sorted by i ascending: -2 < 7
    assert_eq!(row_ids(&index), vec![0, 1]);
}

#[test]
fn spec_char_scenario() {
    let tmp = TempDir::new().unwrap();
    let t = scalar_table(
        &tmp,
        &[(0, 0, 0.0, b"abc"), (0, 0, 0.0, b"abd"), (0, 0, 0.0, b"abc")],
    );
    let index = built_index(&t, "c", &[("c", 0.0)]);

    assert_eq!(index.num_rows(&[Value::Char(b"abc".to_vec())]).unwrap(), 2);
    let keys: Vec<_> = index
        .distinct_keys_iterator()
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(
        keys,
        vec![
            vec![Value::Char(b"abc".to_vec())],
            vec![Value::Char(b"abd".to_vec())],
        ]
    );
    assert_eq!(
        index.get_min(&[]).unwrap(),
        vec![Value::Char(b"abc".to_vec())]
    );
    assert_eq!(
        index.get_max(&[]).unwrap(),
        vec![Value::Char(b"abd".to_vec())]
    );
}

#[test]
fn prefix_probes_on_two_columns() {
    let tmp = TempDir::new().unwrap();
    let t = scalar_table(
        &tmp,
        &[
            (1, 10, 0.0, b"aaa"),
            (1, 20, 0.0, b"aaa"),
            (2, 5, 0.0, b"aaa"),
            (2, 30, 0.0, b"aaa"),
            (3, -7, 0.0, b"aaa"),
        ],
    );
    let index = built_index(&t, "u_i", &[("u", 0.0), ("i", 0.0)]);

    assert_eq!(
        index.get_min(&[Value::Uint(2)]).unwrap(),
        vec![Value::Uint(2), Value::Int(5)]
    );
    assert_eq!(
        index.get_max(&[Value::Uint(2)]).unwrap(),
        vec![Value::Uint(2), Value::Int(30)]
    );
    // full-key probes
    assert_eq!(
        index.get_min(&[Value::Uint(1), Value::Int(20)]).unwrap(),
        vec![Value::Uint(1), Value::Int(20)]
    );
    // absent prefixes
    assert!(matches!(
        index.get_min(&[Value::Uint(9)]),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        index.get_max(&[Value::Uint(9)]),
        Err(Error::NotFound(_))
    ));
    // prefix longer than the arity
    assert!(matches!(
        index.get_min(&[Value::Uint(1), Value::Int(1), Value::Int(1)]),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn num_rows_requires_full_arity() {
    let tmp = TempDir::new().unwrap();
    let t = scalar_table(&tmp, &[(1, 2, 0.0, b"aaa")]);
    let index = built_index(&t, "u_i", &[("u", 0.0), ("i", 0.0)]);
    assert!(matches!(
        index.num_rows(&[Value::Uint(1)]),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(
        index.num_rows(&[Value::Uint(1), Value::Int(2)]).unwrap(),
        1
    );
    assert_eq!(
        index.num_rows(&[Value::Uint(1), Value::Int(3)]).unwrap(),
        0
    );
}

#[test]
fn distinct_key_counts_sum_to_num_rows() {
    let tmp = TempDir::new().unwrap();
    let rows: Vec<(u64, i64, f64, &[u8; 3])> = (0..50)
        .map(|j| ((j % 7) as u64, 0, 0.0, b"aaa"))
        .collect();
    let t = scalar_table(&tmp, &rows);
    let index = built_index(&t, "u", &[("u", 0.0)]);
    let mut total = 0;
    let mut previous: Option<u64> = None;
    for key in index.distinct_keys_iterator().unwrap() {
        let key = key.unwrap();
        let Value::Uint(v) = key[0] else { panic!() };
        if let Some(prev) = previous {
            assert!(prev < v, "keys not strictly increasing: {prev} then {v}");
        }
        total += index.num_rows(&key).unwrap();
        previous = Some(v);
    }
    assert_eq!(total, 50);
}

#[test]
fn row_iterator_prefix_bounds_are_half_open() {
    let tmp = TempDir::new().unwrap();
    let t = scalar_table(
        &tmp,
        &[
            (1, 0, 0.0, b"aaa"),
            (2, 0, 0.0, b"aaa"),
            (2, 1, 0.0, b"aaa"),
            (3, 0, 0.0, b"aaa"),
            (4, 0, 0.0, b"aaa"),
        ],
    );
    let index = built_index(&t, "u_i", &[("u", 0.0), ("i", 0.0)]);

    // [2, 4): includes every row with u == 2 or u == 3
    let mut it = index.row_iterator(&[0]).unwrap();
    it.set_min(&[Value::Uint(2)]).unwrap();
    it.set_max(&[Value::Uint(4)]).unwrap();
    let ids: Vec<u64> = it
        .map(|r| match r.unwrap()[0] {
            Value::Uint(id) => id,
            _ => panic!(),
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    // min == max is empty
    let mut it = index.row_iterator(&[0]).unwrap();
    it.set_min(&[Value::Uint(2)]).unwrap();
    it.set_max(&[Value::Uint(2)]).unwrap();
    assert_eq!(it.count(), 0);

    // unbounded max runs to the end
    let mut it = index.row_iterator(&[0]).unwrap();
    it.set_min(&[Value::Uint(3)]).unwrap();
    let ids: Vec<u64> = it
        .map(|r| match r.unwrap()[0] {
            Value::Uint(id) => id,
            _ => panic!(),
        })
        .collect();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn row_iterator_projects_parent_columns() {
    let tmp = TempDir::new().unwrap();
    let t = scalar_table(&tmp, &[(5, -1, 0.25, b"one"), (2, 8, 0.75, b"two")]);
    let index = built_index(&t, "u", &[("u", 0.0)]);
    let rows: Vec<_> = index
        .row_iterator(&[4, 1])
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(
        rows,
        vec![
            vec![Value::Char(b"two".to_vec()), Value::Uint(2)],
            vec![Value::Char(b"one".to_vec()), Value::Uint(5)],
        ]
    );
}

#[test]
fn min_max_match_column_extremes() {
    let tmp = TempDir::new().unwrap();
    let rows: Vec<(u64, i64, f64, &[u8; 3])> = vec![
        (17, -300, 2.5, b"qqq"),
        (3, 250, -12.0, b"aab"),
        (40, 0, 0.5, b"zzz"),
        (9, -1, 7.25, b"mno"),
    ];
    let t = scalar_table(&tmp, &rows);

    let by_u = built_index(&t, "u", &[("u", 0.0)]);
    assert_eq!(by_u.get_min(&[]).unwrap(), vec![Value::Uint(3)]);
    assert_eq!(by_u.get_max(&[]).unwrap(), vec![Value::Uint(40)]);

    let by_i = built_index(&t, "i", &[("i", 0.0)]);
    assert_eq!(by_i.get_min(&[]).unwrap(), vec![Value::Int(-300)]);
    assert_eq!(by_i.get_max(&[]).unwrap(), vec![Value::Int(250)]);

    let by_f = built_index(&t, "f", &[("f", 0.0)]);
    assert_eq!(by_f.get_min(&[]).unwrap(), vec![Value::Float(-12.0)]);
    assert_eq!(by_f.get_max(&[]).unwrap(), vec![Value::Float(7.25)]);
}
