use tempfile::TempDir;

use crate::codec::Value;
use crate::db::Mode;
use crate::index::Index;
use crate::schema::ElementCount;
use crate::table::Table;

/// Seal a table with columns
/// `row_id, u:uint(2,1), i:int(2,1), f:float(8,1), c:char(3)` holding the
/// given `(u, i, f, c)` rows, and reopen it for reading.
pub(crate) fn scalar_table(tmp: &TempDir, rows: &[(u64, i64, f64, &[u8; 3])]) -> Table {
    let mut t = Table::new(tmp.path());
    t.add_id_column(4).unwrap();
    t.add_uint_column("u", "", 2, ElementCount::Fixed(1)).unwrap();
    t.add_int_column("i", "", 2, ElementCount::Fixed(1)).unwrap();
    t.add_float_column("f", "", 8, ElementCount::Fixed(1)).unwrap();
    t.add_char_column("c", "", ElementCount::Fixed(3)).unwrap();
    t.open(Mode::Write).unwrap();
    for (u, i, f, c) in rows {
        t.append(&[
            Value::Missing,
            Value::Uint(*u),
            Value::Int(*i),
            Value::Float(*f),
            Value::Char(c.to_vec()),
        ])
        .unwrap();
    }
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    t
}

/// Declare, build, seal and reopen an index on the given key columns.
pub(crate) fn built_index(table: &Table, name: &str, keys: &[(&str, f64)]) -> Index {
    let mut index = Index::new(table, name).unwrap();
    for (column, width) in keys {
        index.add_key_column(column, *width).unwrap();
    }
    index.open(Mode::Write).unwrap();
    index.build().unwrap();
    index.close().unwrap();
    index.open(Mode::Read).unwrap();
    index
}

/// Collect the row ids yielded by an index row iterator.
pub(crate) fn row_ids(index: &Index) -> Vec<u64> {
    index
        .row_iterator(&[0])
        .unwrap()
        .map(|r| match r.unwrap()[0] {
            Value::Uint(id) => id,
            ref other => panic!("unexpected row id value {other:?}"),
        })
        .collect()
}
