use tempfile::TempDir;

use crate::codec::Value;
use crate::db::Mode;
use crate::schema::ElementCount;
use crate::table::Table;

/// A table with one column of every element kind:
/// `row_id, u:uint(2,1), i:int(2,1), f:float(8,1), c:char(3), vc:char(var), vu:uint(2,var)`.
pub(crate) fn mixed_table(tmp: &TempDir) -> Table {
    let mut t = Table::new(tmp.path());
    t.add_id_column(4).unwrap();
    t.add_uint_column("u", "", 2, ElementCount::Fixed(1)).unwrap();
    t.add_int_column("i", "", 2, ElementCount::Fixed(1)).unwrap();
    t.add_float_column("f", "", 8, ElementCount::Fixed(1)).unwrap();
    t.add_char_column("c", "", ElementCount::Fixed(3)).unwrap();
    t.add_char_column("vc", "", ElementCount::Variable).unwrap();
    t.add_uint_column("vu", "", 2, ElementCount::Variable).unwrap();
    t
}

/// Build, fill and seal a mixed table, then reopen it for reading.
pub(crate) fn sealed_mixed_table(tmp: &TempDir, rows: &[Vec<Value>]) -> Table {
    let mut t = mixed_table(tmp);
    t.open(Mode::Write).unwrap();
    for row in rows {
        t.append(row).unwrap();
    }
    t.close().unwrap();
    t.open(Mode::Read).unwrap();
    t
}

/// Two sample rows for the mixed table.
pub(crate) fn sample_rows() -> Vec<Vec<Value>> {
    vec![
        vec![
            Value::Missing,
            Value::Uint(3),
            Value::Int(-2),
            Value::Float(0.5),
            Value::Char(b"abc".to_vec()),
            Value::Char(b"hello".to_vec()),
            Value::Uints(vec![Some(1), Some(2)]),
        ],
        vec![
            Value::Missing,
            Value::Uint(10),
            Value::Int(7),
            Value::Float(1.5),
            Value::Char(b"xyz".to_vec()),
            Value::Char(Vec::new()),
            Value::Missing,
        ],
    ]
}
