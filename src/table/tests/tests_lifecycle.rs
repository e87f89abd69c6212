use tempfile::TempDir;

use crate::codec::Value;
use crate::db::Mode;
use crate::error::Error;
use crate::schema::ElementCount;
use crate::table::tests::helpers::{mixed_table, sample_rows, sealed_mixed_table};
use crate::table::{Table, open_table};

#[test]
fn open_read_on_missing_table_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let mut t = Table::new(tmp.path());
    assert!(!t.exists());
    assert!(matches!(t.open(Mode::Read), Err(Error::NotFound(_))));
    assert!(matches!(
        open_table(tmp.path(), 1024),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn double_open_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    assert!(matches!(t.open(Mode::Write), Err(Error::AlreadyOpen)));
    assert!(matches!(t.open(Mode::Read), Err(Error::AlreadyOpen)));
    t.close().unwrap();
}

#[test]
fn close_when_closed_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    for _ in 0..3 {
        assert!(matches!(t.close(), Err(Error::NotOpen)));
        t.open(Mode::Write).unwrap();
        t.close().unwrap();
    }
}

#[test]
fn build_files_invisible_until_close() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    t.append(&sample_rows()[0]).unwrap();
    // still building: no sealed files yet
    assert!(!t.exists());
    let build_files: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.starts_with("_build_"))
        .collect();
    assert_eq!(build_files.len(), 2, "{build_files:?}");
    t.close().unwrap();
    assert!(t.exists());
    assert!(tmp.path().join("table.db").exists());
    assert!(tmp.path().join("table.db.dat").exists());
    assert!(tmp.path().join("table.xml").exists());
}

#[test]
fn write_operations_require_write_mode() {
    let tmp = TempDir::new().unwrap();
    let mut t = sealed_mixed_table(&tmp, &sample_rows());
    assert!(matches!(
        t.insert_element(1, &Value::Uint(1)),
        Err(Error::WrongMode { required: Mode::Write })
    ));
    assert!(matches!(
        t.commit_row(),
        Err(Error::WrongMode { required: Mode::Write })
    ));
    t.close().unwrap();
    assert!(matches!(
        t.insert_element(1, &Value::Uint(1)),
        Err(Error::NotOpen)
    ));
    assert!(matches!(t.commit_row(), Err(Error::NotOpen)));
}

#[test]
fn read_operations_require_read_mode() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    t.append(&sample_rows()[0]).unwrap();
    assert!(matches!(
        t.get_row(0),
        Err(Error::WrongMode { required: Mode::Read })
    ));
    // num_rows works in write mode and counts committed rows
    assert_eq!(t.num_rows().unwrap(), 1);
    t.close().unwrap();
    assert!(matches!(t.num_rows(), Err(Error::NotOpen)));
}

#[test]
fn insert_into_reserved_or_unknown_columns_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    assert!(matches!(
        t.insert_element(0, &Value::Uint(1)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        t.insert_element(7, &Value::Uint(1)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        t.insert_encoded_element(99, b"1"),
        Err(Error::InvalidArgument(_))
    ));
    t.close().unwrap();
}

#[test]
fn schema_declaration_validated_at_open() {
    let tmp = TempDir::new().unwrap();
    // no columns at all
    let mut t = Table::new(tmp.path());
    assert!(matches!(t.open(Mode::Write), Err(Error::InvalidArgument(_))));
    // row-id column alone is not enough
    t.add_id_column(4).unwrap();
    assert!(matches!(t.open(Mode::Write), Err(Error::InvalidArgument(_))));
    // first column must be a single-element uint
    let mut t2 = Table::new(tmp.path());
    t2.add_int_column("row_id", "", 4, ElementCount::Fixed(1)).unwrap();
    t2.add_uint_column("u", "", 1, ElementCount::Fixed(1)).unwrap();
    assert!(matches!(t2.open(Mode::Write), Err(Error::InvalidArgument(_))));
}

#[test]
fn duplicate_column_names_rejected_at_declaration() {
    let tmp = TempDir::new().unwrap();
    let mut t = Table::new(tmp.path());
    t.add_id_column(4).unwrap();
    t.add_uint_column("u", "", 1, ElementCount::Fixed(1)).unwrap();
    assert!(matches!(
        t.add_uint_column("u", "", 2, ElementCount::Fixed(1)),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn columns_cannot_be_added_while_open() {
    let tmp = TempDir::new().unwrap();
    let mut t = mixed_table(&tmp);
    t.open(Mode::Write).unwrap();
    assert!(matches!(
        t.add_uint_column("late", "", 1, ElementCount::Fixed(1)),
        Err(Error::InvalidArgument(_))
    ));
    t.close().unwrap();
}

#[test]
fn reopen_loads_schema_from_sidecar() {
    let tmp = TempDir::new().unwrap();
    let t = sealed_mixed_table(&tmp, &sample_rows());
    let names: Vec<&str> = t.columns().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["row_id", "u", "i", "f", "c", "vc", "vu"]);
    assert_eq!(t.column_position("f"), Some(3));
    // a second, independent handle sees the same table
    let t2 = open_table(tmp.path(), 1024).unwrap();
    assert_eq!(t2.num_rows().unwrap(), 2);
}

#[test]
fn fixed_region_size_matches_schema() {
    let tmp = TempDir::new().unwrap();
    let t = sealed_mixed_table(&tmp, &sample_rows());
    // row_id(4) + u(2) + i(2) + f(8) + c(3) + vc(4) + vu(4)
    assert_eq!(t.fixed_region_size().unwrap(), 27);
}

#[test]
fn delete_removes_sealed_files() {
    let tmp = TempDir::new().unwrap();
    let mut t = sealed_mixed_table(&tmp, &sample_rows());
    assert!(matches!(t.delete(), Err(Error::AlreadyOpen)));
    t.close().unwrap();
    t.delete().unwrap();
    assert!(!t.exists());
    assert!(!tmp.path().join("table.db.dat").exists());
}

#[test]
fn empty_table_seals_and_reopens() {
    let tmp = TempDir::new().unwrap();
    let t = sealed_mixed_table(&tmp, &[]);
    assert_eq!(t.num_rows().unwrap(), 0);
    assert!(matches!(
        t.get_row(0),
        Err(Error::OutOfRange { row_id: 0, num_rows: 0 })
    ));
    assert_eq!(t.row_iterator(&[0]).unwrap().count(), 0);
}
