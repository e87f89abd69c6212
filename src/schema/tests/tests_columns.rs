use crate::codec::Value;
use crate::error::Error;
use crate::schema::{
    Column, ElementCount, ElementType, MAX_NUM_ELEMENTS, Schema, int_bounds, uint_bounds,
};

fn uint(name: &str, size: usize, count: ElementCount) -> Column {
    Column::uint(name, "", size, count).unwrap()
}

#[test]
fn integer_ranges_reserve_missing_marker() {
    for size in 1..=7usize {
        let (min, max) = int_bounds(size);
        assert_eq!(max, (1i64 << (8 * size - 1)) - 1);
        assert_eq!(min, -max);
        let (umin, umax) = uint_bounds(size);
        assert_eq!(umin, 0);
        assert_eq!(umax, (1u64 << (8 * size)) - 2);
    }
    assert_eq!(int_bounds(8), (i64::MIN + 1, i64::MAX));
    assert_eq!(uint_bounds(8), (0, u64::MAX - 1));
}

#[test]
fn column_min_max_elements() {
    let c = Column::int("i", "", 2, ElementCount::Fixed(1)).unwrap();
    assert_eq!(c.min_element(), Some(Value::Int(-32767)));
    assert_eq!(c.max_element(), Some(Value::Int(32767)));
    let c = uint("u", 2, ElementCount::Fixed(1));
    assert_eq!(c.min_element(), Some(Value::Uint(0)));
    assert_eq!(c.max_element(), Some(Value::Uint(65534)));
    let c = Column::char("c", "", ElementCount::Variable).unwrap();
    assert_eq!(c.min_element(), None);
    assert_eq!(c.max_element(), None);
}

#[test]
fn invalid_sizes_rejected() {
    assert!(Column::int("i", "", 0, ElementCount::Fixed(1)).is_err());
    assert!(Column::int("i", "", 9, ElementCount::Fixed(1)).is_err());
    assert!(Column::float("f", "", 3, ElementCount::Fixed(1)).is_err());
    assert!(Column::float("f", "", 16, ElementCount::Fixed(1)).is_err());
    assert!(Column::new("c", "", ElementType::Char, 2, ElementCount::Fixed(1)).is_err());
    assert!(Column::float("f", "", 2, ElementCount::Fixed(1)).is_ok());
}

#[test]
fn invalid_counts_rejected() {
    assert!(Column::int("i", "", 4, ElementCount::Fixed(0)).is_err());
    assert!(Column::int("i", "", 4, ElementCount::Fixed(MAX_NUM_ELEMENTS + 1)).is_err());
    assert!(Column::int("i", "", 4, ElementCount::Fixed(MAX_NUM_ELEMENTS)).is_ok());
    assert!(Column::int("i", "", 4, ElementCount::Variable).is_ok());
}

#[test]
fn empty_name_rejected() {
    let err = Column::int("", "", 4, ElementCount::Fixed(1)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn fixed_region_contributions() {
    assert_eq!(
        uint("u", 4, ElementCount::Fixed(3)).fixed_region_contribution(),
        12
    );
    assert_eq!(
        uint("u", 8, ElementCount::Variable).fixed_region_contribution(),
        4
    );
}

#[test]
fn schema_requires_row_id_first() {
    // too few columns
    assert!(Schema::new(vec![uint("row_id", 4, ElementCount::Fixed(1))]).is_err());
    // wrong type for the first column
    let bad = Column::int("row_id", "", 4, ElementCount::Fixed(1)).unwrap();
    let data = uint("u", 2, ElementCount::Fixed(1));
    assert!(Schema::new(vec![bad, data.clone()]).is_err());
    // wrong count for the first column
    let bad = uint("row_id", 4, ElementCount::Fixed(2));
    assert!(Schema::new(vec![bad, data.clone()]).is_err());
    // well formed
    let schema = Schema::new(vec![uint("row_id", 4, ElementCount::Fixed(1)), data]).unwrap();
    assert_eq!(schema.num_columns(), 2);
    assert_eq!(schema.fixed_region_size(), 4 + 2);
}

#[test]
fn schema_rejects_duplicate_names() {
    let cols = vec![
        uint("row_id", 4, ElementCount::Fixed(1)),
        uint("u", 2, ElementCount::Fixed(1)),
        uint("u", 4, ElementCount::Fixed(1)),
    ];
    assert!(matches!(
        Schema::new(cols),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn schema_rejects_oversized_fixed_region() {
    // 8-byte uints, 256 elements each: 2048 bytes per column
    let mut cols = vec![uint("row_id", 8, ElementCount::Fixed(1))];
    for j in 0..33 {
        cols.push(uint(
            &format!("c{j}"),
            8,
            ElementCount::Fixed(MAX_NUM_ELEMENTS),
        ));
    }
    // 33 * 2048 + 8 = 67592 > 65536
    assert!(Schema::new(cols).is_err());
}

#[test]
fn schema_position_lookup() {
    let schema = Schema::new(vec![
        uint("row_id", 4, ElementCount::Fixed(1)),
        uint("a", 2, ElementCount::Fixed(1)),
        uint("b", 2, ElementCount::Fixed(1)),
    ])
    .unwrap();
    assert_eq!(schema.position_of("b"), Some(2));
    assert_eq!(schema.position_of("missing"), None);
    assert_eq!(schema.column(1).unwrap().name(), "a");
    assert!(schema.column(3).is_none());
}
