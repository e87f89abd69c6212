//! Row codec — order-preserving element encodings and the packed row
//! layout.
//!
//! Every stored element uses a big-endian, memcmp-ordered byte form, so the
//! same encoding serves both the row payload and secondary index keys:
//!
//! | Type  | Stored form                                                   |
//! |-------|---------------------------------------------------------------|
//! | uint  | `value + 1`, `size` bytes; missing = all-zero                 |
//! | int   | offset binary (`value + 2^(8s-1)`); missing = all-zero        |
//! | float | IEEE-754 bits, sign bit flipped when positive, all bits       |
//! |       | flipped when negative; missing = canonical quiet NaN          |
//! | char  | raw bytes                                                     |
//!
//! # Row layout
//!
//! ```text
//! [fixed region][variable region]
//! ```
//!
//! The fixed region concatenates one slot per column in declaration order:
//! a fixed-count column of `n` elements of size `s` occupies `n*s` bytes in
//! place; a variable-count column occupies a 4-byte descriptor
//! `(offset: u16 BE, length: u16 BE)` pointing into the variable region
//! (offset measured from the start of the row). A missing variable value is
//! `(0, 0)`; a present-but-empty value is `(0xFFFF, 0)` — the sentinel
//! offset is only interpreted when the length is zero, so real offsets keep
//! the full 16-bit range.
//!
//! The variable region holds the raw element bytes of each variable-count
//! column, appended in column order.


pub(crate) mod half;

use std::fmt;
use std::io;

use crate::error::{Error, Result};
use crate::schema::{
    Column, ElementCount, ElementType, MAX_NUM_ELEMENTS, MAX_ROW_SIZE, Schema,
    VAR_DESCRIPTOR_SIZE, int_bounds, uint_bounds,
};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Sentinel offset marking a present-but-empty variable value.
pub(crate) const VAR_OFFSET_EMPTY: u16 = 0xFFFF;

/// Canonical missing markers: positive quiet NaN bit patterns. After the
/// order transform these sort above every finite value.
const MISSING_F64_BITS: u64 = 0x7FF8_0000_0000_0000;
const MISSING_F32_BITS: u32 = 0x7FC0_0000;
const MISSING_F16_BITS: u16 = 0x7E00;

/// Bit patterns stored for a *present* NaN, kept distinct from the missing
/// markers so that an inserted NaN round-trips as NaN.
const NAN_F64_BITS: u64 = 0x7FF8_0000_0000_0001;
const NAN_F32_BITS: u32 = 0x7FC0_0001;
const NAN_F16_BITS: u16 = 0x7E01;

const SIGN64: u64 = 1 << 63;
const SIGN32: u32 = 1 << 31;
const SIGN16: u16 = 1 << 15;

// ------------------------------------------------------------------------------------------------
// Typed values
// ------------------------------------------------------------------------------------------------

/// A single column value of a row.
///
/// Single-element columns surface as scalars, multi-element and variable
/// columns as sequences whose elements may individually be missing
/// (numeric types only). A whole-column missing value is [`Value::Missing`]
/// regardless of the column's count; a variable value of length zero is an
/// empty sequence (or empty byte string), which is *not* the same as
/// missing.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The whole column value is absent.
    Missing,
    /// Unsigned integer scalar.
    Uint(u64),
    /// Signed integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// Byte string (fixed- or variable-length char column).
    Char(Vec<u8>),
    /// Unsigned integer sequence.
    Uints(Vec<Option<u64>>),
    /// Signed integer sequence.
    Ints(Vec<Option<i64>>),
    /// Float sequence.
    Floats(Vec<Option<f64>>),
}

/// An ordered tuple of column values.
pub type Row = Vec<Value>;

impl Value {
    /// Short kind name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing",
            Value::Uint(_) => "uint",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Uints(_) => "uint sequence",
            Value::Ints(_) => "int sequence",
            Value::Floats(_) => "float sequence",
        }
    }

    /// Plain-text rendering used by the CLI tools. Missing values (whole
    /// or per-element) print as `.`.
    pub fn display_text(&self) -> String {
        fn join<T: fmt::Display>(vs: &[Option<T>]) -> String {
            vs.iter()
                .map(|v| match v {
                    Some(v) => v.to_string(),
                    None => ".".to_string(),
                })
                .collect::<Vec<_>>()
                .join(",")
        }
        match self {
            Value::Missing => ".".to_string(),
            Value::Uint(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Char(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Uints(vs) => join(vs),
            Value::Ints(vs) => join(vs),
            Value::Floats(vs) => join(vs),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Big-endian element primitives
// ------------------------------------------------------------------------------------------------

#[inline]
fn push_be(out: &mut Vec<u8>, v: u64, size: usize) {
    out.extend_from_slice(&v.to_be_bytes()[8 - size..]);
}

#[inline]
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Append the stored form of an unsigned integer element (`None` =
/// missing). The value must already be range-checked.
pub(crate) fn push_uint(out: &mut Vec<u8>, v: Option<u64>, size: usize) {
    let stored = match v {
        Some(v) => v + 1,
        None => 0,
    };
    push_be(out, stored, size);
}

/// Read back an unsigned integer element; `None` = missing.
pub(crate) fn read_uint(bytes: &[u8]) -> Option<u64> {
    match read_be(bytes) {
        0 => None,
        stored => Some(stored - 1),
    }
}

/// Append the stored form of a signed integer element (`None` = missing).
pub(crate) fn push_int(out: &mut Vec<u8>, v: Option<i64>, size: usize) {
    let stored = match v {
        Some(v) => {
            let bias = 1i128 << (8 * size - 1);
            (i128::from(v) + bias) as u64
        }
        None => 0,
    };
    push_be(out, stored, size);
}

/// Read back a signed integer element; `None` = missing.
pub(crate) fn read_int(bytes: &[u8]) -> Option<i64> {
    let stored = read_be(bytes);
    if stored == 0 {
        return None;
    }
    let bias = 1i128 << (8 * bytes.len() - 1);
    Some((i128::from(stored) - bias) as i64)
}

#[inline]
fn key_bits64(bits: u64) -> u64 {
    if bits & SIGN64 == 0 { bits | SIGN64 } else { !bits }
}

#[inline]
fn unkey_bits64(key: u64) -> u64 {
    if key & SIGN64 != 0 { key ^ SIGN64 } else { !key }
}

#[inline]
fn key_bits32(bits: u32) -> u32 {
    if bits & SIGN32 == 0 { bits | SIGN32 } else { !bits }
}

#[inline]
fn unkey_bits32(key: u32) -> u32 {
    if key & SIGN32 != 0 { key ^ SIGN32 } else { !key }
}

#[inline]
fn key_bits16(bits: u16) -> u16 {
    if bits & SIGN16 == 0 { bits | SIGN16 } else { !bits }
}

#[inline]
fn unkey_bits16(key: u16) -> u16 {
    if key & SIGN16 != 0 { key ^ SIGN16 } else { !key }
}

/// Append the stored form of a float element (`None` = missing).
///
/// NaN inputs are canonicalized to a pattern distinct from the missing
/// marker so they survive a round trip.
pub(crate) fn push_float(out: &mut Vec<u8>, v: Option<f64>, size: usize) {
    match size {
        8 => {
            let bits = match v {
                None => MISSING_F64_BITS,
                Some(x) if x.is_nan() => NAN_F64_BITS,
                Some(x) => x.to_bits(),
            };
            push_be(out, key_bits64(bits), 8);
        }
        4 => {
            let bits = match v {
                None => MISSING_F32_BITS,
                Some(x) if x.is_nan() => NAN_F32_BITS,
                Some(x) => (x as f32).to_bits(),
            };
            push_be(out, u64::from(key_bits32(bits)), 4);
        }
        2 => {
            let bits = match v {
                None => MISSING_F16_BITS,
                Some(x) if x.is_nan() => NAN_F16_BITS,
                Some(x) => half::f32_to_f16_bits(x as f32),
            };
            push_be(out, u64::from(key_bits16(bits)), 2);
        }
        _ => unreachable!("float element size validated at column construction"),
    }
}

/// Read back a float element; `None` = missing.
pub(crate) fn read_float(bytes: &[u8]) -> Option<f64> {
    match bytes.len() {
        8 => {
            let bits = unkey_bits64(read_be(bytes));
            if bits == MISSING_F64_BITS {
                None
            } else {
                Some(f64::from_bits(bits))
            }
        }
        4 => {
            let bits = unkey_bits32(read_be(bytes) as u32);
            if bits == MISSING_F32_BITS {
                None
            } else {
                Some(f64::from(f32::from_bits(bits)))
            }
        }
        2 => {
            let bits = unkey_bits16(read_be(bytes) as u16);
            if bits == MISSING_F16_BITS {
                None
            } else {
                Some(f64::from(half::f16_bits_to_f32(bits)))
            }
        }
        _ => unreachable!("float element size validated at column construction"),
    }
}

/// Append the missing marker for one element of the given type.
fn push_missing_element(out: &mut Vec<u8>, element_type: ElementType, size: usize) {
    match element_type {
        ElementType::Uint => push_uint(out, None, size),
        ElementType::Int => push_int(out, None, size),
        ElementType::Float => push_float(out, None, size),
        ElementType::Char => out.push(0),
    }
}

/// The stored bytes of a whole-column-missing fixed slot.
pub(crate) fn missing_fixed_slot(col: &Column) -> Vec<u8> {
    let n = match col.element_count() {
        ElementCount::Fixed(n) => n,
        ElementCount::Variable => return Vec::new(),
    };
    let mut out = Vec::with_capacity(n * col.element_size());
    for _ in 0..n {
        push_missing_element(&mut out, col.element_type(), col.element_size());
    }
    out
}

// ------------------------------------------------------------------------------------------------
// Range and shape validation
// ------------------------------------------------------------------------------------------------

fn uint_range_checked(col: &Column, v: u64) -> Result<u64> {
    let (min, max) = uint_bounds(col.element_size());
    if v > max {
        return Err(Error::ValueOutOfRange {
            column: col.name().to_string(),
            value: v.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(v)
}

fn int_range_checked(col: &Column, v: i64) -> Result<i64> {
    let (min, max) = int_bounds(col.element_size());
    if v < min || v > max {
        return Err(Error::ValueOutOfRange {
            column: col.name().to_string(),
            value: v.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(v)
}

fn count_mismatch(col: &Column, actual: usize) -> Error {
    let expected = match col.element_count() {
        ElementCount::Fixed(n) => n.to_string(),
        ElementCount::Variable => format!("0..={MAX_NUM_ELEMENTS}"),
    };
    Error::CountMismatch {
        column: col.name().to_string(),
        expected,
        actual,
    }
}

fn type_mismatch(col: &Column, value: &Value) -> Error {
    Error::invalid(format!(
        "column '{}' of type {} cannot accept a {} value",
        col.name(),
        col.element_type(),
        value.type_name()
    ))
}

fn data_corrupt(msg: &str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg.to_string()))
}

// ------------------------------------------------------------------------------------------------
// Column value encoding
// ------------------------------------------------------------------------------------------------

/// Encode one column value to its stored bytes.
///
/// Returns `None` for a whole-column missing value. For fixed-count
/// columns the result is exactly `count * size` bytes; for variable
/// columns it is the variable-region payload (possibly empty).
///
/// # Errors
///
/// [`Error::ValueOutOfRange`] for scalars outside the column range,
/// [`Error::CountMismatch`] for the wrong number of elements, and
/// [`Error::InvalidArgument`] for a value of the wrong kind.
pub(crate) fn encode_column_value(col: &Column, value: &Value) -> Result<Option<Vec<u8>>> {
    if matches!(value, Value::Missing) {
        return Ok(None);
    }
    let bytes = match col.element_count() {
        ElementCount::Fixed(n) => encode_fixed(col, n, value)?,
        ElementCount::Variable => encode_variable(col, value)?,
    };
    Ok(Some(bytes))
}

fn encode_fixed(col: &Column, n: usize, value: &Value) -> Result<Vec<u8>> {
    let size = col.element_size();
    let mut out = Vec::with_capacity(n * size);
    match col.element_type() {
        ElementType::Uint => match value {
            Value::Uint(v) => {
                if n != 1 {
                    return Err(count_mismatch(col, 1));
                }
                push_uint(&mut out, Some(uint_range_checked(col, *v)?), size);
            }
            Value::Uints(vs) => {
                if vs.len() != n {
                    return Err(count_mismatch(col, vs.len()));
                }
                for v in vs {
                    if let Some(v) = v {
                        uint_range_checked(col, *v)?;
                    }
                    push_uint(&mut out, *v, size);
                }
            }
            other => return Err(type_mismatch(col, other)),
        },
        ElementType::Int => match value {
            Value::Int(v) => {
                if n != 1 {
                    return Err(count_mismatch(col, 1));
                }
                push_int(&mut out, Some(int_range_checked(col, *v)?), size);
            }
            Value::Ints(vs) => {
                if vs.len() != n {
                    return Err(count_mismatch(col, vs.len()));
                }
                for v in vs {
                    if let Some(v) = v {
                        int_range_checked(col, *v)?;
                    }
                    push_int(&mut out, *v, size);
                }
            }
            other => return Err(type_mismatch(col, other)),
        },
        ElementType::Float => match value {
            Value::Float(v) => {
                if n != 1 {
                    return Err(count_mismatch(col, 1));
                }
                push_float(&mut out, Some(*v), size);
            }
            Value::Floats(vs) => {
                if vs.len() != n {
                    return Err(count_mismatch(col, vs.len()));
                }
                for v in vs {
                    push_float(&mut out, *v, size);
                }
            }
            other => return Err(type_mismatch(col, other)),
        },
        ElementType::Char => match value {
            Value::Char(bytes) => {
                if bytes.len() != n {
                    return Err(count_mismatch(col, bytes.len()));
                }
                out.extend_from_slice(bytes);
            }
            other => return Err(type_mismatch(col, other)),
        },
    }
    Ok(out)
}

fn encode_variable(col: &Column, value: &Value) -> Result<Vec<u8>> {
    let size = col.element_size();
    let mut out = Vec::new();
    match col.element_type() {
        ElementType::Uint => match value {
            Value::Uints(vs) => {
                if vs.len() > MAX_NUM_ELEMENTS {
                    return Err(count_mismatch(col, vs.len()));
                }
                for v in vs {
                    if let Some(v) = v {
                        uint_range_checked(col, *v)?;
                    }
                    push_uint(&mut out, *v, size);
                }
            }
            other => return Err(type_mismatch(col, other)),
        },
        ElementType::Int => match value {
            Value::Ints(vs) => {
                if vs.len() > MAX_NUM_ELEMENTS {
                    return Err(count_mismatch(col, vs.len()));
                }
                for v in vs {
                    if let Some(v) = v {
                        int_range_checked(col, *v)?;
                    }
                    push_int(&mut out, *v, size);
                }
            }
            other => return Err(type_mismatch(col, other)),
        },
        ElementType::Float => match value {
            Value::Floats(vs) => {
                if vs.len() > MAX_NUM_ELEMENTS {
                    return Err(count_mismatch(col, vs.len()));
                }
                for v in vs {
                    push_float(&mut out, *v, size);
                }
            }
            other => return Err(type_mismatch(col, other)),
        },
        ElementType::Char => match value {
            Value::Char(bytes) => {
                if bytes.len() > MAX_NUM_ELEMENTS {
                    return Err(count_mismatch(col, bytes.len()));
                }
                out.extend_from_slice(bytes);
            }
            other => return Err(type_mismatch(col, other)),
        },
    }
    Ok(out)
}

// ------------------------------------------------------------------------------------------------
// Text parsing
// ------------------------------------------------------------------------------------------------

/// Parse a human-readable value for a column and encode it like
/// [`encode_column_value`]. Numeric multi-element values are
/// comma-separated; char values are taken as raw bytes.
pub(crate) fn parse_text_value(col: &Column, text: &[u8]) -> Result<Option<Vec<u8>>> {
    if col.element_type() == ElementType::Char {
        return encode_column_value(col, &Value::Char(text.to_vec()));
    }
    let s = std::str::from_utf8(text).map_err(|_| {
        Error::invalid(format!(
            "non-UTF-8 text for numeric column '{}'",
            col.name()
        ))
    })?;
    let value = if col.element_count() == ElementCount::Fixed(1) {
        parse_scalar(col, s)?
    } else {
        parse_sequence(col, s)?
    };
    encode_column_value(col, &value)
}

fn parse_scalar(col: &Column, s: &str) -> Result<Value> {
    let bad = || Error::invalid(format!("cannot parse '{s}' for column '{}'", col.name()));
    Ok(match col.element_type() {
        ElementType::Uint => Value::Uint(s.parse::<u64>().map_err(|_| bad())?),
        ElementType::Int => Value::Int(s.parse::<i64>().map_err(|_| bad())?),
        ElementType::Float => Value::Float(s.parse::<f64>().map_err(|_| bad())?),
        ElementType::Char => unreachable!("char handled by the caller"),
    })
}

fn parse_sequence(col: &Column, s: &str) -> Result<Value> {
    let tokens: Vec<&str> = s.split(',').collect();
    Ok(match col.element_type() {
        ElementType::Uint => {
            let mut vs = Vec::with_capacity(tokens.len());
            for t in &tokens {
                vs.push(Some(t.parse::<u64>().map_err(|_| {
                    Error::invalid(format!("cannot parse '{t}' for column '{}'", col.name()))
                })?));
            }
            Value::Uints(vs)
        }
        ElementType::Int => {
            let mut vs = Vec::with_capacity(tokens.len());
            for t in &tokens {
                vs.push(Some(t.parse::<i64>().map_err(|_| {
                    Error::invalid(format!("cannot parse '{t}' for column '{}'", col.name()))
                })?));
            }
            Value::Ints(vs)
        }
        ElementType::Float => {
            let mut vs = Vec::with_capacity(tokens.len());
            for t in &tokens {
                vs.push(Some(t.parse::<f64>().map_err(|_| {
                    Error::invalid(format!("cannot parse '{t}' for column '{}'", col.name()))
                })?));
            }
            Value::Floats(vs)
        }
        ElementType::Char => unreachable!("char handled by the caller"),
    })
}

// ------------------------------------------------------------------------------------------------
// Row layout
// ------------------------------------------------------------------------------------------------

/// Precomputed per-table layout: the fixed-region slot offset of every
/// column.
#[derive(Debug, Clone)]
pub(crate) struct RowLayout {
    slot_offsets: Vec<usize>,
    fixed_region_size: usize,
}

impl RowLayout {
    pub(crate) fn new(schema: &Schema) -> Self {
        let mut slot_offsets = Vec::with_capacity(schema.num_columns());
        let mut offset = 0;
        for col in schema.columns() {
            slot_offsets.push(offset);
            offset += col.fixed_region_contribution();
        }
        Self {
            slot_offsets,
            fixed_region_size: offset,
        }
    }

    pub(crate) fn fixed_region_size(&self) -> usize {
        self.fixed_region_size
    }

    pub(crate) fn slot_offset(&self, position: usize) -> usize {
        self.slot_offsets[position]
    }
}

// ------------------------------------------------------------------------------------------------
// Row assembly
// ------------------------------------------------------------------------------------------------

/// Pack a row from staged per-column bytes (as produced by
/// [`encode_column_value`]; `None` = missing) into its on-disk form.
///
/// # Errors
///
/// [`Error::RowTooLarge`] when the packed row would exceed
/// [`MAX_ROW_SIZE`].
pub(crate) fn assemble_row(
    schema: &Schema,
    layout: &RowLayout,
    row_id: u64,
    staged: &[Option<Vec<u8>>],
) -> Result<Vec<u8>> {
    debug_assert_eq!(staged.len(), schema.num_columns());
    let mut row = vec![0u8; layout.fixed_region_size()];

    let id_col = &schema.columns()[0];
    let (_, id_max) = uint_bounds(id_col.element_size());
    if row_id > id_max {
        return Err(Error::invalid(format!(
            "row id {row_id} exceeds the capacity of the row-id column"
        )));
    }
    let mut id_slot = Vec::with_capacity(id_col.element_size());
    push_uint(&mut id_slot, Some(row_id), id_col.element_size());
    row[..id_slot.len()].copy_from_slice(&id_slot);

    for (j, col) in schema.columns().iter().enumerate().skip(1) {
        let slot = layout.slot_offset(j);
        match col.element_count() {
            ElementCount::Fixed(_) => match &staged[j] {
                Some(bytes) => row[slot..slot + bytes.len()].copy_from_slice(bytes),
                None => {
                    let missing = missing_fixed_slot(col);
                    row[slot..slot + missing.len()].copy_from_slice(&missing);
                }
            },
            ElementCount::Variable => {
                let (offset, length): (u16, u16) = match &staged[j] {
                    None => (0, 0),
                    Some(payload) if payload.is_empty() => (VAR_OFFSET_EMPTY, 0),
                    Some(payload) => {
                        let at = row.len();
                        if at + payload.len() > MAX_ROW_SIZE {
                            return Err(Error::RowTooLarge {
                                size: at + payload.len(),
                                max: MAX_ROW_SIZE,
                            });
                        }
                        row.extend_from_slice(payload);
                        (at as u16, payload.len() as u16)
                    }
                };
                row[slot..slot + 2].copy_from_slice(&offset.to_be_bytes());
                row[slot + 2..slot + 4].copy_from_slice(&length.to_be_bytes());
            }
        }
    }
    if row.len() > MAX_ROW_SIZE {
        return Err(Error::RowTooLarge {
            size: row.len(),
            max: MAX_ROW_SIZE,
        });
    }
    Ok(row)
}

// ------------------------------------------------------------------------------------------------
// Row decoding
// ------------------------------------------------------------------------------------------------

/// Decode a stored row into the values of the requested column positions,
/// in the requested order. Columns not requested are skipped entirely.
pub(crate) fn decode_row(
    schema: &Schema,
    layout: &RowLayout,
    bytes: &[u8],
    positions: &[usize],
) -> Result<Row> {
    positions
        .iter()
        .map(|&j| decode_column(schema, layout, bytes, j))
        .collect()
}

/// Decode the value of one column from a stored row.
pub(crate) fn decode_column(
    schema: &Schema,
    layout: &RowLayout,
    bytes: &[u8],
    position: usize,
) -> Result<Value> {
    let col = schema
        .column(position)
        .ok_or_else(|| Error::invalid(format!("column position {position} out of range")))?;
    let slot = layout.slot_offset(position);
    match col.element_count() {
        ElementCount::Fixed(n) => {
            let width = n * col.element_size();
            let data = bytes
                .get(slot..slot + width)
                .ok_or_else(|| data_corrupt("row shorter than its fixed region"))?;
            Ok(decode_fixed(col, n, data))
        }
        ElementCount::Variable => {
            let descriptor = bytes
                .get(slot..slot + VAR_DESCRIPTOR_SIZE)
                .ok_or_else(|| data_corrupt("row shorter than its fixed region"))?;
            let offset = u16::from_be_bytes([descriptor[0], descriptor[1]]);
            let length = usize::from(u16::from_be_bytes([descriptor[2], descriptor[3]]));
            if length == 0 {
                return Ok(if offset == VAR_OFFSET_EMPTY {
                    empty_value(col)
                } else {
                    Value::Missing
                });
            }
            let start = usize::from(offset);
            let data = bytes
                .get(start..start + length)
                .ok_or_else(|| data_corrupt("variable value descriptor out of bounds"))?;
            decode_variable(col, data)
        }
    }
}

fn decode_fixed(col: &Column, n: usize, data: &[u8]) -> Value {
    let size = col.element_size();
    match col.element_type() {
        ElementType::Char => {
            if data.iter().all(|&b| b == 0) {
                Value::Missing
            } else {
                Value::Char(data.to_vec())
            }
        }
        ElementType::Uint => {
            if n == 1 {
                match read_uint(data) {
                    Some(v) => Value::Uint(v),
                    None => Value::Missing,
                }
            } else {
                let vs: Vec<Option<u64>> = data.chunks(size).map(read_uint).collect();
                if vs.iter().all(Option::is_none) {
                    Value::Missing
                } else {
                    Value::Uints(vs)
                }
            }
        }
        ElementType::Int => {
            if n == 1 {
                match read_int(data) {
                    Some(v) => Value::Int(v),
                    None => Value::Missing,
                }
            } else {
                let vs: Vec<Option<i64>> = data.chunks(size).map(read_int).collect();
                if vs.iter().all(Option::is_none) {
                    Value::Missing
                } else {
                    Value::Ints(vs)
                }
            }
        }
        ElementType::Float => {
            if n == 1 {
                match read_float(data) {
                    Some(v) => Value::Float(v),
                    None => Value::Missing,
                }
            } else {
                let vs: Vec<Option<f64>> = data.chunks(size).map(read_float).collect();
                if vs.iter().all(Option::is_none) {
                    Value::Missing
                } else {
                    Value::Floats(vs)
                }
            }
        }
    }
}

fn decode_variable(col: &Column, data: &[u8]) -> Result<Value> {
    let size = col.element_size();
    match col.element_type() {
        ElementType::Char => Ok(Value::Char(data.to_vec())),
        numeric => {
            if data.len() % size != 0 {
                return Err(data_corrupt("variable payload is not a whole number of elements"));
            }
            Ok(match numeric {
                ElementType::Uint => Value::Uints(data.chunks(size).map(read_uint).collect()),
                ElementType::Int => Value::Ints(data.chunks(size).map(read_int).collect()),
                ElementType::Float => Value::Floats(data.chunks(size).map(read_float).collect()),
                ElementType::Char => unreachable!("char handled above"),
            })
        }
    }
}

fn empty_value(col: &Column) -> Value {
    match col.element_type() {
        ElementType::Char => Value::Char(Vec::new()),
        ElementType::Uint => Value::Uints(Vec::new()),
        ElementType::Int => Value::Ints(Vec::new()),
        ElementType::Float => Value::Floats(Vec::new()),
    }
}

// ------------------------------------------------------------------------------------------------
// Row-id keys
// ------------------------------------------------------------------------------------------------

/// Order-preserving store key of a row id.
pub(crate) fn encode_row_id_key(row_id: u64, size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size);
    push_uint(&mut out, Some(row_id), size);
    out
}

/// Recover a row id from its store key.
pub(crate) fn decode_row_id_key(bytes: &[u8]) -> Result<u64> {
    read_uint(bytes).ok_or_else(|| data_corrupt("row-id key holds the missing marker"))
}
