//! Composite key encoding for secondary indexes.
//!
//! An index key concatenates the order-preserving element encodings of its
//! key columns (see [`crate::codec`]) and appends the row id in the same
//! encoding, so entries with equal column values stay unique and sort by
//! row id. All admissible key columns are fixed-width, which keeps the
//! composite width constant and lets prefix probes operate on plain byte
//! prefixes.
//!
//! A non-zero bucket width `w` quantizes a numeric key value to
//! `⌊v / w⌋ · w` before encoding; values inside one bucket share a key.

use crate::codec::{self, Value};
use crate::error::{Error, Result};
use crate::schema::{Column, ElementCount, ElementType, Schema, int_bounds, uint_bounds};

// ------------------------------------------------------------------------------------------------
// Key column specification
// ------------------------------------------------------------------------------------------------

/// One key column of an index, with its bucket width.
#[derive(Debug, Clone)]
pub(crate) struct KeyColumnSpec {
    /// Position of the column in the parent table.
    pub(crate) position: usize,
    /// The column descriptor.
    pub(crate) column: Column,
    /// Bucket width; 0 = no bucketing.
    pub(crate) bin_width: f64,
}

/// Reject column/width combinations that cannot serve as an index key.
///
/// Admissible key columns hold exactly one logical value per row: numeric
/// columns of element count 1 and fixed-length char columns. Variable
/// columns and multi-element numeric columns are rejected. Bucket widths
/// must be finite and non-negative, and zero for char columns.
pub(crate) fn validate_key_column(column: &Column, bin_width: f64) -> Result<()> {
    match column.element_count() {
        ElementCount::Variable => {
            return Err(Error::invalid(format!(
                "variable-count column '{}' cannot be an index key",
                column.name()
            )));
        }
        ElementCount::Fixed(n) => {
            if column.element_type() != ElementType::Char && n != 1 {
                return Err(Error::invalid(format!(
                    "multi-element column '{}' cannot be an index key",
                    column.name()
                )));
            }
        }
    }
    if !bin_width.is_finite() || bin_width < 0.0 {
        return Err(Error::invalid(format!(
            "bucket width {bin_width} for column '{}' must be finite and non-negative",
            column.name()
        )));
    }
    if column.element_type() == ElementType::Char && bin_width != 0.0 {
        return Err(Error::invalid(format!(
            "char column '{}' does not support bucket widths",
            column.name()
        )));
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Bucket transforms
// ------------------------------------------------------------------------------------------------

/// Quantize an unsigned value. Widths below 2 (after truncation to an
/// integer) are the identity.
fn bucket_uint(v: u64, width: f64, size: usize) -> u64 {
    let w = width as u64;
    if w < 2 {
        return v;
    }
    let bucketed = (v / w) * w;
    let (_, max) = uint_bounds(size);
    bucketed.min(max)
}

/// Quantize a signed value with floor semantics, clamped back into the
/// column range (flooring near the lower bound can otherwise land on the
/// reserved missing value).
fn bucket_int(v: i64, width: f64, size: usize) -> i64 {
    let w = width as i64;
    if w < 2 {
        return v;
    }
    let bucketed = v.div_euclid(w) * w;
    let (min, max) = int_bounds(size);
    bucketed.clamp(min, max)
}

/// Quantize a float value with floor semantics.
fn bucket_float(v: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return v;
    }
    (v / width).floor() * width
}

// ------------------------------------------------------------------------------------------------
// KeyCodec
// ------------------------------------------------------------------------------------------------

/// Encoder/decoder for the composite keys of one index.
#[derive(Debug, Clone)]
pub(crate) struct KeyCodec {
    columns: Vec<KeyColumnSpec>,
    row_id_size: usize,
    composite_width: usize,
}

impl KeyCodec {
    /// Build a codec for the given `(column position, bucket width)` list
    /// against the parent schema.
    pub(crate) fn new(schema: &Schema, keys: &[(usize, f64)]) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::invalid("an index needs at least one key column"));
        }
        let mut columns = Vec::with_capacity(keys.len());
        for &(position, bin_width) in keys {
            let column = schema
                .column(position)
                .ok_or_else(|| {
                    Error::invalid(format!("key column position {position} out of range"))
                })?
                .clone();
            validate_key_column(&column, bin_width)?;
            columns.push(KeyColumnSpec {
                position,
                column,
                bin_width,
            });
        }
        let composite_width = columns
            .iter()
            .map(|k| k.column.fixed_region_contribution())
            .sum();
        Ok(Self {
            columns,
            row_id_size: schema.row_id_size(),
            composite_width,
        })
    }

    /// Number of key columns.
    pub(crate) fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Parent-table positions of the key columns, in order.
    pub(crate) fn positions(&self) -> Vec<usize> {
        self.columns.iter().map(|k| k.position).collect()
    }

    /// Encode a (possibly partial) key prefix with bucket adjustment.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when the prefix is longer than the index
    /// arity or a component has the wrong kind;
    /// [`Error::ValueOutOfRange`] / [`Error::CountMismatch`] for values a
    /// row could not hold either.
    pub(crate) fn encode_prefix(&self, values: &[Value]) -> Result<Vec<u8>> {
        if values.len() > self.columns.len() {
            return Err(Error::invalid(format!(
                "key prefix of length {} exceeds the index arity {}",
                values.len(),
                self.columns.len()
            )));
        }
        let mut out = Vec::with_capacity(self.composite_width + self.row_id_size);
        for (spec, value) in self.columns.iter().zip(values) {
            self.encode_component(spec, value, &mut out)?;
        }
        Ok(out)
    }

    /// Encode the full composite key of a row: all key column values plus
    /// the row-id suffix.
    pub(crate) fn encode_entry_key(&self, values: &[Value], row_id: u64) -> Result<Vec<u8>> {
        debug_assert_eq!(values.len(), self.columns.len());
        let mut key = self.encode_prefix(values)?;
        codec::push_uint(&mut key, Some(row_id), self.row_id_size);
        Ok(key)
    }

    fn encode_component(
        &self,
        spec: &KeyColumnSpec,
        value: &Value,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let col = &spec.column;
        let size = col.element_size();
        match (col.element_type(), value) {
            (ElementType::Uint, Value::Missing) => codec::push_uint(out, None, size),
            (ElementType::Uint, Value::Uint(v)) => {
                let (_, max) = uint_bounds(size);
                if *v > max {
                    return Err(out_of_range(col, &v.to_string()));
                }
                codec::push_uint(out, Some(bucket_uint(*v, spec.bin_width, size)), size);
            }
            (ElementType::Int, Value::Missing) => codec::push_int(out, None, size),
            (ElementType::Int, Value::Int(v)) => {
                let (min, max) = int_bounds(size);
                if *v < min || *v > max {
                    return Err(out_of_range(col, &v.to_string()));
                }
                codec::push_int(out, Some(bucket_int(*v, spec.bin_width, size)), size);
            }
            (ElementType::Float, Value::Missing) => codec::push_float(out, None, size),
            (ElementType::Float, Value::Float(v)) => {
                codec::push_float(out, Some(bucket_float(*v, spec.bin_width)), size);
            }
            (ElementType::Char, Value::Missing) => {
                out.extend(std::iter::repeat_n(0u8, col.fixed_region_contribution()));
            }
            (ElementType::Char, Value::Char(bytes)) => {
                let n = col.fixed_region_contribution();
                if bytes.len() != n {
                    return Err(Error::CountMismatch {
                        column: col.name().to_string(),
                        expected: n.to_string(),
                        actual: bytes.len(),
                    });
                }
                out.extend_from_slice(bytes);
            }
            (_, other) => {
                return Err(Error::invalid(format!(
                    "key component for column '{}' ({}) cannot be a {} value",
                    col.name(),
                    col.element_type(),
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Decode the composite part of an entry key into an arity-length
    /// value tuple. The row-id suffix is ignored.
    pub(crate) fn decode_key(&self, key: &[u8]) -> Result<Vec<Value>> {
        if key.len() < self.composite_width {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "index key shorter than the composite width",
            )));
        }
        let mut values = Vec::with_capacity(self.columns.len());
        let mut offset = 0;
        for spec in &self.columns {
            let col = &spec.column;
            let width = col.fixed_region_contribution();
            let component = &key[offset..offset + width];
            offset += width;
            let value = match col.element_type() {
                ElementType::Uint => match codec::read_uint(component) {
                    Some(v) => Value::Uint(v),
                    None => Value::Missing,
                },
                ElementType::Int => match codec::read_int(component) {
                    Some(v) => Value::Int(v),
                    None => Value::Missing,
                },
                ElementType::Float => match codec::read_float(component) {
                    Some(v) => Value::Float(v),
                    None => Value::Missing,
                },
                ElementType::Char => {
                    if component.iter().all(|&b| b == 0) {
                        Value::Missing
                    } else {
                        Value::Char(component.to_vec())
                    }
                }
            };
            values.push(value);
        }
        Ok(values)
    }

    /// The composite prefix of an entry key.
    pub(crate) fn composite_part<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        &key[..self.composite_width.min(key.len())]
    }
}

fn out_of_range(col: &Column, value: &str) -> Error {
    let (min, max) = match col.element_type() {
        ElementType::Uint => {
            let (min, max) = uint_bounds(col.element_size());
            (min.to_string(), max.to_string())
        }
        ElementType::Int => {
            let (min, max) = int_bounds(col.element_size());
            (min.to_string(), max.to_string())
        }
        _ => ("-inf".to_string(), "inf".to_string()),
    };
    Error::ValueOutOfRange {
        column: col.name().to_string(),
        value: value.to_string(),
        min,
        max,
    }
}
