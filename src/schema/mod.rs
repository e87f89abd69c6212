//! Column descriptors and table schemas.
//!
//! A [`Column`] is the immutable per-column triple (element type, element
//! size, element count) plus a name and free-text description. A [`Schema`]
//! is the validated, ordered column list of a table; the first column is
//! always the unsigned-integer row-id column, assigned automatically on
//! append.
//!
//! The schema determines the row layout: fixed-count columns occupy
//! `count * size` bytes in the fixed region of every row, variable-count
//! columns a 4-byte `(offset, length)` descriptor referring into the
//! variable region (see [`crate::codec`]).

#[cfg(test)]
mod tests;

pub(crate) mod sidecar;

use std::fmt;

use crate::codec::Value;
use crate::error::{Error, Result};

// ------------------------------------------------------------------------------------------------
// Engine constants
// ------------------------------------------------------------------------------------------------

/// Maximum encoded size of a single row in bytes (64 KiB).
pub const MAX_ROW_SIZE: usize = 64 * 1024;

/// Maximum number of elements a single column value may hold.
pub const MAX_NUM_ELEMENTS: usize = 256;

/// Size in bytes of the `(offset, length)` descriptor a variable-count
/// column contributes to the fixed region.
pub(crate) const VAR_DESCRIPTOR_SIZE: usize = 4;

/// Schema sidecar version understood by this engine.
pub const SCHEMA_VERSION: &str = "0.1";

/// Index sidecar version understood by this engine.
pub const INDEX_METADATA_VERSION: &str = "0.1";

// ------------------------------------------------------------------------------------------------
// Element type
// ------------------------------------------------------------------------------------------------

/// The four element kinds a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// Signed integer, 1..=8 bytes.
    Int,
    /// Unsigned integer, 1..=8 bytes.
    Uint,
    /// IEEE-754 float: 2 (half), 4 (single) or 8 (double) bytes.
    Float,
    /// Raw byte, always 1 byte per element.
    Char,
}

impl ElementType {
    /// Name used in the metadata sidecar.
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int => "int",
            ElementType::Uint => "uint",
            ElementType::Float => "float",
            ElementType::Char => "char",
        }
    }

    /// Parse a sidecar type name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "int" => Some(ElementType::Int),
            "uint" => Some(ElementType::Uint),
            "float" => Some(ElementType::Float),
            "char" => Some(ElementType::Char),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ------------------------------------------------------------------------------------------------
// Element count
// ------------------------------------------------------------------------------------------------

/// Number of elements per column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementCount {
    /// Exactly `n` elements in every row.
    Fixed(usize),
    /// 0..=[`MAX_NUM_ELEMENTS`] elements, varying per row.
    Variable,
}

impl ElementCount {
    /// True for variable-count columns.
    pub fn is_variable(self) -> bool {
        matches!(self, ElementCount::Variable)
    }

    /// The fixed count, if any.
    pub fn fixed(self) -> Option<usize> {
        match self {
            ElementCount::Fixed(n) => Some(n),
            ElementCount::Variable => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Numeric ranges
// ------------------------------------------------------------------------------------------------

/// Inclusive range of a signed integer element of `size` bytes.
///
/// The lowest representable value is reserved as the missing marker, so
/// the range is symmetric: `[-2^(8s-1)+1, 2^(8s-1)-1]`.
pub(crate) fn int_bounds(size: usize) -> (i64, i64) {
    if size >= 8 {
        (i64::MIN + 1, i64::MAX)
    } else {
        let max = (1i64 << (8 * size - 1)) - 1;
        (-max, max)
    }
}

/// Inclusive range of an unsigned integer element of `size` bytes.
///
/// The all-ones value is reserved as the missing marker: `[0, 2^(8s)-2]`.
pub(crate) fn uint_bounds(size: usize) -> (u64, u64) {
    if size >= 8 {
        (0, u64::MAX - 1)
    } else {
        (0, (1u64 << (8 * size)) - 2)
    }
}

// ------------------------------------------------------------------------------------------------
// Column
// ------------------------------------------------------------------------------------------------

/// Immutable description of a single table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    description: String,
    element_type: ElementType,
    element_size: usize,
    element_count: ElementCount,
}

impl Column {
    /// Create a column descriptor, validating name, size and count.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty name, a size outside the
    /// per-type bounds of the data model, or a fixed count outside
    /// `1..=MAX_NUM_ELEMENTS`.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        element_type: ElementType,
        element_size: usize,
        element_count: ElementCount,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid("column name must not be empty"));
        }
        let size_ok = match element_type {
            ElementType::Int | ElementType::Uint => (1..=8).contains(&element_size),
            ElementType::Float => matches!(element_size, 2 | 4 | 8),
            ElementType::Char => element_size == 1,
        };
        if !size_ok {
            return Err(Error::invalid(format!(
                "element size {element_size} not supported for {element_type} column '{name}'"
            )));
        }
        if let ElementCount::Fixed(n) = element_count {
            if n == 0 || n > MAX_NUM_ELEMENTS {
                return Err(Error::invalid(format!(
                    "fixed element count {n} outside 1..={MAX_NUM_ELEMENTS} for column '{name}'"
                )));
            }
        }
        Ok(Self {
            name,
            description: description.into(),
            element_type,
            element_size,
            element_count,
        })
    }

    /// Shorthand for an unsigned integer column.
    pub fn uint(name: &str, description: &str, size: usize, count: ElementCount) -> Result<Self> {
        Self::new(name, description, ElementType::Uint, size, count)
    }

    /// Shorthand for a signed integer column.
    pub fn int(name: &str, description: &str, size: usize, count: ElementCount) -> Result<Self> {
        Self::new(name, description, ElementType::Int, size, count)
    }

    /// Shorthand for a float column.
    pub fn float(name: &str, description: &str, size: usize, count: ElementCount) -> Result<Self> {
        Self::new(name, description, ElementType::Float, size, count)
    }

    /// Shorthand for a char column (element size is always 1).
    pub fn char(name: &str, description: &str, count: ElementCount) -> Result<Self> {
        Self::new(name, description, ElementType::Char, 1, count)
    }

    /// The row-id column every table starts with.
    pub(crate) fn row_id(size: usize) -> Result<Self> {
        Self::uint("row_id", "Primary key column", size, ElementCount::Fixed(1))
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-text description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Element kind.
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Bytes per element.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Elements per value.
    pub fn element_count(&self) -> ElementCount {
        self.element_count
    }

    /// Smallest non-missing element value, for numeric columns.
    pub fn min_element(&self) -> Option<Value> {
        match self.element_type {
            ElementType::Int => Some(Value::Int(int_bounds(self.element_size).0)),
            ElementType::Uint => Some(Value::Uint(uint_bounds(self.element_size).0)),
            ElementType::Float => Some(Value::Float(f64::NEG_INFINITY)),
            ElementType::Char => None,
        }
    }

    /// Largest non-missing element value, for numeric columns.
    pub fn max_element(&self) -> Option<Value> {
        match self.element_type {
            ElementType::Int => Some(Value::Int(int_bounds(self.element_size).1)),
            ElementType::Uint => Some(Value::Uint(uint_bounds(self.element_size).1)),
            ElementType::Float => Some(Value::Float(f64::INFINITY)),
            ElementType::Char => None,
        }
    }

    /// Bytes this column contributes to the fixed region of every row.
    pub fn fixed_region_contribution(&self) -> usize {
        match self.element_count {
            ElementCount::Fixed(n) => n * self.element_size,
            ElementCount::Variable => VAR_DESCRIPTOR_SIZE,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element_count {
            ElementCount::Fixed(n) => {
                write!(f, "'{}':{}({}x{})", self.name, self.element_type, self.element_size, n)
            }
            ElementCount::Variable => {
                write!(f, "'{}':{}({}xvar)", self.name, self.element_type, self.element_size)
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Schema
// ------------------------------------------------------------------------------------------------

/// Validated, ordered column list of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    fixed_region_size: usize,
}

impl Schema {
    /// Build a schema from an ordered column list.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when the list has fewer than two columns,
    /// the first column is not a single-element unsigned integer, a name
    /// appears twice, or the fixed region would exceed
    /// [`MAX_ROW_SIZE`].
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if columns.len() < 2 {
            return Err(Error::invalid(
                "a table needs the row-id column and at least one data column",
            ));
        }
        let key = &columns[0];
        if key.element_type() != ElementType::Uint
            || key.element_count() != ElementCount::Fixed(1)
        {
            return Err(Error::invalid(
                "the first column must be a single-element unsigned integer row-id column",
            ));
        }
        for (j, col) in columns.iter().enumerate() {
            if columns[..j].iter().any(|c| c.name() == col.name()) {
                return Err(Error::invalid(format!(
                    "duplicate column name '{}'",
                    col.name()
                )));
            }
        }
        let fixed_region_size: usize = columns
            .iter()
            .map(Column::fixed_region_contribution)
            .sum();
        if fixed_region_size > MAX_ROW_SIZE {
            return Err(Error::invalid(format!(
                "fixed region of {fixed_region_size} bytes exceeds the row size limit of {MAX_ROW_SIZE}"
            )));
        }
        Ok(Self {
            columns,
            fixed_region_size,
        })
    }

    /// The ordered column list.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns, including the row-id column.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column at `position`, if any.
    pub fn column(&self, position: usize) -> Option<&Column> {
        self.columns.get(position)
    }

    /// Position of the column named `name`, if any.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Constant size of the fixed region; the minimum size of any row.
    pub fn fixed_region_size(&self) -> usize {
        self.fixed_region_size
    }

    /// Element size of the row-id column.
    pub(crate) fn row_id_size(&self) -> usize {
        self.columns[0].element_size()
    }
}
