//! Row staging buffer for the append path.
//!
//! [`RowBuffer`] holds two things for an open writer:
//!
//! - the *staged row*: the encoded bytes of each column value inserted so
//!   far for the row under construction, with a running size check so an
//!   oversized row is rejected at insert time, before anything is
//!   committed;
//! - the *pending region*: packed rows that have been committed but not
//!   yet written to the data file. Rows accumulate until the buffer
//!   capacity is reached and are then appended to the file in one large
//!   contiguous write.

use crate::error::{Error, Result};
use crate::schema::{ElementCount, MAX_ROW_SIZE, Schema};

/// Default capacity of the pending region (1 MiB).
pub(crate) const DEFAULT_DATA_BUFFER_SIZE: usize = 1024 * 1024;

/// Staging area for the current row and for committed-but-unflushed row
/// bytes.
pub(crate) struct RowBuffer {
    staged: Vec<Option<Vec<u8>>>,
    variable: Vec<bool>,
    fixed_region_size: usize,
    staged_var_bytes: usize,
    pending: Vec<u8>,
    capacity: usize,
}

impl RowBuffer {
    pub(crate) fn new(schema: &Schema, capacity: usize) -> Self {
        let variable = schema
            .columns()
            .iter()
            .map(|c| c.element_count() == ElementCount::Variable)
            .collect::<Vec<_>>();
        Self {
            staged: vec![None; schema.num_columns()],
            variable,
            fixed_region_size: schema.fixed_region_size(),
            staged_var_bytes: 0,
            pending: Vec::with_capacity(capacity.min(DEFAULT_DATA_BUFFER_SIZE)),
            capacity,
        }
    }

    /// Stage the encoded bytes of one column for the current row,
    /// replacing any previously staged value for that column.
    ///
    /// # Errors
    ///
    /// [`Error::RowTooLarge`] when the staged row would exceed
    /// [`MAX_ROW_SIZE`]; the previous staging is left untouched.
    pub(crate) fn stage(&mut self, position: usize, bytes: Option<Vec<u8>>) -> Result<()> {
        if self.variable[position] {
            let old = self.staged[position]
                .as_ref()
                .map_or(0, Vec::len);
            let new = bytes.as_ref().map_or(0, Vec::len);
            let total = self.fixed_region_size + self.staged_var_bytes - old + new;
            if total > MAX_ROW_SIZE {
                return Err(Error::RowTooLarge {
                    size: total,
                    max: MAX_ROW_SIZE,
                });
            }
            self.staged_var_bytes = self.staged_var_bytes - old + new;
        }
        self.staged[position] = bytes;
        Ok(())
    }

    /// The staged column bytes of the current row.
    pub(crate) fn staged(&self) -> &[Option<Vec<u8>>] {
        &self.staged
    }

    /// Reset the staging area for the next row.
    pub(crate) fn clear_staged(&mut self) {
        for slot in &mut self.staged {
            *slot = None;
        }
        self.staged_var_bytes = 0;
    }

    /// True when appending `row_len` more bytes would overflow the
    /// pending region.
    pub(crate) fn needs_flush(&self, row_len: usize) -> bool {
        !self.pending.is_empty() && self.pending.len() + row_len > self.capacity
    }

    /// Append a packed row to the pending region.
    pub(crate) fn push_row(&mut self, row: &[u8]) {
        self.pending.extend_from_slice(row);
    }

    /// Drain the pending region for a contiguous file write.
    pub(crate) fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    /// Bytes currently pending.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ElementCount, MAX_NUM_ELEMENTS, Schema};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::uint("row_id", "", 4, ElementCount::Fixed(1)).unwrap(),
            Column::uint("u", "", 2, ElementCount::Fixed(1)).unwrap(),
            Column::int("v", "", 8, ElementCount::Variable).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn staging_replaces_previous_value() {
        let schema = schema();
        let mut buffer = RowBuffer::new(&schema, 1024);
        buffer.stage(1, Some(vec![0, 1])).unwrap();
        buffer.stage(1, Some(vec![0, 2])).unwrap();
        assert_eq!(buffer.staged()[1], Some(vec![0, 2]));
        buffer.stage(1, None).unwrap();
        assert_eq!(buffer.staged()[1], None);
    }

    #[test]
    fn oversized_variable_staging_rejected() {
        let schema = schema();
        let mut buffer = RowBuffer::new(&schema, 1024);
        // one full variable value fits
        buffer
            .stage(2, Some(vec![0; MAX_NUM_ELEMENTS * 8]))
            .unwrap();
        // replacing it with another full value is not cumulative
        buffer
            .stage(2, Some(vec![0; MAX_NUM_ELEMENTS * 8]))
            .unwrap();
        // a payload beyond the row limit is rejected and the previous
        // staging survives
        let err = buffer.stage(2, Some(vec![0; MAX_ROW_SIZE])).unwrap_err();
        assert!(matches!(err, Error::RowTooLarge { .. }));
        assert_eq!(
            buffer.staged()[2].as_ref().map(Vec::len),
            Some(MAX_NUM_ELEMENTS * 8)
        );
    }

    #[test]
    fn clear_resets_size_accounting() {
        let schema = schema();
        let mut buffer = RowBuffer::new(&schema, 1024);
        buffer.stage(2, Some(vec![0; 1000])).unwrap();
        buffer.clear_staged();
        assert!(buffer.staged().iter().all(Option::is_none));
        // the full budget is available again
        buffer
            .stage(2, Some(vec![0; MAX_ROW_SIZE - 100]))
            .unwrap();
    }

    #[test]
    fn pending_region_flush_threshold() {
        let schema = schema();
        let mut buffer = RowBuffer::new(&schema, 64);
        assert!(!buffer.needs_flush(1000));
        buffer.push_row(&[1; 40]);
        assert!(!buffer.needs_flush(20));
        assert!(buffer.needs_flush(40));
        let drained = buffer.take_pending();
        assert_eq!(drained.len(), 40);
        assert_eq!(buffer.pending_len(), 0);
    }
}
