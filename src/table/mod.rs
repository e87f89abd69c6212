//! Table store — lifecycle, append path and row retrieval.
//!
//! A [`Table`] lives in a home directory and is backed by three files: the
//! primary store (`table.db`, row-id → row location), the linear data file
//! (`table.db.dat`, the packed row bytes) and the metadata sidecar
//! (`table.xml`).
//!
//! # Lifecycle
//!
//! ```text
//! declare columns → open(Write) → insert/commit rows → close (seal)
//!                                                        │
//! open(Read) → get_row / num_rows / row_iterator → close ┘
//! ```
//!
//! A writer works against `_build_<pid>_` files; a clean [`Table::close`]
//! flushes the write buffer, seals the primary store, promotes both files
//! to their final names and writes the sidecar. A crashed writer leaves
//! only build files behind, which read-opens ignore.
//!
//! Row ids are assigned on commit, starting at zero and strictly
//! ascending, so the primary store receives its keys in sorted order and
//! the data file holds rows in row-id order.
//!
//! # Read handles and iterators
//!
//! Read state lives behind an `Arc`; iterators hold a `Weak` reference
//! and re-validate it on every advance, so advancing an iterator after
//! its table closed fails with [`Error::OperationOnClosed`] instead of
//! touching freed resources.

pub(crate) mod buffer;

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Weak};

use memmap2::Mmap;
use tracing::{debug, info};

use crate::codec::{self, Row, RowLayout, Value};
use crate::db::{DEFAULT_CACHE_SIZE, DbPaths, INDEX_DB_PREFIX, Mode};
use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::error::{Error, Result};
use crate::schema::{Column, ElementCount, ElementType, Schema, sidecar};
use crate::store::builder::StoreWriter;
use crate::store::{CursorPos, StoreReader};

use buffer::{DEFAULT_DATA_BUFFER_SIZE, RowBuffer};

// ------------------------------------------------------------------------------------------------
// Row location (primary store value)
// ------------------------------------------------------------------------------------------------

/// Position of one packed row inside the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowLocation {
    pub(crate) offset: u64,
    pub(crate) length: u32,
}

impl Encode for RowLocation {
    fn encode_to(&self, buf: &mut Vec<u8>) -> std::result::Result<(), EncodingError> {
        self.offset.encode_to(buf)?;
        self.length.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for RowLocation {
    fn decode_from(buf: &[u8]) -> std::result::Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (length, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { offset, length }, off))
    }
}

// ------------------------------------------------------------------------------------------------
// Read-mode state
// ------------------------------------------------------------------------------------------------

/// Shared read state of an open table: schema, primary store and the
/// mapped data file.
pub(crate) struct TableReader {
    pub(crate) schema: Schema,
    pub(crate) layout: RowLayout,
    store: StoreReader,
    /// `None` only when the data file is empty (a table with zero rows).
    data: Option<Mmap>,
}

impl TableReader {
    fn open(paths: &DbPaths, cache_size: u64) -> Result<Self> {
        let schema = sidecar::read_table_metadata(&paths.metadata_path())?;
        let layout = RowLayout::new(&schema);
        let store = StoreReader::open(paths.db_path(), cache_size)?;
        let data_file = File::open(paths.data_path())?;
        let data = if data_file.metadata()?.len() == 0 {
            None
        } else {
            // Safety: the data file is sealed and mapped read-only; row
            // locations are bounds-checked before slicing.
            Some(unsafe { Mmap::map(&data_file)? })
        };
        Ok(Self {
            schema,
            layout,
            store,
            data,
        })
    }

    pub(crate) fn num_rows(&self) -> u64 {
        self.store.entry_count()
    }

    fn data_slice(&self, location: RowLocation) -> Result<&[u8]> {
        let start = usize::try_from(location.offset)
            .map_err(|_| Error::invalid("row offset exceeds the addressable range"))?;
        let end = start + location.length as usize;
        self.data
            .as_deref()
            .and_then(|d| d.get(start..end))
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "row location out of bounds of the data file",
                ))
            })
    }

    /// The packed bytes of one row.
    pub(crate) fn row_bytes(&self, row_id: u64) -> Result<&[u8]> {
        let key = codec::encode_row_id_key(row_id, self.schema.row_id_size());
        let value = self.store.get(&key)?.ok_or(Error::OutOfRange {
            row_id,
            num_rows: self.num_rows(),
        })?;
        let (location, _) = encoding::decode_from_slice::<RowLocation>(&value)
            .map_err(crate::store::StoreError::from)?;
        self.data_slice(location)
    }

    /// Decode one row projected to `positions`.
    pub(crate) fn get_row_projected(&self, row_id: u64, positions: &[usize]) -> Result<Row> {
        let bytes = self.row_bytes(row_id)?;
        codec::decode_row(&self.schema, &self.layout, bytes, positions)
    }

    /// Position a primary-store cursor at `row_id`.
    pub(crate) fn seek_row(&self, row_id: u64) -> Result<CursorPos> {
        let key = codec::encode_row_id_key(row_id, self.schema.row_id_size());
        Ok(self.store.seek(&key)?)
    }

    /// Advance a primary-store cursor, returning the row id and location
    /// of the next row.
    pub(crate) fn next_row(&self, pos: &mut CursorPos) -> Result<Option<(u64, RowLocation)>> {
        let Some((key, value)) = self.store.next_at(pos)? else {
            return Ok(None);
        };
        let row_id = codec::decode_row_id_key(&key)?;
        let (location, _) = encoding::decode_from_slice::<RowLocation>(&value)
            .map_err(crate::store::StoreError::from)?;
        Ok(Some((row_id, location)))
    }

    /// Decode the row at `location` projected to `positions`.
    pub(crate) fn decode_at(&self, location: RowLocation, positions: &[usize]) -> Result<Row> {
        let bytes = self.data_slice(location)?;
        codec::decode_row(&self.schema, &self.layout, bytes, positions)
    }
}

// ------------------------------------------------------------------------------------------------
// Write-mode state
// ------------------------------------------------------------------------------------------------

struct WriteState {
    schema: Schema,
    layout: RowLayout,
    buffer: RowBuffer,
    store: StoreWriter,
    data_file: File,
    flushed_bytes: u64,
    num_rows: u64,
}

impl WriteState {
    fn open(paths: &DbPaths, columns: &[Column]) -> Result<Self> {
        let schema = Schema::new(columns.to_vec())?;
        let layout = RowLayout::new(&schema);
        let store = StoreWriter::create(paths.build_db_path())?;
        let data_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(paths.build_data_path())?;
        let buffer = RowBuffer::new(&schema, DEFAULT_DATA_BUFFER_SIZE);
        Ok(Self {
            schema,
            layout,
            buffer,
            store,
            data_file,
            flushed_bytes: 0,
            num_rows: 0,
        })
    }

    fn check_position(&self, position: usize) -> Result<&Column> {
        if position == 0 {
            return Err(Error::invalid(
                "the row-id column is assigned automatically and cannot be inserted into",
            ));
        }
        self.schema
            .column(position)
            .ok_or_else(|| Error::invalid(format!("column position {position} out of range")))
    }

    fn insert_element(&mut self, position: usize, value: &Value) -> Result<()> {
        let col = self.check_position(position)?;
        let bytes = codec::encode_column_value(col, value)?;
        self.buffer.stage(position, bytes)
    }

    fn insert_encoded_element(&mut self, position: usize, text: &[u8]) -> Result<()> {
        let col = self.check_position(position)?;
        let bytes = codec::parse_text_value(col, text)?;
        self.buffer.stage(position, bytes)
    }

    fn flush_pending(&mut self) -> Result<()> {
        let pending = self.buffer.take_pending();
        if !pending.is_empty() {
            self.data_file.write_all(&pending)?;
            self.flushed_bytes += pending.len() as u64;
        }
        Ok(())
    }

    fn commit_row(&mut self) -> Result<u64> {
        let row_id = self.num_rows;
        let row = codec::assemble_row(&self.schema, &self.layout, row_id, self.buffer.staged())?;

        let key = codec::encode_row_id_key(row_id, self.schema.row_id_size());
        let location = RowLocation {
            offset: self.flushed_bytes + self.buffer.pending_len() as u64,
            length: row.len() as u32,
        };
        let value = encoding::encode_to_vec(&location).map_err(crate::store::StoreError::from)?;

        if self.buffer.needs_flush(row.len()) {
            self.flush_pending()?;
        }
        self.store.put(&key, &value)?;
        self.buffer.push_row(&row);
        self.buffer.clear_staged();
        self.num_rows += 1;
        Ok(row_id)
    }

    fn seal(mut self) -> Result<()> {
        self.flush_pending()?;
        self.data_file.sync_all()?;
        self.store.finish()?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Table
// ------------------------------------------------------------------------------------------------

enum TableState {
    Closed,
    Write(Box<WriteState>),
    Read(Arc<TableReader>),
}

/// The main storage table.
pub struct Table {
    paths: DbPaths,
    cache_size: u64,
    columns: Vec<Column>,
    state: TableState,
}

impl Table {
    /// Allocate an unopened table handle for `homedir`.
    pub fn new(homedir: impl AsRef<Path>) -> Self {
        Self {
            paths: DbPaths::table(homedir),
            cache_size: DEFAULT_CACHE_SIZE,
            columns: Vec::new(),
            state: TableState::Closed,
        }
    }

    /// The home directory of this table.
    pub fn homedir(&self) -> &Path {
        self.paths.homedir()
    }

    /// True when the sealed table files exist.
    pub fn exists(&self) -> bool {
        self.paths.exists() && self.paths.data_path().exists()
    }

    /// True when the table is open in either mode.
    pub fn is_open(&self) -> bool {
        !matches!(self.state, TableState::Closed)
    }

    /// The open mode, if any.
    pub fn open_mode(&self) -> Option<Mode> {
        match self.state {
            TableState::Closed => None,
            TableState::Write(_) => Some(Mode::Write),
            TableState::Read(_) => Some(Mode::Read),
        }
    }

    /// Set the cache size in bytes for subsequent opens.
    pub fn set_cache_size(&mut self, bytes: u64) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        self.cache_size = bytes;
        Ok(())
    }

    /// The declared (or, once opened, effective) column list.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Position of the column named `name`.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Declare a column. Valid only while the table is closed; the first
    /// declared column must be the row-id column (see [`Table::add_id_column`]).
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.is_open() {
            return Err(Error::invalid("cannot add columns to an open table"));
        }
        if self.columns.iter().any(|c| c.name() == column.name()) {
            return Err(Error::invalid(format!(
                "duplicate column name '{}'",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Declare the automatic row-id column with the given size in bytes.
    pub fn add_id_column(&mut self, size: usize) -> Result<()> {
        self.add_column(Column::row_id(size)?)
    }

    /// Declare an unsigned integer column.
    pub fn add_uint_column(
        &mut self,
        name: &str,
        description: &str,
        size: usize,
        count: ElementCount,
    ) -> Result<()> {
        self.add_column(Column::new(name, description, ElementType::Uint, size, count)?)
    }

    /// Declare a signed integer column.
    pub fn add_int_column(
        &mut self,
        name: &str,
        description: &str,
        size: usize,
        count: ElementCount,
    ) -> Result<()> {
        self.add_column(Column::new(name, description, ElementType::Int, size, count)?)
    }

    /// Declare a float column.
    pub fn add_float_column(
        &mut self,
        name: &str,
        description: &str,
        size: usize,
        count: ElementCount,
    ) -> Result<()> {
        self.add_column(Column::new(name, description, ElementType::Float, size, count)?)
    }

    /// Declare a char column.
    pub fn add_char_column(
        &mut self,
        name: &str,
        description: &str,
        count: ElementCount,
    ) -> Result<()> {
        self.add_column(Column::new(name, description, ElementType::Char, 1, count)?)
    }

    /// Open the table.
    ///
    /// In write mode the declared columns become the schema and build
    /// files are created. In read mode the schema is loaded from the
    /// sidecar.
    pub fn open(&mut self, mode: Mode) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        match mode {
            Mode::Write => {
                let state = WriteState::open(&self.paths, &self.columns)?;
                self.columns = state.schema.columns().to_vec();
                self.state = TableState::Write(Box::new(state));
                info!(homedir = %self.paths.homedir().display(), "table opened for writing");
            }
            Mode::Read => {
                if !self.exists() {
                    return Err(Error::NotFound(format!(
                        "table '{}' not found",
                        self.paths.homedir().display()
                    )));
                }
                let reader = TableReader::open(&self.paths, self.cache_size)?;
                self.columns = reader.schema.columns().to_vec();
                self.state = TableState::Read(Arc::new(reader));
                debug!(homedir = %self.paths.homedir().display(), "table opened for reading");
            }
        }
        Ok(())
    }

    /// Close the table. In write mode this flushes and seals the build
    /// files, promotes them to their final names and writes the sidecar;
    /// in read mode it releases the handles. The handle always ends up
    /// closed, even when sealing fails.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, TableState::Closed) {
            TableState::Closed => Err(Error::NotOpen),
            TableState::Read(_) => Ok(()),
            TableState::Write(state) => {
                let schema = state.schema.clone();
                let num_rows = state.num_rows;
                state.seal()?;
                self.paths.promote(true)?;
                sidecar::write_table_metadata(&self.paths.metadata_path(), &schema)?;
                info!(
                    homedir = %self.paths.homedir().display(),
                    num_rows, "table sealed"
                );
                Ok(())
            }
        }
    }

    /// Delete the sealed table files. The table must be closed.
    pub fn delete(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        self.paths.delete(true)?;
        Ok(())
    }

    fn write_state(&mut self) -> Result<&mut WriteState> {
        match &mut self.state {
            TableState::Write(state) => Ok(state),
            TableState::Read(_) => Err(Error::WrongMode {
                required: Mode::Write,
            }),
            TableState::Closed => Err(Error::NotOpen),
        }
    }

    pub(crate) fn read_state(&self) -> Result<&Arc<TableReader>> {
        match &self.state {
            TableState::Read(reader) => Ok(reader),
            TableState::Write(_) => Err(Error::WrongMode {
                required: Mode::Read,
            }),
            TableState::Closed => Err(Error::NotOpen),
        }
    }

    /// Insert a typed value into a column of the row under construction.
    /// Inserting again into the same column replaces the staged value;
    /// inserting [`Value::Missing`] clears it.
    pub fn insert_element(&mut self, position: usize, value: &Value) -> Result<()> {
        self.write_state()?.insert_element(position, value)
    }

    /// Parse a textual value and insert it like [`Table::insert_element`].
    pub fn insert_encoded_element(&mut self, position: usize, text: &[u8]) -> Result<()> {
        self.write_state()?.insert_encoded_element(position, text)
    }

    /// Seal the row under construction: assign the next row id, pack the
    /// staged values and queue the row for the data file. Columns never
    /// inserted into hold the missing value.
    pub fn commit_row(&mut self) -> Result<u64> {
        self.write_state()?.commit_row()
    }

    /// Drain committed rows from the write buffer to the data file and
    /// sync it. Called implicitly when the buffer fills and on close.
    pub fn flush(&mut self) -> Result<()> {
        let state = self.write_state()?;
        state.flush_pending()?;
        state.data_file.sync_all()?;
        Ok(())
    }

    /// Append a full row: one value per column, in declaration order, with
    /// [`Value::Missing`] in the row-id slot.
    pub fn append(&mut self, row: &[Value]) -> Result<u64> {
        let state = self.write_state()?;
        if row.len() != state.schema.num_columns() {
            return Err(Error::invalid(format!(
                "row has {} values, table has {} columns",
                row.len(),
                state.schema.num_columns()
            )));
        }
        for (position, value) in row.iter().enumerate() {
            if matches!(value, Value::Missing) {
                continue;
            }
            state.insert_element(position, value)?;
        }
        state.commit_row()
    }

    /// Number of sealed rows (read mode) or committed rows so far (write
    /// mode).
    pub fn num_rows(&self) -> Result<u64> {
        match &self.state {
            TableState::Read(reader) => Ok(reader.num_rows()),
            TableState::Write(state) => Ok(state.num_rows),
            TableState::Closed => Err(Error::NotOpen),
        }
    }

    /// Constant size of the fixed region; the minimum size of any row.
    pub fn fixed_region_size(&self) -> Result<usize> {
        match &self.state {
            TableState::Read(reader) => Ok(reader.schema.fixed_region_size()),
            TableState::Write(state) => Ok(state.schema.fixed_region_size()),
            TableState::Closed => Err(Error::NotOpen),
        }
    }

    /// Fetch one row by id, fully decoded.
    pub fn get_row(&self, row_id: u64) -> Result<Row> {
        let reader = self.read_state()?;
        if row_id >= reader.num_rows() {
            return Err(Error::OutOfRange {
                row_id,
                num_rows: reader.num_rows(),
            });
        }
        let positions: Vec<usize> = (0..reader.schema.num_columns()).collect();
        reader.get_row_projected(row_id, &positions)
    }

    /// Iterator over rows in row-id order, projected to the given column
    /// positions (any order, repetition allowed). Bounds default to the
    /// full table and can be narrowed with
    /// [`TableRowIterator::set_min`] / [`TableRowIterator::set_max`].
    pub fn row_iterator(&self, positions: &[usize]) -> Result<TableRowIterator> {
        let reader = self.read_state()?;
        for &p in positions {
            if p >= reader.schema.num_columns() {
                return Err(Error::invalid(format!("column position {p} out of range")));
            }
        }
        Ok(TableRowIterator {
            reader: Arc::downgrade(reader),
            positions: positions.to_vec(),
            min_id: 0,
            max_id: reader.num_rows(),
            pos: None,
            finished: false,
        })
    }

    /// Names of the sealed indexes present in the home directory.
    pub fn indexes(&self) -> Result<Vec<String>> {
        self.read_state()?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.paths.homedir())? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = name
                .strip_prefix(INDEX_DB_PREFIX)
                .and_then(|s| s.strip_suffix(".db"))
            {
                if DbPaths::index(self.paths.homedir(), stem).exists() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Open an existing table in read mode.
pub fn open_table(homedir: impl AsRef<Path>, cache_size: u64) -> Result<Table> {
    let mut table = Table::new(homedir);
    table.set_cache_size(cache_size)?;
    table.open(Mode::Read)?;
    Ok(table)
}

// ------------------------------------------------------------------------------------------------
// Row iterator
// ------------------------------------------------------------------------------------------------

/// Forward iterator over table rows in row-id order.
///
/// The iterator is lazy and finite. Calling [`set_min`](Self::set_min)
/// repositions it (also after exhaustion); [`set_max`](Self::set_max)
/// narrows the exclusive upper bound. Advancing after the table closed
/// yields a single [`Error::OperationOnClosed`].
pub struct TableRowIterator {
    reader: Weak<TableReader>,
    positions: Vec<usize>,
    min_id: u64,
    max_id: u64,
    pos: Option<CursorPos>,
    finished: bool,
}

impl TableRowIterator {
    /// Restart iteration at `row_id` (inclusive).
    pub fn set_min(&mut self, row_id: u64) {
        self.min_id = row_id;
        self.pos = None;
        self.finished = false;
    }

    /// Set the exclusive upper bound.
    pub fn set_max(&mut self, row_id: u64) {
        self.max_id = row_id;
    }
}

impl Iterator for TableRowIterator {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let Some(reader) = self.reader.upgrade() else {
            self.finished = true;
            return Some(Err(Error::OperationOnClosed));
        };
        if self.pos.is_none() {
            match reader.seek_row(self.min_id) {
                Ok(p) => self.pos = Some(p),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        let pos = self.pos.as_mut()?;
        match reader.next_row(pos) {
            Ok(Some((row_id, location))) if row_id < self.max_id => {
                Some(reader.decode_at(location, &self.positions))
            }
            Ok(_) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
