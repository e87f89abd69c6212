//! Secondary indexes — declaration, build and ordered-key access.
//!
//! An [`Index`] sorts the rows of its parent table by the bucket-adjusted
//! values of one or more key columns. It is a sub-database of the table's
//! home directory (`index_<name>.db` plus an `index_<name>.xml` sidecar)
//! and follows the same lifecycle: build under a `_build_<pid>_` name,
//! promote on clean close, load the sidecar on read-open.
//!
//! # Building
//!
//! [`Index::build`] scans every row of the parent table in row-id order,
//! encodes the composite key (see [`keys`]), and feeds the entries through
//! a memory-bounded external sort (see [`build`]) into the store writer.
//! Any encoding error aborts the build and removes the partial files.
//!
//! # Reading
//!
//! The reader answers prefix probes ([`Index::get_min`] /
//! [`Index::get_max`]), per-key occurrence counts ([`Index::num_rows`]),
//! ordered distinct-key iteration and ordered row iteration bounded by
//! key prefixes. Because composite keys are memcmp-ordered, a prefix
//! bound is a plain byte bound: the row range for `[min, max)` is exactly
//! the entry range `[encode(min), encode(max))`.

mod build;
pub(crate) mod keys;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use crate::codec::{Row, Value};
use crate::db::{DEFAULT_CACHE_SIZE, DbPaths, Mode};
use crate::encoding;
use crate::error::{Error, Result};
use crate::schema::{Column, Schema, sidecar};
use crate::store::builder::StoreWriter;
use crate::store::{CursorPos, StoreReader, prefix_successor};
use crate::table::{Table, TableReader};

use build::PendingEntry;
use keys::KeyCodec;

/// In-memory budget for pending index entries before a run is spilled.
const MIN_BUILD_BUFFER: u64 = 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Read-mode state
// ------------------------------------------------------------------------------------------------

/// Shared read state of an open index.
pub(crate) struct IndexReader {
    codec: KeyCodec,
    store: StoreReader,
    parent: Weak<TableReader>,
}

impl IndexReader {
    fn parent(&self) -> Result<Arc<TableReader>> {
        self.parent.upgrade().ok_or(Error::OperationOnClosed)
    }
}

// ------------------------------------------------------------------------------------------------
// Index
// ------------------------------------------------------------------------------------------------

enum IndexState {
    Closed,
    Write { codec: KeyCodec, built: bool },
    Read(Arc<IndexReader>),
}

/// A secondary index over an open-for-read [`Table`].
pub struct Index {
    paths: DbPaths,
    name: String,
    cache_size: u64,
    parent: Weak<TableReader>,
    parent_schema: Schema,
    key_columns: Vec<(usize, f64)>,
    state: IndexState,
}

impl Index {
    /// Allocate an unopened index handle named `name` on `table`, which
    /// must be open in read mode.
    pub fn new(table: &Table, name: &str) -> Result<Self> {
        let reader = table.read_state()?;
        if name.is_empty() || name.contains(['/', '\0']) {
            return Err(Error::invalid(format!("invalid index name '{name}'")));
        }
        Ok(Self {
            paths: DbPaths::index(table.homedir(), name),
            name: name.to_string(),
            cache_size: DEFAULT_CACHE_SIZE,
            parent: Arc::downgrade(reader),
            parent_schema: reader.schema.clone(),
            key_columns: Vec::new(),
            state: IndexState::Closed,
        })
    }

    /// The index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the sealed index files exist.
    pub fn exists(&self) -> bool {
        self.paths.exists()
    }

    /// True when the index is open in either mode.
    pub fn is_open(&self) -> bool {
        !matches!(self.state, IndexState::Closed)
    }

    /// The open mode, if any.
    pub fn open_mode(&self) -> Option<Mode> {
        match self.state {
            IndexState::Closed => None,
            IndexState::Write { .. } => Some(Mode::Write),
            IndexState::Read(_) => Some(Mode::Read),
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

    /// Declare a key column (by name in the parent table) with a bucket
    /// width (0 = none). Valid only while the index is closed.
    pub fn add_key_column(&mut self, column_name: &str, bin_width: f64) -> Result<()> {
        if self.is_open() {
            return Err(Error::invalid(
                "cannot add key columns to an open index",
            ));
        }
        let position = self
            .parent_schema
            .position_of(column_name)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "parent table has no column named '{column_name}'"
                ))
            })?;
        let column = self
            .parent_schema
            .column(position)
            .ok_or_else(|| Error::invalid("key column position out of range"))?;
        keys::validate_key_column(column, bin_width)?;
        self.key_columns.push((position, bin_width));
        Ok(())
    }

    /// The key columns, in order.
    pub fn key_columns(&self) -> Vec<Column> {
        self.key_columns
            .iter()
            .filter_map(|&(p, _)| self.parent_schema.column(p).cloned())
            .collect()
    }

    /// The bucket widths, in key-column order.
    pub fn bin_widths(&self) -> Vec<f64> {
        self.key_columns.iter().map(|&(_, w)| w).collect()
    }

    /// Open the index.
    ///
    /// Write mode prepares a build with the declared key columns; read
    /// mode loads the sidecar and the sealed store. The parent table must
    /// still be open in read mode.
    pub fn open(&mut self, mode: Mode) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        if self.parent.upgrade().is_none() {
            return Err(Error::OperationOnClosed);
        }
        match mode {
            Mode::Write => {
                let codec = KeyCodec::new(&self.parent_schema, &self.key_columns)?;
                self.state = IndexState::Write {
                    codec,
                    built: false,
                };
                info!(index = %self.name, "index opened for building");
            }
            Mode::Read => {
                if !self.exists() {
                    return Err(Error::NotFound(format!(
                        "index '{}' not found",
                        self.name
                    )));
                }
                let named = sidecar::read_index_metadata(&self.paths.metadata_path())?;
                let mut key_columns = Vec::with_capacity(named.len());
                for (column_name, bin_width) in named {
                    let position =
                        self.parent_schema.position_of(&column_name).ok_or_else(|| {
                            Error::CorruptMetadata(format!(
                                "index key column '{column_name}' is not in the table schema"
                            ))
                        })?;
                    key_columns.push((position, bin_width));
                }
                let codec = KeyCodec::new(&self.parent_schema, &key_columns)?;
                let store = StoreReader::open(self.paths.db_path(), self.cache_size)?;
                self.key_columns = key_columns;
                self.state = IndexState::Read(Arc::new(IndexReader {
                    codec,
                    store,
                    parent: self.parent.clone(),
                }));
                debug!(index = %self.name, "index opened for reading");
            }
        }
        Ok(())
    }

    /// Close the index. A write-mode close promotes the build file (an
    /// empty index if [`Index::build`] never ran) and writes the sidecar.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, IndexState::Closed) {
            IndexState::Closed => Err(Error::NotOpen),
            IndexState::Read(_) => Ok(()),
            IndexState::Write { built, .. } => {
                if !built {
                    StoreWriter::create(self.paths.build_db_path())?.finish()?;
                }
                self.paths.promote(false)?;
                let named: Vec<(String, f64)> = self
                    .key_columns
                    .iter()
                    .filter_map(|&(p, w)| {
                        self.parent_schema
                            .column(p)
                            .map(|c| (c.name().to_string(), w))
                    })
                    .collect();
                sidecar::write_index_metadata(&self.paths.metadata_path(), &named)?;
                info!(index = %self.name, "index sealed");
                Ok(())
            }
        }
    }

    /// Delete the sealed index files. The index must be closed.
    pub fn delete(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }
        self.paths.delete(false)?;
        Ok(())
    }

    /// Build the index by scanning every row of the parent table.
    pub fn build(&mut self) -> Result<()> {
        self.build_impl(None, 0)
    }

    /// Build the index, invoking `callback` with the number of rows
    /// processed after every `interval` rows. The callback is purely
    /// informational and cannot cancel the build.
    pub fn build_with_progress(
        &mut self,
        callback: &mut dyn FnMut(u64),
        interval: u64,
    ) -> Result<()> {
        if interval == 0 {
            return Err(Error::invalid("progress interval must be positive"));
        }
        self.build_impl(Some(callback), interval)
    }

    fn build_impl(
        &mut self,
        callback: Option<&mut dyn FnMut(u64)>,
        interval: u64,
    ) -> Result<()> {
        let IndexState::Write { codec, built } = &mut self.state else {
            return Err(match &self.state {
                IndexState::Closed => Error::NotOpen,
                _ => Error::WrongMode {
                    required: Mode::Write,
                },
            });
        };
        let parent = self.parent.upgrade().ok_or(Error::OperationOnClosed)?;

        let build_path = self.paths.build_db_path();
        let file_stem = build_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("index")
            .to_string();
        let homedir = self.paths.homedir().to_path_buf();
        let budget = self.cache_size.max(MIN_BUILD_BUFFER);

        // the guard removes the build store file and any spilled runs on
        // every exit path (error return or unwinding callback) until the
        // build completes and disarms it
        let mut guard = build::BuildGuard::new(build_path.clone());
        let result = run_build(
            &parent,
            codec,
            &build_path,
            &homedir,
            &file_stem,
            budget,
            &mut guard,
            callback,
            interval,
        );
        match result {
            Ok(entries) => {
                guard.disarm();
                *built = true;
                debug!(index = %self.name, entries, "index build complete");
                Ok(())
            }
            Err(e) => {
                warn!(index = %self.name, error = %e, "index build failed, discarding build files");
                drop(guard);
                Err(e)
            }
        }
    }

    fn reader(&self) -> Result<&Arc<IndexReader>> {
        match &self.state {
            IndexState::Read(reader) => Ok(reader),
            IndexState::Write { .. } => Err(Error::WrongMode {
                required: Mode::Read,
            }),
            IndexState::Closed => Err(Error::NotOpen),
        }
    }

    /// The smallest full key whose first components equal `prefix`
    /// (bucket-adjusted).
    pub fn get_min(&self, prefix: &[Value]) -> Result<Vec<Value>> {
        let reader = self.reader()?;
        let prefix_bytes = reader.codec.encode_prefix(prefix)?;
        let mut pos = reader.store.seek(&prefix_bytes)?;
        match reader.store.next_at(&mut pos)? {
            Some((key, _)) if key.starts_with(&prefix_bytes) => reader.codec.decode_key(&key),
            _ => Err(Error::NotFound("no key matches the prefix".into())),
        }
    }

    /// The largest full key whose first components equal `prefix`
    /// (bucket-adjusted).
    pub fn get_max(&self, prefix: &[Value]) -> Result<Vec<Value>> {
        let reader = self.reader()?;
        let prefix_bytes = reader.codec.encode_prefix(prefix)?;
        let entry = match prefix_successor(&prefix_bytes) {
            Some(bound) => reader.store.last_entry_below(&bound)?,
            None => reader.store.last_entry()?,
        };
        match entry {
            Some((key, _)) if key.starts_with(&prefix_bytes) => reader.codec.decode_key(&key),
            _ => Err(Error::NotFound("no key matches the prefix".into())),
        }
    }

    /// Number of rows whose composite key equals `key` exactly. The
    /// argument must have the full index arity.
    pub fn num_rows(&self, key: &[Value]) -> Result<u64> {
        let reader = self.reader()?;
        if key.len() != reader.codec.arity() {
            return Err(Error::invalid(format!(
                "key of length {} does not match the index arity {}",
                key.len(),
                reader.codec.arity()
            )));
        }
        let key_bytes = reader.codec.encode_prefix(key)?;
        let mut pos = reader.store.seek(&key_bytes)?;
        let mut count = 0;
        while let Some((entry_key, _)) = reader.store.next_at(&mut pos)? {
            if !entry_key.starts_with(&key_bytes) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Iterator over the distinct composite keys, in ascending order.
    pub fn distinct_keys_iterator(&self) -> Result<IndexKeyIterator> {
        let reader = self.reader()?;
        Ok(IndexKeyIterator {
            reader: Arc::downgrade(reader),
            pos: None,
            last_composite: None,
            finished: false,
        })
    }

    /// Iterator over parent-table rows in index order, projected to the
    /// given column positions. Bounds are key prefixes, half-open:
    /// rows with key `>= min` are included, rows with key `>= max` are
    /// excluded.
    pub fn row_iterator(&self, positions: &[usize]) -> Result<IndexRowIterator> {
        let reader = self.reader()?;
        let parent = reader.parent()?;
        for &p in positions {
            if p >= parent.schema.num_columns() {
                return Err(Error::invalid(format!("column position {p} out of range")));
            }
        }
        Ok(IndexRowIterator {
            reader: Arc::downgrade(reader),
            positions: positions.to_vec(),
            min: None,
            max: None,
            pos: None,
            finished: false,
        })
    }
}

/// Open an existing index of `table` in read mode.
pub fn open_index(table: &Table, name: &str, cache_size: u64) -> Result<Index> {
    let mut index = Index::new(table, name)?;
    index.set_cache_size(cache_size)?;
    index.open(Mode::Read)?;
    Ok(index)
}

/// Scan the parent table, spill sorted runs as the budget fills, and seal
/// the store. Returns the number of entries written. Every file created
/// here is registered with the guard before anything else can fail.
#[allow(clippy::too_many_arguments)]
fn run_build(
    parent: &TableReader,
    codec: &KeyCodec,
    build_path: &Path,
    homedir: &Path,
    file_stem: &str,
    budget: u64,
    guard: &mut build::BuildGuard,
    mut callback: Option<&mut dyn FnMut(u64)>,
    interval: u64,
) -> Result<u64> {
    let positions = codec.positions();
    let mut pending: Vec<PendingEntry> = Vec::new();
    let mut pending_bytes = 0u64;
    let mut rows_seen = 0u64;

    let mut pos = CursorPos::start();
    while let Some((row_id, location)) = parent.next_row(&mut pos)? {
        let values = parent.decode_at(location, &positions)?;
        let key = codec.encode_entry_key(&values, row_id)?;
        pending_bytes += (key.len() + 8) as u64;
        pending.push((key, row_id));
        if pending_bytes >= budget {
            let run = build::spill_run(homedir, file_stem, guard.runs().len(), &mut pending)?;
            guard.track_run(run);
            pending_bytes = 0;
        }
        rows_seen += 1;
        if interval > 0 && rows_seen % interval == 0 {
            if let Some(cb) = callback.as_deref_mut() {
                cb(rows_seen);
            }
        }
    }

    let mut writer = StoreWriter::create(build_path)?;
    if guard.runs().is_empty() {
        pending.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for (key, row_id) in &pending {
            build::put_entry(&mut writer, key, *row_id)?;
        }
    } else {
        if !pending.is_empty() {
            let run = build::spill_run(homedir, file_stem, guard.runs().len(), &mut pending)?;
            guard.track_run(run);
        }
        build::merge_runs(guard.runs(), &mut writer)?;
    }
    let entries = writer.entry_count();
    writer.finish()?;
    Ok(entries)
}

// ------------------------------------------------------------------------------------------------
// Distinct-key iterator
// ------------------------------------------------------------------------------------------------

/// Forward iterator over the distinct composite keys of an index, each
/// yielded once as an arity-length value tuple, in strictly ascending
/// order.
pub struct IndexKeyIterator {
    reader: Weak<IndexReader>,
    pos: Option<CursorPos>,
    last_composite: Option<Vec<u8>>,
    finished: bool,
}

impl Iterator for IndexKeyIterator {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let Some(reader) = self.reader.upgrade() else {
            self.finished = true;
            return Some(Err(Error::OperationOnClosed));
        };
        let pos = self.pos.get_or_insert_with(CursorPos::start);
        loop {
            match reader.store.next_at(pos) {
                Ok(Some((key, _))) => {
                    let composite = reader.codec.composite_part(&key).to_vec();
                    if self.last_composite.as_ref() == Some(&composite) {
                        continue;
                    }
                    self.last_composite = Some(composite.clone());
                    return Some(reader.codec.decode_key(&composite));
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Row iterator
// ------------------------------------------------------------------------------------------------

/// Forward iterator over parent-table rows in `(composite key, row id)`
/// order, optionally bounded by key prefixes.
pub struct IndexRowIterator {
    reader: Weak<IndexReader>,
    positions: Vec<usize>,
    min: Option<Vec<u8>>,
    max: Option<Vec<u8>>,
    pos: Option<CursorPos>,
    finished: bool,
}

impl IndexRowIterator {
    /// Restart iteration at the first row whose key is `>=` the prefix
    /// (bucket-adjusted).
    pub fn set_min(&mut self, prefix: &[Value]) -> Result<()> {
        let reader = self.reader.upgrade().ok_or(Error::OperationOnClosed)?;
        self.min = Some(reader.codec.encode_prefix(prefix)?);
        self.pos = None;
        self.finished = false;
        Ok(())
    }

    /// Exclude rows whose key is `>=` the prefix (bucket-adjusted).
    pub fn set_max(&mut self, prefix: &[Value]) -> Result<()> {
        let reader = self.reader.upgrade().ok_or(Error::OperationOnClosed)?;
        self.max = Some(reader.codec.encode_prefix(prefix)?);
        Ok(())
    }
}

impl Iterator for IndexRowIterator {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let Some(reader) = self.reader.upgrade() else {
            self.finished = true;
            return Some(Err(Error::OperationOnClosed));
        };
        let parent = match reader.parent() {
            Ok(parent) => parent,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };
        if self.pos.is_none() {
            let seeked = match &self.min {
                Some(bytes) => reader.store.seek(bytes),
                None => Ok(CursorPos::start()),
            };
            match seeked {
                Ok(p) => self.pos = Some(p),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
        let pos = self.pos.as_mut()?;
        match reader.store.next_at(pos) {
            Ok(Some((key, value))) => {
                if let Some(max) = &self.max {
                    if key.as_slice() >= max.as_slice() {
                        self.finished = true;
                        return None;
                    }
                }
                let row_id = match encoding::decode_from_slice::<u64>(&value) {
                    Ok((row_id, _)) => row_id,
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(crate::store::StoreError::from(e).into()));
                    }
                };
                Some(parent.get_row_projected(row_id, &self.positions))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e.into()))
            }
        }
    }
}
