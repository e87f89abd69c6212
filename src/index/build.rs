//! External sort machinery for index builds.
//!
//! Index entries are produced in row-id order but must be inserted into
//! the store in key order. The builder accumulates `(entry key, row id)`
//! pairs in a memory-bounded buffer; when the buffer fills, it is sorted
//! and spilled to a run file next to the build store. After the table
//! scan, the sorted runs are merged with a binary heap into the final
//! store writer.
//!
//! Run files are transient: `[u32 key_len][key][u64 row_id]` records,
//! little-endian, removed after a successful merge (and on any build
//! failure).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::encoding;
use crate::error::{Error, Result};
use crate::store::builder::StoreWriter;

/// One index entry awaiting its sort.
pub(super) type PendingEntry = (Vec<u8>, u64);

// ------------------------------------------------------------------------------------------------
// Build guard
// ------------------------------------------------------------------------------------------------

/// Scope guard over the files a build creates.
///
/// Until [`disarm`](Self::disarm) is called, dropping the guard removes
/// the build store file and every tracked run file. This covers both
/// error returns and unwinds out of a panicking progress callback, so an
/// aborted build never strands `_build_<pid>_` or `.run` files in the
/// home directory.
pub(super) struct BuildGuard {
    build_path: PathBuf,
    runs: Vec<PathBuf>,
    armed: bool,
}

impl BuildGuard {
    pub(super) fn new(build_path: PathBuf) -> Self {
        Self {
            build_path,
            runs: Vec::new(),
            armed: true,
        }
    }

    /// Record a spilled run file for cleanup.
    pub(super) fn track_run(&mut self, path: PathBuf) {
        self.runs.push(path);
    }

    /// The run files spilled so far, in spill order.
    pub(super) fn runs(&self) -> &[PathBuf] {
        &self.runs
    }

    /// The build completed; leave its files in place.
    pub(super) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.build_path);
            for run in &self.runs {
                let _ = fs::remove_file(run);
            }
        }
    }
}

/// Sort `entries` and write them to run file `seq` under `dir`.
pub(super) fn spill_run(
    dir: &Path,
    file_stem: &str,
    seq: usize,
    entries: &mut Vec<PendingEntry>,
) -> Result<PathBuf> {
    entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    let path = dir.join(format!("{file_stem}.run{seq}"));
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;
    let mut writer = BufWriter::new(file);
    for (key, row_id) in entries.iter() {
        let len = u32::try_from(key.len())
            .map_err(|_| Error::invalid("index key exceeds the representable length"))?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(key)?;
        writer.write_all(&row_id.to_le_bytes())?;
    }
    writer.flush()?;
    debug!(run = seq, entries = entries.len(), "spilled index run");
    entries.clear();
    Ok(path)
}

/// Streaming reader over one sorted run file.
pub(super) struct RunReader {
    reader: BufReader<File>,
    next: Option<PendingEntry>,
}

impl RunReader {
    pub(super) fn open(path: &Path) -> Result<Self> {
        let mut run = Self {
            reader: BufReader::new(File::open(path)?),
            next: None,
        };
        run.advance()?;
        Ok(run)
    }

    /// Pop the head entry and read the next record.
    pub(super) fn pop(&mut self) -> Result<Option<PendingEntry>> {
        let head = self.next.take();
        if head.is_some() {
            self.advance()?;
        }
        Ok(head)
    }

    fn advance(&mut self) -> Result<()> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.next = None;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut key = vec![0u8; len];
        self.reader.read_exact(&mut key)?;
        let mut row_id_bytes = [0u8; 8];
        self.reader.read_exact(&mut row_id_bytes)?;
        self.next = Some((key, u64::from_le_bytes(row_id_bytes)));
        Ok(())
    }
}

/// Merge sorted runs into the store writer and remove the run files.
pub(super) fn merge_runs(run_paths: &[PathBuf], writer: &mut StoreWriter) -> Result<()> {
    // heap of (key, row_id, run index); keys are unique across runs
    // because every entry key ends in its row id
    let mut heap: BinaryHeap<Reverse<(Vec<u8>, u64, usize)>> = BinaryHeap::new();
    let mut runs = Vec::with_capacity(run_paths.len());
    for (idx, path) in run_paths.iter().enumerate() {
        let mut run = RunReader::open(path)?;
        if let Some((key, row_id)) = run.pop()? {
            heap.push(Reverse((key, row_id, idx)));
        }
        runs.push(run);
    }

    while let Some(Reverse((key, row_id, idx))) = heap.pop() {
        put_entry(writer, &key, row_id)?;
        if let Some((key, row_id)) = runs[idx].pop()? {
            heap.push(Reverse((key, row_id, idx)));
        }
    }

    for path in run_paths {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Insert one `(entry key, row id)` pair into the store writer.
pub(super) fn put_entry(writer: &mut StoreWriter, key: &[u8], row_id: u64) -> Result<()> {
    let value =
        encoding::encode_to_vec(&row_id).map_err(crate::store::StoreError::from)?;
    writer.put(key, &value)?;
    Ok(())
}
