//! Home-directory layout and database lifecycle plumbing.
//!
//! Every database (the table itself and each of its indexes) lives in the
//! table's home directory and is backed by two files: a store file
//! (`<name>.db`) and a metadata sidecar (`<name>.xml`); the table
//! additionally owns the linear data file (`table.db.dat`).
//!
//! While a writer is active, the store and data files carry a
//! `_build_<pid>_` prefix. Only a clean close renames them to their final
//! names and writes the sidecar, so a crashed writer leaves build-suffixed
//! files that a subsequent read-open treats as absent.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Database file name of the main table.
pub const TABLE_DB_NAME: &str = "table";

/// File-name prefix of index databases (`index_<name>.db`).
pub const INDEX_DB_PREFIX: &str = "index_";

/// Suffix of store files.
pub const DB_SUFFIX: &str = ".db";

/// Suffix of the table's linear data file (appended after [`DB_SUFFIX`]).
pub const DATA_SUFFIX: &str = ".dat";

/// Suffix of metadata sidecar files.
pub const METADATA_SUFFIX: &str = ".xml";

/// Default per-database cache size (16 MiB).
pub const DEFAULT_CACHE_SIZE: u64 = 16 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Open mode
// ------------------------------------------------------------------------------------------------

/// Mode a database is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Random access and cursors over a sealed database.
    Read,
    /// Append-only build of a new database.
    Write,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Path layout
// ------------------------------------------------------------------------------------------------

/// Path set of one database inside a home directory.
#[derive(Debug, Clone)]
pub(crate) struct DbPaths {
    homedir: PathBuf,
    db_name: String,
}

impl DbPaths {
    /// Paths for the main table of `homedir`.
    pub(crate) fn table(homedir: impl AsRef<Path>) -> Self {
        Self {
            homedir: homedir.as_ref().to_path_buf(),
            db_name: TABLE_DB_NAME.to_string(),
        }
    }

    /// Paths for the index `name` of the table in `homedir`.
    pub(crate) fn index(homedir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            homedir: homedir.as_ref().to_path_buf(),
            db_name: format!("{INDEX_DB_PREFIX}{name}"),
        }
    }

    /// The home directory this database lives in.
    pub(crate) fn homedir(&self) -> &Path {
        &self.homedir
    }

    /// Final path of the store file (`<name>.db`).
    pub(crate) fn db_path(&self) -> PathBuf {
        self.homedir.join(format!("{}{DB_SUFFIX}", self.db_name))
    }

    /// In-flight path of the store file (`_build_<pid>_<name>.db`).
    pub(crate) fn build_db_path(&self) -> PathBuf {
        let pid = std::process::id();
        self.homedir
            .join(format!("_build_{pid}_{}{DB_SUFFIX}", self.db_name))
    }

    /// Final path of the linear data file (`<name>.db.dat`).
    pub(crate) fn data_path(&self) -> PathBuf {
        self.homedir
            .join(format!("{}{DB_SUFFIX}{DATA_SUFFIX}", self.db_name))
    }

    /// In-flight path of the linear data file.
    pub(crate) fn build_data_path(&self) -> PathBuf {
        let pid = std::process::id();
        self.homedir
            .join(format!("_build_{pid}_{}{DB_SUFFIX}{DATA_SUFFIX}", self.db_name))
    }

    /// Path of the metadata sidecar (`<name>.xml`).
    pub(crate) fn metadata_path(&self) -> PathBuf {
        self.homedir
            .join(format!("{}{METADATA_SUFFIX}", self.db_name))
    }

    /// True when both the sealed store file and the sidecar exist.
    pub(crate) fn exists(&self) -> bool {
        self.db_path().exists() && self.metadata_path().exists()
    }

    /// Rename the build files to their final names.
    ///
    /// The sidecar is written separately by the caller *after* promotion,
    /// matching the close sequence: flush, sync, promote, write metadata.
    pub(crate) fn promote(&self, with_data_file: bool) -> io::Result<()> {
        debug!(db = %self.db_name, "promoting build files");
        fs::rename(self.build_db_path(), self.db_path())?;
        if with_data_file {
            fs::rename(self.build_data_path(), self.data_path())?;
        }
        Ok(())
    }

    /// Remove the sealed files of this database.
    pub(crate) fn delete(&self, with_data_file: bool) -> io::Result<()> {
        fs::remove_file(self.db_path())?;
        fs::remove_file(self.metadata_path())?;
        if with_data_file {
            fs::remove_file(self.data_path())?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Cache-size parsing
// ------------------------------------------------------------------------------------------------

/// Parse a cache-size string with an optional `K`, `M` or `G` suffix
/// (powers of 1024). Used at the CLI boundary; the library API takes plain
/// byte counts.
pub fn parse_cache_size(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::invalid("empty cache size"));
    }
    let (digits, multiplier) = match s.as_bytes()[s.len() - 1] {
        b'K' | b'k' => (&s[..s.len() - 1], 1024u64),
        b'M' | b'm' => (&s[..s.len() - 1], 1024 * 1024),
        b'G' | b'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| Error::invalid(format!("malformed cache size '{s}'")))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| Error::invalid(format!("cache size '{s}' overflows")))
}

// ------------------------------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------------------------------
