//! # Wormtable
//!
//! A **write-once, read-many** column-oriented table engine for scientific
//! tabular data, with ordered secondary indexes. Rows are typed tuples of
//! fixed- or variable-length values; once a table is sealed it is
//! immutable, and any number of indexes can then be built over ordered
//! column tuples to iterate rows in key order, count distinct keys and
//! locate key ranges.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    home directory                       │
//! │                                                         │
//! │  ┌───────────┐   ┌──────────────┐   ┌───────────────┐   │
//! │  │ table.db  │   │ table.db.dat │   │  table.xml    │   │
//! │  │ row id →  │   │ packed row   │   │  schema       │   │
//! │  │ location  │   │ bytes        │   │  sidecar      │   │
//! │  └─────┬─────┘   └──────┬───────┘   └───────────────┘   │
//! │        └────── Table ───┘                               │
//! │                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐              │
//! │  │ index_<n>.db    │   │ index_<n>.xml   │   × many     │
//! │  │ composite key → │   │ key columns +   │              │
//! │  │ row id          │   │ bucket widths   │              │
//! │  └────── Index ────┘   └─────────────────┘              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`schema`] | Column descriptors, table schemas, metadata sidecars |
//! | [`codec`] | Order-preserving element encodings and the packed row layout |
//! | [`store`] | Immutable sorted key→value files with checksummed blocks |
//! | [`table`] | Table lifecycle, append path, positional reads, row iteration |
//! | [`index`] | Key encoding with bucket widths, index build and ordered probes |
//! | [`db`] | Home-directory layout, build-file promotion, open modes |
//! | [`vcf`] | VCF header → schema inference and record ingestion |
//! | [`gtf`] | GTF record ingestion |
//!
//! ## Key properties
//!
//! - **Append-only writes** — rows receive dense, strictly increasing row
//!   ids; committed rows land in the data file in one large write per
//!   buffer flush.
//! - **Order-preserving encodings** — integers, floats and byte strings
//!   encode so that `memcmp` order equals value order, making composite
//!   index keys directly comparable.
//! - **Crash-safe builds** — writers work against `_build_<pid>_` files
//!   that are promoted to their final names only on a clean close; a
//!   crashed build is invisible to readers.
//! - **Block-level integrity** — every store block, header and footer
//!   carries a CRC32 checksum.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use wormtable::{ElementCount, Mode, Table, Value};
//!
//! let mut table = Table::new("/tmp/my_table");
//! table.add_id_column(4)?;
//! table.add_uint_column("depth", "read depth", 2, ElementCount::Fixed(1))?;
//! table.add_char_column("allele", "", ElementCount::Variable)?;
//!
//! table.open(Mode::Write)?;
//! table.append(&[
//!     Value::Missing, // row id, assigned automatically
//!     Value::Uint(42),
//!     Value::Char(b"ACGT".to_vec()),
//! ])?;
//! table.close()?;
//!
//! table.open(Mode::Read)?;
//! assert_eq!(table.num_rows()?, 1);
//! let row = table.get_row(0)?;
//! table.close()?;
//! # Ok::<(), wormtable::Error>(())
//! ```

pub mod codec;
pub mod db;
pub mod encoding;
pub mod error;
pub mod gtf;
pub mod index;
pub mod schema;
pub mod store;
pub mod table;
pub mod vcf;

pub use codec::{Row, Value};
pub use db::{DEFAULT_CACHE_SIZE, Mode, parse_cache_size};
pub use error::{Error, Result};
pub use index::{Index, IndexKeyIterator, IndexRowIterator, open_index};
pub use schema::{Column, ElementCount, ElementType, MAX_NUM_ELEMENTS, MAX_ROW_SIZE, Schema};
pub use table::{Table, TableRowIterator, open_table};
