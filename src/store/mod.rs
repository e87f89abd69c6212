//! Immutable ordered-key file store.
//!
//! Both the primary table database (`table.db`, row-id → row location) and
//! every secondary index (`index_<name>.db`, composite key → row id) are
//! stored in this format: a sorted sequence of key/value cells grouped
//! into checksummed blocks, with a sparse block index for binary search.
//! Stores are written once by a [`StoreWriter`](builder::StoreWriter)
//! consuming a sorted stream and are immutable afterwards.
//!
//! # On-disk layout
//!
//! ```text
//! [HEADER_BYTES]
//! [BLOCK_LEN_LE][CELL_BYTES...][BLOCK_CRC32_LE]
//! [BLOCK_LEN_LE][CELL_BYTES...][BLOCK_CRC32_LE]
//! ...
//! [PROPERTIES_LEN_LE][PROPERTIES_BYTES][PROPERTIES_CRC32_LE]
//! [INDEX_LEN_LE][INDEX_BYTES][INDEX_CRC32_LE]
//! [FOOTER_BYTES]
//! ```
//!
//! - **Header** — [`StoreHeader`] with magic, version and CRC32.
//! - **Blocks** — concatenated cells `[key_len u32][key][val_len u32][val]`,
//!   sorted by key, strictly ascending across the whole file.
//! - **Properties block** — entry count and min/max key.
//! - **Index block** — one [`IndexEntry`] per data block: the block's first
//!   key and its [`BlockHandle`].
//! - **Footer** — [`StoreFooter`] with the handles of the properties and
//!   index blocks, the total file size and a CRC32.
//!
//! # Reading
//!
//! The reader memory-maps the file, verifies header and footer, loads the
//! block index, and serves lookups by binary search over first keys
//! followed by a linear scan inside one block (blocks are ~4 KiB). Block
//! payloads pass through a byte-weighted [`BlockCache`] after checksum
//! verification, so hot blocks skip the CRC work.

pub(crate) mod builder;
pub(crate) mod cache;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use thiserror::Error;

use crate::encoding::{self, Decode, Encode, EncodingError};

use cache::BlockCache;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

pub(crate) const STORE_MAGIC: [u8; 4] = *b"WTB1";
pub(crate) const STORE_VERSION: u32 = 1;

/// Target payload size of one data block.
pub(crate) const BLOCK_TARGET_SIZE: usize = 4096;

pub(crate) const HEADER_SIZE: usize = 12;
pub(crate) const FOOTER_SIZE: usize = 44;
pub(crate) const BLOCK_LEN_SIZE: usize = 4;
pub(crate) const BLOCK_CHECKSUM_SIZE: usize = 4;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error in a framing structure.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A block, header or footer checksum did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Structural corruption or an invariant violation.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl From<StoreError> for crate::error::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => crate::error::Error::Io(e),
            other => crate::error::Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// On-disk format structures
// ------------------------------------------------------------------------------------------------

/// Store file header with magic, version and CRC32.
#[derive(Debug, Default)]
pub(crate) struct StoreHeader {
    magic: [u8; 4],
    version: u32,
    header_crc: u32,
}

/// Handle to a block: file offset and total on-disk size (length prefix
/// and checksum included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHandle {
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

/// Block index entry: the first key of a data block and its handle.
#[derive(Debug)]
pub(crate) struct IndexEntry {
    pub(crate) first_key: Vec<u8>,
    pub(crate) handle: BlockHandle,
}

/// Store-wide statistics.
#[derive(Debug, Default, Clone)]
pub(crate) struct PropertiesBlock {
    /// Number of cells in the store.
    pub(crate) entry_count: u64,
    /// Smallest key (empty when the store is empty).
    pub(crate) min_key: Vec<u8>,
    /// Largest key (empty when the store is empty).
    pub(crate) max_key: Vec<u8>,
}

/// Store footer, stored at the very end of the file.
#[derive(Debug)]
pub(crate) struct StoreFooter {
    pub(crate) properties: BlockHandle,
    pub(crate) index: BlockHandle,
    pub(crate) total_file_size: u64,
    pub(crate) footer_crc: u32,
}

// ------------------------------------------------------------------------------------------------
// Encoding implementations
// ------------------------------------------------------------------------------------------------

impl Encode for StoreHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.version.encode_to(buf)?;
        self.header_crc.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for StoreHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[off..])?;
        off += n;
        let (version, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (header_crc, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                magic,
                version,
                header_crc,
            },
            off,
        ))
    }
}

impl Encode for BlockHandle {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.offset.encode_to(buf)?;
        self.size.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockHandle {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { offset, size }, off))
    }
}

impl Encode for IndexEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.first_key.encode_to(buf)?;
        self.handle.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for IndexEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (first_key, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        let (handle, n) = BlockHandle::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { first_key, handle }, off))
    }
}

impl Encode for PropertiesBlock {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.entry_count.encode_to(buf)?;
        self.min_key.encode_to(buf)?;
        self.max_key.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for PropertiesBlock {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (entry_count, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (min_key, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        let (max_key, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                entry_count,
                min_key,
                max_key,
            },
            off,
        ))
    }
}

impl Encode for StoreFooter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.properties.encode_to(buf)?;
        self.index.encode_to(buf)?;
        self.total_file_size.encode_to(buf)?;
        self.footer_crc.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for StoreFooter {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (properties, n) = BlockHandle::decode_from(&buf[off..])?;
        off += n;
        let (index, n) = BlockHandle::decode_from(&buf[off..])?;
        off += n;
        let (total_file_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (footer_crc, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                properties,
                index,
                total_file_size,
                footer_crc,
            },
            off,
        ))
    }
}

impl StoreHeader {
    pub(crate) fn new() -> Self {
        Self {
            magic: STORE_MAGIC,
            version: STORE_VERSION,
            header_crc: 0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Cell parsing
// ------------------------------------------------------------------------------------------------

/// Byte ranges of one cell inside a block payload, plus the offset of the
/// next cell.
struct CellRanges {
    key: Range<usize>,
    value: Range<usize>,
    next_offset: usize,
}

/// Parse the cell starting at `offset` without copying key or value.
fn parse_cell(block: &[u8], offset: usize) -> Result<CellRanges, StoreError> {
    let (key_len, n) = u32::decode_from(&block[offset..])?;
    let key_start = offset + n;
    let key_end = key_start + key_len as usize;
    if key_end > block.len() {
        return Err(StoreError::Corrupt("cell key overruns its block".into()));
    }
    let (value_len, m) = u32::decode_from(&block[key_end..])?;
    let value_start = key_end + m;
    let value_end = value_start + value_len as usize;
    if value_end > block.len() {
        return Err(StoreError::Corrupt("cell value overruns its block".into()));
    }
    Ok(CellRanges {
        key: key_start..key_end,
        value: value_start..value_end,
        next_offset: value_end,
    })
}

// ------------------------------------------------------------------------------------------------
// Cursor position
// ------------------------------------------------------------------------------------------------

/// Stable position of a forward cursor: a block number and a byte offset
/// inside the block payload.
///
/// Positions carry no borrow of the reader, so iterators can hold one
/// across calls and re-validate their reader handle on every advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CursorPos {
    block: usize,
    offset: usize,
}

impl CursorPos {
    pub(crate) fn start() -> Self {
        Self {
            block: 0,
            offset: 0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// Memory-mapped reader over a sealed store file.
pub(crate) struct StoreReader {
    mmap: Mmap,
    index: Vec<IndexEntry>,
    properties: PropertiesBlock,
    cache: BlockCache,
}

impl StoreReader {
    /// Open a store, verifying header and footer integrity and loading the
    /// block index and properties.
    pub(crate) fn open(path: impl AsRef<Path>, cache_size: u64) -> Result<Self, StoreError> {
        let file = File::open(path)?;

        // Safety: the file is sealed — never written after promotion — and
        // the map is read-only. All block boundaries are verified before
        // slicing.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(StoreError::Corrupt("file too small".into()));
        }

        let (mut header, _) = encoding::decode_from_slice::<StoreHeader>(&mmap[..HEADER_SIZE])?;
        let header_checksum = header.header_crc;
        header.header_crc = 0;
        let header_bytes = encoding::encode_to_vec(&header)?;
        let mut hasher = Crc32::new();
        hasher.update(&header_bytes);
        if header_checksum != hasher.finalize() {
            return Err(StoreError::ChecksumMismatch);
        }
        if header.magic != STORE_MAGIC {
            return Err(StoreError::Corrupt("header magic mismatch".into()));
        }
        if header.version != STORE_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported store version {}",
                header.version
            )));
        }

        let footer_start = mmap.len() - FOOTER_SIZE;
        let (mut footer, _) = encoding::decode_from_slice::<StoreFooter>(&mmap[footer_start..])?;
        let footer_checksum = footer.footer_crc;
        footer.footer_crc = 0;
        let footer_bytes = encoding::encode_to_vec(&footer)?;
        let mut hasher = Crc32::new();
        hasher.update(&footer_bytes);
        if footer_checksum != hasher.finalize() {
            return Err(StoreError::ChecksumMismatch);
        }
        if footer.total_file_size != mmap.len() as u64 {
            return Err(StoreError::Corrupt("file size mismatch".into()));
        }

        let properties_bytes = Self::read_block_bytes(&mmap, &footer.properties)?;
        let (properties, _) = encoding::decode_from_slice::<PropertiesBlock>(&properties_bytes)?;

        let index_bytes = Self::read_block_bytes(&mmap, &footer.index)?;
        let (index, _) = encoding::decode_vec::<IndexEntry>(&index_bytes)?;

        Ok(Self {
            mmap,
            index,
            properties,
            cache: BlockCache::with_capacity(cache_size),
        })
    }

    /// Number of cells in the store.
    pub(crate) fn entry_count(&self) -> u64 {
        self.properties.entry_count
    }

    /// Smallest key, `None` when the store is empty.
    pub(crate) fn min_key(&self) -> Option<&[u8]> {
        (self.properties.entry_count > 0).then_some(self.properties.min_key.as_slice())
    }

    /// Largest key, `None` when the store is empty.
    pub(crate) fn max_key(&self) -> Option<&[u8]> {
        (self.properties.entry_count > 0).then_some(self.properties.max_key.as_slice())
    }

    /// Read and checksum-verify the raw bytes of a block.
    fn read_block_bytes(mmap: &Mmap, handle: &BlockHandle) -> Result<Vec<u8>, StoreError> {
        let start = usize::try_from(handle.offset)
            .map_err(|_| StoreError::Corrupt("block offset exceeds addressable range".into()))?;
        let size = usize::try_from(handle.size)
            .map_err(|_| StoreError::Corrupt("block size exceeds addressable range".into()))?;
        if size < BLOCK_LEN_SIZE + BLOCK_CHECKSUM_SIZE || start + size > mmap.len() {
            return Err(StoreError::Corrupt("block out of range".into()));
        }

        let mut cursor = start;
        let len_bytes: [u8; BLOCK_LEN_SIZE] = mmap[cursor..cursor + BLOCK_LEN_SIZE]
            .try_into()
            .map_err(|_| StoreError::Corrupt("short block length".into()))?;
        let content_len = u32::from_le_bytes(len_bytes) as usize;
        cursor += BLOCK_LEN_SIZE;
        if content_len != size - BLOCK_LEN_SIZE - BLOCK_CHECKSUM_SIZE {
            return Err(StoreError::Corrupt("block length mismatch".into()));
        }

        let content = &mmap[cursor..cursor + content_len];
        cursor += content_len;

        let checksum_bytes: [u8; BLOCK_CHECKSUM_SIZE] = mmap
            [cursor..cursor + BLOCK_CHECKSUM_SIZE]
            .try_into()
            .map_err(|_| StoreError::Corrupt("short checksum".into()))?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let mut hasher = Crc32::new();
        hasher.update(content);
        if hasher.finalize() != stored_checksum {
            return Err(StoreError::ChecksumMismatch);
        }

        Ok(content.to_vec())
    }

    /// Verified payload of data block `idx`, via the block cache.
    fn block(&self, idx: usize) -> Result<Arc<[u8]>, StoreError> {
        let handle = &self.index[idx].handle;
        if let Some(block) = self.cache.get(handle.offset) {
            return Ok(block);
        }
        let bytes = Self::read_block_bytes(&self.mmap, handle)?;
        let block: Arc<[u8]> = Arc::from(bytes.into_boxed_slice());
        self.cache.insert(handle.offset, Arc::clone(&block));
        Ok(block)
    }

    /// Index of the block that may contain `key`: the last block whose
    /// first key is `<= key`.
    fn find_block(&self, key: &[u8]) -> usize {
        match self
            .index
            .binary_search_by(|entry| entry.first_key.as_slice().cmp(key))
        {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }

    /// Position of the first cell whose key is `>= key`.
    pub(crate) fn seek(&self, key: &[u8]) -> Result<CursorPos, StoreError> {
        if self.index.is_empty() {
            return Ok(CursorPos::start());
        }
        let b = self.find_block(key);
        let block = self.block(b)?;
        let mut offset = 0;
        while offset < block.len() {
            let cell = parse_cell(&block, offset)?;
            if &block[cell.key.clone()] >= key {
                return Ok(CursorPos { block: b, offset });
            }
            offset = cell.next_offset;
        }
        Ok(CursorPos {
            block: b + 1,
            offset: 0,
        })
    }

    /// Yield the cell at `pos` and advance, or `None` at the end of the
    /// store.
    pub(crate) fn next_at(
        &self,
        pos: &mut CursorPos,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        loop {
            if pos.block >= self.index.len() {
                return Ok(None);
            }
            let block = self.block(pos.block)?;
            if pos.offset >= block.len() {
                pos.block += 1;
                pos.offset = 0;
                continue;
            }
            let cell = parse_cell(&block, pos.offset)?;
            pos.offset = cell.next_offset;
            return Ok(Some((
                block[cell.key].to_vec(),
                block[cell.value].to_vec(),
            )));
        }
    }

    /// Exact-match point lookup.
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut pos = self.seek(key)?;
        match self.next_at(&mut pos)? {
            Some((k, v)) if k == key => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    /// The last cell whose key is strictly below `bound`, if any.
    pub(crate) fn last_entry_below(
        &self,
        bound: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        if self.index.is_empty() {
            return Ok(None);
        }
        let mut b = self.find_block(bound);
        loop {
            let block = self.block(b)?;
            let mut best: Option<(Vec<u8>, Vec<u8>)> = None;
            let mut offset = 0;
            while offset < block.len() {
                let cell = parse_cell(&block, offset)?;
                if &block[cell.key.clone()] >= bound {
                    break;
                }
                best = Some((block[cell.key].to_vec(), block[cell.value].to_vec()));
                offset = cell.next_offset;
            }
            if best.is_some() {
                return Ok(best);
            }
            if b == 0 {
                return Ok(None);
            }
            // every key in the previous block is below this block's first
            // key, which is itself <= bound
            b -= 1;
        }
    }

    /// The last cell of the store, if any.
    pub(crate) fn last_entry(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let Some(last) = self.index.len().checked_sub(1) else {
            return Ok(None);
        };
        let block = self.block(last)?;
        let mut best = None;
        let mut offset = 0;
        while offset < block.len() {
            let cell = parse_cell(&block, offset)?;
            best = Some((block[cell.key].to_vec(), block[cell.value].to_vec()));
            offset = cell.next_offset;
        }
        Ok(best)
    }
}

// ------------------------------------------------------------------------------------------------
// Key helpers
// ------------------------------------------------------------------------------------------------

/// The least byte string strictly greater than every string with prefix
/// `prefix`, or `None` when no such bound exists (all bytes `0xFF`).
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.last_mut() {
        if *last == 0xFF {
            out.pop();
        } else {
            *last += 1;
            return Some(out);
        }
    }
    None
}
