//! Store writer — builds a store file from a sorted cell stream.
//!
//! [`StoreWriter`] consumes strictly ascending `(key, value)` pairs and
//! writes the complete store: header, data blocks, properties block, index
//! block and footer. Input order is enforced; an out-of-order key aborts
//! the build with [`StoreError::Corrupt`].
//!
//! The writer targets the path it is given (the caller passes the
//! `_build_<pid>_` path and owns promotion to the final name), flushes all
//! buffered data and calls `sync_all` before returning from
//! [`StoreWriter::finish`], so a promoted file is always complete.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::mem;
use std::path::Path;

use crc32fast::Hasher as Crc32;
use tracing::debug;

use crate::encoding::{self, Encode};

use super::{
    BLOCK_CHECKSUM_SIZE, BLOCK_LEN_SIZE, BLOCK_TARGET_SIZE, BlockHandle, IndexEntry,
    PropertiesBlock, StoreError, StoreFooter, StoreHeader,
};

// ------------------------------------------------------------------------------------------------
// Block I/O helpers
// ------------------------------------------------------------------------------------------------

/// Write a checksummed block: `[len_le (4 B)][data][crc32_le (4 B)]`.
///
/// Returns the handle covering the whole framed block.
fn write_checksummed_block(
    writer: &mut (impl Write + Seek),
    data: &[u8],
) -> Result<BlockHandle, StoreError> {
    let offset = writer.stream_position()?;
    let len = data.len() as u32;

    let mut hasher = Crc32::new();
    hasher.update(data);
    let checksum = hasher.finalize();

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(data)?;
    writer.write_all(&checksum.to_le_bytes())?;

    Ok(BlockHandle {
        offset,
        size: (BLOCK_LEN_SIZE + data.len() + BLOCK_CHECKSUM_SIZE) as u64,
    })
}

/// Write the store header with its embedded CRC32.
fn write_header(writer: &mut impl Write) -> Result<(), StoreError> {
    let header = StoreHeader::new();
    let zeroed_bytes = encoding::encode_to_vec(&header)?;
    let mut hasher = Crc32::new();
    hasher.update(&zeroed_bytes);
    let crc = hasher.finalize();

    let header = StoreHeader {
        header_crc: crc,
        ..header
    };
    writer.write_all(&encoding::encode_to_vec(&header)?)?;
    Ok(())
}

/// Write the footer (with CRC) and sync the file.
fn write_footer(
    file: &mut File,
    properties: BlockHandle,
    index: BlockHandle,
) -> Result<(), StoreError> {
    let current_size = file.metadata()?.len();
    let footer = StoreFooter {
        properties,
        index,
        total_file_size: current_size + super::FOOTER_SIZE as u64,
        footer_crc: 0,
    };

    let footer_bytes = encoding::encode_to_vec(&footer)?;
    let mut hasher = Crc32::new();
    hasher.update(&footer_bytes);
    let crc = hasher.finalize();

    let footer = StoreFooter {
        footer_crc: crc,
        ..footer
    };
    let footer_bytes = encoding::encode_to_vec(&footer)?;

    let mut writer = BufWriter::new(&mut *file);
    writer.write_all(&footer_bytes)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// StoreWriter
// ------------------------------------------------------------------------------------------------

/// Streaming writer for a sorted store file.
pub(crate) struct StoreWriter {
    writer: BufWriter<File>,
    current_block: Vec<u8>,
    block_first_key: Option<Vec<u8>>,
    index_entries: Vec<IndexEntry>,
    properties: PropertiesBlock,
    last_key: Option<Vec<u8>>,
}

impl StoreWriter {
    /// Create the target file and write the header.
    pub(crate) fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer)?;
        debug!(path = %path.as_ref().display(), "created store build file");
        Ok(Self {
            writer,
            current_block: Vec::with_capacity(BLOCK_TARGET_SIZE),
            block_first_key: None,
            index_entries: Vec::new(),
            properties: PropertiesBlock::default(),
            last_key: None,
        })
    }

    /// Append one cell. Keys must arrive strictly ascending.
    pub(crate) fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(StoreError::Corrupt(
                    "cells must be inserted in strictly ascending key order".into(),
                ));
            }
        }

        if self.block_first_key.is_none() {
            self.block_first_key = Some(key.to_vec());
        }
        if self.properties.entry_count == 0 {
            self.properties.min_key = key.to_vec();
        }
        self.properties.max_key = key.to_vec();
        self.properties.entry_count += 1;
        self.last_key = Some(key.to_vec());

        key.encode_to(&mut self.current_block)?;
        value.encode_to(&mut self.current_block)?;

        if self.current_block.len() >= BLOCK_TARGET_SIZE {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Number of cells written so far.
    pub(crate) fn entry_count(&self) -> u64 {
        self.properties.entry_count
    }

    fn flush_block(&mut self) -> Result<(), StoreError> {
        let data = mem::take(&mut self.current_block);
        let handle = write_checksummed_block(&mut self.writer, &data)?;
        let first_key = self
            .block_first_key
            .take()
            .ok_or_else(|| StoreError::Corrupt("flushing a block with no first key".into()))?;
        self.index_entries.push(IndexEntry { first_key, handle });
        Ok(())
    }

    /// Flush the final partial block, write properties, index and footer,
    /// and sync the file to disk.
    pub(crate) fn finish(mut self) -> Result<(), StoreError> {
        if !self.current_block.is_empty() {
            self.flush_block()?;
        }

        let properties_bytes = encoding::encode_to_vec(&self.properties)?;
        let properties_handle = write_checksummed_block(&mut self.writer, &properties_bytes)?;

        let mut index_bytes = Vec::new();
        encoding::encode_vec(&self.index_entries, &mut index_bytes)?;
        let index_handle = write_checksummed_block(&mut self.writer, &index_bytes)?;

        self.writer.flush()?;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        write_footer(&mut file, properties_handle, index_handle)?;

        debug!(
            entries = self.properties.entry_count,
            blocks = self.index_entries.len(),
            "sealed store file"
        );
        Ok(())
    }
}
