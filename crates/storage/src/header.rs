//! Database file header (the first 100 bytes of the file).
//!
//! ```text
//! [0..16]   magic string
//! [16..18]  page size: u16 (little-endian)
//! [36..40]  free-page cursor: u32 (little-endian), file offset of the next
//!           page the pager will hand out
//! ```
//! Every other byte is zero. The pager rewrites the header after every page
//! write, so the free-page cursor alone is enough to reopen a database.

use crate::error::{Result, StorageError};

/// Magic bytes identifying an ember database file.
pub const MAGIC: &[u8; 16] = b"emberdb format 1";

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 32768;

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 100;

const PAGE_SIZE_OFFSET: usize = 16;
const FREE_PAGE_OFFSET: usize = 36;

/// Offset of page 0. The byte between the header and the first page is
/// never written.
pub const FIRST_PAGE_OFFSET: u64 = HEADER_SIZE as u64 + 1;

/// The file header stored at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHeader {
    /// Page size in bytes. Always `PAGE_SIZE` for files this crate writes.
    pub page_size: u16,
    /// File offset of the next page to allocate.
    pub free_page_offset: u32,
}

impl Default for DbHeader {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE as u16,
            free_page_offset: FIRST_PAGE_OFFSET as u32,
        }
    }
}

impl DbHeader {
    /// Serialize the header into a fresh 100-byte buffer.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..16].copy_from_slice(MAGIC);
        buf[PAGE_SIZE_OFFSET..PAGE_SIZE_OFFSET + 2].copy_from_slice(&self.page_size.to_le_bytes());
        buf[FREE_PAGE_OFFSET..FREE_PAGE_OFFSET + 4]
            .copy_from_slice(&self.free_page_offset.to_le_bytes());
        buf
    }

    /// Parse and validate a header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StorageError::CorruptHeader(format!(
                "header is {} bytes, expected {}",
                buf.len(),
                HEADER_SIZE
            )));
        }
        if &buf[0..16] != MAGIC.as_slice() {
            return Err(StorageError::CorruptHeader("bad magic".to_string()));
        }

        let page_size = u16::from_le_bytes([buf[PAGE_SIZE_OFFSET], buf[PAGE_SIZE_OFFSET + 1]]);
        if page_size as usize != PAGE_SIZE {
            return Err(StorageError::CorruptHeader(format!(
                "unsupported page size {page_size}"
            )));
        }

        let mut cursor = [0u8; 4];
        cursor.copy_from_slice(&buf[FREE_PAGE_OFFSET..FREE_PAGE_OFFSET + 4]);
        let free_page_offset = u32::from_le_bytes(cursor);
        if (free_page_offset as u64) < FIRST_PAGE_OFFSET
            || (free_page_offset as u64 - FIRST_PAGE_OFFSET) % PAGE_SIZE as u64 != 0
        {
            return Err(StorageError::CorruptHeader(format!(
                "free-page cursor {free_page_offset} is not on a page boundary"
            )));
        }

        Ok(Self {
            page_size,
            free_page_offset,
        })
    }
}
