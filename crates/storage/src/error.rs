//! Error type shared by every layer of the storage engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pager::PageNum;

/// Result alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("database file not found: {}", .0.display())]
    MissingDatabase(PathBuf),
    #[error("corrupt database header: {0}")]
    CorruptHeader(String),
    #[error("corrupt page {page}: {reason}")]
    CorruptPage { page: PageNum, reason: String },
    #[error("page {page} out of range ({allocated} pages allocated)")]
    PageOutOfRange { page: PageNum, allocated: PageNum },
    #[error("database is full: free-page cursor exceeds the header field")]
    DatabaseFull,
    #[error("value of {len} bytes exceeds the {max}-byte cell limit")]
    ValueTooLarge { len: usize, max: usize },
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("no such table '{0}'")]
    NoSuchTable(String),
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

impl StorageError {
    pub(crate) fn corrupt_page(page: PageNum, reason: impl Into<String>) -> Self {
        StorageError::CorruptPage {
            page,
            reason: reason.into(),
        }
    }
}
