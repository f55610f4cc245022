//! Pager: append-only page allocation and raw page I/O.
//!
//! Pages are numbered from 0 and live at
//! `page_num * PAGE_SIZE + HEADER_SIZE + 1` in the database file. Page numbers
//! are never reused. Every page write is followed by a rewrite of the database
//! header so the free-page cursor on disk always matches the allocation
//! boundary.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::trace;

use crate::error::{Result, StorageError};
use crate::header::{DbHeader, FIRST_PAGE_OFFSET, HEADER_SIZE, PAGE_SIZE};

/// A page number (0-based). Page 0 holds the master catalog tree.
pub type PageNum = u32;

/// Pager tuning knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagerOptions {
    /// Call `sync_data` after every page write and header flush.
    pub sync_writes: bool,
}

/// Owns the database file and the free-page cursor.
pub struct Pager {
    file: File,
    header: DbHeader,
    options: PagerOptions,
}

impl Pager {
    /// Create a database file, truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, PagerOptions::default())
    }

    /// Create a database file with specific options.
    pub fn create_with_options<P: AsRef<Path>>(path: P, options: PagerOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        let mut pager = Self {
            file,
            header: DbHeader::default(),
            options,
        };
        pager.write_header()?;
        trace!(path = %path.as_ref().display(), "created database file");
        Ok(pager)
    }

    /// Open an existing database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, PagerOptions::default())
    }

    /// Open an existing database file with specific options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: PagerOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::MissingDatabase(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut buf = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        let read = read_fully(&mut file, &mut buf)?;
        if read < HEADER_SIZE {
            return Err(StorageError::CorruptHeader(format!(
                "file holds {read} header bytes, expected {HEADER_SIZE}"
            )));
        }
        let header = DbHeader::decode(&buf)?;
        trace!(
            path = %path.display(),
            free_page_offset = header.free_page_offset,
            "opened database file"
        );

        Ok(Self {
            file,
            header,
            options,
        })
    }

    /// Returns the on-disk header as currently held in memory.
    pub fn header(&self) -> &DbHeader {
        &self.header
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    /// Returns the number of pages handed out so far.
    pub fn page_count(&self) -> PageNum {
        ((self.header.free_page_offset as u64 - FIRST_PAGE_OFFSET) / PAGE_SIZE as u64) as PageNum
    }

    /// File offset of a page.
    pub fn page_offset(page_num: PageNum) -> u64 {
        page_num as u64 * PAGE_SIZE as u64 + FIRST_PAGE_OFFSET
    }

    /// Inverse of [`Pager::page_offset`]. Returns `None` for offsets that do
    /// not sit on a page boundary.
    pub fn page_for_offset(offset: u64) -> Option<PageNum> {
        let rel = offset.checked_sub(FIRST_PAGE_OFFSET)?;
        if rel % PAGE_SIZE as u64 != 0 {
            return None;
        }
        PageNum::try_from(rel / PAGE_SIZE as u64).ok()
    }

    /// Hand out the next page number. The cursor only reaches disk with the
    /// next page write.
    pub fn allocate_page(&mut self) -> Result<PageNum> {
        let page_num = self.page_count();
        let next = self.header.free_page_offset as u64 + PAGE_SIZE as u64;
        self.header.free_page_offset = u32::try_from(next).map_err(|_| StorageError::DatabaseFull)?;
        trace!(page = page_num, "allocated page");
        Ok(page_num)
    }

    /// Release a page. Pages are never reclaimed, so this does nothing.
    pub fn free_page(&mut self, page_num: PageNum) {
        trace!(page = page_num, "free_page ignored: pages are never reclaimed");
    }

    /// Read one page. Allocated pages that were never written (or lie past
    /// the end of the file) come back zero-filled.
    pub fn read_page(&mut self, page_num: PageNum) -> Result<Vec<u8>> {
        self.check_allocated(page_num)?;

        let mut data = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(Self::page_offset(page_num)))?;
        let read = read_fully(&mut self.file, &mut data)?;
        trace!(page = page_num, bytes = read, "read page");
        Ok(data)
    }

    /// Write one page, then flush the header.
    pub fn write_page(&mut self, page_num: PageNum, data: &[u8]) -> Result<()> {
        self.check_allocated(page_num)?;
        if data.len() != PAGE_SIZE {
            return Err(StorageError::corrupt_page(
                page_num,
                format!("page buffer is {} bytes, expected {}", data.len(), PAGE_SIZE),
            ));
        }

        self.file.seek(SeekFrom::Start(Self::page_offset(page_num)))?;
        self.file.write_all(data)?;
        self.write_header()?;
        trace!(page = page_num, "wrote page");
        Ok(())
    }

    /// Force file contents to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.encode())?;
        if self.options.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn check_allocated(&self, page_num: PageNum) -> Result<()> {
        let allocated = self.page_count();
        if page_num >= allocated {
            return Err(StorageError::PageOutOfRange {
                page: page_num,
                allocated,
            });
        }
        Ok(())
    }
}

/// Read until `buf` is full or the file ends. Returns the bytes read.
fn read_fully(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}
