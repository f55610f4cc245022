//! Storage engine: pager, page codec, B+tree, and the master catalog.
//!
//! This crate provides:
//! - File header management (magic, page size, free-page cursor)
//! - Append-only page allocation and raw page I/O (pager)
//! - Leaf and interior page encoding (page)
//! - A B+tree over `u64` keys with an ordered cursor (btree)
//! - Row records and the page-0 table catalog (record, catalog)

pub mod btree;
pub mod catalog;
pub mod error;
pub mod header;
pub mod page;
pub mod pager;
pub mod record;

pub use btree::{BTree, MAX_VALUE_LEN, ORDER};
pub use catalog::{ColumnDef, Database, TableEntry, MASTER_ROOT_PAGE};
pub use error::{Result, StorageError};
pub use header::{DbHeader, PAGE_SIZE};
pub use pager::{PageNum, Pager, PagerOptions};
pub use record::{decode_record, encode_record, Value};
