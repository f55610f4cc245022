//! Master catalog: the tree on page 0 listing every table.
//!
//! Each catalog row is a record `(name TEXT, page INTEGER, sql TEXT)` keyed by
//! row id. Table names compare case-insensitively.

use std::path::Path;

use tracing::debug;

use crate::btree::BTree;
use crate::error::{Result, StorageError};
use crate::pager::{PageNum, Pager, PagerOptions};
use crate::record::{decode_record, encode_record, Value};

/// Root page of the master catalog tree.
pub const MASTER_ROOT_PAGE: PageNum = 0;

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub row_id: u64,
    pub name: String,
    pub root_page: PageNum,
    /// The `CREATE TABLE` text the table was made from.
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type, empty when the column has none.
    pub data_type: String,
}

impl TableEntry {
    fn to_record(&self) -> Vec<u8> {
        encode_record(&[
            Value::Text(self.name.clone()),
            Value::Integer(self.root_page as i64),
            Value::Text(self.sql.clone()),
        ])
    }

    fn from_record(row_id: u64, payload: &[u8]) -> Result<Self> {
        let row = decode_record(payload)?;
        let malformed = || {
            StorageError::MalformedRecord(format!(
                "catalog row {row_id} has unexpected shape {row:?}"
            ))
        };
        let [name, page, sql] = row.as_slice() else {
            return Err(malformed());
        };
        let (Some(name), Some(page), Some(sql)) =
            (name.as_text(), page.as_integer(), sql.as_text())
        else {
            return Err(malformed());
        };
        let root_page = PageNum::try_from(page).map_err(|_| {
            StorageError::MalformedRecord(format!("catalog row {row_id}: bad page {page}"))
        })?;
        Ok(Self {
            row_id,
            name: name.to_string(),
            root_page,
            sql: sql.to_string(),
        })
    }

    /// Columns from the parenthesised list in the stored SQL.
    pub fn columns(&self) -> Vec<ColumnDef> {
        let (Some(open), Some(close)) = (self.sql.find('('), self.sql.rfind(')')) else {
            return Vec::new();
        };
        if close <= open {
            return Vec::new();
        }
        self.sql[open + 1..close]
            .split(',')
            .filter_map(|def| {
                let mut words = def.split_whitespace();
                let name = words.next()?;
                Some(ColumnDef {
                    name: name.to_string(),
                    data_type: words.collect::<Vec<_>>().join(" "),
                })
            })
            .collect()
    }
}

/// A database file: the pager plus the catalog on page 0.
pub struct Database {
    pager: Pager,
}

impl Database {
    /// Create a new database file with an empty catalog.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, PagerOptions::default())
    }

    pub fn create_with_options<P: AsRef<Path>>(path: P, options: PagerOptions) -> Result<Self> {
        let mut pager = Pager::create_with_options(path, options)?;
        let root = BTree::create(&mut pager)?;
        if root != MASTER_ROOT_PAGE {
            return Err(StorageError::corrupt_page(root, "catalog must live on page 0"));
        }
        debug!("initialized master catalog");
        Ok(Self { pager })
    }

    /// Open an existing database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, PagerOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: PagerOptions) -> Result<Self> {
        let pager = Pager::open_with_options(path, options)?;
        if pager.page_count() == 0 {
            return Err(StorageError::CorruptHeader(
                "no pages allocated: master catalog missing".to_string(),
            ));
        }
        Ok(Self { pager })
    }

    pub fn pager(&mut self) -> &mut Pager {
        &mut self.pager
    }

    /// The master catalog tree.
    pub fn master(&mut self) -> Result<BTree<'_>> {
        self.tree(MASTER_ROOT_PAGE)
    }

    /// A tree view over any root page.
    pub fn tree(&mut self, root_page: PageNum) -> Result<BTree<'_>> {
        BTree::fetch(&mut self.pager, root_page)
    }

    /// Allocate a root page for a new table and record it in the catalog.
    pub fn create_table(&mut self, name: &str, sql: &str) -> Result<TableEntry> {
        if self.find_table(name)?.is_some() {
            return Err(StorageError::TableExists(name.to_string()));
        }

        let root_page = BTree::create(&mut self.pager)?;
        let mut master = self.master()?;
        let entry = TableEntry {
            row_id: master.next_row_id()?,
            name: name.to_string(),
            root_page,
            sql: sql.to_string(),
        };
        master.insert(entry.row_id, &entry.to_record())?;
        debug!(table = name, root_page, row_id = entry.row_id, "created table");
        Ok(entry)
    }

    pub fn find_table(&mut self, name: &str) -> Result<Option<TableEntry>> {
        Ok(self
            .list_tables()?
            .into_iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name)))
    }

    /// All catalog rows in row-id order.
    pub fn list_tables(&mut self) -> Result<Vec<TableEntry>> {
        self.master()?
            .scan()?
            .into_iter()
            .map(|(row_id, payload)| TableEntry::from_record(row_id, &payload))
            .collect()
    }

    pub fn table_tree(&mut self, name: &str) -> Result<BTree<'_>> {
        let entry = self
            .find_table(name)?
            .ok_or_else(|| StorageError::NoSuchTable(name.to_string()))?;
        self.tree(entry.root_page)
    }

    /// Append a row to `table`, returning its row id.
    pub fn insert_row(&mut self, table: &str, values: &[Value]) -> Result<u64> {
        let mut tree = self.table_tree(table)?;
        let row_id = tree.next_row_id()?;
        tree.insert(row_id, &encode_record(values))?;
        Ok(row_id)
    }

    /// Every row of `table` in row-id order.
    pub fn rows(&mut self, table: &str) -> Result<Vec<(u64, Vec<Value>)>> {
        self.table_tree(table)?
            .scan()?
            .into_iter()
            .map(|(row_id, payload)| Ok((row_id, decode_record(&payload)?)))
            .collect()
    }
}
