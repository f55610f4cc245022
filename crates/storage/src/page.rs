//! Page codec: translates leaf and interior nodes to and from the on-disk page
//! layout.
//!
//! ## Page header (18 bytes)
//! ```text
//! [0]       node_type: u8 (0 = leaf, 1 = interior)
//! [1..3]    first_freeblock: u16, unused
//! [3..5]    number_of_cells: u16
//! [5..7]    cell_content_area: u16, recomputed on every write
//! [7..9]    cell_pointer_array: u16, start of the pointer array (0 = blank page)
//! [9]       fragmented_bytes: u8, unused
//! [10..18]  right_most_pointer: u64, next-leaf file offset (leaves only)
//! ```
//! All integers are little-endian. Child and sibling references are stored
//! as file offsets (see [`Pager::page_offset`]).
//!
//! ## Cells
//! Cells are appended from the end of the page toward the front. Each
//! pointer-array entry records the lowest address of its cell.
//!
//! Leaf cell, lowest address first: `[key: u64][value_len: u16][value]`.
//!
//! Interior cells interleave `child, key, child, key, ..., child`, each
//! written below the previous one. Pointer entry `i` records the address of
//! key `i`; child `i` sits right above it. The trailing child sits in the
//! 8 bytes right below the last key, and gets a pointer entry of its own.

use crate::error::{Result, StorageError};
use crate::header::PAGE_SIZE;
use crate::pager::{PageNum, Pager};

/// Size of the page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 18;

/// Where the cell pointer array starts in every page this crate writes.
pub const CELL_POINTER_ARRAY_START: u16 = PAGE_HEADER_SIZE as u16 + 1;

/// Size of one pointer-array entry.
pub const CELL_PTR_SIZE: usize = 2;

/// Bytes a leaf cell needs besides its value.
pub const LEAF_CELL_OVERHEAD: usize = 8 + 2;

const NODE_TYPE_OFFSET: usize = 0;
const NUMBER_OF_CELLS_OFFSET: usize = 3;
const CELL_CONTENT_AREA_OFFSET: usize = 5;
const CELL_POINTER_ARRAY_OFFSET: usize = 7;
const RIGHT_MOST_POINTER_OFFSET: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Leaf = 0,
    Interior = 1,
}

impl NodeType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(NodeType::Leaf),
            1 => Some(NodeType::Interior),
            _ => None,
        }
    }
}

/// Decoded page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub node_type: NodeType,
    pub number_of_cells: u16,
    pub cell_content_area: u16,
    pub cell_pointer_array: u16,
    pub right_most_pointer: u64,
}

impl PageHeader {
    fn blank(node_type: NodeType) -> Self {
        Self {
            node_type,
            number_of_cells: 0,
            cell_content_area: PAGE_SIZE as u16,
            cell_pointer_array: CELL_POINTER_ARRAY_START,
            right_most_pointer: 0,
        }
    }

    pub fn encode(&self, page: &mut [u8]) {
        page[NODE_TYPE_OFFSET] = self.node_type as u8;
        put_u16(page, NUMBER_OF_CELLS_OFFSET, self.number_of_cells);
        put_u16(page, CELL_CONTENT_AREA_OFFSET, self.cell_content_area);
        put_u16(page, CELL_POINTER_ARRAY_OFFSET, self.cell_pointer_array);
        put_u64(page, RIGHT_MOST_POINTER_OFFSET, self.right_most_pointer);
    }

    /// Returns `None` for a page that was never written (pointer-array field
    /// of zero), which callers treat as an empty leaf.
    pub fn decode(page_num: PageNum, page: &[u8]) -> Result<Option<Self>> {
        let cell_pointer_array = get_u16(page_num, page, CELL_POINTER_ARRAY_OFFSET)?;
        if cell_pointer_array == 0 {
            return Ok(None);
        }

        let type_byte = *page
            .get(NODE_TYPE_OFFSET)
            .ok_or_else(|| StorageError::corrupt_page(page_num, "page is empty"))?;
        let node_type = NodeType::from_byte(type_byte).ok_or_else(|| {
            StorageError::corrupt_page(page_num, format!("unknown node type {type_byte}"))
        })?;

        Ok(Some(Self {
            node_type,
            number_of_cells: get_u16(page_num, page, NUMBER_OF_CELLS_OFFSET)?,
            cell_content_area: get_u16(page_num, page, CELL_CONTENT_AREA_OFFSET)?,
            cell_pointer_array,
            right_most_pointer: get_u64(page_num, page, RIGHT_MOST_POINTER_OFFSET)?,
        }))
    }
}

/// Contents of a leaf page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafPage {
    pub keys: Vec<u64>,
    pub values: Vec<Vec<u8>>,
    pub next_leaf: Option<PageNum>,
}

/// Contents of an interior page. `children.len() == keys.len() + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteriorPage {
    pub keys: Vec<u64>,
    pub children: Vec<PageNum>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePage {
    Leaf(LeafPage),
    Interior(InteriorPage),
}

/// Clear `page` and write a leaf into it.
pub fn encode_leaf(
    page_num: PageNum,
    page: &mut [u8],
    keys: &[u64],
    values: &[Vec<u8>],
    next_leaf: Option<PageNum>,
) -> Result<()> {
    check_page_len(page_num, page)?;
    if keys.len() != values.len() {
        return Err(StorageError::corrupt_page(
            page_num,
            format!("{} keys but {} values", keys.len(), values.len()),
        ));
    }
    page.fill(0);

    let mut header = PageHeader::blank(NodeType::Leaf);
    let mut content = PAGE_SIZE;
    let mut pointer = header.cell_pointer_array as usize;

    for (key, value) in keys.iter().zip(values) {
        let value_len = u16::try_from(value.len()).map_err(|_| StorageError::ValueTooLarge {
            len: value.len(),
            max: u16::MAX as usize,
        })?;
        let cell_len = value.len() + LEAF_CELL_OVERHEAD;
        if content < pointer + CELL_PTR_SIZE + cell_len {
            return Err(page_full(page_num, keys.len()));
        }

        content -= value.len();
        page[content..content + value.len()].copy_from_slice(value);
        content -= 2;
        put_u16(page, content, value_len);
        content -= 8;
        put_u64(page, content, *key);

        put_u16(page, pointer, content as u16);
        pointer += CELL_PTR_SIZE;
        header.number_of_cells += 1;
    }

    header.cell_content_area = content as u16;
    header.right_most_pointer = next_leaf.map(Pager::page_offset).unwrap_or(0);
    header.encode(page);
    Ok(())
}

/// Clear `page` and write an interior node into it.
pub fn encode_interior(
    page_num: PageNum,
    page: &mut [u8],
    keys: &[u64],
    children: &[PageNum],
) -> Result<()> {
    check_page_len(page_num, page)?;
    if children.len() != keys.len() + 1 {
        return Err(StorageError::corrupt_page(
            page_num,
            format!("{} keys but {} children", keys.len(), children.len()),
        ));
    }
    page.fill(0);

    let mut header = PageHeader::blank(NodeType::Interior);
    let mut content = PAGE_SIZE;
    let mut pointer = header.cell_pointer_array as usize;

    for (i, child) in children.iter().enumerate() {
        if content < pointer + CELL_PTR_SIZE + 16 {
            return Err(page_full(page_num, keys.len()));
        }

        content -= 8;
        put_u64(page, content, Pager::page_offset(*child));
        if let Some(key) = keys.get(i) {
            content -= 8;
            put_u64(page, content, *key);
            header.number_of_cells += 1;
        }

        put_u16(page, pointer, content as u16);
        pointer += CELL_PTR_SIZE;
    }

    header.cell_content_area = content as u16;
    header.encode(page);
    Ok(())
}

/// Decode a page into a node. A never-written page decodes as an empty leaf.
pub fn decode(page_num: PageNum, page: &[u8]) -> Result<NodePage> {
    check_page_len(page_num, page)?;
    let Some(header) = PageHeader::decode(page_num, page)? else {
        return Ok(NodePage::Leaf(LeafPage::default()));
    };

    let cells = header.number_of_cells as usize;
    let pointers_start = header.cell_pointer_array as usize;
    let cell_offset = |i: usize| -> Result<usize> {
        Ok(get_u16(page_num, page, pointers_start + i * CELL_PTR_SIZE)? as usize)
    };

    match header.node_type {
        NodeType::Leaf => {
            let mut keys = Vec::with_capacity(cells);
            let mut values = Vec::with_capacity(cells);
            for i in 0..cells {
                let offset = cell_offset(i)?;
                keys.push(get_u64(page_num, page, offset)?);
                let len = get_u16(page_num, page, offset + 8)? as usize;
                let start = offset + LEAF_CELL_OVERHEAD;
                let value = page.get(start..start + len).ok_or_else(|| {
                    StorageError::corrupt_page(page_num, format!("leaf cell {i} runs past the page"))
                })?;
                // copy out: the page buffer is reused by the caller
                values.push(value.to_vec());
            }
            let next_leaf = match header.right_most_pointer {
                0 => None,
                offset => Some(offset_to_page(page_num, offset)?),
            };
            Ok(NodePage::Leaf(LeafPage {
                keys,
                values,
                next_leaf,
            }))
        }
        NodeType::Interior => {
            let mut keys = Vec::with_capacity(cells);
            let mut children = Vec::with_capacity(cells + 1);
            if cells == 0 {
                let offset = cell_offset(0)?;
                children.push(offset_to_page(page_num, get_u64(page_num, page, offset)?)?);
            }
            for i in 0..cells {
                let offset = cell_offset(i)?;
                keys.push(get_u64(page_num, page, offset)?);
                children.push(offset_to_page(page_num, get_u64(page_num, page, offset + 8)?)?);
                if i + 1 == cells {
                    let trailing = offset.checked_sub(8).ok_or_else(|| {
                        StorageError::corrupt_page(page_num, "trailing child below page start")
                    })?;
                    children.push(offset_to_page(page_num, get_u64(page_num, page, trailing)?)?);
                }
            }
            Ok(NodePage::Interior(InteriorPage { keys, children }))
        }
    }
}

fn check_page_len(page_num: PageNum, page: &[u8]) -> Result<()> {
    if page.len() != PAGE_SIZE {
        return Err(StorageError::corrupt_page(
            page_num,
            format!("page buffer is {} bytes, expected {}", page.len(), PAGE_SIZE),
        ));
    }
    Ok(())
}

fn page_full(page_num: PageNum, cells: usize) -> StorageError {
    StorageError::corrupt_page(page_num, format!("{cells} cells do not fit in one page"))
}

fn offset_to_page(page_num: PageNum, offset: u64) -> Result<PageNum> {
    Pager::page_for_offset(offset).ok_or_else(|| {
        StorageError::corrupt_page(page_num, format!("{offset} is not a page offset"))
    })
}

// ─── Byte helpers ─────────────────────────────────────────────────────────────

fn get_u16(page_num: PageNum, page: &[u8], at: usize) -> Result<u16> {
    page.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| StorageError::corrupt_page(page_num, format!("u16 at {at} out of bounds")))
}

fn get_u64(page_num: PageNum, page: &[u8], at: usize) -> Result<u64> {
    let bytes = page
        .get(at..at + 8)
        .ok_or_else(|| StorageError::corrupt_page(page_num, format!("u64 at {at} out of bounds")))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

fn put_u16(page: &mut [u8], at: usize, val: u16) {
    page[at..at + 2].copy_from_slice(&val.to_le_bytes());
}

fn put_u64(page: &mut [u8], at: usize, val: u64) {
    page[at..at + 8].copy_from_slice(&val.to_le_bytes());
}
