//! Row records: the byte format of table rows stored as B-tree values.
//!
//! A record is a concatenation of columns, each `[serial code: u64 LE][body]`:
//!
//! | code        | body                            |
//! |-------------|---------------------------------|
//! | 6           | `i64`, 8 bytes little-endian    |
//! | 7           | `f64` bits, 8 bytes little-endian |
//! | 13 + 2·n    | `n` bytes of UTF-8 text         |

use std::fmt;

use crate::error::{Result, StorageError};

const SERIAL_INTEGER: u64 = 6;
const SERIAL_REAL: u64 = 7;
const SERIAL_TEXT_BASE: u64 = 13;

/// A typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    fn serial_code(&self) -> u64 {
        match self {
            Value::Integer(_) => SERIAL_INTEGER,
            Value::Real(_) => SERIAL_REAL,
            Value::Text(s) => SERIAL_TEXT_BASE + 2 * s.len() as u64,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

pub fn encode_record(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        out.extend_from_slice(&value.serial_code().to_le_bytes());
        match value {
            Value::Integer(i) => out.extend_from_slice(&i.to_le_bytes()),
            Value::Real(r) => out.extend_from_slice(&r.to_bits().to_le_bytes()),
            Value::Text(s) => out.extend_from_slice(s.as_bytes()),
        }
    }
    out
}

pub fn decode_record(payload: &[u8]) -> Result<Vec<Value>> {
    let mut offset = 0usize;
    let mut row = Vec::new();

    while offset < payload.len() {
        let code = read_u64(payload, &mut offset)?;
        let value = match code {
            SERIAL_INTEGER => Value::Integer(read_u64(payload, &mut offset)? as i64),
            SERIAL_REAL => Value::Real(f64::from_bits(read_u64(payload, &mut offset)?)),
            code if code >= SERIAL_TEXT_BASE && (code - SERIAL_TEXT_BASE) % 2 == 0 => {
                let len = usize::try_from((code - SERIAL_TEXT_BASE) / 2).map_err(|_| {
                    StorageError::MalformedRecord(format!("text length code {code} too large"))
                })?;
                let bytes = take(payload, &mut offset, len)?;
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    StorageError::MalformedRecord(format!("invalid utf-8 text: {e}"))
                })?;
                Value::Text(text.to_string())
            }
            other => {
                return Err(StorageError::MalformedRecord(format!(
                    "unknown serial code {other}"
                )))
            }
        };
        row.push(value);
    }

    Ok(row)
}

fn take<'p>(buf: &'p [u8], offset: &mut usize, len: usize) -> Result<&'p [u8]> {
    let bytes = offset
        .checked_add(len)
        .and_then(|end| buf.get(*offset..end))
        .ok_or_else(|| {
            StorageError::MalformedRecord(format!(
                "record truncated: need {len} bytes at offset {}",
                *offset
            ))
        })?;
    *offset += len;
    Ok(bytes)
}

fn read_u64(buf: &[u8], offset: &mut usize) -> Result<u64> {
    let bytes = take(buf, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
}
