//! Fixed-width column types and tuple serialization.
//!
//! Every column occupies a fixed number of bytes, so a schema fully
//! determines the tuple width and the slotted page can size its slots
//! once at construction time.

use crate::storage::error::{StorageError, StorageResult};
use std::sync::Arc;

/// Data types supported by the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int32,
    /// Fixed-capacity text column; shorter strings are zero-padded.
    Text(usize),
}

impl DataType {
    /// On-disk width of a value of this type.
    pub fn width(&self) -> usize {
        match self {
            DataType::Int32 => 4,
            // 4-byte length prefix plus the padded payload
            DataType::Text(capacity) => 4 + capacity,
        }
    }
}

/// Ordered column list for one table. Shared via `Arc` between the heap
/// file and every page it materializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<DataType>,
}

impl Schema {
    pub fn new(columns: Vec<DataType>) -> Arc<Self> {
        Arc::new(Self { columns })
    }

    pub fn columns(&self) -> &[DataType] {
        &self.columns
    }

    /// Bytes occupied by one serialized tuple.
    pub fn tuple_width(&self) -> usize {
        self.columns.iter().map(DataType::width).sum()
    }
}

/// Values that can be stored in a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Text(String),
}

/// Serialize values according to the schema into exactly
/// `schema.tuple_width()` bytes.
pub fn serialize_tuple(values: &[Value], schema: &Schema) -> StorageResult<Vec<u8>> {
    if values.len() != schema.columns().len() {
        return Err(StorageError::SchemaMismatch(format!(
            "expected {} values, got {}",
            schema.columns().len(),
            values.len()
        )));
    }

    let mut data = Vec::with_capacity(schema.tuple_width());
    for (value, column) in values.iter().zip(schema.columns()) {
        match (value, column) {
            (Value::Int(v), DataType::Int32) => data.extend_from_slice(&v.to_le_bytes()),
            (Value::Text(s), DataType::Text(capacity)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *capacity {
                    return Err(StorageError::SchemaMismatch(format!(
                        "text value of {} bytes exceeds column capacity {}",
                        bytes.len(),
                        capacity
                    )));
                }
                data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                data.extend_from_slice(bytes);
                data.resize(data.len() + (capacity - bytes.len()), 0);
            }
            (value, column) => {
                return Err(StorageError::SchemaMismatch(format!(
                    "value {:?} is not compatible with column type {:?}",
                    value, column
                )));
            }
        }
    }
    Ok(data)
}

/// Deserialize one tuple's worth of bytes back into values.
pub fn deserialize_tuple(data: &[u8], schema: &Schema) -> StorageResult<Vec<Value>> {
    if data.len() != schema.tuple_width() {
        return Err(StorageError::SchemaMismatch(format!(
            "expected {} bytes, got {}",
            schema.tuple_width(),
            data.len()
        )));
    }

    let mut values = Vec::with_capacity(schema.columns().len());
    let mut offset = 0;
    for column in schema.columns() {
        match column {
            DataType::Int32 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&data[offset..offset + 4]);
                values.push(Value::Int(i32::from_le_bytes(buf)));
            }
            DataType::Text(capacity) => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&data[offset..offset + 4]);
                let len = u32::from_le_bytes(buf) as usize;
                if len > *capacity {
                    return Err(StorageError::SchemaMismatch(format!(
                        "stored text length {} exceeds column capacity {}",
                        len, capacity
                    )));
                }
                let bytes = &data[offset + 4..offset + 4 + len];
                let s = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    StorageError::SchemaMismatch(format!("invalid utf8 in text column: {}", e))
                })?;
                values.push(Value::Text(s));
            }
        }
        offset += column.width();
    }
    Ok(values)
}
