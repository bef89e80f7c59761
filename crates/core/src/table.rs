//! Tables: key to value association over two parallel arrays.

use crate::array::FemArray;
use crate::error::{FemError, FemResult};
use crate::sequence::{HASH_INIT, Sequence, hash_push};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Immutable table; entry `i` is `(keys[i], values[i])`.
#[derive(Clone)]
pub struct FemTable(Arc<TableData>);

struct TableData {
    keys: FemArray,
    values: FemArray,
}

impl FemTable {
    pub fn empty() -> Self {
        FemTable(Arc::new(TableData {
            keys: FemArray::empty(),
            values: FemArray::empty(),
        }))
    }

    /// Builds a table from equally long key and value arrays.
    pub fn from_columns(keys: FemArray, values: FemArray) -> FemResult<Self> {
        if keys.length() != values.length() {
            return Err(FemError::Conversion(format!(
                "table needs as many keys as values ({} keys, {} values)",
                keys.length(),
                values.length()
            )));
        }
        Ok(FemTable(Arc::new(TableData { keys, values })))
    }

    /// Builds a table from entries. Keys are forced; a repeated key keeps its
    /// first position and its last value.
    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> FemResult<Self> {
        let mut positions: HashMap<Value, usize> = HashMap::new();
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (key, value) in entries {
            let key = key.result(true)?;
            match positions.get(&key).copied() {
                Some(position) => values[position] = value,
                None => {
                    positions.insert(key.clone(), keys.len());
                    keys.push(key);
                    values.push(value);
                }
            }
        }
        Self::from_columns(FemArray::from_values(keys), FemArray::from_values(values))
    }

    pub fn ptr_eq(&self, other: &FemTable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn length(&self) -> usize {
        self.0.keys.length()
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    pub fn keys(&self) -> &FemArray {
        &self.0.keys
    }

    pub fn values(&self) -> &FemArray {
        &self.0.values
    }

    pub fn entry(&self, index: usize) -> FemResult<(Value, Value)> {
        Ok((self.0.keys.get(index)?, self.0.values.get(index)?))
    }

    /// Position of `key`.
    pub fn find(&self, key: &Value) -> FemResult<Option<usize>> {
        self.0.keys.find(key, 0)
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &Value) -> FemResult<Option<Value>> {
        match self.find(key)? {
            Some(index) => Ok(Some(self.0.values.get(index)?)),
            None => Ok(None),
        }
    }

    pub fn result(&self, recursive: bool) -> FemResult<FemTable> {
        let keys = self.0.keys.result(recursive)?;
        let values = self.0.values.result(recursive)?;
        if keys.ptr_eq(&self.0.keys) && values.ptr_eq(&self.0.values) {
            return Ok(self.clone());
        }
        Ok(FemTable(Arc::new(TableData { keys, values })))
    }

    pub fn hash_code(&self) -> FemResult<u32> {
        Ok(hash_push(
            hash_push(HASH_INIT, self.0.keys.hash_code()?),
            self.0.values.hash_code()?,
        ))
    }

    pub fn equals(&self, other: &FemTable) -> FemResult<bool> {
        if self.ptr_eq(other) {
            return Ok(true);
        }
        Ok(self.0.keys.equals(&other.0.keys)? && self.0.values.equals(&other.0.values)?)
    }
}

impl PartialEq for FemTable {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for FemTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys.iter().zip(self.0.values.iter()))
            .finish()
    }
}
