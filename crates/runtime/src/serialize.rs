//! Serialization of FEM Values
//!
//! This module provides a serializable representation of evaluated values,
//! for snapshots and for exchange with external systems.
//!
//! # Why TypedValue?
//!
//! A runtime `Value` may hold unevaluated futures, ropes shared with other
//! values, and code (handlers, natives). `TypedValue` is the fully evaluated,
//! owned, data-only form: every future is forced on the way in, ropes are
//! flattened, and code is rejected.
//!
//! Tables keep their entries as an ordered list, so the same table always
//! serializes to identical bytes.
//!
//! # Performance
//!
//! Uses bincode for fast, compact binary serialization.
//! For debugging, use `TypedValue::to_debug_string()`.

use fem_core::{FemArray, FemBinary, FemError, FemString, FemTable, Sequence, Value};
use serde::{Deserialize, Serialize};

/// Error during serialization/deserialization
#[derive(Debug)]
pub enum SerializeError {
    /// Cannot serialize handlers (code)
    HandlerNotSerializable,
    /// Cannot serialize native host objects
    NativeNotSerializable,
    /// Cannot serialize variables (mutable runtime state)
    VariableNotSerializable,
    /// Forcing a lazy value failed
    Evaluation(FemError),
    /// Bincode encoding/decoding error (preserves original error for debugging)
    BincodeError(Box<bincode::Error>),
    /// Invalid data structure
    InvalidData(String),
}

impl std::fmt::Display for SerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializeError::HandlerNotSerializable => {
                write!(f, "Handlers cannot be serialized - code is not data")
            }
            SerializeError::NativeNotSerializable => {
                write!(f, "Native objects cannot be serialized - host state")
            }
            SerializeError::VariableNotSerializable => {
                write!(f, "Variables cannot be serialized - runtime state")
            }
            SerializeError::Evaluation(e) => write!(f, "Evaluation failed: {}", e),
            SerializeError::BincodeError(e) => write!(f, "Bincode error: {}", e),
            SerializeError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializeError::Evaluation(e) => Some(e),
            SerializeError::BincodeError(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<bincode::Error> for SerializeError {
    fn from(e: bincode::Error) -> Self {
        SerializeError::BincodeError(Box::new(e))
    }
}

impl From<FemError> for SerializeError {
    fn from(e: FemError) -> Self {
        SerializeError::Evaluation(e)
    }
}

/// Serializable representation of FEM Values
///
/// Only data survives: handlers, natives and variables are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TypedValue {
    Void,
    Boolean(bool),
    Integer(i64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<TypedValue>),
    /// Entries in table order
    Table(Vec<(TypedValue, TypedValue)>),
}

impl TypedValue {
    /// Convert from runtime Value, forcing every lazy part
    ///
    /// Pointers serialize as the current content of their variable.
    pub fn from_value(value: &Value) -> Result<Self, SerializeError> {
        match value.result(false)? {
            Value::Void => Ok(TypedValue::Void),
            Value::Boolean(v) => Ok(TypedValue::Boolean(v)),
            Value::Integer(v) => Ok(TypedValue::Integer(v)),
            Value::String(s) => Ok(TypedValue::String(text_of(&s)?)),
            Value::Binary(b) => Ok(TypedValue::Binary(b.to_vec())),
            Value::Array(array) => Ok(TypedValue::Array(Self::from_array(&array)?)),
            Value::Table(table) => {
                let keys = Self::from_array(table.keys())?;
                let values = Self::from_array(table.values())?;
                Ok(TypedValue::Table(keys.into_iter().zip(values).collect()))
            }
            Value::Handler(_) => Err(SerializeError::HandlerNotSerializable),
            Value::Native(_) => Err(SerializeError::NativeNotSerializable),
            Value::Variable(_) => Err(SerializeError::VariableNotSerializable),
            lazy @ (Value::Pointer(_) | Value::Future(_)) => Err(SerializeError::InvalidData(
                format!("value did not resolve: {:?}", lazy),
            )),
        }
    }

    fn from_array(array: &FemArray) -> Result<Vec<TypedValue>, SerializeError> {
        let mut items = Vec::with_capacity(array.length());
        for item in array.iter() {
            items.push(TypedValue::from_value(&item)?);
        }
        Ok(items)
    }

    /// Convert to runtime Value
    pub fn to_value(&self) -> Result<Value, SerializeError> {
        match self {
            TypedValue::Void => Ok(Value::Void),
            TypedValue::Boolean(v) => Ok(Value::Boolean(*v)),
            TypedValue::Integer(v) => Ok(Value::Integer(*v)),
            TypedValue::String(s) => Ok(Value::String(FemString::from(s.as_str()))),
            TypedValue::Binary(bytes) => Ok(Value::Binary(FemBinary::from_bytes(bytes.as_slice()))),
            TypedValue::Array(items) => {
                let values = items
                    .iter()
                    .map(TypedValue::to_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(FemArray::from_values(values)))
            }
            TypedValue::Table(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    pairs.push((key.to_value()?, value.to_value()?));
                }
                let table = FemTable::from_entries(pairs)?;
                if table.length() != entries.len() {
                    return Err(SerializeError::InvalidData(
                        "table contains duplicate keys".to_string(),
                    ));
                }
                Ok(Value::Table(table))
            }
        }
    }

    /// Serialize to binary format (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        bincode::serialize(self).map_err(SerializeError::from)
    }

    /// Deserialize from binary format (bincode)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializeError> {
        bincode::deserialize(bytes).map_err(SerializeError::from)
    }

    /// Convert to human-readable debug string
    pub fn to_debug_string(&self) -> String {
        match self {
            TypedValue::Void => "void".to_string(),
            TypedValue::Boolean(v) => format!("{}", v),
            TypedValue::Integer(v) => format!("{}", v),
            TypedValue::String(v) => format!("{:?}", v),
            TypedValue::Binary(bytes) => FemBinary::from_bytes(bytes.as_slice()).to_string(),
            TypedValue::Array(items) => {
                let items: Vec<String> = items.iter().map(|v| v.to_debug_string()).collect();
                format!("[{}]", items.join("; "))
            }
            TypedValue::Table(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_debug_string(), v.to_debug_string()))
                    .collect();
                format!("{{{}}}", entries.join("; "))
            }
        }
    }
}

fn text_of(string: &FemString) -> Result<String, SerializeError> {
    string
        .to_code_points()
        .into_iter()
        .map(char::from_u32)
        .collect::<Option<String>>()
        .ok_or_else(|| {
            SerializeError::InvalidData("string contains invalid code points".to_string())
        })
}

/// Extension trait for Value to add serialization methods
pub trait ValueSerialize {
    /// Convert to serializable TypedValue
    fn to_typed(&self) -> Result<TypedValue, SerializeError>;

    /// Serialize directly to bytes
    fn to_bytes(&self) -> Result<Vec<u8>, SerializeError>;
}

impl ValueSerialize for Value {
    fn to_typed(&self) -> Result<TypedValue, SerializeError> {
        TypedValue::from_value(self)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        TypedValue::from_value(self)?.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fem_core::{BoxError, Frame, Function, Variable};

    fn ints(values: &[i64]) -> FemArray {
        values.iter().map(|&v| Value::integer(v)).collect()
    }

    #[test]
    fn test_scalar_roundtrip() {
        for value in [
            Value::Void,
            Value::boolean(true),
            Value::integer(-7),
            Value::from("grüße"),
            Value::binary(vec![0u8, 0xFF, 7]),
        ] {
            let typed = TypedValue::from_value(&value).unwrap();
            assert_eq!(typed.to_value().unwrap(), value);
        }
    }

    #[test]
    fn test_lazy_array_is_forced() {
        let frame = Frame::empty().new_frame_lazy(&[
            Function::value(Value::integer(1)),
            Function::native("two", |_frame| -> Result<Option<Value>, BoxError> {
                Ok(Some(Value::integer(2)))
            }),
        ]);
        let typed = TypedValue::from_value(&Value::Array(frame.params())).unwrap();
        assert_eq!(
            typed,
            TypedValue::Array(vec![TypedValue::Integer(1), TypedValue::Integer(2)])
        );
    }

    #[test]
    fn test_rope_is_flattened() {
        let rope = ints(&[1, 2]).concat(&ints(&[3])).reverse();
        let typed = Value::Array(rope).to_typed().unwrap();
        assert_eq!(typed.to_debug_string(), "[3; 2; 1]");
    }

    #[test]
    fn test_binary_rope_is_flattened() {
        let rope = FemBinary::from_bytes(vec![1u8, 2]).concat(&FemBinary::from_bytes(vec![0xAB]));
        let typed = Value::Binary(rope.reverse()).to_typed().unwrap();
        assert_eq!(typed, TypedValue::Binary(vec![0xAB, 2, 1]));
        assert_eq!(typed.to_debug_string(), "0xAB0201");
    }

    #[test]
    fn test_table_roundtrip() {
        let table = FemTable::from_entries(vec![
            (Value::from("b"), Value::integer(2)),
            (Value::from("a"), Value::Array(ints(&[1]))),
        ])
        .unwrap();
        let value = Value::Table(table);
        let typed = value.to_typed().unwrap();
        assert_eq!(typed.to_debug_string(), "{\"b\": 2; \"a\": [1]}");
        assert_eq!(typed.to_value().unwrap(), value);
    }

    #[test]
    fn test_duplicate_table_keys_rejected() {
        let typed = TypedValue::Table(vec![
            (TypedValue::Integer(1), TypedValue::Void),
            (TypedValue::Integer(1), TypedValue::Void),
        ]);
        assert!(matches!(
            typed.to_value(),
            Err(SerializeError::InvalidData(_))
        ));
    }

    #[test]
    fn test_code_and_state_not_serializable() {
        let handler = Value::handler(Function::param(0));
        assert!(matches!(
            TypedValue::from_value(&handler),
            Err(SerializeError::HandlerNotSerializable)
        ));
        assert!(matches!(
            TypedValue::from_value(&Value::native(5u32)),
            Err(SerializeError::NativeNotSerializable)
        ));
        let variable = Variable::new(Value::integer(1));
        assert!(matches!(
            TypedValue::from_value(&Value::Variable(variable.clone())),
            Err(SerializeError::VariableNotSerializable)
        ));
        // A pointer is read through.
        let pointer = Value::pointer(&variable);
        assert_eq!(pointer.to_typed().unwrap(), TypedValue::Integer(1));
    }

    #[test]
    fn test_failed_evaluation_is_reported() {
        let frame = Frame::empty().new_frame_lazy(&[Function::param(5)]);
        let result = TypedValue::from_value(&Value::Array(frame.params()));
        assert!(matches!(
            result,
            Err(SerializeError::Evaluation(FemError::Bounds(_)))
        ));
    }

    #[test]
    fn test_invalid_code_points_rejected() {
        let lone_surrogate = FemString::from_code_points(&[0x61, 0xD800]);
        assert!(matches!(
            TypedValue::from_value(&Value::String(lone_surrogate)),
            Err(SerializeError::InvalidData(_))
        ));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let typed = TypedValue::Table(vec![
            (TypedValue::String("x".to_string()), TypedValue::Integer(10)),
            (
                TypedValue::Integer(42),
                TypedValue::Array(vec![TypedValue::Boolean(true), TypedValue::Void]),
            ),
        ]);
        let bytes = typed.to_bytes().unwrap();
        assert_eq!(TypedValue::from_bytes(&bytes).unwrap(), typed);
        assert_eq!(Value::integer(42).to_bytes().unwrap(), TypedValue::Integer(42).to_bytes().unwrap());
    }

    #[test]
    fn test_bincode_is_compact() {
        let bytes = TypedValue::Integer(42).to_bytes().unwrap();
        assert!(
            bytes.len() < 20,
            "Expected compact encoding, got {} bytes",
            bytes.len()
        );
    }

    #[test]
    fn test_corrupted_data_returns_error() {
        assert!(TypedValue::from_bytes(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).is_err());
        assert!(TypedValue::from_bytes(&[]).is_err());

        let bytes = TypedValue::String("hello world".to_string()).to_bytes().unwrap();
        assert!(TypedValue::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }
}
