//! Context: the value to host-data conversion strategy
//!
//! Every [`Frame`](crate::Frame) carries a [`Context`]. Native delegates use it
//! to turn parameter values into host data ([`Context::data_of`]) and host
//! data back into values ([`Context::value_of`]). Hosts customize conversion
//! by implementing [`Conversion`]; both methods have defaults that cover the
//! built-in value kinds.
//!
//! A process-wide default context exists for ergonomics. It starts out as
//! [`Context::empty`] and can be replaced atomically with
//! [`Context::set_default`]; readers never observe a partial update.

use crate::array::FemArray;
use crate::binary::FemBinary;
use crate::error::{FemError, FemResult};
use crate::function::Function;
use crate::native::Native;
use crate::slot::Variable;
use crate::string::FemString;
use crate::table::FemTable;
use crate::types::TypeTag;
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// Host-side shape of a value's data.
#[derive(Debug, Clone)]
pub enum Data {
    /// Nothing.
    Void,
    /// Already a value; converted by identity.
    Value(Value),
    Boolean(bool),
    Integer(i64),
    /// Host text, converted to a string value.
    Text(String),
    String(FemString),
    /// Host bytes, converted to a binary value.
    Bytes(Vec<u8>),
    Binary(FemBinary),
    /// Host sequence, converted element-wise to an array value.
    Sequence(Vec<Data>),
    Array(FemArray),
    Function(Function),
    Table(FemTable),
    Variable(Variable),
    Native(Native),
}

impl From<()> for Data {
    fn from(_: ()) -> Self {
        Data::Void
    }
}

impl From<bool> for Data {
    fn from(value: bool) -> Self {
        Data::Boolean(value)
    }
}

impl From<i64> for Data {
    fn from(value: i64) -> Self {
        Data::Integer(value)
    }
}

impl From<i32> for Data {
    fn from(value: i32) -> Self {
        Data::Integer(i64::from(value))
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Data::Text(value.to_string())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Data::Text(value)
    }
}

impl From<&[u8]> for Data {
    fn from(value: &[u8]) -> Self {
        Data::Bytes(value.to_vec())
    }
}

impl<T: Into<Data>> From<Vec<T>> for Data {
    fn from(items: Vec<T>) -> Self {
        Data::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Data>> From<Option<T>> for Data {
    fn from(value: Option<T>) -> Self {
        value.map_or(Data::Void, Into::into)
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        Data::Value(value)
    }
}

impl From<Function> for Data {
    fn from(value: Function) -> Self {
        Data::Function(value)
    }
}

impl From<Native> for Data {
    fn from(value: Native) -> Self {
        Data::Native(value)
    }
}

/// Conversion strategy between values and host data.
pub trait Conversion: Send + Sync + fmt::Debug {
    /// Data of `value` if its type matches (or derives from) `tag`.
    fn data_of(&self, value: &Value, tag: TypeTag) -> FemResult<Data> {
        let value = value.result(false)?;
        let found = value.raw_tag();
        if found.is(tag) {
            value.data()
        } else {
            Err(FemError::conversion(tag, found))
        }
    }

    /// Value for `data`, detecting its shape.
    fn value_of(&self, data: Data) -> FemResult<Value> {
        Ok(match data {
            Data::Void => Value::Void,
            Data::Value(value) => value,
            Data::Boolean(b) => Value::Boolean(b),
            Data::Integer(i) => Value::Integer(i),
            Data::Text(text) => Value::String(FemString::from(text.as_str())),
            Data::String(s) => Value::String(s),
            Data::Bytes(bytes) => Value::Binary(FemBinary::from_bytes(bytes)),
            Data::Binary(binary) => Value::Binary(binary),
            Data::Sequence(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.value_of(item))
                    .collect::<FemResult<Vec<_>>>()?
                    .into(),
            ),
            Data::Array(array) => Value::Array(array),
            Data::Function(function) => Value::Handler(function),
            Data::Table(table) => Value::Table(table),
            Data::Variable(variable) => Value::Variable(variable),
            Data::Native(native) => Value::Native(native),
        })
    }
}

/// The built-in conversion rules, without customization.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardConversion;

impl Conversion for StandardConversion {}

/// Shared handle to a [`Conversion`] strategy.
#[derive(Clone)]
pub struct Context(Arc<dyn Conversion>);

static EMPTY: LazyLock<Context> = LazyLock::new(|| Context::new(StandardConversion));

static DEFAULT: LazyLock<RwLock<Context>> = LazyLock::new(|| RwLock::new(Context::empty()));

impl Context {
    pub fn new(conversion: impl Conversion + 'static) -> Self {
        Context(Arc::new(conversion))
    }

    /// The context using [`StandardConversion`].
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// The process-wide default context.
    pub fn current() -> Self {
        DEFAULT
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the process-wide default, returning the previous one.
    pub fn set_default(context: Context) -> Context {
        tracing::debug!(conversion = ?context.0, "replacing default context");
        let mut slot = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, context)
    }

    /// Restores [`Context::empty`] as the process-wide default.
    pub fn reset_default() -> Context {
        Self::set_default(Self::empty())
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn conversion(&self) -> &dyn Conversion {
        &*self.0
    }

    pub fn data_of(&self, value: &Value, tag: TypeTag) -> FemResult<Data> {
        self.0.data_of(value, tag)
    }

    pub fn value_of(&self, data: Data) -> FemResult<Value> {
        self.0.value_of(data)
    }

    pub fn function_of(&self, value: &Value) -> FemResult<Function> {
        match self.data_of(value, TypeTag::HANDLER)? {
            Data::Function(function) => Ok(function),
            Data::Value(value) => Ok(Function::value(value)),
            other => Err(mismatch(TypeTag::HANDLER, &other)),
        }
    }

    pub fn boolean_of(&self, value: &Value) -> FemResult<bool> {
        match self.data_of(value, TypeTag::BOOLEAN)? {
            Data::Boolean(b) => Ok(b),
            other => Err(mismatch(TypeTag::BOOLEAN, &other)),
        }
    }

    pub fn integer_of(&self, value: &Value) -> FemResult<i64> {
        match self.data_of(value, TypeTag::INTEGER)? {
            Data::Integer(i) => Ok(i),
            other => Err(mismatch(TypeTag::INTEGER, &other)),
        }
    }

    pub fn string_of(&self, value: &Value) -> FemResult<FemString> {
        match self.data_of(value, TypeTag::STRING)? {
            Data::String(s) => Ok(s),
            Data::Text(text) => Ok(FemString::from(text.as_str())),
            other => Err(mismatch(TypeTag::STRING, &other)),
        }
    }

    pub fn binary_of(&self, value: &Value) -> FemResult<FemBinary> {
        match self.data_of(value, TypeTag::BINARY)? {
            Data::Binary(binary) => Ok(binary),
            Data::Bytes(bytes) => Ok(FemBinary::from_bytes(bytes)),
            other => Err(mismatch(TypeTag::BINARY, &other)),
        }
    }

    pub fn array_of(&self, value: &Value) -> FemResult<FemArray> {
        match self.data_of(value, TypeTag::ARRAY)? {
            Data::Array(array) => Ok(array),
            other => Err(mismatch(TypeTag::ARRAY, &other)),
        }
    }

    pub fn table_of(&self, value: &Value) -> FemResult<FemTable> {
        match self.data_of(value, TypeTag::TABLE)? {
            Data::Table(table) => Ok(table),
            other => Err(mismatch(TypeTag::TABLE, &other)),
        }
    }
}

fn mismatch(expected: TypeTag, found: &Data) -> FemError {
    FemError::Conversion(format!(
        "conversion to {} produced unexpected data {:?}",
        expected, found
    ))
}

impl Default for Context {
    fn default() -> Self {
        Context::current()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Accepts integers where strings are expected by formatting them.
    #[derive(Debug)]
    struct Lenient;

    impl Conversion for Lenient {
        fn data_of(&self, value: &Value, tag: TypeTag) -> FemResult<Data> {
            let value = value.result(false)?;
            match (&value, tag) {
                (Value::Integer(i), t) if t == TypeTag::STRING => Ok(Data::Text(i.to_string())),
                _ => StandardConversion.data_of(&value, tag),
            }
        }
    }

    #[test]
    fn test_data_of_checks_type() {
        let context = Context::empty();
        assert_eq!(context.integer_of(&Value::integer(4)).unwrap(), 4);
        assert!(matches!(
            context.integer_of(&Value::from("4")),
            Err(FemError::Conversion(_))
        ));
        assert!(matches!(
            context.data_of(&Value::from("4"), TypeTag::ANY).unwrap(),
            Data::String(_)
        ));
    }

    #[test]
    fn test_value_of_detects_shapes() {
        let context = Context::empty();
        assert_eq!(context.value_of(Data::Void).unwrap(), Value::Void);
        assert_eq!(context.value_of(Data::from(true)).unwrap(), Value::boolean(true));
        assert_eq!(context.value_of(Data::from("x")).unwrap(), Value::from("x"));
        assert_eq!(
            context.value_of(Data::from(vec![1i64, 2])).unwrap(),
            Value::from(vec![Value::integer(1), Value::integer(2)])
        );
        let existing = Value::integer(9);
        assert!(context.value_of(Data::Value(existing.clone())).unwrap().same(&existing));
        let bytes: &[u8] = &[0xCA, 0xFE];
        let binary = context.value_of(Data::from(bytes)).unwrap();
        assert_eq!(binary.type_tag().unwrap(), TypeTag::BINARY);
        assert_eq!(context.binary_of(&binary).unwrap().to_string(), "0xCAFE");
        assert!(context.binary_of(&Value::from("CAFE")).is_err());
        let native = context.value_of(Data::Native(Native::new(3u8))).unwrap();
        assert_eq!(native.type_tag().unwrap(), TypeTag::NATIVE);
    }

    #[test]
    fn test_custom_conversion() {
        let context = Context::new(Lenient);
        assert_eq!(context.string_of(&Value::integer(12)).unwrap().to_string(), "12");
        assert!(context.boolean_of(&Value::integer(1)).is_err());
    }

    #[test]
    #[serial]
    fn test_default_context_is_swappable() {
        let custom = Context::new(Lenient);
        let previous = Context::set_default(custom.clone());
        assert!(Context::current().ptr_eq(&custom));
        assert!(Context::default().ptr_eq(&custom));
        assert_eq!(Value::of(5i64).unwrap(), Value::integer(5));
        Context::set_default(previous);
        Context::reset_default();
        assert!(Context::current().ptr_eq(&Context::empty()));
    }
}
