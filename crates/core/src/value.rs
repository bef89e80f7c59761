//! Value: the immutable datum every evaluation produces
//!
//! A tagged sum type with one variant per kind. Two variants are lazy:
//! [`Value::Future`] (evaluated on first access, then cached) and
//! [`Value::Pointer`] (re-read from its slot on every access). Everything
//! that inspects a value's type or data goes through [`Value::result`], so
//! laziness is invisible to consumers except for when work happens.

use crate::array::FemArray;
use crate::binary::FemBinary;
use crate::context::{Context, Data};
use crate::error::{FemError, FemResult};
use crate::function::Function;
use crate::future::Future;
use crate::native::Native;
use crate::sequence::{HASH_INIT, hash_push};
use crate::slot::{Pointer, Variable};
use crate::string::FemString;
use crate::table::FemTable;
use crate::types::TypeTag;
use std::fmt;

/// Immutable, polymorphic datum.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Void,
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// Code-point sequence.
    String(FemString),
    /// Byte sequence.
    Binary(FemBinary),
    /// Value sequence.
    Array(FemArray),
    /// A function used as data.
    Handler(Function),
    /// Opaque host object, compared by identity.
    Native(Native),
    /// Mutable single slot, compared by identity.
    Variable(Variable),
    /// Live view of a variable's current content.
    Pointer(Pointer),
    /// Key to value association.
    Table(FemTable),
    /// Deferred evaluation, cached after the first access.
    Future(Future),
}

impl Value {
    pub fn void() -> Self {
        Value::Void
    }

    pub fn boolean(value: bool) -> Self {
        Value::Boolean(value)
    }

    pub fn integer(value: i64) -> Self {
        Value::Integer(value)
    }

    pub fn string(value: impl Into<FemString>) -> Self {
        Value::String(value.into())
    }

    pub fn binary(bytes: impl Into<FemBinary>) -> Self {
        Value::Binary(bytes.into())
    }

    pub fn array(values: impl Into<FemArray>) -> Self {
        Value::Array(values.into())
    }

    pub fn handler(function: Function) -> Self {
        Value::Handler(function)
    }

    pub fn native<T: std::any::Any + Send + Sync>(object: T) -> Self {
        Value::Native(Native::new(object))
    }

    pub fn variable(initial: Value) -> Self {
        Value::Variable(Variable::new(initial))
    }

    pub fn pointer(target: &Variable) -> Self {
        Value::Pointer(Pointer::new(target))
    }

    pub fn table(table: FemTable) -> Self {
        Value::Table(table)
    }

    pub fn future(future: Future) -> Self {
        Value::Future(future)
    }

    /// Converts host data using the process-wide default context.
    pub fn of(data: impl Into<Data>) -> FemResult<Self> {
        Context::current().value_of(data.into())
    }

    /// Converts host data using `context`.
    pub fn of_with(data: impl Into<Data>, context: &Context) -> FemResult<Self> {
        context.value_of(data.into())
    }

    /// Tag of this variant without forcing anything.
    pub fn raw_tag(&self) -> TypeTag {
        match self {
            Value::Void => TypeTag::VOID,
            Value::Boolean(_) => TypeTag::BOOLEAN,
            Value::Integer(_) => TypeTag::INTEGER,
            Value::String(_) => TypeTag::STRING,
            Value::Binary(_) => TypeTag::BINARY,
            Value::Array(_) => TypeTag::ARRAY,
            Value::Handler(_) => TypeTag::HANDLER,
            Value::Native(_) => TypeTag::NATIVE,
            Value::Variable(_) => TypeTag::VARIABLE,
            Value::Pointer(_) => TypeTag::POINTER,
            Value::Table(_) => TypeTag::TABLE,
            Value::Future(_) => TypeTag::FUTURE,
        }
    }

    /// Type of the (forced) value.
    pub fn type_tag(&self) -> FemResult<TypeTag> {
        Ok(self.result(false)?.raw_tag())
    }

    /// Data of the (forced) value.
    pub fn data(&self) -> FemResult<Data> {
        Ok(match self.result(false)? {
            Value::Void => Data::Void,
            Value::Boolean(b) => Data::Boolean(b),
            Value::Integer(i) => Data::Integer(i),
            Value::String(s) => Data::String(s),
            Value::Binary(b) => Data::Binary(b),
            Value::Array(a) => Data::Array(a),
            Value::Handler(f) => Data::Function(f),
            Value::Native(n) => Data::Native(n),
            Value::Variable(v) => Data::Variable(v),
            Value::Table(t) => Data::Table(t),
            // result() never yields a lazy variant
            lazy @ (Value::Pointer(_) | Value::Future(_)) => Data::Value(lazy),
        })
    }

    /// Forces lazy variants. With `recursive`, elements of arrays and tables
    /// are forced as well.
    pub fn result(&self, recursive: bool) -> FemResult<Value> {
        match self {
            Value::Future(future) => future.result(recursive),
            Value::Pointer(pointer) => dereference(pointer)?.result(recursive),
            Value::Array(array) if recursive => Ok(Value::Array(array.result(true)?)),
            Value::Table(table) if recursive => Ok(Value::Table(table.result(true)?)),
            other => Ok(other.clone()),
        }
    }

    /// Structural equality over `(type, data)`, forcing lazy operands.
    pub fn equals(&self, other: &Value) -> FemResult<bool> {
        if self.same(other) {
            return Ok(true);
        }
        let left = self.result(false)?;
        let right = other.result(false)?;
        Ok(match (&left, &right) {
            (Value::Void, Value::Void) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a.equals(b),
            (Value::Binary(a), Value::Binary(b)) => a.equals(b),
            (Value::Array(a), Value::Array(b)) => a.equals(b)?,
            (Value::Handler(a), Value::Handler(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Variable(a), Value::Variable(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.equals(b)?,
            _ => false,
        })
    }

    /// Hash consistent with [`Value::equals`].
    pub fn hash_code(&self) -> FemResult<u32> {
        let value = self.result(false)?;
        let data = match &value {
            Value::Void => 0,
            Value::Boolean(b) => {
                if *b {
                    1231
                } else {
                    1237
                }
            }
            Value::Integer(i) => (*i ^ (*i >> 32)) as u32,
            Value::String(s) => s.hash_code(),
            Value::Binary(b) => b.hash_code(),
            Value::Array(a) => a.hash_code()?,
            Value::Handler(f) => f.hash_code(),
            Value::Native(n) => n.hash_code(),
            Value::Variable(v) => v.hash_code(),
            Value::Table(t) => t.hash_code()?,
            Value::Pointer(_) | Value::Future(_) => 0,
        };
        Ok(hash_push(
            hash_push(HASH_INIT, u32::from(value.raw_tag().id())),
            data,
        ))
    }

    /// Identity check that never forces.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a.ptr_eq(b),
            (Value::Binary(a), Value::Binary(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Handler(a), Value::Handler(b)) => a.ptr_eq(b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Variable(a), Value::Variable(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// True unless this is an unforced future or a pointer.
    pub fn is_ready(&self) -> bool {
        match self {
            Value::Future(future) => future.ready(),
            Value::Pointer(_) => false,
            _ => true,
        }
    }
}

/// Longest pointer-to-pointer chain followed before giving up.
const MAX_POINTER_HOPS: usize = 64;

/// Follows `pointer` until the content is not a pointer.
fn dereference(pointer: &Pointer) -> FemResult<Value> {
    let mut content = pointer.target().get();
    for _ in 0..MAX_POINTER_HOPS {
        let Value::Pointer(next) = &content else {
            return Ok(content);
        };
        if next.target() == pointer.target() {
            return Err(FemError::invariant("pointer refers to its own variable"));
        }
        content = next.target().get();
    }
    Err(FemError::invariant(format!(
        "pointer chain longer than {} hops",
        MAX_POINTER_HOPS
    )))
}

/// Lossy: a value that fails to evaluate compares unequal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other) || self.equals(other).unwrap_or(false)
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_code().unwrap_or(0));
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Integer(i) => write!(f, "Integer({})", i),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Binary(b) => write!(f, "{:?}", b),
            Value::Array(a) => write!(f, "Array({:?})", a),
            Value::Handler(func) => write!(f, "Handler({:?})", func),
            Value::Native(n) => write!(f, "{:?}", n),
            Value::Variable(v) => write!(f, "{:?}", v),
            Value::Pointer(p) => write!(f, "{:?}", p),
            Value::Table(t) => write!(f, "Table({:?})", t),
            Value::Future(future) => write!(f, "{:?}", future),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(FemString::from(value))
    }
}

impl From<FemString> for Value {
    fn from(value: FemString) -> Self {
        Value::String(value)
    }
}

impl From<FemBinary> for Value {
    fn from(value: FemBinary) -> Self {
        Value::Binary(value)
    }
}

impl From<FemArray> for Value {
    fn from(value: FemArray) -> Self {
        Value::Array(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(FemArray::from_values(values))
    }
}

impl From<FemTable> for Value {
    fn from(value: FemTable) -> Self {
        Value::Table(value)
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Handler(value)
    }
}
