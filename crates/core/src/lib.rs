//! FEM Core: the evaluation model shared by every front end
//!
//! This crate provides the language-agnostic pieces of the Function
//! Evaluation Model: immutable values, call shapes over frames, lazily
//! evaluated parameters and rope sequences.
//!
//! Key design principles:
//! - Value: what a program talks about (Void, Boolean, Integer, String, Binary, Array, ...)
//! - Function: an immutable call shape, evaluated with `invoke(frame)`
//! - Frame: a parameter array, a parent and a conversion context
//! - Future: a parameter that is computed at most once, on first access
//!
//! # Modules
//!
//! - `error`: The engine error taxonomy
//! - `types`: Runtime type tags
//! - `sequence`: The shared sequence contract and hashing helpers
//! - `string`: Rope strings over code points
//! - `binary`: Rope byte sequences
//! - `array`: Rope arrays over values
//! - `value`: Core Value enum
//! - `slot`: Mutable variables and pointers to them
//! - `native`: Opaque host objects
//! - `future`: Memoized lazy results
//! - `frame`: Evaluation frames
//! - `context`: Value to host-data conversion
//! - `table`: Key to value tables
//! - `function`: Call shapes and combinators
//! - `proxy`: Forward references for recursive definitions
//! - `tracer`: Invocation listeners

pub mod array;
pub mod binary;
pub mod context;
pub mod error;
pub mod frame;
pub mod function;
pub mod future;
pub mod native;
pub mod proxy;
pub mod sequence;
pub mod slot;
pub mod string;
pub mod table;
pub mod tracer;
pub mod types;
pub mod value;

pub use array::{FemArray, Values};
pub use binary::{Bytes, FemBinary};
pub use context::{Context, Conversion, Data, StandardConversion};
pub use error::{BoxError, FemError, FemResult, HostDelegateError};
pub use frame::Frame;
pub use function::{Call, Function, FunctionKind, NativeDelegate, NativeFunction};
pub use future::Future;
pub use native::Native;
pub use proxy::{Proxy, ProxyTable};
pub use sequence::{Collector, Sequence};
pub use slot::{Pointer, Variable};
pub use string::{CodePoints, FemString, StringEncoding};
pub use table::FemTable;
pub use tracer::{Invocation, TraceListener, Tracer};
pub use types::TypeTag;
pub use value::Value;
