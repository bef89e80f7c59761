//! FEM Runtime: driving the evaluation core from a host
//!
//! Key design principles:
//! - Engine: one configured place to define, link and evaluate function trees
//! - NativeRegistry: natives are registered by name, per engine
//! - TypedValue: the data-only, serializable form of an evaluated value
//!
//! # Modules
//!
//! - `config`: Environment-driven engine configuration
//! - `logging`: Subscriber installation and the logging trace listener
//! - `natives`: Native function registry and the standard natives
//! - `serialize`: Value snapshots via serde/bincode
//! - `engine`: The evaluation driver

pub mod config;
pub mod engine;
pub mod logging;
pub mod natives;
pub mod serialize;

pub use config::{EngineConfig, TraceMode};
pub use engine::Engine;
pub use logging::{LogListener, init_logging};
pub use natives::{NativeFn, NativeRegistry};
pub use serialize::{SerializeError, TypedValue, ValueSerialize};

// Core types hosts need alongside the engine
pub use fem_core::{Context, FemError, FemResult, Frame, Function, Value};
