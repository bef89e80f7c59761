//! Error taxonomy for evaluation.
//!
//! Every fallible operation in this crate returns [`FemResult`]. Errors are
//! never recovered locally: they propagate with `?` up to whoever drove the
//! evaluation, carrying enough context to explain what failed.
//!
//! Errors are `Clone` so a [`Future`](crate::Future) that failed can be forced
//! again and a [`TraceListener`](crate::TraceListener) can inspect or replace
//! the error of an invocation.

use crate::context::Context;
use crate::types::TypeTag;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Boxed error returned by native delegates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the engine.
pub type FemResult<T> = Result<T, FemError>;

/// Error type for evaluation operations.
#[derive(Debug, Clone)]
pub enum FemError {
    /// A value could not be coerced into the requested type.
    Conversion(String),
    /// An index or range lies outside the valid domain of a frame or sequence.
    Bounds(String),
    /// A proxy (or registry entry) was used before its target was set.
    UnresolvedReference(String),
    /// An internal contract was broken, e.g. a delegate produced no result.
    InvariantViolation(String),
    /// A native delegate failed; the original cause is preserved.
    HostDelegate(Arc<HostDelegateError>),
}

impl FemError {
    pub fn conversion(expected: TypeTag, found: TypeTag) -> Self {
        FemError::Conversion(format!(
            "cannot convert {} value to {}",
            found.name(),
            expected.name()
        ))
    }

    pub fn index(index: usize, length: usize) -> Self {
        FemError::Bounds(format!("index {} out of range for length {}", index, length))
    }

    pub fn range(offset: usize, length: usize, total: usize) -> Self {
        FemError::Bounds(format!(
            "section [{}, {}) out of range for length {}",
            offset,
            offset.saturating_add(length),
            total
        ))
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        FemError::UnresolvedReference(name.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        FemError::InvariantViolation(message.into())
    }

    /// Wraps a host-level failure.
    pub fn host(cause: BoxError, message: impl Into<String>) -> Self {
        FemError::HostDelegate(Arc::new(
            HostDelegateError::new(Some(Arc::from(cause))).with_message(message),
        ))
    }

    /// Appends a message to the diagnostic chain of a host delegate error.
    ///
    /// Other kinds are returned unchanged: their message already names the
    /// failing operation.
    pub fn push_message(self, message: impl Into<String>) -> Self {
        match self {
            FemError::HostDelegate(mut inner) => {
                Arc::make_mut(&mut inner).messages.push(message.into());
                FemError::HostDelegate(inner)
            }
            other => other,
        }
    }

    /// The host delegate details, if this is a [`FemError::HostDelegate`].
    pub fn host_details(&self) -> Option<&HostDelegateError> {
        match self {
            FemError::HostDelegate(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for FemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FemError::Conversion(msg) => write!(f, "conversion error: {}", msg),
            FemError::Bounds(msg) => write!(f, "bounds error: {}", msg),
            FemError::UnresolvedReference(name) => write!(f, "unresolved reference: {}", name),
            FemError::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
            FemError::HostDelegate(inner) => write!(f, "{}", inner),
        }
    }
}

impl std::error::Error for FemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FemError::HostDelegate(inner) => inner.cause(),
            _ => None,
        }
    }
}

/// Details of a failed native delegate.
///
/// Messages are kept in the order they were pushed, outermost last. The
/// cause is shared, never rewritten.
#[derive(Debug, Clone)]
pub struct HostDelegateError {
    messages: Vec<String>,
    value: Option<Value>,
    context: Option<Context>,
    cause: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HostDelegateError {
    pub fn new(cause: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        HostDelegateError {
            messages: Vec::new(),
            value: None,
            context: None,
            cause,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// The value being processed when the delegate failed.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The context in effect when the delegate failed.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for HostDelegateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host delegate error")?;
        for message in self.messages.iter().rev() {
            write!(f, ": {}", message)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl From<HostDelegateError> for FemError {
    fn from(err: HostDelegateError) -> Self {
        FemError::HostDelegate(Arc::new(err))
    }
}
