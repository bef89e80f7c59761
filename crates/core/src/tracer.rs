//! Invocation tracing
//!
//! A [`Tracer`] wraps a [`TraceListener`]. [`Function::trace`] re-wraps a
//! function tree so that each invocation point (composed and chained calls,
//! natives, proxies) runs through [`Tracer::run`]:
//!
//! 1. `on_execute`: the listener may rewrite the frame or the function.
//! 2. The (possibly rewritten) function is invoked with the (possibly
//!    rewritten) frame.
//! 3. `on_return` with the result, or `on_throw` with the error. Either may
//!    replace the outcome.
//!
//! The [`Invocation`] record lives only for one call.

use crate::error::{FemError, FemResult};
use crate::frame::Frame;
use crate::function::Function;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// State of one traced call, handed to the listener at each step.
#[derive(Debug)]
pub struct Invocation {
    pub frame: Frame,
    pub function: Function,
    pub result: Option<Value>,
    pub error: Option<FemError>,
}

impl Invocation {
    fn new(frame: Frame, function: Function) -> Self {
        Invocation {
            frame,
            function,
            result: None,
            error: None,
        }
    }

    /// Sets the result and clears the error.
    pub fn use_result(&mut self, value: Value) {
        self.result = Some(value);
        self.error = None;
    }

    /// Sets the error and clears the result.
    pub fn use_error(&mut self, error: FemError) {
        self.error = Some(error);
        self.result = None;
    }
}

/// Callbacks around traced invocations. All default to doing nothing.
pub trait TraceListener: Send + Sync {
    fn on_execute(&self, _call: &mut Invocation) {}

    fn on_return(&self, _call: &mut Invocation) {}

    fn on_throw(&self, _call: &mut Invocation) {}
}

/// Shared handle to a listener.
#[derive(Clone)]
pub struct Tracer(Arc<dyn TraceListener>);

impl Tracer {
    pub fn new(listener: impl TraceListener + 'static) -> Self {
        Tracer(Arc::new(listener))
    }

    pub fn from_arc(listener: Arc<dyn TraceListener>) -> Self {
        Tracer(listener)
    }

    pub fn listener(&self) -> &dyn TraceListener {
        &*self.0
    }

    /// Invokes `function` with `frame` between the listener callbacks.
    pub fn run(&self, function: &Function, frame: &Frame) -> FemResult<Value> {
        let mut call = Invocation::new(frame.clone(), function.clone());
        self.0.on_execute(&mut call);
        match call.function.invoke(&call.frame) {
            Ok(value) => {
                call.use_result(value);
                self.0.on_return(&mut call);
            }
            Err(error) => {
                call.use_error(error);
                self.0.on_throw(&mut call);
            }
        }
        match (call.error, call.result) {
            (Some(error), _) => Err(error),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(FemError::invariant(
                "traced invocation finished without a result",
            )),
        }
    }
}

impl PartialEq for Tracer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tracer({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}
