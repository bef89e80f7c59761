//! Frames: parameter carriers for function invocation
//!
//! A [`Frame`] holds an ordered run of *assured* parameters, a parent frame
//! that supplies every parameter past them, and the [`Context`] in effect.
//! Index arithmetic walks the parent chain: `get(i)` with `i >= size()`
//! forwards to `parent.get(i - size())`.
//!
//! Frames are immutable. The derivation operations (`new_frame*`,
//! `with_params*`, `with_context`, `without_params`) return new frames that
//! share structure with the receiver.
//!
//! ## Binding strategies
//!
//! - **Eager**: assured parameters given as values.
//! - **Lazy**: assured parameters given as functions, each wrapped in a
//!   [`Future`] over the enclosing frame. `get` forces and caches a slot;
//!   `params()` exposes slots that were not forced yet as unforced futures, so
//!   iterating parameters never evaluates anything by itself.

use crate::array::FemArray;
use crate::context::Context;
use crate::error::{FemError, FemResult};
use crate::function::Function;
use crate::future::Future;
use crate::sequence::Sequence;
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Immutable parameter-and-context carrier.
#[derive(Clone)]
pub struct Frame(Arc<FrameData>);

struct FrameData {
    /// `None` only for root frames.
    parent: Option<Frame>,
    params: FemArray,
    context: Context,
}

static EMPTY: LazyLock<Frame> = LazyLock::new(|| Frame::root(Context::empty()));

impl Frame {
    fn root(context: Context) -> Self {
        Frame(Arc::new(FrameData {
            parent: None,
            params: FemArray::empty(),
            context,
        }))
    }

    fn child(parent: &Frame, params: FemArray, context: Context) -> Self {
        Frame(Arc::new(FrameData {
            parent: Some(parent.clone()),
            params,
            context,
        }))
    }

    /// Root frame without parameters, using the empty context.
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// Root frame using the process-wide default context.
    pub fn current() -> Self {
        Self::from(Context::current())
    }

    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The parent frame; a root frame is its own parent.
    pub fn parent(&self) -> Frame {
        match &self.0.parent {
            Some(parent) => parent.clone(),
            None => self.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn context(&self) -> &Context {
        &self.0.context
    }

    /// Number of assured parameters.
    pub fn size(&self) -> usize {
        self.0.params.length()
    }

    /// View over exactly the assured parameters. Lazy slots that were not
    /// forced yet appear as unforced futures.
    pub fn params(&self) -> FemArray {
        self.0.params.clone()
    }

    /// The `index`-th parameter, forced. Indexes past the assured parameters
    /// are resolved against the parent chain.
    pub fn get(&self, index: usize) -> FemResult<Value> {
        let mut frame = self;
        let mut local = index;
        loop {
            let size = frame.size();
            if local < size {
                return frame.0.params.get(local)?.result(false);
            }
            local -= size;
            match &frame.0.parent {
                Some(parent) => frame = parent,
                None => {
                    return Err(FemError::Bounds(format!(
                        "parameter index {} out of range ({} available)",
                        index,
                        index - local
                    )));
                }
            }
        }
    }

    /// Child frame without assured parameters.
    pub fn new_frame(&self) -> Frame {
        Self::child(self, FemArray::empty(), self.0.context.clone())
    }

    /// Child frame with the given assured values.
    pub fn new_frame_values(&self, params: FemArray) -> Frame {
        Self::child(self, params, self.0.context.clone())
    }

    /// Child frame whose assured parameters are `functions` evaluated lazily
    /// against this frame.
    pub fn new_frame_lazy(&self, functions: &[Function]) -> Frame {
        Self::child(self, self.deferred(functions), self.0.context.clone())
    }

    /// This frame with its assured parameters replaced by `params`.
    pub fn with_params(&self, params: FemArray) -> Frame {
        Self::child(&self.parent(), params, self.0.context.clone())
    }

    /// This frame with its assured parameters replaced by `functions`,
    /// evaluated lazily against the parent frame.
    pub fn with_params_lazy(&self, functions: &[Function]) -> Frame {
        let parent = self.parent();
        let params = parent.deferred(functions);
        Self::child(&parent, params, self.0.context.clone())
    }

    /// This frame without assured parameters.
    pub fn without_params(&self) -> Frame {
        if self.size() == 0 {
            return self.clone();
        }
        self.with_params(FemArray::empty())
    }

    /// This frame with a different context; `self` if the context is the same.
    pub fn with_context(&self, context: Context) -> Frame {
        if self.0.context.ptr_eq(&context) {
            return self.clone();
        }
        Frame(Arc::new(FrameData {
            parent: self.0.parent.clone(),
            params: self.0.params.clone(),
            context,
        }))
    }

    fn deferred(&self, functions: &[Function]) -> FemArray {
        FemArray::deferred(
            functions
                .iter()
                .map(|function| Future::new(self.clone(), function.clone()))
                .collect(),
        )
    }
}

/// Root frame without parameters, using the given context.
impl From<Context> for Frame {
    fn from(context: Context) -> Self {
        if context.ptr_eq(&EMPTY.0.context) {
            return Frame::empty();
        }
        Frame::root(context)
    }
}

/// Frames compare by their assured parameters.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.params == other.0.params
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut frame = self;
        while let Some(parent) = &frame.0.parent {
            depth += 1;
            frame = parent;
        }
        f.debug_struct("Frame")
            .field("params", &self.0.params)
            .field("depth", &depth)
            .finish()
    }
}
