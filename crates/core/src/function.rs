//! Functions and combinators
//!
//! A [`Function`] is an immutable call shape. Leaves produce a value from the
//! frame directly; combinators build child frames and delegate to other
//! functions. All of them share one entry point, [`Function::invoke`].
//!
//! ## Call shapes
//!
//! | Kind | `invoke(frame)` |
//! |------|-----------------|
//! | `Value(v)` | `v` |
//! | `Param(i)` | `frame.get(i)` |
//! | `Params` | `frame.params()` as an array |
//! | `Compose(t, ps)` | `t.invoke(frame.new_frame_lazy(ps))` |
//! | `Chain(t, ps)` | `h = t.invoke(frame)` as handler, then `h.invoke(frame.new_frame_lazy(ps))` |
//! | `Closure(f)` | handler of `f` bound to `frame` |
//! | `Bound(scope, f)` | `f.invoke(scope.with_params(frame.params()))` |
//! | `Future(f)` | unforced future of `f` over `frame` |
//! | `Proxy(p)` | target of `p`, or an unresolved-reference error |
//! | `Native(n)` | host delegate |
//! | `Trace(t, f)` | `f` wrapped in the listener callbacks of `t` |
//!
//! `Compose` and `Chain` share their payload ([`Call`]) and differ only in
//! whether the target is the callee or computes the callee.

use crate::error::{BoxError, FemError, FemResult, HostDelegateError};
use crate::frame::Frame;
use crate::future::Future;
use crate::proxy::Proxy;
use crate::sequence::{HASH_INIT, hash_push};
use crate::tracer::Tracer;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Host callback behind a native function. `Ok(None)` is a contract breach.
pub type NativeDelegate = dyn Fn(&Frame) -> Result<Option<Value>, BoxError> + Send + Sync;

/// Immutable callable.
#[derive(Clone)]
pub struct Function(Arc<FunctionKind>);

/// The call shapes a [`Function`] can take.
#[derive(Debug)]
pub enum FunctionKind {
    Value(Value),
    Param(usize),
    Params,
    Compose(Call),
    Chain(Call),
    Closure(Function),
    Bound(Frame, Function),
    Future(Function),
    Proxy(Proxy),
    Native(NativeFunction),
    Trace(Tracer, Function),
}

/// Target plus parameter functions of a `Compose` or `Chain` node.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub target: Function,
    pub params: Arc<[Function]>,
}

impl Call {
    fn hash_code(&self) -> u32 {
        self.params
            .iter()
            .fold(self.target.hash_code(), |hash, param| {
                hash_push(hash, param.hash_code())
            })
    }

    fn trace(&self, tracer: &Tracer) -> Call {
        Call {
            target: self.target.trace(tracer),
            params: self.params.iter().map(|p| p.trace(tracer)).collect(),
        }
    }
}

/// Named host delegate.
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    delegate: Arc<NativeDelegate>,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, frame: &Frame) -> FemResult<Value> {
        match (self.delegate)(frame) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(FemError::invariant(format!(
                "native function '{}' returned nothing",
                self.name
            ))),
            Err(err) => match err.downcast::<FemError>() {
                Ok(err) => Err((*err).push_message(format!("in native function '{}'", self.name))),
                Err(host) => {
                    tracing::debug!(native = %self.name, error = %host, "native function failed");
                    Err(HostDelegateError::new(Some(Arc::from(host)))
                        .with_message(format!("native function '{}' failed", self.name))
                        .with_value(Value::Array(frame.params()))
                        .with_context(frame.context().clone())
                        .into())
                }
            },
        }
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.delegate, &other.delegate)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({})", self.name)
    }
}

impl Function {
    fn new(kind: FunctionKind) -> Self {
        Function(Arc::new(kind))
    }

    /// Returns `value` on every invocation.
    pub fn value(value: Value) -> Self {
        Self::new(FunctionKind::Value(value))
    }

    /// Projects the `index`-th parameter of the frame.
    pub fn param(index: usize) -> Self {
        Self::new(FunctionKind::Param(index))
    }

    /// Returns the assured parameters of the frame as an array.
    pub fn params() -> Self {
        Self::new(FunctionKind::Params)
    }

    /// Direct call: invokes `target` with a child frame of lazy `params`.
    pub fn compose(target: Function, params: impl Into<Vec<Function>>) -> Self {
        let params: Vec<Function> = params.into();
        Self::new(FunctionKind::Compose(Call {
            target,
            params: params.into(),
        }))
    }

    /// Indirect call: invokes `target` to obtain the callee, then calls it
    /// with a child frame of lazy `params`.
    pub fn chain(target: Function, params: impl Into<Vec<Function>>) -> Self {
        let params: Vec<Function> = params.into();
        Self::new(FunctionKind::Chain(Call {
            target,
            params: params.into(),
        }))
    }

    /// Captures the invoking frame and returns `function` bound to it.
    pub fn closure(function: Function) -> Self {
        Self::new(FunctionKind::Closure(function))
    }

    /// `function` bound to `scope`: invoked with the caller's assured
    /// parameters on top of `scope`'s parent chain and context.
    pub fn bound(scope: Frame, function: Function) -> Self {
        Self::new(FunctionKind::Bound(scope, function))
    }

    /// Host delegate under a name used in diagnostics.
    pub fn native<F>(name: &str, delegate: F) -> Self
    where
        F: Fn(&Frame) -> Result<Option<Value>, BoxError> + Send + Sync + 'static,
    {
        Self::new(FunctionKind::Native(NativeFunction {
            name: Arc::from(name),
            delegate: Arc::new(delegate),
        }))
    }

    /// Defers this function: invoking the result yields an unforced future.
    pub fn to_future(&self) -> Function {
        match &*self.0 {
            FunctionKind::Future(_) | FunctionKind::Value(_) => self.clone(),
            _ => Self::new(FunctionKind::Future(self.clone())),
        }
    }

    pub fn kind(&self) -> &FunctionKind {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Evaluates this function against `frame`.
    pub fn invoke(&self, frame: &Frame) -> FemResult<Value> {
        match &*self.0 {
            FunctionKind::Value(value) => Ok(value.clone()),
            FunctionKind::Param(index) => frame.get(*index),
            FunctionKind::Params => Ok(Value::Array(frame.params())),
            FunctionKind::Compose(call) => call.target.invoke(&frame.new_frame_lazy(&call.params)),
            FunctionKind::Chain(call) => {
                let handle = call.target.invoke(frame)?;
                let callee = frame.context().function_of(&handle)?;
                callee.invoke(&frame.new_frame_lazy(&call.params))
            }
            FunctionKind::Closure(function) => Ok(Value::Handler(Function::bound(
                frame.clone(),
                function.clone(),
            ))),
            FunctionKind::Bound(scope, function) => {
                function.invoke(&scope.with_params(frame.params()))
            }
            FunctionKind::Future(function) => Ok(Value::Future(Future::new(
                frame.clone(),
                function.clone(),
            ))),
            FunctionKind::Proxy(proxy) => proxy.target()?.invoke(frame),
            FunctionKind::Native(native) => native.call(frame),
            FunctionKind::Trace(tracer, function) => tracer.run(function, frame),
        }
    }

    /// Returns this function with every invocation point reporting to
    /// `tracer`. Tracing twice with the same tracer changes nothing.
    pub fn trace(&self, tracer: &Tracer) -> Function {
        match &*self.0 {
            FunctionKind::Value(Value::Handler(function)) => {
                Function::value(Value::Handler(function.trace(tracer)))
            }
            FunctionKind::Value(_) | FunctionKind::Param(_) | FunctionKind::Params => {
                self.clone()
            }
            FunctionKind::Compose(call) => Self::traced(
                tracer,
                Self::new(FunctionKind::Compose(call.trace(tracer))),
            ),
            FunctionKind::Chain(call) => {
                Self::traced(tracer, Self::new(FunctionKind::Chain(call.trace(tracer))))
            }
            FunctionKind::Closure(function) => Function::closure(function.trace(tracer)),
            FunctionKind::Bound(scope, function) => {
                Function::bound(scope.clone(), function.trace(tracer))
            }
            FunctionKind::Future(function) => {
                Self::new(FunctionKind::Future(function.trace(tracer)))
            }
            FunctionKind::Proxy(_) | FunctionKind::Native(_) => Self::traced(tracer, self.clone()),
            FunctionKind::Trace(existing, function) => {
                if existing == tracer {
                    self.clone()
                } else {
                    function.trace(tracer)
                }
            }
        }
    }

    fn traced(tracer: &Tracer, function: Function) -> Function {
        Self::new(FunctionKind::Trace(tracer.clone(), function))
    }

    /// Structural hash consistent with `==`.
    pub fn hash_code(&self) -> u32 {
        let (tag, data) = match &*self.0 {
            FunctionKind::Value(value) => (1, value.hash_code().unwrap_or(0)),
            FunctionKind::Param(index) => (2, *index as u32),
            FunctionKind::Params => (3, 0),
            FunctionKind::Compose(call) => (4, call.hash_code()),
            FunctionKind::Chain(call) => (5, call.hash_code()),
            FunctionKind::Closure(function) => (6, function.hash_code()),
            FunctionKind::Bound(scope, function) => (
                7,
                hash_push(
                    scope.params().hash_code().unwrap_or(0),
                    function.hash_code(),
                ),
            ),
            FunctionKind::Future(function) => (8, function.hash_code()),
            FunctionKind::Proxy(proxy) => (9, proxy.hash_code()),
            FunctionKind::Native(native) => {
                let address = Arc::as_ptr(&native.delegate) as *const () as usize as u64;
                (10, (address ^ (address >> 32)) as u32)
            }
            FunctionKind::Trace(_, function) => (11, function.hash_code()),
        };
        hash_push(hash_push(HASH_INIT, tag), data)
    }
}

impl From<Value> for Function {
    fn from(value: Value) -> Self {
        Function::value(value)
    }
}

impl From<Proxy> for Function {
    fn from(proxy: Proxy) -> Self {
        Function::new(FunctionKind::Proxy(proxy))
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (FunctionKind::Value(a), FunctionKind::Value(b)) => a == b,
            (FunctionKind::Param(a), FunctionKind::Param(b)) => a == b,
            (FunctionKind::Params, FunctionKind::Params) => true,
            (FunctionKind::Compose(a), FunctionKind::Compose(b))
            | (FunctionKind::Chain(a), FunctionKind::Chain(b)) => a == b,
            (FunctionKind::Closure(a), FunctionKind::Closure(b))
            | (FunctionKind::Future(a), FunctionKind::Future(b)) => a == b,
            (FunctionKind::Bound(fa, a), FunctionKind::Bound(fb, b)) => fa == fb && a == b,
            (FunctionKind::Proxy(a), FunctionKind::Proxy(b)) => a == b,
            (FunctionKind::Native(a), FunctionKind::Native(b)) => a == b,
            (FunctionKind::Trace(ta, a), FunctionKind::Trace(tb, b)) => ta == tb && a == b,
            _ => false,
        }
    }
}

impl Eq for Function {}

impl std::hash::Hash for Function {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_code());
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
