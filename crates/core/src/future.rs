//! Lazy, memoized evaluation
//!
//! A [`Future`] owns a `(frame, function)` pair until it is first forced,
//! then owns only the produced value. It is the mechanism behind both lazy
//! parameters (a parameter is evaluated only if read, and at most once) and
//! shared results (many references to one deferred computation).
//!
//! ## Concurrency
//!
//! Forcing is exclusive per instance. The forcing thread moves the pending
//! pair out of the lock and evaluates without holding it; any other thread
//! that arrives meanwhile waits on a condition variable until the value is
//! published. A thread that re-enters its own in-progress evaluation gets an
//! invariant violation instead of a deadlock.
//!
//! If evaluation fails (or panics), the pending pair is put back so a later
//! access can try again; no partial state is published.

use crate::error::{FemError, FemResult};
use crate::frame::Frame;
use crate::function::Function;
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Deferred `function.invoke(frame)`, evaluated at most once.
#[derive(Clone)]
pub struct Future(Arc<FutureCell>);

struct FutureCell {
    state: Mutex<State>,
    published: Condvar,
}

enum State {
    Pending(Frame, Function),
    Running(ThreadId),
    Ready(Value),
}

/// Puts the pending pair back if evaluation does not complete.
struct Restore<'a> {
    cell: &'a FutureCell,
    pending: Option<(Frame, Function)>,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        if let Some((frame, function)) = self.pending.take() {
            *self.cell.lock() = State::Pending(frame, function);
            self.cell.published.notify_all();
        }
    }
}

impl FutureCell {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Future {
    pub fn new(frame: Frame, function: Function) -> Self {
        Future(Arc::new(FutureCell {
            state: Mutex::new(State::Pending(frame, function)),
            published: Condvar::new(),
        }))
    }

    pub fn ptr_eq(&self, other: &Future) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True once the value has been computed.
    pub fn ready(&self) -> bool {
        matches!(*self.0.lock(), State::Ready(_))
    }

    /// The computed value, if any, without forcing.
    pub fn peek(&self) -> Option<Value> {
        match &*self.0.lock() {
            State::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The computed value, or this future as a value if still pending.
    pub(crate) fn current(&self) -> Value {
        self.peek().unwrap_or_else(|| Value::Future(self.clone()))
    }

    /// Forces the evaluation (once) and returns the cached value.
    ///
    /// A cached pointer is dereferenced on every call, never stored
    /// dereferenced.
    pub fn result(&self, recursive: bool) -> FemResult<Value> {
        let value = self.force()?;
        if recursive || matches!(value, Value::Pointer(_)) {
            value.result(recursive)
        } else {
            Ok(value)
        }
    }

    fn force(&self) -> FemResult<Value> {
        let me = thread::current().id();
        let mut state = self.0.lock();
        let (frame, function) = loop {
            match &*state {
                State::Ready(value) => return Ok(value.clone()),
                State::Running(owner) if *owner == me => {
                    return Err(FemError::invariant(
                        "future re-entered its own evaluation",
                    ));
                }
                _ => {}
            }
            if matches!(*state, State::Running(_)) {
                state = self
                    .0
                    .published
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            if let State::Pending(frame, function) =
                std::mem::replace(&mut *state, State::Running(me))
            {
                break (frame, function);
            }
        };
        drop(state);

        tracing::trace!(function = ?function, "forcing future");
        let mut restore = Restore {
            cell: &self.0,
            pending: Some((frame, function)),
        };
        let outcome = match &restore.pending {
            Some((frame, function)) => function.invoke(frame).and_then(settle),
            None => Err(FemError::invariant("future lost its pending evaluation")),
        };
        let value = outcome?;

        // Success: drop the upstream frame and function, publish the value.
        let upstream = restore.pending.take();
        *self.0.lock() = State::Ready(value.clone());
        self.0.published.notify_all();
        drop(upstream);
        Ok(value)
    }
}

/// Flattens nested futures; every other variant is cached as produced.
fn settle(value: Value) -> FemResult<Value> {
    match value {
        Value::Future(inner) => inner.force(),
        other => Ok(other),
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.state.try_lock() {
            Ok(state) => match &*state {
                State::Ready(value) => write!(f, "Future({:?})", value),
                State::Running(_) => write!(f, "Future(<running>)"),
                State::Pending(_, function) => write!(f, "Future(<pending {:?}>)", function),
            },
            Err(_) => write!(f, "Future(<locked>)"),
        }
    }
}
