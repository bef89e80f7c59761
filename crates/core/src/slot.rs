//! Mutable single-slot holders
//!
//! The only mutable values in the model. A [`Variable`] is a value in its own
//! right (identity semantics); a [`Pointer`] is a live reference to a
//! variable's content, re-read on every access, so a write through any
//! holder is visible to all of them.
//!
//! Slots are replaced atomically under a lock; there is no transactional
//! update beyond [`Variable::update`].

use crate::value::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared mutable slot, compared by identity.
#[derive(Clone)]
pub struct Variable(Arc<RwLock<Value>>);

impl Variable {
    pub fn new(initial: Value) -> Self {
        Variable(Arc::new(RwLock::new(initial)))
    }

    pub fn get(&self) -> Value {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the content, returning the previous one.
    pub fn set(&self, value: Value) -> Value {
        let mut slot = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, value)
    }

    /// Replaces the content with `f(current)` while holding the write lock.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) -> Value {
        let mut slot = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&slot);
        *slot = next.clone();
        next
    }

    pub(crate) fn hash_code(&self) -> u32 {
        let address = Arc::as_ptr(&self.0) as usize as u64;
        (address ^ (address >> 32)) as u32
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Variable {}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(value) => write!(f, "Variable({:?})", *value),
            Err(_) => write!(f, "Variable(<locked>)"),
        }
    }
}

/// Live reference to a [`Variable`].
#[derive(Clone, PartialEq, Eq)]
pub struct Pointer(Variable);

impl Pointer {
    pub fn new(target: &Variable) -> Self {
        Pointer(target.clone())
    }

    pub fn target(&self) -> &Variable {
        &self.0
    }

    /// Writes through to the referenced slot.
    pub fn set(&self, value: Value) -> Value {
        self.0.set(value)
    }
}

/// Prints the slot address only; the content may point back here.
impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({:p})", Arc::as_ptr(&(self.0).0))
    }
}
