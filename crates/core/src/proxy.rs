//! Forward references for recursive definitions
//!
//! A [`ProxyTable`] is an arena of named function slots. A compiler asks the
//! table for a [`Proxy`] whenever it meets a name (possibly before the
//! definition), builds function trees that embed those proxies, defines every
//! slot, and finally calls [`ProxyTable::link`] to verify that no slot was
//! left empty.
//!
//! Proxies hold a weak handle to the arena, so a recursive definition (a
//! slot whose function refers back to its own proxy) does not keep the
//! arena alive on its own. Invoking a proxy whose slot is empty, or whose
//! arena is gone, is an unresolved-reference error.

use crate::error::{FemError, FemResult};
use crate::function::Function;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

#[derive(Default)]
struct Slots {
    by_name: HashMap<Arc<str>, usize>,
    entries: Vec<Slot>,
}

struct Slot {
    name: Arc<str>,
    target: Option<Function>,
}

/// Arena of named, write-once function slots.
#[derive(Default)]
pub struct ProxyTable {
    slots: Arc<RwLock<Slots>>,
}

impl ProxyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The proxy for `name`, registering an empty slot on first use.
    pub fn proxy(&self, name: &str) -> Proxy {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let index = match slots.by_name.get(name).copied() {
            Some(index) => index,
            None => {
                let index = slots.entries.len();
                let name: Arc<str> = Arc::from(name);
                slots.by_name.insert(name.clone(), index);
                slots.entries.push(Slot { name, target: None });
                index
            }
        };
        Proxy {
            slots: Arc::downgrade(&self.slots),
            index,
            name: slots.entries[index].name.clone(),
        }
    }

    /// Fills the slot for `name`. Each slot can be defined once.
    pub fn define(&self, name: &str, function: Function) -> FemResult<Proxy> {
        let proxy = self.proxy(name);
        proxy.set(function)?;
        Ok(proxy)
    }

    /// Verifies that every registered slot has been defined.
    pub fn link(&self) -> FemResult<()> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(missing) = slots.entries.iter().find(|slot| slot.target.is_none()) {
            return Err(FemError::unresolved(missing.name.to_string()));
        }
        tracing::debug!(slots = slots.entries.len(), "linked proxy table");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the registered slots, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|slot| slot.name.to_string())
            .collect()
    }
}

impl fmt::Debug for ProxyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyTable")
            .field("names", &self.names())
            .finish()
    }
}

/// Named placeholder for a function defined later.
#[derive(Clone)]
pub struct Proxy {
    slots: Weak<RwLock<Slots>>,
    index: usize,
    name: Arc<str>,
}

impl Proxy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_set(&self) -> bool {
        self.target().is_ok()
    }

    /// Sets the target. Fails if it was set before.
    pub fn set(&self, function: Function) -> FemResult<()> {
        let slots = self
            .slots
            .upgrade()
            .ok_or_else(|| FemError::unresolved(self.name.to_string()))?;
        let mut slots = slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut slots.entries[self.index];
        if slot.target.is_some() {
            return Err(FemError::invariant(format!(
                "proxy '{}' is already defined",
                self.name
            )));
        }
        slot.target = Some(function);
        Ok(())
    }

    /// The current target, or an unresolved-reference error.
    pub fn target(&self) -> FemResult<Function> {
        let slots = self
            .slots
            .upgrade()
            .ok_or_else(|| FemError::unresolved(self.name.to_string()))?;
        let slots = slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.entries[self.index]
            .target
            .clone()
            .ok_or_else(|| FemError::unresolved(self.name.to_string()))
    }

    pub(crate) fn hash_code(&self) -> u32 {
        let address = self.slots.as_ptr() as usize as u64;
        (address ^ (address >> 32)) as u32 ^ self.index as u32
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.slots, &other.slots) && self.index == other.index
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proxy({})", self.name)
    }
}
