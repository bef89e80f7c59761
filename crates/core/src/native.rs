//! Opaque host objects carried as values.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Host object wrapped as a value. Compared by identity.
#[derive(Clone)]
pub struct Native {
    type_name: &'static str,
    object: Arc<dyn Any + Send + Sync>,
}

impl Native {
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Native {
            type_name: std::any::type_name::<T>(),
            object: Arc::new(object),
        }
    }

    /// Host type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }

    pub(crate) fn hash_code(&self) -> u32 {
        let address = Arc::as_ptr(&self.object) as *const () as usize as u64;
        (address ^ (address >> 32)) as u32
    }
}

impl PartialEq for Native {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl Eq for Native {}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({})", self.type_name)
    }
}
