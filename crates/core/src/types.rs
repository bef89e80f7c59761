//! Type tags
//!
//! Every [`Value`](crate::Value) carries a small integer discriminant that is
//! stable across releases, so hosts can dispatch on it with a plain `match`.

use std::fmt;

/// Discriminant of a value kind.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: u16,
    name: &'static str,
}

impl TypeTag {
    pub const VOID: TypeTag = TypeTag::new(0, "VOID");
    pub const ARRAY: TypeTag = TypeTag::new(1, "ARRAY");
    pub const NATIVE: TypeTag = TypeTag::new(2, "NATIVE");
    pub const HANDLER: TypeTag = TypeTag::new(3, "HANDLER");
    pub const STRING: TypeTag = TypeTag::new(4, "STRING");
    pub const BINARY: TypeTag = TypeTag::new(5, "BINARY");
    pub const BOOLEAN: TypeTag = TypeTag::new(6, "BOOLEAN");
    pub const INTEGER: TypeTag = TypeTag::new(7, "INTEGER");
    pub const TABLE: TypeTag = TypeTag::new(11, "TABLE");
    pub const VARIABLE: TypeTag = TypeTag::new(12, "VARIABLE");
    pub const POINTER: TypeTag = TypeTag::new(13, "POINTER");
    pub const FUTURE: TypeTag = TypeTag::new(14, "FUTURE");
    /// Wildcard every tag derives from.
    pub const ANY: TypeTag = TypeTag::new(u16::MAX, "ANY");

    pub const fn new(id: u16, name: &'static str) -> Self {
        TypeTag { id, name }
    }

    pub const fn id(self) -> u16 {
        self.id
    }

    pub const fn name(self) -> &'static str {
        self.name
    }

    /// Returns true if a value of this type may be used where `other` is
    /// expected.
    pub fn is(self, other: TypeTag) -> bool {
        other.id == TypeTag::ANY.id || self.id == other.id
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl std::hash::Hash for TypeTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_matches_self_and_any() {
        assert!(TypeTag::INTEGER.is(TypeTag::INTEGER));
        assert!(TypeTag::INTEGER.is(TypeTag::ANY));
        assert!(!TypeTag::INTEGER.is(TypeTag::STRING));
        assert!(!TypeTag::ANY.is(TypeTag::INTEGER));
    }

    #[test]
    fn test_ids_are_stable() {
        assert_eq!(TypeTag::ARRAY.id(), 1);
        assert_eq!(TypeTag::STRING.id(), 4);
        assert_eq!(TypeTag::BINARY.id(), 5);
        assert_eq!(TypeTag::TABLE.id(), 11);
        assert_eq!(format!("{:?}", TypeTag::HANDLER), "HANDLER#3");
    }
}
