//! Named-field access on wrapped values
//!
//! Property reads and writes on a proxy go through the same interception
//! protocol as method calls, under the names in [`PropertyOp`]. The storage
//! itself is reached through [`PropertyTable`], usually derived with
//! `#[derive(PropertyTable)]`.

use std::any::Any;

use crate::contract::PropertyDescriptor;
use crate::error::PropertyError;
use crate::value::Value;

/// Where a property access originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessScope {
    /// Any caller: public fields only
    Public,
    /// Code in the target's declaring module: every field
    Friend,
}

/// Property operation, doubling as the interceptable member name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyOp {
    /// Read a field
    Get,
    /// Write a field
    Set,
    /// Check that a field exists, is accessible, and holds a non-null value
    Isset,
    /// Reset an `Option` field to `None`
    Unset,
}

impl PropertyOp {
    /// All property operations
    pub const ALL: [PropertyOp; 4] = [Self::Get, Self::Set, Self::Isset, Self::Unset];

    /// Name under which hooks for this operation are registered
    pub fn method_name(self) -> &'static str {
        match self {
            Self::Get => "get_property",
            Self::Set => "set_property",
            Self::Isset => "has_property",
            Self::Unset => "unset_property",
        }
    }

    /// Inverse of [`PropertyOp::method_name`]
    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.method_name() == name)
    }
}

/// Raw field storage of a proxy target.
///
/// Implementations perform no visibility or permission checks; the proxy
/// checks the caller's scope against [`PropertyTable::property_descriptors`]
/// before touching storage.
pub trait PropertyTable {
    /// Descriptors of every named field
    fn property_descriptors() -> Vec<PropertyDescriptor>;

    /// Current value of a field
    fn read_property(&self, name: &str) -> Result<Value, PropertyError>;

    /// Replace a field's value
    fn write_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError>;

    /// Reset an `Option` field to `None`
    fn unset_property(&mut self, name: &str) -> Result<(), PropertyError>;

    /// The field's storage itself, for typed aliasing borrows
    fn property_slot(&mut self, name: &str) -> Option<&mut (dyn Any + 'static)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for op in PropertyOp::ALL {
            assert_eq!(PropertyOp::from_method_name(op.method_name()), Some(op));
        }
        assert_eq!(PropertyOp::from_method_name("get"), None);
    }
}
