//! Types that can be wrapped by a proxy

use crate::contract::TypeContract;
use crate::property::PropertyTable;

/// A type with a statically known contract.
///
/// Implemented by `#[proxy]` for the type whose inherent impl it annotates,
/// or by generated build-script output.
pub trait ProxyTarget: PropertyTable + Sized {
    /// The type's forwarded contract
    fn contract() -> &'static TypeContract;
}
