//! Interpose Proc Macros
//!
//! Front end of the proxy generator. Put `#[derive(PropertyTable)]` on the
//! target struct and `#[proxy]` on its inherent impl block; the impl block
//! stays as written and a `<Target>Proxy` type is emitted beside it, in the
//! same module, so private members remain reachable from there only.
//!
//! # Example
//!
//! ```ignore
//! use interpose_core::{AccessInterceptor, Interception};
//! use interpose_macros::{proxy, PropertyTable};
//!
//! #[derive(PropertyTable)]
//! pub struct Account {
//!     pub balance: i64,
//!     #[interpose(read_only)]
//!     pub owner: String,
//! }
//!
//! #[proxy(clone, name = "GuardedAccount")]
//! impl Account {
//!     pub fn new(owner: String) -> Self {
//!         Account { balance: 0, owner }
//!     }
//!
//!     pub fn deposit(&mut self, amount: i64) -> i64 {
//!         self.balance += amount;
//!         self.balance
//!     }
//! }
//!
//! let mut account = GuardedAccount::new("ada".into());
//! account.set_prefix_interceptor("deposit", |call| {
//!     match call.param("amount").and_then(|v| v.as_i64()) {
//!         Some(amount) if amount < 0 => Ok(Interception::returning(0)),
//!         _ => Ok(Interception::Proceed),
//!     }
//! })?;
//! ```
//!
//! The runtime is named as `::interpose_core` in generated code; pass
//! `crate = "path"` when it is only reachable through a re-export.

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod args;
mod expand;

/// Generate an interception proxy for the annotated inherent impl block.
///
/// # Options
///
/// - `name = "Ident"` - proxy type name, `<Target>Proxy` by default
/// - `vis = "pub(crate)"` - proxy type visibility, `pub` by default
/// - `clone`, `serde`, `debug`, `partial_eq` - implement the trait by
///   delegating to the wrapped value
/// - `crate = "path"` - path of the runtime crate
///
/// # Markers
///
/// - `#[variadic]` on the last parameter of a method or constructor
/// - `#[interpose(variadic)]` on a method, same meaning
/// - `#[interpose(dynamic_args)]` on a method that reads arguments beyond
///   its declared list; the proxy documents the gap
///
/// Markers are removed from the impl block before it is compiled.
///
/// The target struct must implement `PropertyTable`, normally through
/// `#[derive(PropertyTable)]`. Only one `#[proxy]` block per type.
#[proc_macro_attribute]
pub fn proxy(args: TokenStream, item: TokenStream) -> TokenStream {
    expand::proxy(args.into(), item.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Implement `PropertyTable` for a struct with named fields.
///
/// Field markers: `#[interpose(read_only)]` rejects outside writes and
/// unsets, `#[interpose(skip)]` hides the field from property access.
/// A struct-level `#[interpose(crate = "path")]` renames the runtime crate.
#[proc_macro_derive(PropertyTable, attributes(interpose))]
pub fn derive_property_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as syn::ItemStruct);
    expand::property_table(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Method markers for impl blocks handled by build-script generation.
///
/// Accepts `variadic` and `dynamic_args` and leaves the item unchanged;
/// the generator reads the marker from source. Write it with its full
/// path, `#[interpose_macros::interpose(variadic)]`, so it does not clash
/// with the `PropertyTable` field marker.
#[proc_macro_attribute]
pub fn interpose(args: TokenStream, item: TokenStream) -> TokenStream {
    match args::check_method_markers(args.into()) {
        Ok(()) => item,
        Err(e) => {
            let mut output: TokenStream = e.to_compile_error().into();
            output.extend(item);
            output
        }
    }
}
