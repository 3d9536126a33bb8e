//! # Interpose Core - proxy runtime
//!
//! Runtime half of interpose: everything a generated `<Target>Proxy` needs at
//! call time. The build-time half (contract extraction, proxy synthesis,
//! token emission) lives in `interpose-codegen`, and the `#[proxy]` /
//! `#[derive(PropertyTable)]` front end in `interpose-macros`.
//!
//! - [`contract`]: descriptors of a target's methods, constructors and fields
//! - [`value`]: parameter and return snapshots handed to hooks
//! - [`interceptor`]: per-instance prefix/suffix hook table
//! - [`dispatch`]: the per-call interception protocol
//! - [`proxy`]: the wrapper itself and its lifecycle
//! - [`property`]: named-field access on wrapped values
//!
//! Proxies are not internally synchronized. Installing hooks and calling
//! `&mut self` methods need exclusive access, so sharing one proxy between
//! threads for mutation needs a lock owned by the caller.

pub mod contract;
pub mod dispatch;
pub mod error;
pub mod interceptor;
pub mod property;
pub mod proxy;
pub mod target;
pub mod value;

pub use contract::{
    ConstructorDescriptor, Fingerprint, MethodDescriptor, ParamMode, ParameterDescriptor,
    PropertyAccess, PropertyDescriptor, Receiver, ReturnMode, TypeContract, Visibility,
};
pub use error::{
    DispatchFailure, HookError, InterceptorError, PropertyError, RejectedInterceptors,
    RestoreError, Stage, UnsupportedContract,
};
pub use interceptor::{
    prefix_hook, suffix_hook, AccessInterceptor, Instance, Interception, InterceptorTable,
    Invocation, PrefixHook, SuffixHook,
};
pub use property::{AccessScope, PropertyOp, PropertyTable};
pub use proxy::{Friend, Proxy, ProxyId, ValueHolder};
pub use target::ProxyTarget;
pub use value::{Params, ReturnCodec, Value};

/// Re-exports used by generated code
#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
    pub use serde;
    pub use serde_json;
}
