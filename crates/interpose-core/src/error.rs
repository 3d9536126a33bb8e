//! Error types for contract validation, hook registration and dispatch
//!
//! Every failure raised by this layer is propagated unchanged to the caller.
//! Nothing here is retried or recovered locally.

use std::fmt;

/// A target type exposes a construct that cannot be forwarded faithfully.
///
/// Synthesis aborts on any of these instead of producing a wrapper that
/// silently behaves differently from the target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedContract {
    /// Forwarded calls never suspend
    #[error("method `{method}` is async; forwarded calls cannot suspend")]
    AsyncMethod {
        /// Offending method
        method: String,
    },

    /// The proxy must keep its wrapped value after every call
    #[error("method `{method}` consumes its receiver")]
    ConsumingReceiver {
        /// Offending method
        method: String,
    },

    /// Variadic parameters must close the parameter list
    #[error("variadic parameter `{parameter}` of `{method}` must be the last parameter")]
    MisplacedVariadic {
        /// Offending method
        method: String,
        /// The variadic parameter that is not last
        parameter: String,
    },

    /// `...` foreign variadics have no safe forwarding form
    #[error("method `{method}` uses C-variadic arguments")]
    CVariadic {
        /// Offending method
        method: String,
    },

    /// Return type cannot be named by the generated proxy
    #[error("return type of `{method}` cannot be forwarded: {reason}")]
    OpaqueReturn {
        /// Offending method
        method: String,
        /// Why the return type is rejected
        reason: String,
    },

    /// Member name collides with the proxy's own API
    #[error("`{name}` collides with a member of the generated proxy API")]
    ReservedName {
        /// Colliding member name
        name: String,
    },

    /// Member declared more than once across impl blocks
    #[error("`{name}` is declared more than once")]
    DuplicateMember {
        /// Duplicated member name
        name: String,
    },

    /// Whole type cannot be proxied
    #[error("type `{type_name}` cannot be proxied: {reason}")]
    UnsupportedType {
        /// Target type
        type_name: String,
        /// Why the type is rejected
        reason: String,
    },
}

impl UnsupportedContract {
    /// Create an unsupported-type error
    pub fn unsupported_type(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an opaque-return error
    pub fn opaque_return(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OpaqueReturn {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Hook registration was rejected; the interceptor table is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterceptorError {
    /// The method name is not part of the target's contract
    #[error("`{method}` is not a method of `{type_name}`")]
    UnknownMethod {
        /// Target type name
        type_name: String,
        /// Requested method name
        method: String,
    },

    /// Suffix hooks cannot observe a call that returns a borrow of the
    /// wrapped value, the borrow is still live when the hook would run
    #[error("`{method}` returns a borrow of the wrapped value; suffix interceptors are not supported")]
    BorrowedReturn {
        /// Requested method name
        method: String,
    },
}

/// `with_interceptors` rejected a hook; the value it was given comes back
/// unwrapped so the caller keeps ownership.
#[derive(thiserror::Error)]
#[error("proxy not built: {error}")]
pub struct RejectedInterceptors<T> {
    /// Why the hooks were rejected
    #[source]
    pub error: InterceptorError,
    /// The value that would have been wrapped
    pub value: T,
}

impl<T> RejectedInterceptors<T> {
    /// Take the value back, dropping the error
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for RejectedInterceptors<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedInterceptors")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Failure reported by an interception hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Create a hook failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Which interception stage produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before the real call
    Prefix,
    /// After the real call
    Suffix,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Prefix => f.write_str("prefix"),
            Stage::Suffix => f.write_str("suffix"),
        }
    }
}

/// A hook-supplied value could not be turned back into the method's return type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RestoreError {
    /// The return type has no serde representation
    #[error("`{type_name}` is not deserializable")]
    NotDeserializable {
        /// Rust type name of the return type
        type_name: &'static str,
    },

    /// The value does not describe an instance of the return type
    #[error("value does not fit `{type_name}`: {reason}")]
    Mismatch {
        /// Rust type name of the return type
        type_name: &'static str,
        /// Decoder message
        reason: String,
    },
}

/// Property access failed on the wrapped value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// No such field
    #[error("unknown property `{property}`")]
    Unknown {
        /// Requested property
        property: String,
    },

    /// Field exists but is not visible from the caller's scope
    #[error("property `{property}` is not accessible from this scope")]
    Inaccessible {
        /// Requested property
        property: String,
    },

    /// Field is declared read-only
    #[error("property `{property}` is read-only")]
    ReadOnly {
        /// Requested property
        property: String,
    },

    /// Only `Option` fields can be unset
    #[error("property `{property}` is not nullable and cannot be unset")]
    NotNullable {
        /// Requested property
        property: String,
    },

    /// Field type has no serde representation
    #[error("property `{property}` of type `{type_name}` has no value representation")]
    Opaque {
        /// Requested property
        property: String,
        /// Field type name
        type_name: String,
    },

    /// Written value does not fit the field, or a typed borrow asked for the wrong type
    #[error("property `{property}` cannot hold the given value: {reason}")]
    Mismatch {
        /// Requested property
        property: String,
        /// Why the value was rejected
        reason: String,
    },
}

impl PropertyError {
    /// Create an unknown-property error
    pub fn unknown(property: impl Into<String>) -> Self {
        Self::Unknown {
            property: property.into(),
        }
    }

    /// Create a not-nullable error
    pub fn not_nullable(property: impl Into<String>) -> Self {
        Self::NotNullable {
            property: property.into(),
        }
    }

    /// Create an opaque-property error
    pub fn opaque(property: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::Opaque {
            property: property.into(),
            type_name: type_name.into(),
        }
    }

    /// Wrap a restore failure for a property write
    pub fn from_restore(property: impl Into<String>, error: RestoreError) -> Self {
        let property = property.into();
        match error {
            RestoreError::NotDeserializable { type_name } => Self::Opaque {
                property,
                type_name: type_name.to_string(),
            },
            RestoreError::Mismatch { reason, .. } => Self::Mismatch { property, reason },
        }
    }
}

/// A forwarded call failed in a hook, in the real call's value channel, or
/// in property access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchFailure {
    /// A prefix or suffix hook returned an error; later stages did not run
    #[error("{stage} interceptor for `{method}` failed: {source}")]
    Hook {
        /// Intercepted method
        method: String,
        /// Stage that failed
        stage: Stage,
        /// Error returned by the hook
        #[source]
        source: HookError,
    },

    /// A hook-supplied value did not fit the return type
    #[error("interceptor value for `{method}` was rejected: {source}")]
    Restore {
        /// Intercepted method
        method: String,
        /// Conversion failure
        #[source]
        source: RestoreError,
    },

    /// A hook tried to replace a by-reference return
    #[error("`{method}` returns a borrow of the wrapped value; interceptors cannot replace it")]
    BorrowedOverride {
        /// Intercepted method
        method: String,
    },

    /// Dispatch was requested for a name outside the contract
    #[error("`{method}` is not a method of `{type_name}`")]
    UnknownMethod {
        /// Target type name
        type_name: String,
        /// Requested method name
        method: String,
    },

    /// Property access failed on the wrapped value
    #[error(transparent)]
    Property(#[from] PropertyError),
}

impl DispatchFailure {
    /// Create a hook failure for a stage
    pub fn hook(method: impl Into<String>, stage: Stage, source: HookError) -> Self {
        Self::Hook {
            method: method.into(),
            stage,
            source,
        }
    }

    /// Create a restore failure
    pub fn restore(method: impl Into<String>, source: RestoreError) -> Self {
        Self::Restore {
            method: method.into(),
            source,
        }
    }

    /// Method whose dispatch failed, when known
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Hook { method, .. }
            | Self::Restore { method, .. }
            | Self::BorrowedOverride { method }
            | Self::UnknownMethod { method, .. } => Some(method),
            Self::Property(_) => None,
        }
    }

    /// Propagate this failure out of a forwarding method that keeps the
    /// target's exact signature.
    ///
    /// The failure becomes the unwinding payload; callers that need it as a
    /// value use the `try_` forwarding variant or downcast the payload from
    /// `std::panic::catch_unwind`.
    pub fn raise(self) -> ! {
        tracing::error!(failure = %self, "dispatch failure raised from forwarding method");
        std::panic::panic_any(self)
    }
}
