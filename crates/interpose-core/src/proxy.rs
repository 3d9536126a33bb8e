//! The proxy wrapper
//!
//! [`Proxy`] owns a wrapped value and its interceptor table. Generated
//! `<Target>Proxy` types are thin newtypes over it: every forwarding method
//! captures its parameters, then hands the real call to one of the
//! `dispatch*` entry points, which run the interception protocol from
//! [`crate::dispatch`].

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::contract::{PropertyDescriptor, ReturnMode, TypeContract};
use crate::dispatch::Call;
use crate::error::{DispatchFailure, HookError, InterceptorError, PropertyError, RejectedInterceptors};
use crate::interceptor::{
    AccessInterceptor, Instance, Interception, InterceptorTable, Invocation, PrefixHook, SuffixHook,
};
use crate::property::{AccessScope, PropertyOp, PropertyTable};
use crate::target::ProxyTarget;
use crate::value::{Params, ReturnCodec, Value};

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a proxy instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyId(u64);

impl ProxyId {
    fn next() -> Self {
        Self(NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy-{}", self.0)
    }
}

/// Access to the value behind a proxy, bypassing interception
pub trait ValueHolder {
    /// Type of the wrapped value
    type Wrapped;

    /// The wrapped value
    fn wrapped_value(&self) -> &Self::Wrapped;

    /// The wrapped value, mutably
    fn wrapped_value_mut(&mut self) -> &mut Self::Wrapped;
}

/// A wrapped value plus its per-instance interceptor table
pub struct Proxy<T> {
    id: ProxyId,
    wrapped: T,
    interceptors: InterceptorTable<T>,
}

impl<T> Proxy<T> {
    /// Wrap an existing value with an empty interceptor table
    pub fn from_existing(value: T) -> Self {
        Self {
            id: ProxyId::next(),
            wrapped: value,
            interceptors: InterceptorTable::new(),
        }
    }

    /// Identity of this proxy
    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// Unwrap, dropping every installed hook
    pub fn into_wrapped_value(self) -> T {
        self.wrapped
    }

    /// Installed hooks
    pub fn interceptors(&self) -> &InterceptorTable<T> {
        &self.interceptors
    }

    /// Parameter snapshot for a call; `build` only runs when the method has
    /// a hook that could look at it
    pub fn capture(&self, method: &str, build: impl FnOnce() -> Params) -> Params {
        if self.interceptors.is_intercepted(method) {
            build()
        } else {
            Params::new()
        }
    }
}

impl<T: ProxyTarget> Proxy<T> {
    /// Wrap a value and install hooks in one step.
    ///
    /// Every method name is validated before the proxy is returned. On the
    /// first invalid name no proxy is built and `value` is handed back in
    /// the error.
    pub fn with_interceptors<P, S, M, N>(
        value: T,
        prefix: P,
        suffix: S,
    ) -> Result<Self, RejectedInterceptors<T>>
    where
        P: IntoIterator<Item = (M, PrefixHook<T>)>,
        S: IntoIterator<Item = (N, SuffixHook<T>)>,
        M: AsRef<str>,
        N: AsRef<str>,
    {
        let mut proxy = Self::from_existing(value);
        let installed = prefix
            .into_iter()
            .try_for_each(|(method, hook)| proxy.install_prefix(method.as_ref(), hook))
            .and_then(|()| {
                suffix
                    .into_iter()
                    .try_for_each(|(method, hook)| proxy.install_suffix(method.as_ref(), hook))
            });
        match installed {
            Ok(()) => Ok(proxy),
            Err(error) => Err(RejectedInterceptors {
                error,
                value: proxy.into_wrapped_value(),
            }),
        }
    }

    /// Contract of the wrapped type
    pub fn contract(&self) -> &'static TypeContract {
        T::contract()
    }

    /// Install a boxed prefix hook, replacing any previous one
    pub fn install_prefix(&mut self, method: &str, hook: PrefixHook<T>) -> Result<(), InterceptorError> {
        known_method::<T>(method)?;
        let replaced = self.interceptors.set_prefix(method, hook).is_some();
        debug!(proxy = %self.id, method, replaced, "installed prefix interceptor");
        Ok(())
    }

    /// Install a boxed suffix hook, replacing any previous one
    pub fn install_suffix(&mut self, method: &str, hook: SuffixHook<T>) -> Result<(), InterceptorError> {
        known_method::<T>(method)?;
        let borrowed = T::contract()
            .method(method)
            .is_some_and(|m| m.return_mode == ReturnMode::ByReference);
        if borrowed {
            return Err(InterceptorError::BorrowedReturn {
                method: method.to_string(),
            });
        }
        let replaced = self.interceptors.set_suffix(method, hook).is_some();
        debug!(proxy = %self.id, method, replaced, "installed suffix interceptor");
        Ok(())
    }

    /// Forward a `&self` call returning an owned value
    pub fn dispatch<R>(
        &self,
        method: &str,
        params: Params,
        codec: ReturnCodec<R>,
        real: impl FnOnce(&T) -> R,
    ) -> Result<R, DispatchFailure> {
        let call = call::<T>(self.id, method, &params, &self.interceptors)?;
        if let Some(value) = call.prefix(Instance::Shared(&self.wrapped))? {
            return call.restore(&codec, value);
        }
        let returned = real(&self.wrapped);
        call.finish(Instance::Shared(&self.wrapped), &codec, returned)
    }

    /// Forward a `&mut self` call returning an owned value
    pub fn dispatch_mut<R>(
        &mut self,
        method: &str,
        params: Params,
        codec: ReturnCodec<R>,
        real: impl FnOnce(&mut T) -> R,
    ) -> Result<R, DispatchFailure> {
        let Self {
            id,
            wrapped,
            interceptors,
        } = self;
        let call = call::<T>(*id, method, &params, interceptors)?;
        if let Some(value) = call.prefix(Instance::Exclusive(&mut *wrapped))? {
            return call.restore(&codec, value);
        }
        let returned = real(&mut *wrapped);
        call.finish(Instance::Exclusive(&mut *wrapped), &codec, returned)
    }

    /// Forward a `&self` call whose result borrows the wrapped value.
    ///
    /// Only the prefix stage runs. A prefix hook cannot supply the borrow,
    /// so an early return fails with [`DispatchFailure::BorrowedOverride`].
    pub fn dispatch_ref<'s, R>(
        &'s self,
        method: &str,
        params: Params,
        real: impl FnOnce(&'s T) -> R,
    ) -> Result<R, DispatchFailure> {
        let call = call::<T>(self.id, method, &params, &self.interceptors)?;
        if call.prefix(Instance::Shared(&self.wrapped))?.is_some() {
            return Err(DispatchFailure::BorrowedOverride {
                method: method.to_string(),
            });
        }
        Ok(real(&self.wrapped))
    }

    /// Forward a `&mut self` call whose result borrows the wrapped value
    pub fn dispatch_ref_mut<'s, R>(
        &'s mut self,
        method: &str,
        params: Params,
        real: impl FnOnce(&'s mut T) -> R,
    ) -> Result<R, DispatchFailure> {
        let Self {
            id,
            wrapped,
            interceptors,
        } = self;
        let call = call::<T>(*id, method, &params, interceptors)?;
        if call.prefix(Instance::Exclusive(&mut *wrapped))?.is_some() {
            return Err(DispatchFailure::BorrowedOverride {
                method: method.to_string(),
            });
        }
        Ok(real(wrapped))
    }

    /// Read a public field
    pub fn get_property(&self, name: &str) -> Result<Value, DispatchFailure> {
        self.read_in(AccessScope::Public, name)
    }

    /// Write a public field
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<(), DispatchFailure> {
        self.write_in(AccessScope::Public, name, value)
    }

    /// Whether a public field exists and holds a non-null value.
    ///
    /// Unknown and inaccessible fields report `false` rather than failing.
    pub fn has_property(&self, name: &str) -> Result<bool, DispatchFailure> {
        self.has_in(AccessScope::Public, name)
    }

    /// Reset a public `Option` field to `None`
    pub fn unset_property(&mut self, name: &str) -> Result<(), DispatchFailure> {
        self.unset_in(AccessScope::Public, name)
    }

    /// Typed aliasing borrow of a public field's storage.
    ///
    /// Runs the prefix stage of `get_property`. Writes through the borrow
    /// land in the wrapped value directly.
    pub fn property_mut<V: Any>(&mut self, name: &str) -> Result<&mut V, DispatchFailure> {
        self.slot_in(AccessScope::Public, name)
    }

    /// Property access from the target's declaring module
    pub fn friend(&mut self) -> Friend<'_, T> {
        Friend { proxy: self }
    }

    fn read_in(&self, scope: AccessScope, name: &str) -> Result<Value, DispatchFailure> {
        let method = PropertyOp::Get.method_name();
        let params = self.capture(method, || Params::new().with("name", name));
        self.dispatch(method, params, value_result_codec(), |target| {
            checked::<T>(scope, PropertyOp::Get, name)?;
            target.read_property(name)
        })?
        .map_err(DispatchFailure::from)
    }

    fn write_in(&mut self, scope: AccessScope, name: &str, value: Value) -> Result<(), DispatchFailure> {
        let method = PropertyOp::Set.method_name();
        let params = self.capture(method, || {
            Params::new().with("name", name).with("value", value.clone())
        });
        self.dispatch_mut(method, params, unit_result_codec(), move |target| {
            checked::<T>(scope, PropertyOp::Set, name)?;
            target.write_property(name, value)
        })?
        .map_err(DispatchFailure::from)
    }

    fn has_in(&self, scope: AccessScope, name: &str) -> Result<bool, DispatchFailure> {
        let method = PropertyOp::Isset.method_name();
        let params = self.capture(method, || Params::new().with("name", name));
        self.dispatch(method, params, ReturnCodec::serde(), |target| {
            checked::<T>(scope, PropertyOp::Isset, name).is_ok()
                && target
                    .read_property(name)
                    .is_ok_and(|value| !value.is_null())
        })
    }

    fn unset_in(&mut self, scope: AccessScope, name: &str) -> Result<(), DispatchFailure> {
        let method = PropertyOp::Unset.method_name();
        let params = self.capture(method, || Params::new().with("name", name));
        self.dispatch_mut(method, params, unit_result_codec(), |target| {
            checked::<T>(scope, PropertyOp::Unset, name)?;
            target.unset_property(name)
        })?
        .map_err(DispatchFailure::from)
    }

    fn slot_in<V: Any>(&mut self, scope: AccessScope, name: &str) -> Result<&mut V, DispatchFailure> {
        let method = PropertyOp::Get.method_name();
        let params = self.capture(method, || Params::new().with("name", name));
        self.dispatch_ref_mut(method, params, |target| {
            // the borrow can write, so it needs write access too
            checked::<T>(scope, PropertyOp::Set, name)?;
            target
                .property_slot(name)
                .ok_or_else(|| PropertyError::unknown(name))?
                .downcast_mut::<V>()
                .ok_or_else(|| PropertyError::Mismatch {
                    property: name.to_string(),
                    reason: format!("field is not a `{}`", type_name::<V>()),
                })
        })?
        .map_err(DispatchFailure::from)
    }
}

fn known_method<T: ProxyTarget>(method: &str) -> Result<(), InterceptorError> {
    let contract = T::contract();
    if contract.is_interceptable(method) {
        Ok(())
    } else {
        Err(InterceptorError::UnknownMethod {
            type_name: contract.type_name.clone(),
            method: method.to_string(),
        })
    }
}

fn call<'a, T: ProxyTarget>(
    proxy: ProxyId,
    method: &'a str,
    params: &'a Params,
    table: &'a InterceptorTable<T>,
) -> Result<Call<'a, T>, DispatchFailure> {
    let contract = T::contract();
    if !contract.is_interceptable(method) {
        return Err(DispatchFailure::UnknownMethod {
            type_name: contract.type_name.clone(),
            method: method.to_string(),
        });
    }
    Ok(Call {
        proxy,
        type_name: &contract.type_name,
        method,
        params,
        table,
    })
}

fn checked<T: ProxyTarget>(
    scope: AccessScope,
    op: PropertyOp,
    name: &str,
) -> Result<&'static PropertyDescriptor, PropertyError> {
    let descriptor = T::contract()
        .property(name)
        .ok_or_else(|| PropertyError::unknown(name))?;
    if !descriptor.accessible_from(scope) {
        return Err(PropertyError::Inaccessible {
            property: name.to_string(),
        });
    }
    let outside = scope == AccessScope::Public;
    match op {
        PropertyOp::Get | PropertyOp::Isset if outside && !descriptor.access.read => {
            Err(PropertyError::Inaccessible {
                property: name.to_string(),
            })
        }
        PropertyOp::Set | PropertyOp::Unset if outside && !descriptor.access.write => {
            Err(PropertyError::ReadOnly {
                property: name.to_string(),
            })
        }
        PropertyOp::Unset if !descriptor.nullable => Err(PropertyError::not_nullable(name)),
        _ => Ok(descriptor),
    }
}

fn value_result_codec() -> ReturnCodec<Result<Value, PropertyError>> {
    ReturnCodec::new(
        |result: &Result<Value, PropertyError>| result.as_ref().cloned().unwrap_or(Value::Null),
        |value: Value| Ok(Ok(value)),
    )
}

fn unit_result_codec() -> ReturnCodec<Result<(), PropertyError>> {
    ReturnCodec::new(
        |_: &Result<(), PropertyError>| Value::Null,
        |_: Value| Ok(Ok(())),
    )
}

/// Property access with the target module's own visibility.
///
/// Obtained through [`Proxy::friend`]; generated proxies only expose it to
/// the module that declares the target.
pub struct Friend<'a, T> {
    proxy: &'a mut Proxy<T>,
}

impl<T: ProxyTarget> Friend<'_, T> {
    /// Read any field
    pub fn get_property(&self, name: &str) -> Result<Value, DispatchFailure> {
        self.proxy.read_in(AccessScope::Friend, name)
    }

    /// Write any field
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<(), DispatchFailure> {
        self.proxy.write_in(AccessScope::Friend, name, value)
    }

    /// Whether any field exists and holds a non-null value
    pub fn has_property(&self, name: &str) -> Result<bool, DispatchFailure> {
        self.proxy.has_in(AccessScope::Friend, name)
    }

    /// Reset any `Option` field to `None`
    pub fn unset_property(&mut self, name: &str) -> Result<(), DispatchFailure> {
        self.proxy.unset_in(AccessScope::Friend, name)
    }

    /// Typed aliasing borrow of any field's storage
    pub fn property_mut<V: Any>(&mut self, name: &str) -> Result<&mut V, DispatchFailure> {
        self.proxy.slot_in(AccessScope::Friend, name)
    }
}

impl<T> ValueHolder for Proxy<T> {
    type Wrapped = T;

    fn wrapped_value(&self) -> &T {
        &self.wrapped
    }

    fn wrapped_value_mut(&mut self) -> &mut T {
        &mut self.wrapped
    }
}

impl<T: ProxyTarget> AccessInterceptor for Proxy<T> {
    fn set_prefix_interceptor<F>(&mut self, method: &str, hook: F) -> Result<(), InterceptorError>
    where
        F: Fn(&mut Invocation<'_, T>) -> Result<Interception, HookError> + Send + Sync + 'static,
    {
        self.install_prefix(method, Arc::new(hook))
    }

    fn set_suffix_interceptor<F>(&mut self, method: &str, hook: F) -> Result<(), InterceptorError>
    where
        F: Fn(&mut Invocation<'_, T>, &Value) -> Result<Interception, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.install_suffix(method, Arc::new(hook))
    }

    fn remove_prefix_interceptor(&mut self, method: &str) -> bool {
        let removed = self.interceptors.remove_prefix(method).is_some();
        if removed {
            debug!(proxy = %self.id, method, "removed prefix interceptor");
        }
        removed
    }

    fn remove_suffix_interceptor(&mut self, method: &str) -> bool {
        let removed = self.interceptors.remove_suffix(method).is_some();
        if removed {
            debug!(proxy = %self.id, method, "removed suffix interceptor");
        }
        removed
    }

    fn clear_interceptors(&mut self) {
        debug!(proxy = %self.id, hooks = self.interceptors.len(), "cleared interceptors");
        self.interceptors.clear();
    }
}

/// Copies the wrapped value only; the copy gets a new identity and no hooks.
impl<T: Clone> Clone for Proxy<T> {
    fn clone(&self) -> Self {
        let copy = Self::from_existing(self.wrapped.clone());
        debug!(source = %self.id, proxy = %copy.id, "cloned proxy without interceptors");
        copy
    }
}

/// Serializes the wrapped value only.
impl<T: Serialize> Serialize for Proxy<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.wrapped.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Proxy<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self::from_existing)
    }
}

impl<T: fmt::Debug> fmt::Debug for Proxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id)
            .field("wrapped", &self.wrapped)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

/// Proxies compare by wrapped value; identity and hooks are ignored.
impl<T: PartialEq> PartialEq for Proxy<T> {
    fn eq(&self, other: &Self) -> bool {
        self.wrapped == other.wrapped
    }
}
