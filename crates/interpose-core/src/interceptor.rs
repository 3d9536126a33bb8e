//! Per-instance prefix/suffix hook registry
//!
//! Each proxy owns one [`InterceptorTable`]. A method has at most one prefix
//! and one suffix hook; registering another replaces the first. Tables are
//! never shared, cloned or serialized.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{HookError, InterceptorError};
use crate::proxy::{ProxyId, ValueHolder};
use crate::value::{Params, Value};

/// Outcome of a hook
#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    /// Continue the protocol: run the real call (prefix) or keep its value (suffix)
    Proceed,
    /// Finish the call with this value
    Return(Value),
}

impl Interception {
    /// Finish the call with a value convertible into [`Value`]
    pub fn returning(value: impl Into<Value>) -> Self {
        Self::Return(value.into())
    }

    /// Whether the hook ends the call early
    pub fn is_early_return(&self) -> bool {
        matches!(self, Self::Return(_))
    }
}

/// The wrapped instance as seen by a hook
#[derive(Debug)]
pub enum Instance<'a, T> {
    /// The forwarded call only has shared access
    Shared(&'a T),
    /// The forwarded call has exclusive access
    Exclusive(&'a mut T),
}

impl<T> Instance<'_, T> {
    /// Shared view of the instance
    pub fn get(&self) -> &T {
        match self {
            Self::Shared(instance) => instance,
            Self::Exclusive(instance) => &**instance,
        }
    }

    /// Mutable view, available when the forwarded call takes `&mut self`
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Shared(_) => None,
            Self::Exclusive(instance) => Some(&mut **instance),
        }
    }

    pub(crate) fn reborrow(&mut self) -> Instance<'_, T> {
        match self {
            Self::Shared(instance) => Instance::Shared(*instance),
            Self::Exclusive(instance) => Instance::Exclusive(&mut **instance),
        }
    }
}

/// One intercepted call as seen by a hook
#[derive(Debug)]
pub struct Invocation<'a, T> {
    proxy: ProxyId,
    type_name: &'a str,
    method: &'a str,
    params: &'a Params,
    instance: Instance<'a, T>,
}

impl<'a, T> Invocation<'a, T> {
    pub(crate) fn new(
        proxy: ProxyId,
        type_name: &'a str,
        method: &'a str,
        params: &'a Params,
        instance: Instance<'a, T>,
    ) -> Self {
        Self {
            proxy,
            type_name,
            method,
            params,
            instance,
        }
    }

    /// Identity of the proxy being called
    pub fn proxy_id(&self) -> ProxyId {
        self.proxy
    }

    /// Name of the wrapped type
    pub fn type_name(&self) -> &str {
        self.type_name
    }

    /// Name of the intercepted method
    pub fn method(&self) -> &str {
        self.method
    }

    /// Snapshot of the call's parameters by name
    pub fn params(&self) -> &Params {
        self.params
    }

    /// One parameter's snapshot
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// The wrapped instance
    pub fn instance(&self) -> &T {
        self.instance.get()
    }

    /// The wrapped instance, mutable when the call takes `&mut self`
    pub fn instance_mut(&mut self) -> Option<&mut T> {
        self.instance.get_mut()
    }
}

/// Hook run before the real call
pub type PrefixHook<T> =
    Arc<dyn Fn(&mut Invocation<'_, T>) -> Result<Interception, HookError> + Send + Sync>;

/// Hook run after the real call, given a snapshot of its return value
pub type SuffixHook<T> =
    Arc<dyn Fn(&mut Invocation<'_, T>, &Value) -> Result<Interception, HookError> + Send + Sync>;

/// Box a closure as a [`PrefixHook`]
pub fn prefix_hook<T, F>(hook: F) -> PrefixHook<T>
where
    F: Fn(&mut Invocation<'_, T>) -> Result<Interception, HookError> + Send + Sync + 'static,
{
    Arc::new(hook)
}

/// Box a closure as a [`SuffixHook`]
pub fn suffix_hook<T, F>(hook: F) -> SuffixHook<T>
where
    F: Fn(&mut Invocation<'_, T>, &Value) -> Result<Interception, HookError> + Send + Sync + 'static,
{
    Arc::new(hook)
}

struct Slot<T> {
    prefix: Option<PrefixHook<T>>,
    suffix: Option<SuffixHook<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            prefix: None,
            suffix: None,
        }
    }
}

impl<T> Slot<T> {
    fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.suffix.is_none()
    }
}

/// Method name to at most one prefix and one suffix hook
pub struct InterceptorTable<T> {
    slots: HashMap<String, Slot<T>>,
}

impl<T> Default for InterceptorTable<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T> InterceptorTable<T> {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a prefix hook, returning the one it replaces
    pub fn set_prefix(&mut self, method: &str, hook: PrefixHook<T>) -> Option<PrefixHook<T>> {
        self.slots
            .entry(method.to_string())
            .or_default()
            .prefix
            .replace(hook)
    }

    /// Install a suffix hook, returning the one it replaces
    pub fn set_suffix(&mut self, method: &str, hook: SuffixHook<T>) -> Option<SuffixHook<T>> {
        self.slots
            .entry(method.to_string())
            .or_default()
            .suffix
            .replace(hook)
    }

    /// Remove the prefix hook of a method
    pub fn remove_prefix(&mut self, method: &str) -> Option<PrefixHook<T>> {
        let slot = self.slots.get_mut(method)?;
        let removed = slot.prefix.take();
        if slot.is_empty() {
            self.slots.remove(method);
        }
        removed
    }

    /// Remove the suffix hook of a method
    pub fn remove_suffix(&mut self, method: &str) -> Option<SuffixHook<T>> {
        let slot = self.slots.get_mut(method)?;
        let removed = slot.suffix.take();
        if slot.is_empty() {
            self.slots.remove(method);
        }
        removed
    }

    /// Prefix hook of a method
    pub fn prefix(&self, method: &str) -> Option<&PrefixHook<T>> {
        self.slots.get(method).and_then(|slot| slot.prefix.as_ref())
    }

    /// Suffix hook of a method
    pub fn suffix(&self, method: &str) -> Option<&SuffixHook<T>> {
        self.slots.get(method).and_then(|slot| slot.suffix.as_ref())
    }

    /// Whether any hook is installed for a method
    pub fn is_intercepted(&self, method: &str) -> bool {
        self.slots.contains_key(method)
    }

    /// Drop every hook
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of installed hooks, prefix and suffix counted separately
    pub fn len(&self) -> usize {
        self.slots
            .values()
            .map(|slot| usize::from(slot.prefix.is_some()) + usize::from(slot.suffix.is_some()))
            .sum()
    }

    /// Whether no hook is installed
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names of intercepted methods
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

impl<T> fmt::Debug for InterceptorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (method, slot) in &self.slots {
            map.entry(
                method,
                &format_args!(
                    "prefix: {}, suffix: {}",
                    slot.prefix.is_some(),
                    slot.suffix.is_some()
                ),
            );
        }
        map.finish()
    }
}

/// Runtime installation and removal of interception hooks.
///
/// Registration validates the method name against the target's contract;
/// a rejected registration leaves every installed hook in place.
pub trait AccessInterceptor: ValueHolder {
    /// Install the prefix hook for `method`, replacing any previous one
    fn set_prefix_interceptor<F>(&mut self, method: &str, hook: F) -> Result<(), InterceptorError>
    where
        F: Fn(&mut Invocation<'_, Self::Wrapped>) -> Result<Interception, HookError>
            + Send
            + Sync
            + 'static;

    /// Install the suffix hook for `method`, replacing any previous one
    fn set_suffix_interceptor<F>(&mut self, method: &str, hook: F) -> Result<(), InterceptorError>
    where
        F: Fn(&mut Invocation<'_, Self::Wrapped>, &Value) -> Result<Interception, HookError>
            + Send
            + Sync
            + 'static;

    /// Remove the prefix hook for `method`; true if one was installed
    fn remove_prefix_interceptor(&mut self, method: &str) -> bool;

    /// Remove the suffix hook for `method`; true if one was installed
    fn remove_suffix_interceptor(&mut self, method: &str) -> bool;

    /// Remove every hook
    fn clear_interceptors(&mut self);
}
