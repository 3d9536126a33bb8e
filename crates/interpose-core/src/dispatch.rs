//! Interception protocol stages
//!
//! A forwarded call runs, in order:
//!
//! 1. collect bound parameters by name,
//! 2. the method's prefix hook, if any,
//! 3. stop with the prefix value when it returns early (the real method is
//!    not invoked),
//! 4. the real call with the caller's original arguments,
//! 5. the method's suffix hook, if any, given the real return value,
//! 6. return the suffix override, or the real value.
//!
//! A failing hook ends the call; later stages do not run. The stage
//! functions here hold no state: everything lives in the caller's frame.
//! The entry points that sequence them are the `dispatch*` methods on
//! [`crate::Proxy`].

use tracing::trace;

use crate::error::{DispatchFailure, Stage};
use crate::interceptor::{Instance, Interception, InterceptorTable, Invocation};
use crate::proxy::ProxyId;
use crate::value::{Params, ReturnCodec, Value};

/// Everything the stages need about one call, apart from the instance
pub(crate) struct Call<'a, T> {
    pub(crate) proxy: ProxyId,
    pub(crate) type_name: &'a str,
    pub(crate) method: &'a str,
    pub(crate) params: &'a Params,
    pub(crate) table: &'a InterceptorTable<T>,
}

impl<T> Call<'_, T> {
    /// Prefix stage: `Some(value)` ends the call early
    pub(crate) fn prefix(&self, instance: Instance<'_, T>) -> Result<Option<Value>, DispatchFailure> {
        let Some(hook) = self.table.prefix(self.method) else {
            return Ok(None);
        };
        trace!(proxy = %self.proxy, method = self.method, params = %self.params, "prefix interceptor");
        let mut invocation =
            Invocation::new(self.proxy, self.type_name, self.method, self.params, instance);
        match hook(&mut invocation) {
            Ok(Interception::Proceed) => Ok(None),
            Ok(Interception::Return(value)) => {
                trace!(proxy = %self.proxy, method = self.method, "prefix interceptor returned early");
                Ok(Some(value))
            }
            Err(source) => Err(DispatchFailure::hook(self.method, Stage::Prefix, source)),
        }
    }

    /// Suffix stage: `Some(value)` overrides the real return value
    pub(crate) fn suffix(
        &self,
        instance: Instance<'_, T>,
        real: &Value,
    ) -> Result<Option<Value>, DispatchFailure> {
        let Some(hook) = self.table.suffix(self.method) else {
            return Ok(None);
        };
        trace!(proxy = %self.proxy, method = self.method, returned = %real, "suffix interceptor");
        let mut invocation =
            Invocation::new(self.proxy, self.type_name, self.method, self.params, instance);
        match hook(&mut invocation, real) {
            Ok(Interception::Proceed) => Ok(None),
            Ok(Interception::Return(value)) => {
                trace!(proxy = %self.proxy, method = self.method, "suffix interceptor overrode return value");
                Ok(Some(value))
            }
            Err(source) => Err(DispatchFailure::hook(self.method, Stage::Suffix, source)),
        }
    }

    /// Whether a suffix hook will look at the real return value
    pub(crate) fn observes_return(&self) -> bool {
        self.table.suffix(self.method).is_some()
    }

    /// Turn a hook-supplied value into the method's return type
    pub(crate) fn restore<R>(&self, codec: &ReturnCodec<R>, value: Value) -> Result<R, DispatchFailure> {
        codec
            .restore(value)
            .map_err(|source| DispatchFailure::restore(self.method, source))
    }

    /// Stages 5 and 6 for a by-value return
    pub(crate) fn finish<R>(
        &self,
        instance: Instance<'_, T>,
        codec: &ReturnCodec<R>,
        real: R,
    ) -> Result<R, DispatchFailure> {
        if !self.observes_return() {
            return Ok(real);
        }
        let observed = codec.observe(&real);
        match self.suffix(instance, &observed)? {
            Some(value) => self.restore(codec, value),
            None => Ok(real),
        }
    }
}
