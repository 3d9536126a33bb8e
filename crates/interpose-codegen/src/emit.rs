//! Token emission for synthesized proxies
//!
//! [`EmitBackend`] is the boundary between synthesis and code generation: it
//! takes a [`ProxyTypeDescription`] and produces something constructible.
//! [`TokenBackend`] produces Rust items as a `proc_macro2::TokenStream`, for
//! both the `#[proxy]` attribute and build-script output.
//!
//! Generated code names the runtime crate through a configurable path
//! (`::interpose_core` unless overridden) and must be placed in the module
//! that declares the target, so that private members stay reachable.

use interpose_core::{
    ConstructorDescriptor, MethodDescriptor, ParamMode, PropertyDescriptor, Receiver, ReturnMode,
    Visibility,
};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};

use crate::error::EmitError;
use crate::synthesize::{ConstructorPlan, ForwardingPlan, ProxyTypeDescription};

/// Default path of the runtime crate in generated code
pub const DEFAULT_RUNTIME_PATH: &str = "::interpose_core";

/// Turns a description into a constructible artifact
pub trait EmitBackend {
    /// What the backend produces
    type Output;

    /// Emit the proxy type for one description
    fn emit(&self, description: &ProxyTypeDescription) -> Result<Self::Output, EmitError>;
}

/// Emits Rust items
#[derive(Debug, Clone)]
pub struct TokenBackend {
    runtime: syn::Path,
}

impl Default for TokenBackend {
    fn default() -> Self {
        Self {
            runtime: syn::parse_quote!(::interpose_core),
        }
    }
}

impl TokenBackend {
    /// Backend naming the runtime as `::interpose_core`
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend naming the runtime crate through another path, e.g. a
    /// re-export
    pub fn with_runtime_path(path: &str) -> Result<Self, EmitError> {
        let runtime = parse("runtime", "path", path)?;
        Ok(Self { runtime })
    }

    /// Path of the runtime crate
    pub fn runtime_path(&self) -> &syn::Path {
        &self.runtime
    }
}

impl EmitBackend for TokenBackend {
    type Output = TokenStream;

    fn emit(&self, description: &ProxyTypeDescription) -> Result<TokenStream, EmitError> {
        let rt = &self.runtime;
        let target = ident(&description.target, &description.target)?;
        let proxy = ident(&description.target, &description.proxy_name)?;
        let vis: syn::Visibility = parse(&description.proxy_name, "visibility", description.proxy_vis())?;
        let fingerprint = description.fingerprint.to_string();
        let type_doc = format!(" Interception proxy for [`{}`].", description.target);

        let contract = contract_tokens(description, rt)?;
        let constructors = description
            .constructors
            .iter()
            .map(|plan| constructor_tokens(description, plan))
            .collect::<Result<Vec<_>, _>>()?;
        let methods = description
            .forwarding
            .iter()
            .map(|plan| method_tokens(description, plan, rt))
            .collect::<Result<Vec<_>, _>>()?;
        let property_table = if description.emit_property_table {
            property_table_tokens(&description.target, &description.contract.properties, rt)?
        } else {
            TokenStream::new()
        };
        let derives = option_impls(description, &proxy, &target, rt);

        Ok(quote! {
            #[doc = #type_doc]
            #vis struct #proxy(#rt::Proxy<#target>);

            #property_table

            impl #rt::ProxyTarget for #target {
                fn contract() -> &'static #rt::TypeContract {
                    static CONTRACT: #rt::__private::Lazy<#rt::TypeContract> =
                        #rt::__private::Lazy::new(|| #contract);
                    &CONTRACT
                }
            }

            #[allow(dead_code)]
            impl #proxy {
                /// Fingerprint of the contract this proxy was generated from
                pub const CONTRACT_FINGERPRINT: &'static str = #fingerprint;

                /// Wrap an existing value without running any constructor
                pub fn from_existing(value: #target) -> Self {
                    Self(#rt::Proxy::from_existing(value))
                }

                /// Wrap a value and install hooks; when a method name is
                /// unknown the value comes back inside the error
                pub fn with_interceptors<P, S, M, N>(
                    value: #target,
                    prefix: P,
                    suffix: S,
                ) -> ::core::result::Result<Self, #rt::RejectedInterceptors<#target>>
                where
                    P: ::core::iter::IntoIterator<Item = (M, #rt::PrefixHook<#target>)>,
                    S: ::core::iter::IntoIterator<Item = (N, #rt::SuffixHook<#target>)>,
                    M: ::core::convert::AsRef<str>,
                    N: ::core::convert::AsRef<str>,
                {
                    #rt::Proxy::with_interceptors(value, prefix, suffix).map(Self)
                }

                /// Identity of this proxy
                pub fn id(&self) -> #rt::ProxyId {
                    self.0.id()
                }

                /// The underlying runtime proxy
                pub fn as_proxy(&self) -> &#rt::Proxy<#target> {
                    &self.0
                }

                /// Unwrap, dropping every installed hook
                pub fn into_wrapped_value(self) -> #target {
                    self.0.into_wrapped_value()
                }

                /// Read a public field through interception
                pub fn get_property(&self, name: &str) -> ::core::result::Result<#rt::Value, #rt::DispatchFailure> {
                    self.0.get_property(name)
                }

                /// Write a public field through interception
                pub fn set_property(
                    &mut self,
                    name: &str,
                    value: #rt::Value,
                ) -> ::core::result::Result<(), #rt::DispatchFailure> {
                    self.0.set_property(name, value)
                }

                /// Whether a public field holds a non-null value
                pub fn has_property(&self, name: &str) -> ::core::result::Result<bool, #rt::DispatchFailure> {
                    self.0.has_property(name)
                }

                /// Reset a public `Option` field
                pub fn unset_property(&mut self, name: &str) -> ::core::result::Result<(), #rt::DispatchFailure> {
                    self.0.unset_property(name)
                }

                /// Typed borrow of a public field's storage
                pub fn property_mut<V: ::core::any::Any>(
                    &mut self,
                    name: &str,
                ) -> ::core::result::Result<&mut V, #rt::DispatchFailure> {
                    self.0.property_mut(name)
                }

                /// Interceptable access to every field, for the declaring module
                fn friend(&mut self) -> #rt::Friend<'_, #target> {
                    self.0.friend()
                }

                #(#constructors)*

                #(#methods)*
            }

            impl #rt::ValueHolder for #proxy {
                type Wrapped = #target;

                fn wrapped_value(&self) -> &#target {
                    #rt::ValueHolder::wrapped_value(&self.0)
                }

                fn wrapped_value_mut(&mut self) -> &mut #target {
                    #rt::ValueHolder::wrapped_value_mut(&mut self.0)
                }
            }

            impl #rt::AccessInterceptor for #proxy {
                fn set_prefix_interceptor<F>(
                    &mut self,
                    method: &str,
                    hook: F,
                ) -> ::core::result::Result<(), #rt::InterceptorError>
                where
                    F: Fn(&mut #rt::Invocation<'_, #target>) -> ::core::result::Result<#rt::Interception, #rt::HookError>
                        + Send
                        + Sync
                        + 'static,
                {
                    #rt::AccessInterceptor::set_prefix_interceptor(&mut self.0, method, hook)
                }

                fn set_suffix_interceptor<F>(
                    &mut self,
                    method: &str,
                    hook: F,
                ) -> ::core::result::Result<(), #rt::InterceptorError>
                where
                    F: Fn(&mut #rt::Invocation<'_, #target>, &#rt::Value) -> ::core::result::Result<#rt::Interception, #rt::HookError>
                        + Send
                        + Sync
                        + 'static,
                {
                    #rt::AccessInterceptor::set_suffix_interceptor(&mut self.0, method, hook)
                }

                fn remove_prefix_interceptor(&mut self, method: &str) -> bool {
                    #rt::AccessInterceptor::remove_prefix_interceptor(&mut self.0, method)
                }

                fn remove_suffix_interceptor(&mut self, method: &str) -> bool {
                    #rt::AccessInterceptor::remove_suffix_interceptor(&mut self.0, method)
                }

                fn clear_interceptors(&mut self) {
                    #rt::AccessInterceptor::clear_interceptors(&mut self.0)
                }
            }

            impl ::core::convert::From<#target> for #proxy {
                fn from(value: #target) -> Self {
                    Self::from_existing(value)
                }
            }

            #derives
        })
    }
}

/// `PropertyTable` implementation for a struct's named fields.
///
/// Shared by `#[derive(PropertyTable)]` and by generated output for targets
/// that do not derive it.
pub fn emit_property_table(
    target: &str,
    properties: &[PropertyDescriptor],
    runtime: &syn::Path,
) -> Result<TokenStream, EmitError> {
    property_table_tokens(target, properties, runtime)
}

fn property_table_tokens(
    target: &str,
    properties: &[PropertyDescriptor],
    rt: &syn::Path,
) -> Result<TokenStream, EmitError> {
    let target_ident = ident(target, target)?;
    let mut descriptors = Vec::with_capacity(properties.len());
    let mut reads = Vec::with_capacity(properties.len());
    let mut writes = Vec::with_capacity(properties.len());
    let mut unsets = Vec::with_capacity(properties.len());
    let mut slots = Vec::with_capacity(properties.len());

    for property in properties {
        let name = property.name.as_str();
        let field = ident(name, name)?;
        let ty: syn::Type = parse(name, "type", &property.ty)?;
        let ty_text = property.ty.as_str();
        let visibility = visibility_tokens(property.visibility, rt);
        let read = property.access.read;
        let write = property.access.write;
        let nullable = property.nullable;

        descriptors.push(quote! {
            #rt::PropertyDescriptor::new(#name, #ty_text, #visibility)
                .with_access(#rt::PropertyAccess { read: #read, write: #write })
                .nullable(#nullable)
        });
        reads.push(quote! {
            #name => (&#rt::value::Probe(&self.#field))
                .try_snapshot()
                .ok_or_else(|| #rt::PropertyError::opaque(#name, #ty_text)),
        });
        writes.push(quote! {
            #name => {
                self.#field = (&#rt::value::Restore::<#ty>::new())
                    .restore(value)
                    .map_err(|error| #rt::PropertyError::from_restore(#name, error))?;
                ::core::result::Result::Ok(())
            }
        });
        unsets.push(if nullable {
            quote! {
                #name => {
                    self.#field = ::core::option::Option::None;
                    ::core::result::Result::Ok(())
                }
            }
        } else {
            quote! {
                #name => ::core::result::Result::Err(#rt::PropertyError::not_nullable(#name)),
            }
        });
        slots.push(quote! {
            #name => ::core::option::Option::Some(&mut self.#field as &mut dyn ::core::any::Any),
        });
    }

    Ok(quote! {
        impl #rt::PropertyTable for #target_ident {
            fn property_descriptors() -> ::std::vec::Vec<#rt::PropertyDescriptor> {
                ::std::vec![#(#descriptors),*]
            }

            fn read_property(&self, name: &str) -> ::core::result::Result<#rt::Value, #rt::PropertyError> {
                #[allow(unused_imports)]
                use #rt::value::{OpaqueProbe as _, SerializeProbe as _};
                match name {
                    #(#reads)*
                    _ => ::core::result::Result::Err(#rt::PropertyError::unknown(name)),
                }
            }

            #[allow(unused_variables)]
            fn write_property(
                &mut self,
                name: &str,
                value: #rt::Value,
            ) -> ::core::result::Result<(), #rt::PropertyError> {
                #[allow(unused_imports)]
                use #rt::value::{DeserializeRestore as _, OpaqueRestore as _};
                match name {
                    #(#writes)*
                    _ => ::core::result::Result::Err(#rt::PropertyError::unknown(name)),
                }
            }

            fn unset_property(&mut self, name: &str) -> ::core::result::Result<(), #rt::PropertyError> {
                match name {
                    #(#unsets)*
                    _ => ::core::result::Result::Err(#rt::PropertyError::unknown(name)),
                }
            }

            fn property_slot(&mut self, name: &str) -> ::core::option::Option<&mut (dyn ::core::any::Any + 'static)> {
                match name {
                    #(#slots)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    })
}

fn contract_tokens(description: &ProxyTypeDescription, rt: &syn::Path) -> Result<TokenStream, EmitError> {
    let contract = &description.contract;
    let type_name = contract.type_name.as_str();
    let target = ident(type_name, type_name)?;
    let methods = contract.methods.iter().map(|method| method_descriptor(method, rt));
    let constructors = contract
        .constructors
        .iter()
        .map(|constructor| constructor_descriptor(constructor, rt));
    Ok(quote! {
        #rt::TypeContract::new(#type_name)
            #(.with_method(#methods))*
            #(.with_constructor(#constructors))*
            .with_properties(<#target as #rt::PropertyTable>::property_descriptors())
    })
}

fn method_descriptor(method: &MethodDescriptor, rt: &syn::Path) -> TokenStream {
    let name = method.name.as_str();
    let receiver = match method.receiver {
        Receiver::Shared => quote!(#rt::Receiver::Shared),
        Receiver::Exclusive => quote!(#rt::Receiver::Exclusive),
    };
    let parameters = method.parameters.iter().map(|parameter| {
        let name = parameter.name.as_str();
        let ty = parameter.ty.as_str();
        let mode = param_mode_tokens(parameter.mode, rt);
        quote!(.with_parameter(#rt::ParameterDescriptor::new(#name, #mode, #ty)))
    });
    let returning = match method.return_mode {
        ReturnMode::Void => TokenStream::new(),
        mode => {
            let mode = match mode {
                ReturnMode::ByReference => quote!(#rt::ReturnMode::ByReference),
                _ => quote!(#rt::ReturnMode::ByValue),
            };
            let ty = method.return_ty.as_deref().unwrap_or_default();
            quote!(.returning(#mode, #ty))
        }
    };
    let generics = optional_text(method.generics.as_deref());
    let where_clause = optional_text(method.where_clause.as_deref());
    let visibility = visibility_tokens(method.visibility, rt);
    let forwardable = (!method.forwardable).then(|| quote!(.non_forwardable()));
    quote! {
        #rt::MethodDescriptor::new(#name, #receiver)
            #(#parameters)*
            #returning
            .with_generics(#generics, #where_clause)
            .with_visibility(#visibility)
            #forwardable
    }
}

fn constructor_descriptor(constructor: &ConstructorDescriptor, rt: &syn::Path) -> TokenStream {
    let name = constructor.name.as_str();
    let parameters = constructor.parameters.iter().map(|parameter| {
        let name = parameter.name.as_str();
        let ty = parameter.ty.as_str();
        let mode = param_mode_tokens(parameter.mode, rt);
        quote!(.with_parameter(#rt::ParameterDescriptor::new(#name, #mode, #ty)))
    });
    let visibility = visibility_tokens(constructor.visibility, rt);
    let fallible = constructor
        .error_ty
        .as_deref()
        .map(|error| quote!(.fallible(#error)));
    quote! {
        #rt::ConstructorDescriptor::new(#name)
            #(#parameters)*
            .with_visibility(#visibility)
            #fallible
    }
}

fn constructor_tokens(
    description: &ProxyTypeDescription,
    plan: &ConstructorPlan,
) -> Result<TokenStream, EmitError> {
    let member = plan.constructor.as_str();
    let constructor = description
        .contract
        .constructors
        .iter()
        .find(|c| c.name == plan.constructor)
        .ok_or_else(|| missing(member, "constructor"))?;
    let target = ident(&description.target, &description.target)?;
    let name = ident(member, member)?;
    let vis: syn::Visibility = parse(member, "visibility", &plan.syntax.vis)?;
    let (params, args) = parameter_list(member, &constructor.parameters, &plan.syntax.bindings)?;
    let doc = format!(" Runs [`{}::{member}`] and wraps the result.", description.target);

    match &constructor.error_ty {
        None => Ok(quote! {
            #[doc = #doc]
            #vis fn #name(#(#params),*) -> Self {
                Self::from_existing(#target::#name(#(#args),*))
            }
        }),
        Some(error) => {
            let error: syn::Type = parse(member, "error type", error)?;
            Ok(quote! {
                #[doc = #doc]
                #vis fn #name(#(#params),*) -> ::core::result::Result<Self, #error> {
                    #target::#name(#(#args),*).map(Self::from_existing)
                }
            })
        }
    }
}

fn method_tokens(
    description: &ProxyTypeDescription,
    plan: &ForwardingPlan,
    rt: &syn::Path,
) -> Result<TokenStream, EmitError> {
    let member = plan.method.as_str();
    let method = description
        .contract
        .method(member)
        .ok_or_else(|| missing(member, "method"))?;
    let name = ident(member, member)?;
    let try_name = ident(member, &plan.try_name)?;
    let vis: syn::Visibility = parse(member, "visibility", &plan.syntax.vis)?;
    let receiver_text = plan.syntax.receiver.as_deref().unwrap_or(match method.receiver {
        Receiver::Shared => "&self",
        Receiver::Exclusive => "&mut self",
    });
    let receiver: syn::FnArg = parse(member, "receiver", receiver_text)?;
    let generics: syn::Generics = match method.generics.as_deref() {
        Some(text) => parse(member, "generics", text)?,
        None => syn::Generics::default(),
    };
    let where_clause: Option<syn::WhereClause> = method
        .where_clause
        .as_deref()
        .map(|text| parse(member, "where clause", text))
        .transpose()?;
    let turbofish = turbofish(&generics, method);
    let (params, args) = parameter_list(member, &method.parameters, &plan.syntax.bindings)?;
    let returned: Option<syn::Type> = match method.return_mode {
        ReturnMode::Void => None,
        ReturnMode::ByValue | ReturnMode::ByReference => {
            let text = method
                .return_ty
                .as_deref()
                .ok_or_else(|| missing(member, "return type"))?;
            Some(parse(member, "return type", text)?)
        }
    };

    let captures = method.parameters.iter().zip(&args).map(|(parameter, arg)| {
        let key = parameter.name.as_str();
        let borrowed = if parameter.mode.is_by_reference() {
            quote!(&*#arg)
        } else {
            quote!(&#arg)
        };
        quote! {
            __interpose_params.insert(#key, (&#rt::value::Probe(#borrowed)).snapshot());
        }
    });
    let capture = if method.parameters.is_empty() {
        quote!(self.0.capture(#member, #rt::Params::new))
    } else {
        let count = method.parameters.len();
        quote! {
            self.0.capture(#member, || {
                let mut __interpose_params = #rt::Params::with_capacity(#count);
                #(#captures)*
                __interpose_params
            })
        }
    };

    let real = quote!(move |__interpose_target| __interpose_target.#name #turbofish(#(#args),*));
    let dispatch = format_ident!("{}", plan.dispatch.entry_point());
    let call = if plan.dispatch.takes_codec() {
        let codec = match &returned {
            None => quote!(#rt::ReturnCodec::void()),
            Some(ty) => quote! {
                #rt::ReturnCodec::<#ty>::new(
                    |__interpose_value: &#ty| (&#rt::value::Probe(__interpose_value)).snapshot(),
                    |__interpose_value: #rt::Value| (&#rt::value::Restore::<#ty>::new()).restore(__interpose_value),
                )
            },
        };
        quote!(self.0.#dispatch(#member, __interpose_params, #codec, #real))
    } else {
        quote!(self.0.#dispatch(#member, __interpose_params, #real))
    };

    let try_output = match &returned {
        Some(ty) => quote!(::core::result::Result<#ty, #rt::DispatchFailure>),
        None => quote!(::core::result::Result<(), #rt::DispatchFailure>),
    };
    let output = returned.as_ref().map(|ty| quote!(-> #ty));
    let notes = description.limitations_of(member).map(|limitation| {
        let note = format!(" Limitation: {}.", limitation.note);
        quote!(#[doc = ""] #[doc = #note])
    });
    let doc = format!(" Forwards [`{}::{member}`] through interception.", description.target);
    let try_doc = format!(
        " Like [`{}::{member}`], returning a dispatch failure instead of raising it.",
        description.proxy_name
    );

    Ok(quote! {
        #[doc = #try_doc]
        #vis fn #try_name #generics (#receiver, #(#params),*) -> #try_output #where_clause {
            #[allow(unused_imports)]
            use #rt::value::{DeserializeRestore as _, OpaqueProbe as _, OpaqueRestore as _, SerializeProbe as _};
            let __interpose_params = #capture;
            #call
        }

        #[doc = #doc]
        #(#notes)*
        #vis fn #name #generics (#receiver, #(#params),*) #output #where_clause {
            match self.#try_name #turbofish(#(#args),*) {
                ::core::result::Result::Ok(value) => value,
                ::core::result::Result::Err(failure) => failure.raise(),
            }
        }
    })
}

fn option_impls(
    description: &ProxyTypeDescription,
    proxy: &syn::Ident,
    target: &syn::Ident,
    rt: &syn::Path,
) -> TokenStream {
    let options = &description.options;
    let mut tokens = TokenStream::new();
    if options.clone {
        tokens.extend(quote! {
            impl ::core::clone::Clone for #proxy {
                fn clone(&self) -> Self {
                    Self(::core::clone::Clone::clone(&self.0))
                }
            }
        });
    }
    if options.serde {
        tokens.extend(quote! {
            impl #rt::__private::serde::Serialize for #proxy {
                fn serialize<S>(&self, serializer: S) -> ::core::result::Result<S::Ok, S::Error>
                where
                    S: #rt::__private::serde::Serializer,
                {
                    #rt::__private::serde::Serialize::serialize(&self.0, serializer)
                }
            }

            impl<'de> #rt::__private::serde::Deserialize<'de> for #proxy {
                fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
                where
                    D: #rt::__private::serde::Deserializer<'de>,
                {
                    <#rt::Proxy<#target> as #rt::__private::serde::Deserialize<'de>>::deserialize(deserializer)
                        .map(Self)
                }
            }
        });
    }
    if options.debug {
        let name = description.proxy_name.as_str();
        tokens.extend(quote! {
            impl ::core::fmt::Debug for #proxy {
                fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                    f.debug_tuple(#name).field(&self.0).finish()
                }
            }
        });
    }
    if options.partial_eq {
        tokens.extend(quote! {
            impl ::core::cmp::PartialEq for #proxy {
                fn eq(&self, other: &Self) -> bool {
                    self.0 == other.0
                }
            }
        });
    }
    tokens
}

/// `name: Ty` pairs and the matching call arguments
fn parameter_list(
    member: &str,
    parameters: &[interpose_core::ParameterDescriptor],
    bindings: &[String],
) -> Result<(Vec<TokenStream>, Vec<syn::Ident>), EmitError> {
    let mut params = Vec::with_capacity(parameters.len());
    let mut args = Vec::with_capacity(parameters.len());
    for (index, parameter) in parameters.iter().enumerate() {
        let binding = bindings.get(index).unwrap_or(&parameter.name);
        let arg = ident(member, binding)?;
        let ty: syn::Type = parse(member, "parameter type", &parameter.ty)?;
        params.push(quote!(#arg: #ty));
        args.push(arg);
    }
    Ok((params, args))
}

// explicit type arguments, unless argument-position `impl Trait` forbids them
fn turbofish(generics: &syn::Generics, method: &MethodDescriptor) -> TokenStream {
    let explicit: Vec<&syn::Ident> = generics
        .params
        .iter()
        .filter_map(|param| match param {
            syn::GenericParam::Type(ty) => Some(&ty.ident),
            syn::GenericParam::Const(constant) => Some(&constant.ident),
            syn::GenericParam::Lifetime(_) => None,
        })
        .collect();
    let apit = method.parameters.iter().any(|p| p.ty.contains("impl "));
    if explicit.is_empty() || apit {
        TokenStream::new()
    } else {
        quote!(::<#(#explicit),*>)
    }
}

fn param_mode_tokens(mode: ParamMode, rt: &syn::Path) -> TokenStream {
    match mode {
        ParamMode::ByValue => quote!(#rt::ParamMode::ByValue),
        ParamMode::ByReference => quote!(#rt::ParamMode::ByReference),
        ParamMode::VariadicByValue => quote!(#rt::ParamMode::VariadicByValue),
        ParamMode::VariadicByReference => quote!(#rt::ParamMode::VariadicByReference),
    }
}

fn visibility_tokens(visibility: Visibility, rt: &syn::Path) -> TokenStream {
    match visibility {
        Visibility::Public => quote!(#rt::Visibility::Public),
        Visibility::Restricted => quote!(#rt::Visibility::Restricted),
        Visibility::Private => quote!(#rt::Visibility::Private),
    }
}

fn optional_text(text: Option<&str>) -> TokenStream {
    match text {
        Some(text) => quote!(::core::option::Option::Some(::std::string::String::from(#text))),
        None => quote!(::core::option::Option::None),
    }
}

fn ident(member: &str, text: &str) -> Result<syn::Ident, EmitError> {
    parse(member, "identifier", text)
}

fn parse<T: syn::parse::Parse>(member: &str, what: &'static str, text: &str) -> Result<T, EmitError> {
    syn::parse_str(text).map_err(|error| EmitError::parse(member, what, text, error))
}

fn missing(member: &str, what: &'static str) -> EmitError {
    EmitError::parse(
        member,
        what,
        member,
        syn::Error::new(Span::call_site(), format!("{what} is missing from the contract")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_contract;
    use crate::synthesize::{describe, SynthesisOptions};
    use syn::{parse_quote, ImplItem, Item, ItemImpl, ItemStruct};

    fn description(options: SynthesisOptions) -> ProxyTypeDescription {
        let item: ItemStruct = parse_quote! {
            pub struct Base { pub counter: i64, label: Option<String> }
        };
        let body: ItemImpl = parse_quote! {
            impl Base {
                pub fn new() -> Self { Base { counter: 0, label: None } }
                pub fn m(&mut self) -> String { "X".into() }
                fn secret(&self, key: &str) -> bool { key.is_empty() }
                pub fn name(&self) -> &str { "base" }
                pub fn join(&self, first: String, #[variadic] rest: Vec<String>) -> String { first }
                pub fn convert<T: Default>(&self) -> T { T::default() }
            }
        };
        let extracted = extract_contract(Some(&item), &[&body]).unwrap();
        describe(&extracted, &options).unwrap()
    }

    fn emitted(description: &ProxyTypeDescription) -> syn::File {
        let tokens = TokenBackend::new().emit(description).unwrap();
        syn::parse2(tokens).unwrap()
    }

    fn proxy_methods(file: &syn::File) -> Vec<syn::ImplItemFn> {
        file.items
            .iter()
            .filter_map(|item| match item {
                Item::Impl(block) if block.trait_.is_none() => Some(block),
                _ => None,
            })
            .flat_map(|block| block.items.iter())
            .filter_map(|item| match item {
                ImplItem::Fn(function) => Some(function.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn emits_forwarding_pairs_with_original_visibility() {
        let file = emitted(&description(SynthesisOptions::default()));
        let methods = proxy_methods(&file);
        let find = |name: &str| methods.iter().find(|m| m.sig.ident == name).unwrap();

        assert!(matches!(find("m").vis, syn::Visibility::Public(_)));
        assert!(matches!(find("secret").vis, syn::Visibility::Inherited));
        assert!(matches!(find("try_secret").vis, syn::Visibility::Inherited));
        assert!(matches!(find("friend").vis, syn::Visibility::Inherited));
        assert_eq!(find("convert").sig.generics.params.len(), 1);
        assert_eq!(find("new").sig.inputs.len(), 0);
    }

    #[test]
    fn property_table_only_when_not_derived() {
        let file = emitted(&description(SynthesisOptions::default()));
        let has_table = file.items.iter().any(|item| {
            matches!(item, Item::Impl(block)
                if block.trait_.as_ref().is_some_and(|(_, path, _)| path.segments.last().unwrap().ident == "PropertyTable"))
        });
        assert!(has_table);
    }

    #[test]
    fn options_add_trait_impls() {
        let options = SynthesisOptions {
            clone: true,
            serde: true,
            debug: true,
            partial_eq: true,
            ..SynthesisOptions::default()
        };
        let file = emitted(&description(options));
        let traits: Vec<String> = file
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Impl(block) => block
                    .trait_
                    .as_ref()
                    .map(|(_, path, _)| path.segments.last().unwrap().ident.to_string()),
                _ => None,
            })
            .collect();
        for expected in ["Clone", "Serialize", "Deserialize", "Debug", "PartialEq", "ValueHolder", "AccessInterceptor"] {
            assert!(traits.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn runtime_path_is_configurable() {
        let backend = TokenBackend::with_runtime_path("crate::runtime").unwrap();
        let tokens = backend.emit(&description(SynthesisOptions::default())).unwrap().to_string();
        assert!(tokens.contains("crate :: runtime :: Proxy"));
        assert!(!tokens.contains("interpose_core"));

        assert!(TokenBackend::with_runtime_path("not a path").is_err());
    }

    #[test]
    fn broken_source_text_is_reported() {
        let mut description = description(SynthesisOptions::default());
        description.contract.methods[0].return_ty = Some("Vec<".into());
        let error = TokenBackend::new().emit(&description).unwrap_err();
        assert!(matches!(error, EmitError::Parse { what: "return type", .. }));
    }
}
