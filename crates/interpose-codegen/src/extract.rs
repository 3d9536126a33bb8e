//! Contract extraction from Rust syntax
//!
//! Pure analysis over `syn` items: an inherent impl block yields method and
//! constructor descriptors, a named-field struct yields property
//! descriptors. Anything that cannot be forwarded faithfully is rejected
//! with [`UnsupportedContract`].
//!
//! Recognized markers:
//!
//! - `#[variadic]` on the last parameter (only inside `#[proxy]` blocks,
//!   where the macro strips it again),
//! - `#[interpose(variadic)]` on a method, marking its last parameter
//!   (written `#[interpose_macros::interpose(..)]` outside `#[proxy]`),
//! - `#[interpose(dynamic_args)]` on a method that reads arguments beyond
//!   its declared list,
//! - `#[interpose(read_only)]` / `#[interpose(skip)]` on fields.

use indexmap::IndexMap;
use interpose_core::{
    ConstructorDescriptor, Fingerprint, MethodDescriptor, ParamMode, ParameterDescriptor,
    PropertyAccess, PropertyDescriptor, Receiver, ReturnMode, TypeContract, UnsupportedContract,
    Visibility,
};
use quote::ToTokens;
use serde::{Deserialize, Serialize};
use syn::visit::Visit;
use syn::visit_mut::VisitMut;
use syn::{
    Attribute, FnArg, Generics, ImplItem, ImplItemFn, ItemImpl, ItemStruct, Pat, ReturnType, Type,
};

use crate::registry::TargetKey;

/// Parameter marker for a trailing variadic sequence
pub const VARIADIC_ATTR: &str = "variadic";

/// Helper attribute carrying interpose options
pub const INTERPOSE_ATTR: &str = "interpose";

/// Source-level details of a member that descriptors do not carry, needed
/// to reproduce its exact signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSyntax {
    /// Visibility as written (`pub`, `pub(super)`, empty for private)
    pub vis: String,
    /// Receiver as written, `None` for constructors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Parameter binding names, in order
    pub bindings: Vec<String>,
}

impl MemberSyntax {
    /// Syntax implied by a method descriptor alone
    pub fn for_method(method: &MethodDescriptor) -> Self {
        let receiver = match method.receiver {
            Receiver::Shared => "&self",
            Receiver::Exclusive => "&mut self",
        };
        Self {
            vis: default_vis(method.visibility).to_string(),
            receiver: Some(receiver.to_string()),
            bindings: method.parameters.iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// Syntax implied by a constructor descriptor alone
    pub fn for_constructor(constructor: &ConstructorDescriptor) -> Self {
        Self {
            vis: default_vis(constructor.visibility).to_string(),
            receiver: None,
            bindings: constructor.parameters.iter().map(|p| p.name.clone()).collect(),
        }
    }
}

fn default_vis(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "pub",
        Visibility::Restricted => "pub(crate)",
        Visibility::Private => "",
    }
}

/// Members found in one impl block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMethods {
    /// Instance methods
    pub methods: Vec<MethodDescriptor>,
    /// Associated functions returning the target
    pub constructors: Vec<ConstructorDescriptor>,
    /// Signature details by member name
    pub syntax: IndexMap<String, MemberSyntax>,
    /// Associated functions that are neither
    pub skipped: Vec<String>,
}

/// Everything extracted for one target type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContract {
    /// The contract itself
    pub contract: TypeContract,
    /// Signature details by member name
    pub syntax: IndexMap<String, MemberSyntax>,
    /// Associated functions left out of the contract
    pub skipped: Vec<String>,
    /// The struct already derives `PropertyTable`
    pub derives_property_table: bool,
    /// Where the target is declared (source file or module path), when known
    pub origin: Option<String>,
}

impl ExtractedContract {
    /// Wrap a hand-built contract, deriving syntax from its descriptors
    pub fn from_contract(contract: TypeContract) -> Self {
        let syntax = contract
            .methods
            .iter()
            .map(|m| (m.name.clone(), MemberSyntax::for_method(m)))
            .chain(
                contract
                    .constructors
                    .iter()
                    .map(|c| (c.name.clone(), MemberSyntax::for_constructor(c))),
            )
            .collect();
        Self {
            contract,
            syntax,
            skipped: Vec::new(),
            derives_property_table: true,
            origin: None,
        }
    }

    /// Record where the target is declared
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Signature details of a member
    pub fn syntax_of(&self, name: &str) -> Option<&MemberSyntax> {
        self.syntax.get(name)
    }

    /// Fingerprint of every input a description is built from.
    ///
    /// Covers the contract plus what only shapes the emitted code: member
    /// syntax as written, skipped associated functions and whether the
    /// struct derives `PropertyTable`. The origin is not hashed.
    pub fn source_fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.contract.fingerprint().as_bytes());
        for (member, syntax) in &self.syntax {
            feed(&mut hasher, member);
            feed(&mut hasher, &syntax.vis);
            feed(&mut hasher, syntax.receiver.as_deref().unwrap_or(""));
            hasher.update(&(syntax.bindings.len() as u64).to_le_bytes());
            for binding in &syntax.bindings {
                feed(&mut hasher, binding);
            }
        }
        for skipped in &self.skipped {
            feed(&mut hasher, "skipped");
            feed(&mut hasher, skipped);
        }
        hasher.update(&[u8::from(self.derives_property_table)]);
        Fingerprint::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Registry identity of the target
    pub fn target_key(&self) -> TargetKey {
        match &self.origin {
            Some(origin) => TargetKey::new(origin.clone(), self.contract.type_name.clone()),
            None => TargetKey::unplaced(self.contract.type_name.clone(), self.source_fingerprint()),
        }
    }
}

fn feed(hasher: &mut blake3::Hasher, text: &str) {
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

/// Name of the type an inherent impl block is for
pub fn target_name(item: &ItemImpl) -> Result<String, UnsupportedContract> {
    let rendered = type_text(&item.self_ty);
    if item.trait_.is_some() {
        return Err(UnsupportedContract::unsupported_type(
            rendered,
            "only inherent impl blocks can be proxied",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(UnsupportedContract::unsupported_type(
            rendered,
            "generic impl blocks cannot be proxied",
        ));
    }
    match &*item.self_ty {
        Type::Path(path) if path.qself.is_none() => match path.path.get_ident() {
            Some(ident) => Ok(ident.to_string()),
            None => Err(UnsupportedContract::unsupported_type(
                rendered,
                "the target must be named by a plain identifier in its own module",
            )),
        },
        _ => Err(UnsupportedContract::unsupported_type(
            rendered,
            "the target must be a named struct",
        )),
    }
}

/// Methods and constructors of one inherent impl block
pub fn extract_methods(item: &ItemImpl) -> Result<ExtractedMethods, UnsupportedContract> {
    let target = target_name(item)?;
    let mut extracted = ExtractedMethods::default();
    for member in &item.items {
        let ImplItem::Fn(function) = member else {
            continue;
        };
        let name = function.sig.ident.to_string();
        if extracted.syntax.contains_key(&name) || extracted.skipped.contains(&name) {
            return Err(UnsupportedContract::DuplicateMember { name });
        }
        match function.sig.inputs.first() {
            Some(FnArg::Receiver(_)) => {
                let (method, syntax) = extract_method(&target, function)?;
                extracted.methods.push(method);
                extracted.syntax.insert(name, syntax);
            }
            _ => match extract_constructor(&target, function)? {
                Some((constructor, syntax)) => {
                    extracted.constructors.push(constructor);
                    extracted.syntax.insert(name, syntax);
                }
                None => extracted.skipped.push(name),
            },
        }
    }
    Ok(extracted)
}

/// Properties of a named-field struct
pub fn extract_properties(item: &ItemStruct) -> Result<Vec<PropertyDescriptor>, UnsupportedContract> {
    let target = item.ident.to_string();
    if !item.generics.params.is_empty() {
        return Err(UnsupportedContract::unsupported_type(
            target,
            "structs with generic or lifetime parameters cannot be proxied",
        ));
    }
    let syn::Fields::Named(fields) = &item.fields else {
        return Err(UnsupportedContract::unsupported_type(
            target,
            "tuple and unit structs have no named properties",
        ));
    };

    let mut properties = Vec::with_capacity(fields.named.len());
    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let markers = FieldMarkers::parse(&target, &field.attrs)?;
        if markers.skip {
            continue;
        }
        let access = if markers.read_only {
            PropertyAccess::READ_ONLY
        } else {
            PropertyAccess::READ_WRITE
        };
        properties.push(
            PropertyDescriptor::new(ident.to_string(), type_text(&field.ty), visibility(&field.vis))
                .with_access(access)
                .nullable(is_option(&field.ty)),
        );
    }
    Ok(properties)
}

/// Full contract from a struct (when available) and its inherent impls
pub fn extract_contract(
    item_struct: Option<&ItemStruct>,
    impls: &[&ItemImpl],
) -> Result<ExtractedContract, UnsupportedContract> {
    let type_name = match (item_struct, impls.first()) {
        (Some(item), _) => item.ident.to_string(),
        (None, Some(item)) => target_name(item)?,
        (None, None) => {
            return Err(UnsupportedContract::unsupported_type(
                "<unknown>",
                "no struct or impl block to extract from",
            ))
        }
    };

    let mut contract = TypeContract::new(type_name.clone());
    let mut syntax = IndexMap::new();
    let mut skipped = Vec::new();
    for item in impls {
        let name = target_name(item)?;
        if name != type_name {
            return Err(UnsupportedContract::unsupported_type(
                name,
                format!("impl block does not belong to `{type_name}`"),
            ));
        }
        let extracted = extract_methods(item)?;
        for (member, member_syntax) in extracted.syntax {
            if syntax.contains_key(&member) {
                return Err(UnsupportedContract::DuplicateMember { name: member });
            }
            syntax.insert(member, member_syntax);
        }
        contract.methods.extend(extracted.methods);
        contract.constructors.extend(extracted.constructors);
        skipped.extend(extracted.skipped);
    }

    let derives_property_table = match item_struct {
        Some(item) => {
            contract.properties = extract_properties(item)?;
            derives(&type_name, &item.attrs, "PropertyTable")?
        }
        None => true,
    };
    contract.validate()?;

    Ok(ExtractedContract {
        contract,
        syntax,
        skipped,
        derives_property_table,
        origin: None,
    })
}

/// Contract of `type_name` from a parsed source file: its struct plus every
/// inherent impl block for it, at the file's top level.
///
/// `Ok(None)` when the file declares no such struct.
pub fn extract_from_file(
    file: &syn::File,
    type_name: &str,
) -> Result<Option<ExtractedContract>, UnsupportedContract> {
    let mut item_struct = None;
    let mut impls = Vec::new();
    for item in &file.items {
        match item {
            syn::Item::Struct(item) if item.ident == type_name => item_struct = Some(item),
            syn::Item::Impl(item) if item.trait_.is_none() && names_type(item, type_name) => {
                impls.push(item)
            }
            _ => {}
        }
    }
    match item_struct {
        Some(item) => extract_contract(Some(item), &impls).map(Some),
        None => Ok(None),
    }
}

fn names_type(item: &ItemImpl, type_name: &str) -> bool {
    matches!(&*item.self_ty, Type::Path(path) if path.qself.is_none() && path.path.is_ident(type_name))
}

/// Remove interpose markers so the impl block compiles as plain Rust
pub fn strip_markers(item: &mut ItemImpl) {
    for member in &mut item.items {
        if let ImplItem::Fn(function) = member {
            function.attrs.retain(|attr| !is_marker(attr, INTERPOSE_ATTR));
            for input in &mut function.sig.inputs {
                if let FnArg::Typed(typed) = input {
                    typed.attrs.retain(|attr| !is_marker(attr, VARIADIC_ATTR));
                }
            }
        }
    }
}

/// Render a type as compact source text
pub fn type_text(ty: &Type) -> String {
    compact(ty.to_token_stream().to_string())
}

fn generics_text(generics: &Generics) -> (Option<String>, Option<String>) {
    let params = (!generics.params.is_empty()).then(|| {
        let params = &generics.params;
        compact(quote::quote!(<#params>).to_string())
    });
    let where_clause = generics
        .where_clause
        .as_ref()
        .filter(|clause| !clause.predicates.is_empty())
        .map(|clause| compact(clause.to_token_stream().to_string()));
    (params, where_clause)
}

// token streams print with a space between every token
fn compact(text: String) -> String {
    const JOINS: &[(&str, &str)] = &[
        (" < ", "<"),
        ("< ", "<"),
        (" >", ">"),
        (" :: ", "::"),
        (":: ", "::"),
        (" ,", ","),
        ("& ", "&"),
        ("( ", "("),
        (" )", ")"),
        ("[ ", "["),
        (" ]", "]"),
        (" ;", ";"),
        (" : ", ": "),
    ];
    JOINS
        .iter()
        .fold(text, |text, (from, to)| text.replace(from, to))
}

fn visibility(vis: &syn::Visibility) -> Visibility {
    match vis {
        syn::Visibility::Public(_) => Visibility::Public,
        syn::Visibility::Restricted(_) => Visibility::Restricted,
        syn::Visibility::Inherited => Visibility::Private,
    }
}

fn vis_text(vis: &syn::Visibility) -> String {
    compact(vis.to_token_stream().to_string())
}

fn extract_method(
    target: &str,
    function: &ImplItemFn,
) -> Result<(MethodDescriptor, MemberSyntax), UnsupportedContract> {
    let sig = &function.sig;
    let name = sig.ident.to_string();
    check_signature(target, &name, sig)?;
    let markers = MethodMarkers::parse(target, &name, &function.attrs)?;

    let Some(FnArg::Receiver(receiver)) = sig.inputs.first() else {
        return Err(UnsupportedContract::ConsumingReceiver { method: name });
    };
    let (kind, receiver_text) = classify_receiver(&name, receiver)?;

    let (parameters, bindings) = extract_parameters(target, sig.inputs.iter().skip(1), markers.variadic)?;
    let (return_mode, return_ty) = classify_return(target, &name, &sig.output)?;
    let (generics, where_clause) = generics_text(&replace_self_generics(&sig.generics, target));

    let mut method = MethodDescriptor::new(name.clone(), kind)
        .returning(return_mode, return_ty.unwrap_or_default())
        .with_generics(generics, where_clause)
        .with_visibility(visibility(&function.vis));
    method.parameters = parameters;
    if markers.dynamic_args {
        method = method.non_forwardable();
    }
    method.validate()?;

    Ok((
        method,
        MemberSyntax {
            vis: vis_text(&function.vis),
            receiver: Some(receiver_text),
            bindings,
        },
    ))
}

fn extract_constructor(
    target: &str,
    function: &ImplItemFn,
) -> Result<Option<(ConstructorDescriptor, MemberSyntax)>, UnsupportedContract> {
    let sig = &function.sig;
    let name = sig.ident.to_string();
    let ReturnType::Type(_, output) = &sig.output else {
        return Ok(None);
    };
    let fallible = match returns_target(target, output) {
        TargetReturn::Plain => None,
        TargetReturn::Result(error) => Some(error),
        TargetReturn::Other => return Ok(None),
    };
    if !sig.generics.params.is_empty() {
        return Ok(None);
    }
    check_signature(target, &name, sig)?;

    let (parameters, bindings) = extract_parameters(target, sig.inputs.iter(), false)?;
    let mut constructor =
        ConstructorDescriptor::new(name).with_visibility(visibility(&function.vis));
    constructor.parameters = parameters;
    if let Some(error) = fallible {
        constructor = constructor.fallible(error);
    }
    Ok(Some((
        constructor,
        MemberSyntax {
            vis: vis_text(&function.vis),
            receiver: None,
            bindings,
        },
    )))
}

fn check_signature(target: &str, name: &str, sig: &syn::Signature) -> Result<(), UnsupportedContract> {
    if sig.asyncness.is_some() {
        return Err(UnsupportedContract::AsyncMethod {
            method: name.to_string(),
        });
    }
    if sig.variadic.is_some() {
        return Err(UnsupportedContract::CVariadic {
            method: name.to_string(),
        });
    }
    if sig.unsafety.is_some() {
        return Err(UnsupportedContract::unsupported_type(
            target,
            format!("method `{name}` is unsafe"),
        ));
    }
    Ok(())
}

fn classify_receiver(
    method: &str,
    receiver: &syn::Receiver,
) -> Result<(Receiver, String), UnsupportedContract> {
    let reference = match (&receiver.reference, &*receiver.ty) {
        (Some((_, lifetime)), _) => Some((lifetime.clone(), receiver.mutability.is_some())),
        (None, Type::Reference(reference)) if is_self(&reference.elem) => {
            Some((reference.lifetime.clone(), reference.mutability.is_some()))
        }
        _ => None,
    };
    let Some((lifetime, exclusive)) = reference else {
        return Err(UnsupportedContract::ConsumingReceiver {
            method: method.to_string(),
        });
    };
    let mut text = String::from("&");
    if let Some(lifetime) = lifetime {
        text.push_str(&lifetime.to_string());
        text.push(' ');
    }
    if exclusive {
        text.push_str("mut ");
    }
    text.push_str("self");
    let kind = if exclusive {
        Receiver::Exclusive
    } else {
        Receiver::Shared
    };
    Ok((kind, text))
}

fn extract_parameters<'a>(
    target: &str,
    inputs: impl Iterator<Item = &'a FnArg>,
    last_is_variadic: bool,
) -> Result<(Vec<ParameterDescriptor>, Vec<String>), UnsupportedContract> {
    let inputs: Vec<&syn::PatType> = inputs
        .filter_map(|input| match input {
            FnArg::Typed(typed) => Some(typed),
            FnArg::Receiver(_) => None,
        })
        .collect();
    let last = inputs.len().saturating_sub(1);

    let mut parameters = Vec::with_capacity(inputs.len());
    let mut bindings = Vec::with_capacity(inputs.len());
    for (index, typed) in inputs.into_iter().enumerate() {
        let name = match &*typed.pat {
            Pat::Ident(ident) if ident.subpat.is_none() && ident.by_ref.is_none() => {
                ident.ident.to_string()
            }
            _ => format!("arg{index}"),
        };
        let variadic = typed.attrs.iter().any(|attr| is_marker(attr, VARIADIC_ATTR))
            || (last_is_variadic && index == last);
        let mode = match (&*typed.ty, variadic) {
            (Type::Reference(reference), true) if reference.mutability.is_some() => {
                ParamMode::VariadicByReference
            }
            (_, true) => ParamMode::VariadicByValue,
            (Type::Reference(reference), false) if reference.mutability.is_some() => {
                ParamMode::ByReference
            }
            _ => ParamMode::ByValue,
        };
        let ty = replace_self(&typed.ty, target);
        parameters.push(ParameterDescriptor::new(name.clone(), mode, type_text(&ty)));
        bindings.push(name);
    }
    Ok((parameters, bindings))
}

fn classify_return(
    target: &str,
    method: &str,
    output: &ReturnType,
) -> Result<(ReturnMode, Option<String>), UnsupportedContract> {
    let ReturnType::Type(_, ty) = output else {
        return Ok((ReturnMode::Void, None));
    };
    if matches!(&**ty, Type::Tuple(tuple) if tuple.elems.is_empty()) {
        return Ok((ReturnMode::Void, None));
    }
    let mut scan = BorrowScan::default();
    scan.visit_type(ty);
    if scan.opaque {
        return Err(UnsupportedContract::opaque_return(
            method,
            "`impl Trait` cannot be named by the proxy",
        ));
    }
    let mode = if scan.borrows {
        ReturnMode::ByReference
    } else {
        ReturnMode::ByValue
    };
    Ok((mode, Some(type_text(&replace_self(ty, target)))))
}

/// Finds borrows (non-`'static` references or lifetimes) and `impl Trait`
#[derive(Default)]
struct BorrowScan {
    borrows: bool,
    opaque: bool,
}

impl<'ast> Visit<'ast> for BorrowScan {
    fn visit_type_reference(&mut self, reference: &'ast syn::TypeReference) {
        if reference.lifetime.is_none() {
            self.borrows = true;
        }
        syn::visit::visit_type_reference(self, reference);
    }

    fn visit_lifetime(&mut self, lifetime: &'ast syn::Lifetime) {
        if lifetime.ident != "static" {
            self.borrows = true;
        }
    }

    fn visit_type_impl_trait(&mut self, _: &'ast syn::TypeImplTrait) {
        self.opaque = true;
    }
}

/// Rewrites `Self` to the target's name
struct SelfReplacer<'a> {
    target: &'a syn::Ident,
}

impl VisitMut for SelfReplacer<'_> {
    fn visit_path_mut(&mut self, path: &mut syn::Path) {
        if let Some(first) = path.segments.first_mut() {
            if first.ident == "Self" {
                first.ident = self.target.clone();
            }
        }
        syn::visit_mut::visit_path_mut(self, path);
    }
}

fn replace_self(ty: &Type, target: &str) -> Type {
    let mut ty = ty.clone();
    let ident = syn::Ident::new(target, proc_macro2::Span::call_site());
    SelfReplacer { target: &ident }.visit_type_mut(&mut ty);
    ty
}

fn replace_self_generics(generics: &Generics, target: &str) -> Generics {
    let mut generics = generics.clone();
    let ident = syn::Ident::new(target, proc_macro2::Span::call_site());
    SelfReplacer { target: &ident }.visit_generics_mut(&mut generics);
    generics
}

fn is_self(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.qself.is_none() && path.path.is_ident("Self"))
}

fn is_target(target: &str, ty: &Type) -> bool {
    is_self(ty) || matches!(ty, Type::Path(path) if path.qself.is_none() && path.path.is_ident(target))
}

enum TargetReturn {
    Plain,
    Result(String),
    Other,
}

fn returns_target(target: &str, ty: &Type) -> TargetReturn {
    if is_target(target, ty) {
        return TargetReturn::Plain;
    }
    let Type::Path(path) = ty else {
        return TargetReturn::Other;
    };
    let Some(last) = path.path.segments.last() else {
        return TargetReturn::Other;
    };
    if last.ident != "Result" {
        return TargetReturn::Other;
    }
    let syn::PathArguments::AngleBracketed(arguments) = &last.arguments else {
        return TargetReturn::Other;
    };
    let mut types = arguments.args.iter().filter_map(|arg| match arg {
        syn::GenericArgument::Type(ty) => Some(ty),
        _ => None,
    });
    match (types.next(), types.next()) {
        (Some(ok), Some(error)) if is_target(target, ok) => {
            TargetReturn::Result(type_text(&replace_self(error, target)))
        }
        _ => TargetReturn::Other,
    }
}

fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    path.qself.is_none()
        && path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Option")
}

// `#[interpose(..)]` and `#[interpose_macros::interpose(..)]` alike
fn is_marker(attr: &Attribute, name: &str) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|segment| segment.ident == name)
}

fn derives(target: &str, attrs: &[Attribute], name: &str) -> Result<bool, UnsupportedContract> {
    let mut found = false;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("derive")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.segments.last().is_some_and(|segment| segment.ident == name) {
                found = true;
            }
            Ok(())
        })
        .map_err(|error| {
            UnsupportedContract::unsupported_type(target, format!("malformed derive list: {error}"))
        })?;
    }
    Ok(found)
}

#[derive(Default)]
struct MethodMarkers {
    dynamic_args: bool,
    variadic: bool,
}

impl MethodMarkers {
    fn parse(target: &str, method: &str, attrs: &[Attribute]) -> Result<Self, UnsupportedContract> {
        let mut markers = Self::default();
        for attr in attrs.iter().filter(|attr| is_marker(attr, INTERPOSE_ATTR)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("dynamic_args") {
                    markers.dynamic_args = true;
                    Ok(())
                } else if meta.path.is_ident("variadic") {
                    markers.variadic = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `dynamic_args` or `variadic`"))
                }
            })
            .map_err(|e| {
                UnsupportedContract::unsupported_type(target, format!("method `{method}`: {e}"))
            })?;
        }
        Ok(markers)
    }
}

#[derive(Default)]
struct FieldMarkers {
    read_only: bool,
    skip: bool,
}

impl FieldMarkers {
    fn parse(target: &str, attrs: &[Attribute]) -> Result<Self, UnsupportedContract> {
        let mut markers = Self::default();
        for attr in attrs.iter().filter(|attr| is_marker(attr, INTERPOSE_ATTR)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("read_only") {
                    markers.read_only = true;
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    markers.skip = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `read_only` or `skip`"))
                }
            })
            .map_err(|e| UnsupportedContract::unsupported_type(target, e.to_string()))?;
        }
        Ok(markers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use syn::parse_quote;

    fn counter_impl() -> ItemImpl {
        parse_quote! {
            impl Counter {
                pub fn new(start: i64) -> Self { Counter { counter: start } }
                pub fn try_open(path: &str) -> Result<Self, std::io::Error> { unimplemented!() }
                pub fn helper() -> usize { 1 }
                pub fn increment(&mut self, amount: i64) { self.counter += amount; }
                pub(crate) fn get(&self) -> i64 { self.counter }
                fn name(&self) -> &str { "c" }
                pub fn swap(&mut self, other: &mut i64) {}
                pub fn join(&mut self, first: String, #[variadic] rest: &mut [String]) -> String { first }
                #[interpose(dynamic_args)]
                pub fn raw(&self, declared: u8) -> Self { unimplemented!() }
            }
        }
    }

    #[test]
    fn classifies_members() {
        let extracted = extract_methods(&counter_impl()).unwrap();
        let names: Vec<_> = extracted.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["increment", "get", "name", "swap", "join", "raw"]);
        assert_eq!(extracted.constructors.len(), 2);
        assert_eq!(extracted.constructors[1].error_ty.as_deref(), Some("std::io::Error"));
        assert_eq!(extracted.skipped, ["helper"]);

        let get = &extracted.methods[1];
        assert_eq!(get.receiver, Receiver::Shared);
        assert_eq!(get.return_mode, ReturnMode::ByValue);
        assert_eq!(get.visibility, Visibility::Restricted);
        assert_eq!(extracted.syntax["get"].vis, "pub(crate)");

        let name = &extracted.methods[2];
        assert_eq!(name.return_mode, ReturnMode::ByReference);
        assert_eq!(name.visibility, Visibility::Private);
        assert_eq!(extracted.syntax["name"].vis, "");

        assert_eq!(extracted.methods[3].parameters[0].mode, ParamMode::ByReference);
        assert_eq!(extracted.methods[3].parameters[0].ty, "&mut i64");

        let join = &extracted.methods[4];
        assert_eq!(join.parameters[1].mode, ParamMode::VariadicByReference);
        assert_eq!(join.parameters[1].ty, "&mut [String]");

        let raw = &extracted.methods[5];
        assert!(!raw.forwardable);
        assert_eq!(raw.return_ty.as_deref(), Some("Counter"));
    }

    #[test]
    fn rejects_unforwardable_constructs() {
        let cases: Vec<ItemImpl> = vec![
            parse_quote!(impl T { pub async fn run(&self) {} }),
            parse_quote!(impl T { pub fn into_inner(self) -> u8 { 0 } }),
            parse_quote!(impl T { pub fn boxed(self: Box<Self>) {} }),
            parse_quote!(impl T { pub fn items(&self) -> impl Iterator<Item = u8> { None.into_iter() } }),
            parse_quote!(impl T { pub fn f(&self, #[variadic] rest: Vec<u8>, last: u8) {} }),
            parse_quote!(impl Display for T {}),
            parse_quote!(impl<U> T<U> {}),
        ];
        let errors: Vec<_> = cases.iter().map(|item| extract_methods(item).unwrap_err()).collect();
        assert_matches!(errors[0], UnsupportedContract::AsyncMethod { .. });
        assert_matches!(errors[1], UnsupportedContract::ConsumingReceiver { .. });
        assert_matches!(errors[2], UnsupportedContract::ConsumingReceiver { .. });
        assert_matches!(errors[3], UnsupportedContract::OpaqueReturn { .. });
        assert_matches!(errors[4], UnsupportedContract::MisplacedVariadic { .. });
        assert_matches!(errors[5], UnsupportedContract::UnsupportedType { .. });
        assert_matches!(errors[6], UnsupportedContract::UnsupportedType { .. });
    }

    #[test]
    fn static_references_are_values() {
        let item: ItemImpl = parse_quote! {
            impl T {
                pub fn label(&self) -> &'static str { "t" }
                pub fn parts(&self) -> Option<&str> { None }
                pub fn iter(&self) -> std::slice::Iter<'_, u8> { [].iter() }
            }
        };
        let modes: Vec<_> = extract_methods(&item)
            .unwrap()
            .methods
            .iter()
            .map(|m| m.return_mode)
            .collect();
        assert_eq!(modes, [ReturnMode::ByValue, ReturnMode::ByReference, ReturnMode::ByReference]);
    }

    #[test]
    fn explicit_receiver_forms_are_kept() {
        let item: ItemImpl = parse_quote! {
            impl T {
                pub fn first<'a>(&'a self, fallback: &'a str) -> &'a str { fallback }
                pub fn typed(self: &mut Self) {}
            }
        };
        let extracted = extract_methods(&item).unwrap();
        assert_eq!(extracted.syntax["first"].receiver.as_deref(), Some("&'a self"));
        assert_eq!(extracted.methods[0].generics.as_deref(), Some("<'a>"));
        assert_eq!(extracted.methods[1].receiver, Receiver::Exclusive);
    }

    #[test]
    fn properties_follow_field_declarations() {
        let item: ItemStruct = parse_quote! {
            #[derive(Debug, PropertyTable)]
            pub struct Account {
                pub owner: String,
                #[interpose(read_only)]
                pub id: u64,
                pub(crate) note: Option<String>,
                secret: Vec<u8>,
                #[interpose(skip)]
                cache: std::cell::Cell<u8>,
            }
        };
        let properties = extract_properties(&item).unwrap();
        assert_eq!(properties.len(), 4);
        assert_eq!(properties[1].access, PropertyAccess::READ_ONLY);
        assert!(properties[2].nullable);
        assert_eq!(properties[2].visibility, Visibility::Restricted);
        assert_eq!(properties[3].visibility, Visibility::Private);
        assert_eq!(properties[3].ty, "Vec<u8>");

        let contract = extract_contract(Some(&item), &[]).unwrap();
        assert!(contract.derives_property_table);

        let tuple: ItemStruct = parse_quote!(pub struct Pair(u8, u8););
        assert_matches!(extract_properties(&tuple), Err(UnsupportedContract::UnsupportedType { .. }));
    }

    #[test]
    fn malformed_derive_lists_are_reported() {
        let item: ItemStruct = parse_quote! {
            #[derive(Debug = 1)]
            pub struct Account { pub owner: String }
        };
        let error = extract_contract(Some(&item), &[]).unwrap_err();
        assert_matches!(
            error,
            UnsupportedContract::UnsupportedType { ref type_name, ref reason }
                if type_name == "Account" && reason.starts_with("malformed derive list")
        );
    }

    #[test]
    fn duplicates_across_impl_blocks_are_rejected() {
        let a: ItemImpl = parse_quote!(impl T { pub fn run(&self) {} });
        let b: ItemImpl = parse_quote!(impl T { pub fn run(&mut self) {} });
        assert_eq!(
            extract_contract(None, &[&a, &b]).unwrap_err(),
            UnsupportedContract::DuplicateMember { name: "run".into() }
        );
    }

    #[test]
    fn whole_files_collect_every_inherent_impl() {
        let file: syn::File = parse_quote! {
            pub struct Meter { pub reading: i64 }
            impl Meter { pub fn read(&self) -> i64 { self.reading } }
            impl std::fmt::Display for Meter {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { Ok(()) }
            }
            impl Meter { pub fn reset(&mut self) { self.reading = 0; } }
            impl Other { pub fn unrelated(&self) {} }
        };
        let extracted = extract_from_file(&file, "Meter").unwrap().unwrap();
        let names: Vec<_> = extracted.contract.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["read", "reset"]);
        assert_eq!(extracted.contract.properties.len(), 1);
        assert!(!extracted.derives_property_table);

        assert_eq!(extract_from_file(&file, "Missing").unwrap(), None);
    }

    #[test]
    fn markers_are_stripped() {
        let mut item = counter_impl();
        strip_markers(&mut item);
        let rendered = item.to_token_stream().to_string();
        assert!(!rendered.contains("variadic"));
        assert!(!rendered.contains("interpose"));
    }

    #[test]
    fn compact_rendering_parses_back() {
        let ty: Type = parse_quote!(std::collections::HashMap<String, Vec<&'static mut [u8]>>);
        let text = type_text(&ty);
        assert_eq!(text, "std::collections::HashMap<String, Vec<&'static mut [u8]>>");
        assert_eq!(syn::parse_str::<Type>(&text).unwrap(), ty);
    }
}
