//! Proxy type synthesis
//!
//! Turns an extracted contract into a [`ProxyTypeDescription`]: the plain,
//! serializable plan an [`crate::emit::EmitBackend`] needs to produce the
//! proxy type. Descriptions are shared through a [`ProxyRegistry`], one per
//! target and source fingerprint.

use std::sync::Arc;

use interpose_core::{Fingerprint, MethodDescriptor, Receiver, ReturnMode, TypeContract};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SynthesisError;
use crate::extract::{ExtractedContract, MemberSyntax};
use crate::registry::ProxyRegistry;

/// Per-type synthesis knobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Proxy type name; `<Target>Proxy` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Proxy type visibility as written; `pub` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vis: Option<String>,
    /// Implement `Clone` (needs `Target: Clone`)
    pub clone: bool,
    /// Implement `Serialize` and `Deserialize` (needs the target to)
    pub serde: bool,
    /// Implement `Debug` (needs `Target: Debug`)
    pub debug: bool,
    /// Implement `PartialEq` over wrapped values (needs `Target: PartialEq`)
    pub partial_eq: bool,
}

/// Which `Proxy::dispatch*` entry point a forwarding method uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    /// `&self`, owned return
    Shared,
    /// `&mut self`, owned return
    Exclusive,
    /// `&self`, borrowed return
    SharedBorrow,
    /// `&mut self`, borrowed return
    ExclusiveBorrow,
}

impl DispatchKind {
    /// Entry point for a method's receiver and return mode
    pub fn for_method(method: &MethodDescriptor) -> Self {
        match (method.receiver, method.return_mode) {
            (Receiver::Shared, ReturnMode::ByReference) => Self::SharedBorrow,
            (Receiver::Exclusive, ReturnMode::ByReference) => Self::ExclusiveBorrow,
            (Receiver::Shared, _) => Self::Shared,
            (Receiver::Exclusive, _) => Self::Exclusive,
        }
    }

    /// Name of the `Proxy` method to call
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Shared => "dispatch",
            Self::Exclusive => "dispatch_mut",
            Self::SharedBorrow => "dispatch_ref",
            Self::ExclusiveBorrow => "dispatch_ref_mut",
        }
    }

    /// Whether the entry point takes a return codec
    pub fn takes_codec(self) -> bool {
        matches!(self, Self::Shared | Self::Exclusive)
    }
}

/// How one method is forwarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingPlan {
    /// Target method
    pub method: String,
    /// Name of the `Result`-returning sibling
    pub try_name: String,
    /// Dispatch entry point
    pub dispatch: DispatchKind,
    /// Signature details
    pub syntax: MemberSyntax,
}

/// How one constructor is mirrored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorPlan {
    /// Target constructor
    pub constructor: String,
    /// Signature details
    pub syntax: MemberSyntax,
}

/// A documented fidelity gap of the generated proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limitation {
    /// Affected member
    pub member: String,
    /// What the proxy cannot do for it
    pub note: String,
}

/// Everything needed to emit one proxy type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTypeDescription {
    /// Target type name
    pub target: String,
    /// Generated type name
    pub proxy_name: String,
    /// Contract fingerprint
    pub fingerprint: Fingerprint,
    /// Fingerprint of all inputs, see [`ExtractedContract::source_fingerprint`]
    pub source_fingerprint: Fingerprint,
    /// Forwarded contract
    pub contract: TypeContract,
    /// One plan per method, in declaration order
    pub forwarding: Vec<ForwardingPlan>,
    /// One plan per constructor
    pub constructors: Vec<ConstructorPlan>,
    /// Options the description was built with
    pub options: SynthesisOptions,
    /// Known fidelity gaps
    pub limitations: Vec<Limitation>,
    /// The emitter must also implement `PropertyTable` for the target
    pub emit_property_table: bool,
}

impl ProxyTypeDescription {
    /// Forwarding plan of a method
    pub fn plan(&self, method: &str) -> Option<&ForwardingPlan> {
        self.forwarding.iter().find(|plan| plan.method == method)
    }

    /// Visibility of the proxy type as written
    pub fn proxy_vis(&self) -> &str {
        self.options.vis.as_deref().unwrap_or("pub")
    }

    /// Limitations affecting one member
    pub fn limitations_of<'a>(&'a self, member: &'a str) -> impl Iterator<Item = &'a Limitation> + 'a {
        self.limitations.iter().filter(move |l| l.member == member)
    }
}

/// Deterministic proxy name for a target
pub fn proxy_name(target: &str) -> String {
    format!("{target}Proxy")
}

/// Builds descriptions and shares them through a registry
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer<'r> {
    registry: &'r ProxyRegistry,
}

impl Synthesizer<'static> {
    /// Synthesizer backed by the process-wide registry
    pub fn global() -> Self {
        Self::new(ProxyRegistry::global())
    }
}

impl<'r> Synthesizer<'r> {
    /// Synthesizer backed by an injected registry
    pub fn new(registry: &'r ProxyRegistry) -> Self {
        Self { registry }
    }

    /// Description for a target, reused when the registry already holds one
    /// for the same source fingerprint and options
    pub fn synthesize(
        &self,
        extracted: &ExtractedContract,
        options: &SynthesisOptions,
    ) -> Result<Arc<ProxyTypeDescription>, SynthesisError> {
        extracted.contract.validate()?;
        self.registry.get_or_insert_with(
            &extracted.target_key(),
            extracted.source_fingerprint(),
            options,
            || describe(extracted, options),
        )
    }
}

/// Build a description without consulting any registry
pub fn describe(
    extracted: &ExtractedContract,
    options: &SynthesisOptions,
) -> Result<ProxyTypeDescription, SynthesisError> {
    let contract = &extracted.contract;
    contract.validate()?;

    let proxy_name = options
        .name
        .clone()
        .unwrap_or_else(|| proxy_name(&contract.type_name));
    if syn::parse_str::<syn::Ident>(&proxy_name).is_err() {
        return Err(SynthesisError::InvalidName { name: proxy_name });
    }
    if let Some(vis) = &options.vis {
        if syn::parse_str::<syn::Visibility>(vis).is_err() {
            return Err(SynthesisError::InvalidVisibility { vis: vis.clone() });
        }
    }

    let forwarding = contract
        .methods
        .iter()
        .map(|method| ForwardingPlan {
            method: method.name.clone(),
            try_name: format!("try_{}", method.name),
            dispatch: DispatchKind::for_method(method),
            syntax: extracted
                .syntax_of(&method.name)
                .cloned()
                .unwrap_or_else(|| MemberSyntax::for_method(method)),
        })
        .collect();
    let constructors = contract
        .constructors
        .iter()
        .map(|constructor| ConstructorPlan {
            constructor: constructor.name.clone(),
            syntax: extracted
                .syntax_of(&constructor.name)
                .cloned()
                .unwrap_or_else(|| MemberSyntax::for_constructor(constructor)),
        })
        .collect();

    let limitations = limitations(extracted);
    for limitation in limitations.iter().filter(|l| is_dynamic_args(contract, &l.member)) {
        warn!(
            type_name = %contract.type_name,
            member = %limitation.member,
            "{}",
            limitation.note
        );
    }

    let description = ProxyTypeDescription {
        target: contract.type_name.clone(),
        proxy_name,
        fingerprint: contract.fingerprint(),
        source_fingerprint: extracted.source_fingerprint(),
        contract: contract.clone(),
        forwarding,
        constructors,
        options: options.clone(),
        limitations,
        emit_property_table: !extracted.derives_property_table,
    };
    debug!(
        type_name = %description.target,
        proxy = %description.proxy_name,
        fingerprint = %description.fingerprint.short(),
        methods = description.forwarding.len(),
        constructors = description.constructors.len(),
        "synthesized proxy description"
    );
    Ok(description)
}

fn is_dynamic_args(contract: &TypeContract, member: &str) -> bool {
    contract.method(member).is_some_and(|m| !m.forwardable)
}

fn limitations(extracted: &ExtractedContract) -> Vec<Limitation> {
    let mut limitations = Vec::new();
    for method in &extracted.contract.methods {
        if !method.forwardable {
            limitations.push(Limitation {
                member: method.name.clone(),
                note: "reads arguments beyond its declared list; only declared parameters are forwarded"
                    .to_string(),
            });
        }
        if method.return_mode == ReturnMode::ByReference {
            limitations.push(Limitation {
                member: method.name.clone(),
                note: "returns a borrow of the wrapped value; hooks cannot replace the result"
                    .to_string(),
            });
        }
    }
    for skipped in &extracted.skipped {
        limitations.push(Limitation {
            member: skipped.clone(),
            note: "associated function without a receiver is not forwarded".to_string(),
        });
    }
    limitations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_contract;
    use assert_matches::assert_matches;
    use syn::{parse_quote, ItemImpl};

    fn extracted() -> ExtractedContract {
        let item: ItemImpl = parse_quote! {
            impl Base {
                pub fn new() -> Self { Base }
                pub fn m(&mut self) -> String { "X".into() }
                pub fn name(&self) -> &str { "base" }
                #[interpose(dynamic_args)]
                pub fn raw(&self, declared: u8) {}
                pub fn version() -> u32 { 1 }
            }
        };
        extract_contract(None, &[&item]).unwrap()
    }

    #[test]
    fn plans_follow_receiver_and_return_mode() {
        let description = describe(&extracted(), &SynthesisOptions::default()).unwrap();
        assert_eq!(description.proxy_name, "BaseProxy");
        assert_eq!(description.plan("m").unwrap().dispatch, DispatchKind::Exclusive);
        assert_eq!(description.plan("name").unwrap().dispatch, DispatchKind::SharedBorrow);
        assert_eq!(description.plan("raw").unwrap().dispatch, DispatchKind::Shared);
        assert_eq!(description.plan("m").unwrap().try_name, "try_m");
        assert_eq!(description.constructors.len(), 1);
        assert!(!description.emit_property_table);
    }

    #[test]
    fn limitations_are_listed() {
        let description = describe(&extracted(), &SynthesisOptions::default()).unwrap();
        let members: Vec<_> = description.limitations.iter().map(|l| l.member.as_str()).collect();
        assert_eq!(members, ["name", "raw", "version"]);
        assert_eq!(description.limitations_of("raw").count(), 1);
    }

    #[test]
    fn options_are_validated() {
        let bad_name = SynthesisOptions {
            name: Some("not a name".into()),
            ..SynthesisOptions::default()
        };
        assert_matches!(describe(&extracted(), &bad_name), Err(SynthesisError::InvalidName { .. }));

        let bad_vis = SynthesisOptions {
            vis: Some("public".into()),
            ..SynthesisOptions::default()
        };
        assert_matches!(describe(&extracted(), &bad_vis), Err(SynthesisError::InvalidVisibility { .. }));
    }

    #[test]
    fn source_fingerprint_tracks_what_the_contract_does_not() {
        let crate_wide: ItemImpl = parse_quote!(impl Base { pub(crate) fn m(&self) {} });
        let parent_only: ItemImpl = parse_quote!(impl Base { pub(super) fn m(&self) {} });
        let a = extract_contract(None, &[&crate_wide]).unwrap();
        let b = extract_contract(None, &[&parent_only]).unwrap();
        assert_eq!(a.contract.fingerprint(), b.contract.fingerprint());
        assert_ne!(a.source_fingerprint(), b.source_fingerprint());

        let mut underived = a.clone();
        underived.derives_property_table = false;
        assert_ne!(a.source_fingerprint(), underived.source_fingerprint());
        assert_eq!(a.source_fingerprint(), a.clone().with_origin("src/base.rs").source_fingerprint());

        let description = describe(&underived, &SynthesisOptions::default()).unwrap();
        assert_eq!(description.source_fingerprint, underived.source_fingerprint());
        assert_eq!(description.fingerprint, a.contract.fingerprint());
    }

    #[test]
    fn descriptions_serialize() {
        let description = describe(&extracted(), &SynthesisOptions::default()).unwrap();
        let json = serde_json::to_string(&description).unwrap();
        let back: ProxyTypeDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(back, description);
    }
}
