//! # Interpose Codegen - proxy synthesis
//!
//! Build-time half of interpose. Works on `syn` syntax trees and produces
//! `proc_macro2` tokens, so the same pipeline serves the `#[proxy]`
//! attribute and `build.rs` generation:
//!
//! 1. [`extract`]: target struct and inherent impls to a [`TypeContract`]
//!    plus signature details, rejecting what cannot be forwarded,
//! 2. [`synthesize`]: contract to a serializable [`ProxyTypeDescription`],
//!    shared through a [`ProxyRegistry`] keyed by target and fingerprint,
//! 3. [`emit`]: description to Rust items through an [`EmitBackend`].
//!
//! [`Generator`] drives all three from a [`GeneratorConfig`], with an
//! optional on-disk [`DescriptionCache`].
//!
//! [`TypeContract`]: interpose_core::TypeContract

pub mod cache;
pub mod config;
pub mod emit;
pub mod error;
pub mod extract;
pub mod generator;
pub mod registry;
pub mod synthesize;

pub use cache::DescriptionCache;
pub use config::{GeneratorConfig, TargetConfig};
pub use emit::{emit_property_table, EmitBackend, TokenBackend, DEFAULT_RUNTIME_PATH};
pub use error::{CacheError, ConfigError, EmitError, GeneratorError, SynthesisError};
pub use extract::{
    extract_contract, extract_from_file, extract_methods, extract_properties, strip_markers,
    ExtractedContract, MemberSyntax,
};
pub use generator::{GeneratedFile, Generator};
pub use registry::{ProxyRegistry, TargetKey};
pub use synthesize::{
    describe, proxy_name, ConstructorPlan, DispatchKind, ForwardingPlan, Limitation,
    ProxyTypeDescription, SynthesisOptions, Synthesizer,
};
