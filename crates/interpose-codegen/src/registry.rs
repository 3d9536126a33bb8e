//! Registry of synthesized proxy descriptions
//!
//! Holds at most one description per [`TargetKey`]. A request with the same
//! source fingerprint and options gets the shared description back; a
//! changed fingerprint replaces the entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use interpose_core::Fingerprint;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::synthesize::{ProxyTypeDescription, SynthesisOptions};

static GLOBAL: Lazy<ProxyRegistry> = Lazy::new(ProxyRegistry::new);

/// Identity of a target in a registry.
///
/// A placed key names where the target is declared, so a later description
/// for the same place replaces the earlier one. Without a known place the
/// key includes the source fingerprint: same-named targets from different
/// modules then coexist, at the cost of keeping one entry per revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    type_name: String,
    place: Place,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Place {
    Origin(String),
    Unplaced(Fingerprint),
}

impl TargetKey {
    /// Target declared at `origin` (source file or module path)
    pub fn new(origin: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            place: Place::Origin(origin.into()),
        }
    }

    /// Target whose declaring module is unknown
    pub fn unplaced(type_name: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            type_name: type_name.into(),
            place: Place::Unplaced(fingerprint),
        }
    }

    /// Target type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declaring place, when known
    pub fn origin(&self) -> Option<&str> {
        match &self.place {
            Place::Origin(origin) => Some(origin),
            Place::Unplaced(_) => None,
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.place {
            Place::Origin(origin) => write!(f, "{origin}::{}", self.type_name),
            Place::Unplaced(fingerprint) => write!(f, "{}@{}", self.type_name, fingerprint.short()),
        }
    }
}

/// Target key to its current description
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    entries: RwLock<HashMap<TargetKey, Arc<ProxyTypeDescription>>>,
}

impl ProxyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static ProxyRegistry {
        &GLOBAL
    }

    /// Current description of a target
    pub fn get(&self, key: &TargetKey) -> Option<Arc<ProxyTypeDescription>> {
        self.entries.read().get(key).cloned()
    }

    /// Shared description for `(key, source fingerprint, options)`, building
    /// it with `build` when missing or stale.
    ///
    /// `build` runs without the lock held; if another caller registered a
    /// matching description meanwhile, theirs is kept.
    pub fn get_or_insert_with<E>(
        &self,
        key: &TargetKey,
        source: Fingerprint,
        options: &SynthesisOptions,
        build: impl FnOnce() -> Result<ProxyTypeDescription, E>,
    ) -> Result<Arc<ProxyTypeDescription>, E> {
        if let Some(existing) = self.fresh(key, source, options) {
            debug!(target_key = %key, source = %source.short(), "reusing proxy description");
            return Ok(existing);
        }

        let built = Arc::new(build()?);
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(key) {
            if matches(existing, source, options) {
                return Ok(Arc::clone(existing));
            }
            info!(
                target_key = %key,
                previous = %existing.source_fingerprint.short(),
                current = %source.short(),
                "source or options changed; replacing proxy description"
            );
        }
        entries.insert(key.clone(), Arc::clone(&built));
        Ok(built)
    }

    /// Register a description built elsewhere (e.g. loaded from a cache),
    /// returning the one it replaces
    pub fn insert(&self, key: TargetKey, description: ProxyTypeDescription) -> Option<Arc<ProxyTypeDescription>> {
        self.entries.write().insert(key, Arc::new(description))
    }

    /// Drop a target's description
    pub fn remove(&self, key: &TargetKey) -> Option<Arc<ProxyTypeDescription>> {
        self.entries.write().remove(key)
    }

    /// Number of registered targets
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every description
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn fresh(
        &self,
        key: &TargetKey,
        source: Fingerprint,
        options: &SynthesisOptions,
    ) -> Option<Arc<ProxyTypeDescription>> {
        self.entries
            .read()
            .get(key)
            .filter(|existing| matches(existing, source, options))
            .cloned()
    }
}

fn matches(description: &ProxyTypeDescription, source: Fingerprint, options: &SynthesisOptions) -> bool {
    description.source_fingerprint == source && description.options == *options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_contract;
    use crate::synthesize::Synthesizer;
    use syn::{parse_quote, ItemImpl};

    fn extracted(body: ItemImpl) -> crate::extract::ExtractedContract {
        extract_contract(None, &[&body]).unwrap()
    }

    #[test]
    fn same_contract_shares_one_description() {
        let registry = ProxyRegistry::new();
        let synthesizer = Synthesizer::new(&registry);
        let contract = extracted(parse_quote!(impl Base { pub fn m(&self) -> String { String::new() } }));

        let first = synthesizer.synthesize(&contract, &SynthesisOptions::default()).unwrap();
        let second = synthesizer.synthesize(&contract, &SynthesisOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn changed_fingerprint_replaces_entry() {
        let registry = ProxyRegistry::new();
        let synthesizer = Synthesizer::new(&registry);
        let before = extracted(parse_quote!(impl Base { pub fn m(&self) -> String { String::new() } }))
            .with_origin("src/base.rs");
        let after = extracted(parse_quote!(impl Base { pub fn m(&self, n: u8) -> String { String::new() } }))
            .with_origin("src/base.rs");

        let first = synthesizer.synthesize(&before, &SynthesisOptions::default()).unwrap();
        let second = synthesizer.synthesize(&after, &SynthesisOptions::default()).unwrap();
        assert_ne!(first.fingerprint, second.fingerprint);
        let key = TargetKey::new("src/base.rs", "Base");
        assert_eq!(registry.get(&key).unwrap().fingerprint, second.fingerprint);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_named_targets_from_different_modules_coexist() {
        let registry = ProxyRegistry::new();
        let synthesizer = Synthesizer::new(&registry);
        let reader = extracted(parse_quote!(impl Base { pub fn m(&self) -> String { String::new() } }));
        let writer = extracted(parse_quote!(impl Base { pub fn set(&mut self, n: u8) {} }));

        let first = synthesizer.synthesize(&reader, &SynthesisOptions::default()).unwrap();
        synthesizer.synthesize(&writer, &SynthesisOptions::default()).unwrap();
        let again = synthesizer.synthesize(&reader, &SynthesisOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.len(), 2);

        let a = synthesizer
            .synthesize(&reader.clone().with_origin("crate::a"), &SynthesisOptions::default())
            .unwrap();
        let b = synthesizer
            .synthesize(&writer.clone().with_origin("crate::b"), &SynthesisOptions::default())
            .unwrap();
        assert_eq!(registry.get(&TargetKey::new("crate::a", "Base")), Some(a));
        assert_eq!(registry.get(&TargetKey::new("crate::b", "Base")), Some(b));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn keys_render_their_place() {
        let fingerprint = Fingerprint::from_bytes([0xab; 32]);
        assert_eq!(TargetKey::new("src/a.rs", "Base").to_string(), "src/a.rs::Base");
        assert_eq!(TargetKey::unplaced("Base", fingerprint).to_string(), "Base@abababababababab");
        assert_eq!(TargetKey::unplaced("Base", fingerprint).origin(), None);
    }

    #[test]
    fn changed_options_rebuild() {
        let registry = ProxyRegistry::new();
        let synthesizer = Synthesizer::new(&registry);
        let contract = extracted(parse_quote!(impl Base { pub fn m(&self) {} }));

        let plain = synthesizer.synthesize(&contract, &SynthesisOptions::default()).unwrap();
        let cloned = SynthesisOptions {
            clone: true,
            ..SynthesisOptions::default()
        };
        let with_clone = synthesizer.synthesize(&contract, &cloned).unwrap();
        assert!(!Arc::ptr_eq(&plain, &with_clone));
        assert!(with_clone.options.clone);
    }

    #[test]
    fn failed_builds_leave_registry_untouched() {
        let registry = ProxyRegistry::new();
        let result: Result<_, &str> = registry.get_or_insert_with(
            &TargetKey::new("src/base.rs", "Base"),
            Fingerprint::from_bytes([0; 32]),
            &SynthesisOptions::default(),
            || Err("refused"),
        );
        assert_eq!(result.unwrap_err(), "refused");
        assert!(registry.is_empty());
    }
}
