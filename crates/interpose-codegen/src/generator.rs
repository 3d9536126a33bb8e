//! Build-script proxy generation
//!
//! [`Generator`] reads each configured target's source file, extracts its
//! contract, synthesizes (or loads from the cache) a description, and writes
//! the emitted proxy next to other build outputs. The generated file is
//! meant to be `include!`d in the module that declares the target:
//!
//! ```ignore
//! // build.rs
//! fn main() {
//!     let config = interpose_codegen::GeneratorConfig::default()
//!         .with_target(interpose_codegen::TargetConfig::new("src/meter.rs", "Meter"));
//!     interpose_codegen::Generator::new(config).and_then(|g| g.generate()).unwrap();
//! }
//!
//! // src/meter.rs
//! include!(concat!(env!("OUT_DIR"), "/meter_proxy.rs"));
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use interpose_core::Fingerprint;
use tracing::{debug, info, trace, warn};

use crate::cache::DescriptionCache;
use crate::config::{GeneratorConfig, TargetConfig};
use crate::emit::{EmitBackend, TokenBackend};
use crate::error::{ConfigError, GeneratorError};
use crate::extract::extract_from_file;
use crate::registry::ProxyRegistry;
use crate::synthesize::{describe, Limitation, ProxyTypeDescription};

/// Result of generating one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Target type
    pub type_name: String,
    /// Generated proxy type
    pub proxy_name: String,
    /// Written file
    pub path: PathBuf,
    /// Contract fingerprint
    pub fingerprint: Fingerprint,
    /// The description came from the on-disk cache
    pub from_cache: bool,
    /// The file content changed on this run
    pub written: bool,
    /// Fidelity gaps of the generated proxy
    pub limitations: Vec<Limitation>,
}

/// Generates proxy source files for configured targets
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    backend: TokenBackend,
    cache: Option<DescriptionCache>,
    registry: ProxyRegistry,
}

impl Generator {
    /// Generator for a validated configuration
    pub fn new(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        config.validate()?;
        let backend = TokenBackend::with_runtime_path(&config.runtime_path)?;
        let cache = config.cache_dir.as_ref().map(DescriptionCache::new);
        Ok(Self {
            config,
            backend,
            cache,
            registry: ProxyRegistry::new(),
        })
    }

    /// Generator for a TOML file, with environment overrides applied
    pub fn from_config_file(path: &Path) -> Result<Self, GeneratorError> {
        let mut config = GeneratorConfig::load_from_file(path)?;
        config.merge_with_env()?;
        Self::new(config)
    }

    /// Active configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Descriptions synthesized by this generator
    pub fn registry(&self) -> &ProxyRegistry {
        &self.registry
    }

    /// Output directory: configured, else `$OUT_DIR`
    pub fn out_dir(&self) -> Result<PathBuf, GeneratorError> {
        match &self.config.out_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::var_os("OUT_DIR").map(PathBuf::from).ok_or_else(|| {
                ConfigError::invalid("out_dir", "not configured and OUT_DIR is not set").into()
            }),
        }
    }

    /// Generate every configured target
    pub fn generate(&self) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let out_dir = self.out_dir()?;
        fs::create_dir_all(&out_dir).map_err(|source| GeneratorError::Io {
            path: out_dir.clone(),
            source,
        })?;
        self.config
            .targets
            .iter()
            .map(|target| self.generate_target(target, &out_dir))
            .collect()
    }

    /// Generate one target into `out_dir`
    pub fn generate_target(&self, target: &TargetConfig, out_dir: &Path) -> Result<GeneratedFile, GeneratorError> {
        if self.config.rerun_if_changed {
            println!("cargo:rerun-if-changed={}", target.source.display());
        }
        let source = fs::read_to_string(&target.source).map_err(|source| GeneratorError::Io {
            path: target.source.clone(),
            source,
        })?;
        let (description, from_cache) = self.describe_source(target, &source)?;
        let text = self.render(&description)?;

        let path = out_dir.join(target.output_file());
        let written = write_if_changed(&path, &text)?;
        info!(
            type_name = %description.target,
            proxy = %description.proxy_name,
            path = %path.display(),
            from_cache,
            written,
            "generated proxy"
        );
        Ok(GeneratedFile {
            type_name: description.target.clone(),
            proxy_name: description.proxy_name.clone(),
            path,
            fingerprint: description.fingerprint,
            from_cache,
            written,
            limitations: description.limitations.clone(),
        })
    }

    /// Description of a target declared in `source`, and whether it came
    /// from the cache
    pub fn describe_source(
        &self,
        target: &TargetConfig,
        source: &str,
    ) -> Result<(Arc<ProxyTypeDescription>, bool), GeneratorError> {
        let file = syn::parse_file(source).map_err(|source| GeneratorError::Parse {
            path: target.source.clone(),
            source,
        })?;
        let extracted = extract_from_file(&file, &target.type_name)?
            .ok_or_else(|| GeneratorError::TargetNotFound {
                type_name: target.type_name.clone(),
                path: target.source.clone(),
            })?
            .with_origin(target.source.display().to_string());
        for skipped in &extracted.skipped {
            trace!(type_name = %target.type_name, member = %skipped, "associated function is not forwarded");
        }

        let source_fingerprint = extracted.source_fingerprint();
        let mut from_cache = false;
        let description = self.registry.get_or_insert_with(
            &extracted.target_key(),
            source_fingerprint,
            &target.options,
            || -> Result<ProxyTypeDescription, GeneratorError> {
                if let Some(cache) = &self.cache {
                    if let Some(cached) = cache.load(&target.type_name, source_fingerprint, &target.options)? {
                        from_cache = true;
                        return Ok(cached);
                    }
                }
                let description = describe(&extracted, &target.options)?;
                if let Some(cache) = &self.cache {
                    // a cache that cannot be written only costs a rebuild
                    if let Err(error) = cache.store(&description) {
                        warn!(%error, "failed to cache proxy description");
                    }
                }
                Ok(description)
            },
        )?;
        Ok((description, from_cache))
    }

    /// Source text of a generated file
    pub fn render(&self, description: &ProxyTypeDescription) -> Result<String, GeneratorError> {
        let tokens = self.backend.emit(description)?;
        let mut text = format!(
            "// Generated by interpose-codegen for `{}` (contract {}). Do not edit.\n",
            description.target,
            description.fingerprint.short()
        );
        for limitation in &description.limitations {
            text.push_str(&format!("// limitation: `{}` {}\n", limitation.member, limitation.note));
        }
        text.push_str(&tokens.to_string());
        text.push('\n');
        Ok(text)
    }
}

fn write_if_changed(path: &Path, text: &str) -> Result<bool, GeneratorError> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == text) {
        debug!(path = %path.display(), "generated proxy unchanged");
        return Ok(false);
    }
    fs::write(path, text).map_err(|source| GeneratorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}
