//! Generator configuration
//!
//! A [`GeneratorConfig`] lists the targets a build script generates proxies
//! for. It is read from TOML, layered with `INTERPOSE_*` environment
//! variables, and validated before use:
//!
//! ```toml
//! out_dir = "target/interpose"
//! cache_dir = "target/interpose-cache"
//!
//! [[targets]]
//! source = "src/account.rs"
//! type_name = "Account"
//! clone = true
//! serde = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::emit::DEFAULT_RUNTIME_PATH;
use crate::error::ConfigError;
use crate::synthesize::SynthesisOptions;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "INTERPOSE_";

/// One type to generate a proxy for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Source file declaring the type and its inherent impls
    pub source: PathBuf,
    /// Name of the struct
    pub type_name: String,
    /// Output file name; `<type>_proxy.rs` in snake case when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Per-type synthesis options
    #[serde(flatten)]
    pub options: SynthesisOptions,
}

impl TargetConfig {
    /// Target with default options
    pub fn new(source: impl Into<PathBuf>, type_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            type_name: type_name.into(),
            output: None,
            options: SynthesisOptions::default(),
        }
    }

    /// Builder form for synthesis options
    pub fn with_options(mut self, options: SynthesisOptions) -> Self {
        self.options = options;
        self
    }

    /// Output file name
    pub fn output_file(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| format!("{}_proxy.rs", snake_case(&self.type_name)))
    }
}

/// Build-script generator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Where generated files go; `$OUT_DIR` when unset
    pub out_dir: Option<PathBuf>,
    /// Description cache directory; no caching when unset
    pub cache_dir: Option<PathBuf>,
    /// Path of the runtime crate in generated code
    pub runtime_path: String,
    /// Emit `cargo:rerun-if-changed` lines for target sources
    pub rerun_if_changed: bool,
    /// Types to generate
    pub targets: Vec<TargetConfig>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            out_dir: None,
            cache_dir: None,
            runtime_path: DEFAULT_RUNTIME_PATH.to_string(),
            rerun_if_changed: true,
            targets: Vec::new(),
        }
    }
}

impl GeneratorConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Builder form for adding a target
    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.targets.push(target);
        self
    }

    /// Apply `INTERPOSE_OUT_DIR`, `INTERPOSE_CACHE_DIR`,
    /// `INTERPOSE_RUNTIME_PATH` and `INTERPOSE_RERUN_IF_CHANGED`
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `INTERPOSE_*` overrides from an explicit variable list
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(key) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_lowercase();
            if matches!(key.as_str(), "out_dir" | "cache_dir" | "runtime_path" | "rerun_if_changed") {
                self.set_from_string(&key, value.as_ref())?;
            }
        }
        Ok(())
    }

    /// Overlay another configuration: its set values win, targets append
    pub fn merge_with(&mut self, other: &Self) {
        if other.out_dir.is_some() {
            self.out_dir = other.out_dir.clone();
        }
        if other.cache_dir.is_some() {
            self.cache_dir = other.cache_dir.clone();
        }
        if other.runtime_path != DEFAULT_RUNTIME_PATH {
            self.runtime_path = other.runtime_path.clone();
        }
        self.rerun_if_changed &= other.rerun_if_changed;
        self.targets.extend(other.targets.iter().cloned());
    }

    /// Set one top-level key from its string form
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "out_dir" => self.out_dir = Some(PathBuf::from(value)),
            "cache_dir" => self.cache_dir = Some(PathBuf::from(value)),
            "runtime_path" => self.runtime_path = value.to_string(),
            "rerun_if_changed" => {
                self.rerun_if_changed = value
                    .parse()
                    .map_err(|_| ConfigError::invalid(key, format!("`{value}` is not a boolean")))?
            }
            _ => return Err(ConfigError::invalid(key, "unknown configuration key")),
        }
        Ok(())
    }

    /// Check paths, names and uniqueness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if syn::parse_str::<syn::Path>(&self.runtime_path).is_err() {
            return Err(ConfigError::invalid(
                "runtime_path",
                format!("`{}` is not a Rust path", self.runtime_path),
            ));
        }
        let mut names = std::collections::HashSet::new();
        let mut outputs = std::collections::HashSet::new();
        for target in &self.targets {
            if syn::parse_str::<syn::Ident>(&target.type_name).is_err() {
                return Err(ConfigError::invalid(
                    "targets.type_name",
                    format!("`{}` is not a Rust identifier", target.type_name),
                ));
            }
            if target.source.as_os_str().is_empty() {
                return Err(ConfigError::invalid(
                    "targets.source",
                    format!("no source file for `{}`", target.type_name),
                ));
            }
            if !names.insert(target.type_name.as_str()) {
                return Err(ConfigError::invalid(
                    "targets.type_name",
                    format!("`{}` is listed twice", target.type_name),
                ));
            }
            if !outputs.insert(target.output_file()) {
                return Err(ConfigError::invalid(
                    "targets.output",
                    format!("`{}` is written by two targets", target.output_file()),
                ));
            }
        }
        Ok(())
    }
}

/// `AccountHolder` to `account_holder`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if previous_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            previous_lower = false;
        } else {
            out.push(ch);
            previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = r#"
        cache_dir = "cache"

        [[targets]]
        source = "src/account.rs"
        type_name = "AccountHolder"
        clone = true
        name = "Guarded"

        [[targets]]
        source = "src/meter.rs"
        type_name = "Meter"
        output = "meter.rs"
    "#;

    #[test]
    fn parses_targets_with_flattened_options() {
        let config = GeneratorConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.runtime_path, DEFAULT_RUNTIME_PATH);
        assert_eq!(config.targets.len(), 2);
        assert!(config.targets[0].options.clone);
        assert_eq!(config.targets[0].options.name.as_deref(), Some("Guarded"));
        assert_eq!(config.targets[0].output_file(), "account_holder_proxy.rs");
        assert_eq!(config.targets[1].output_file(), "meter.rs");
        config.validate().unwrap();
    }

    #[test]
    fn environment_overrides_top_level_keys() {
        let mut config = GeneratorConfig::from_toml_str(SAMPLE).unwrap();
        config
            .merge_with_vars([
                ("INTERPOSE_OUT_DIR", "gen"),
                ("INTERPOSE_RERUN_IF_CHANGED", "false"),
                ("INTERPOSE_UNRELATED_THING", "x"),
                ("PATH", "/bin"),
            ])
            .unwrap();
        assert_eq!(config.out_dir.as_deref(), Some(Path::new("gen")));
        assert!(!config.rerun_if_changed);

        let error = config.merge_with_vars([("INTERPOSE_RERUN_IF_CHANGED", "sometimes")]);
        assert_matches!(error, Err(ConfigError::Invalid { .. }));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let duplicate = GeneratorConfig::default()
            .with_target(TargetConfig::new("a.rs", "Meter"))
            .with_target(TargetConfig::new("b.rs", "Meter"));
        assert_matches!(duplicate.validate(), Err(ConfigError::Invalid { .. }));

        let bad_name = GeneratorConfig::default().with_target(TargetConfig::new("a.rs", "not-a-type"));
        assert_matches!(bad_name.validate(), Err(ConfigError::Invalid { .. }));

        let bad_path = GeneratorConfig {
            runtime_path: "::".into(),
            ..GeneratorConfig::default()
        };
        assert_matches!(bad_path.validate(), Err(ConfigError::Invalid { .. }));

        assert_matches!(GeneratorConfig::from_toml_str("targets = 3"), Err(ConfigError::Parse(_)));
    }

    #[test]
    fn merge_appends_targets() {
        let mut base = GeneratorConfig::default().with_target(TargetConfig::new("a.rs", "A"));
        let overlay = GeneratorConfig {
            cache_dir: Some("c".into()),
            ..GeneratorConfig::default()
        }
        .with_target(TargetConfig::new("b.rs", "B"));
        base.merge_with(&overlay);
        assert_eq!(base.targets.len(), 2);
        assert_eq!(base.cache_dir.as_deref(), Some(Path::new("c")));
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(snake_case("Meter"), "meter");
        assert_eq!(snake_case("AccountHolder"), "account_holder");
        assert_eq!(snake_case("Http2Client"), "http2_client");
    }
}
