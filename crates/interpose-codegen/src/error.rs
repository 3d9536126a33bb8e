//! Errors raised while synthesizing, emitting, caching and generating proxies

use std::path::PathBuf;

use interpose_core::UnsupportedContract;

/// Synthesis was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// The target's contract cannot be forwarded faithfully
    #[error(transparent)]
    Unsupported(#[from] UnsupportedContract),

    /// The requested proxy name is not a Rust identifier
    #[error("`{name}` is not a valid proxy type name")]
    InvalidName {
        /// Requested name
        name: String,
    },

    /// The requested proxy visibility does not parse
    #[error("`{vis}` is not a valid visibility")]
    InvalidVisibility {
        /// Requested visibility
        vis: String,
    },
}

/// A description could not be turned into tokens
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// Source text stored in the description does not parse
    #[error("cannot parse {what} `{text}` of `{member}`: {reason}")]
    Parse {
        /// Member whose syntax is broken
        member: String,
        /// Kind of syntax (type, generics, visibility, ...)
        what: &'static str,
        /// Offending text
        text: String,
        /// Parser message
        reason: String,
    },
}

impl EmitError {
    /// Create a parse error
    pub fn parse(member: &str, what: &'static str, text: &str, error: syn::Error) -> Self {
        Self::Parse {
            member: member.to_string(),
            what,
            text: text.to_string(),
            reason: error.to_string(),
        }
    }
}

/// On-disk description cache failure
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem access failed
    #[error("cache I/O on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A description could not be encoded for storage
    #[error("cannot encode cache entry {path}: {source}")]
    Encode {
        /// Cache file
        path: PathBuf,
        /// Encoder error
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid generator configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read config file {path}: {reason}")]
    Read {
        /// Config file
        path: PathBuf,
        /// I/O message
        reason: String,
    },

    /// Configuration text is not valid TOML for the config schema
    #[error("invalid config: {0}")]
    Parse(String),

    /// A value is out of range or inconsistent
    #[error("invalid config value for `{key}`: {reason}")]
    Invalid {
        /// Config key
        key: String,
        /// What is wrong
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Build-script generation failure
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Target source could not be read or written
    #[error("I/O on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Target source does not parse
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Source file
        path: PathBuf,
        /// Parser error
        #[source]
        source: syn::Error,
    },

    /// The named type is not declared in the source file
    #[error("struct `{type_name}` not found in {path}")]
    TargetNotFound {
        /// Requested type
        type_name: String,
        /// Source file
        path: PathBuf,
    },

    /// Synthesis refused the target
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Emission failed
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// Cache access failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<UnsupportedContract> for GeneratorError {
    fn from(error: UnsupportedContract) -> Self {
        Self::Synthesis(SynthesisError::Unsupported(error))
    }
}
