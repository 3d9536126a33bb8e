//! Structural contract of a proxied type
//!
//! A [`TypeContract`] lists what a proxy must forward: instance methods with
//! their parameter and return modes, constructors, and named fields
//! (properties). Contracts are produced at build time by the extractor in
//! `interpose-codegen` and embedded into generated code, so every type here
//! is plain data with a serde representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnsupportedContract;
use crate::property::{AccessScope, PropertyOp};

/// Member names taken by the generated proxy's own API.
///
/// A target member with one of these names would be shadowed by, or clash
/// with, the proxy's inherent methods.
pub const RESERVED_NAMES: &[&str] = &[
    "from_existing",
    "with_interceptors",
    "id",
    "as_proxy",
    "into_wrapped_value",
    "wrapped_value",
    "wrapped_value_mut",
    "set_prefix_interceptor",
    "set_suffix_interceptor",
    "remove_prefix_interceptor",
    "remove_suffix_interceptor",
    "clear_interceptors",
    "get_property",
    "set_property",
    "has_property",
    "unset_property",
    "property_mut",
    "friend",
];

/// How a parameter is handed to the real method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    /// Moved or copied into the call (shared references included)
    ByValue,
    /// `&mut` alias of the caller's storage
    ByReference,
    /// Trailing `#[variadic]` sequence passed by value
    VariadicByValue,
    /// Trailing `#[variadic]` sequence passed as `&mut [T]`
    VariadicByReference,
}

impl ParamMode {
    /// Whether the parameter collects the trailing arguments
    pub fn is_variadic(self) -> bool {
        matches!(self, Self::VariadicByValue | Self::VariadicByReference)
    }

    /// Whether the real call sees the caller's storage
    pub fn is_by_reference(self) -> bool {
        matches!(self, Self::ByReference | Self::VariadicByReference)
    }

    /// Stable identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ByValue => "by_value",
            Self::ByReference => "by_reference",
            Self::VariadicByValue => "variadic_by_value",
            Self::VariadicByReference => "variadic_by_reference",
        }
    }
}

/// How a method hands its result back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// Owned value
    ByValue,
    /// Borrow of the wrapped value's storage
    ByReference,
    /// No value
    Void,
}

impl ReturnMode {
    /// Stable identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ByValue => "by_value",
            Self::ByReference => "by_reference",
            Self::Void => "void",
        }
    }
}

/// Receiver of an instance method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    /// `&self`
    Shared,
    /// `&mut self`
    Exclusive,
}

impl Receiver {
    /// Stable identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        }
    }
}

/// Declared visibility of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// `pub`
    Public,
    /// `pub(crate)`, `pub(super)`, `pub(in path)`
    Restricted,
    /// Inherited visibility, declaring module only
    Private,
}

impl Visibility {
    /// Whether code outside the declaring scope may reach the member
    pub fn is_public(self) -> bool {
        self == Self::Public
    }

    /// Stable identifier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Restricted => "restricted",
            Self::Private => "private",
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Binding name, used as the key in hook parameter maps
    pub name: String,
    /// Passing mode
    pub mode: ParamMode,
    /// Rust type as source text
    pub ty: String,
}

impl ParameterDescriptor {
    /// Describe a parameter
    pub fn new(name: impl Into<String>, mode: ParamMode, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode,
            ty: ty.into(),
        }
    }
}

/// One forwarded instance method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name, unique within the type
    pub name: String,
    /// Receiver kind
    pub receiver: Receiver,
    /// Declared parameters in order
    pub parameters: Vec<ParameterDescriptor>,
    /// Return mode
    pub return_mode: ReturnMode,
    /// Return type as source text, `None` for void methods
    pub return_ty: Option<String>,
    /// Method-level generic parameters as source text (`<U: Serialize>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generics: Option<String>,
    /// Method-level where clause as source text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    /// Declared visibility
    pub visibility: Visibility,
    /// False for methods that read arguments beyond their declared list;
    /// those only receive the declared subset through a proxy
    pub forwardable: bool,
}

impl MethodDescriptor {
    /// Describe a public void method with no parameters
    pub fn new(name: impl Into<String>, receiver: Receiver) -> Self {
        Self {
            name: name.into(),
            receiver,
            parameters: Vec::new(),
            return_mode: ReturnMode::Void,
            return_ty: None,
            generics: None,
            where_clause: None,
            visibility: Visibility::Public,
            forwardable: true,
        }
    }

    /// Append a parameter
    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the return mode and type
    pub fn returning(mut self, mode: ReturnMode, ty: impl Into<String>) -> Self {
        self.return_mode = mode;
        self.return_ty = match mode {
            ReturnMode::Void => None,
            ReturnMode::ByValue | ReturnMode::ByReference => Some(ty.into()),
        };
        self
    }

    /// Set method-level generics and where clause
    pub fn with_generics(mut self, generics: Option<String>, where_clause: Option<String>) -> Self {
        self.generics = generics;
        self.where_clause = where_clause;
        self
    }

    /// Set the declared visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Flag the method as reading arguments beyond its declared list
    pub fn non_forwardable(mut self) -> Self {
        self.forwardable = false;
        self
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check the per-method invariants
    pub fn validate(&self) -> Result<(), UnsupportedContract> {
        let last = self.parameters.len().saturating_sub(1);
        let mut variadics = self
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.mode.is_variadic());
        if let Some((index, parameter)) = variadics.next() {
            if index != last {
                return Err(UnsupportedContract::MisplacedVariadic {
                    method: self.name.clone(),
                    parameter: parameter.name.clone(),
                });
            }
        }
        if let Some((_, parameter)) = variadics.next() {
            return Err(UnsupportedContract::MisplacedVariadic {
                method: self.name.clone(),
                parameter: parameter.name.clone(),
            });
        }
        Ok(())
    }
}

/// An associated function returning a new target instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstructorDescriptor {
    /// Function name
    pub name: String,
    /// Declared parameters
    pub parameters: Vec<ParameterDescriptor>,
    /// Declared visibility
    pub visibility: Visibility,
    /// Error type as source text when the constructor returns `Result<Self, E>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_ty: Option<String>,
}

impl ConstructorDescriptor {
    /// Describe an infallible public constructor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            visibility: Visibility::Public,
            error_ty: None,
        }
    }

    /// Append a parameter
    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the declared visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Mark the constructor as returning `Result<Self, error_ty>`
    pub fn fallible(mut self, error_ty: impl Into<String>) -> Self {
        self.error_ty = Some(error_ty.into());
        self
    }
}

/// Read/write permissions of a property from outside its declaring scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyAccess {
    /// Readable
    pub read: bool,
    /// Writable
    pub write: bool,
}

impl PropertyAccess {
    /// Readable and writable
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };

    /// Readable only
    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
    };
}

/// One named field of the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Field name
    pub name: String,
    /// Field type as source text
    pub ty: String,
    /// Declared visibility
    pub visibility: Visibility,
    /// Access permissions
    pub access: PropertyAccess,
    /// `Option` field, the only kind that can be unset
    pub nullable: bool,
}

impl PropertyDescriptor {
    /// Describe a read/write, non-nullable field
    pub fn new(name: impl Into<String>, ty: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            visibility,
            access: PropertyAccess::READ_WRITE,
            nullable: false,
        }
    }

    /// Set access permissions
    pub fn with_access(mut self, access: PropertyAccess) -> Self {
        self.access = access;
        self
    }

    /// Mark as nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Whether a caller in `scope` may reach this field.
    ///
    /// Friend scope is code inside the declaring module, which Rust already
    /// lets see every field.
    pub fn accessible_from(&self, scope: AccessScope) -> bool {
        match scope {
            AccessScope::Public => self.visibility.is_public(),
            AccessScope::Friend => true,
        }
    }
}

/// Everything a proxy forwards for one target type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeContract {
    /// Target type name
    pub type_name: String,
    /// Instance methods
    pub methods: Vec<MethodDescriptor>,
    /// Constructors
    #[serde(default)]
    pub constructors: Vec<ConstructorDescriptor>,
    /// Named fields
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl TypeContract {
    /// Start an empty contract
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            methods: Vec::new(),
            constructors: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Add a method
    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a constructor
    pub fn with_constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Add a property
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Add several properties
    pub fn with_properties(mut self, properties: impl IntoIterator<Item = PropertyDescriptor>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Look up a method
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Look up a property
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Whether hooks can be registered under `name`: a declared method or
    /// one of the property access operations
    pub fn is_interceptable(&self, name: &str) -> bool {
        self.method(name).is_some() || PropertyOp::from_method_name(name).is_some()
    }

    /// Methods that only see their declared parameters through a proxy
    pub fn non_forwardable(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.iter().filter(|m| !m.forwardable)
    }

    /// Check the whole-contract invariants: unique member names, no
    /// collision with the proxy API, variadics last
    pub fn validate(&self) -> Result<(), UnsupportedContract> {
        let mut seen = std::collections::HashSet::new();
        let members = self
            .methods
            .iter()
            .map(|m| m.name.as_str())
            .chain(self.constructors.iter().map(|c| c.name.as_str()));
        for name in members {
            if !seen.insert(name) {
                return Err(UnsupportedContract::DuplicateMember {
                    name: name.to_string(),
                });
            }
            if RESERVED_NAMES.contains(&name) {
                return Err(UnsupportedContract::ReservedName {
                    name: name.to_string(),
                });
            }
        }
        // every method also gets a `try_` sibling on the proxy
        for method in &self.methods {
            let sibling = format!("try_{}", method.name);
            if seen.contains(sibling.as_str()) {
                return Err(UnsupportedContract::ReservedName { name: sibling });
            }
            method.validate()?;
        }
        let mut properties = std::collections::HashSet::new();
        for property in &self.properties {
            if !properties.insert(property.name.as_str()) {
                return Err(UnsupportedContract::DuplicateMember {
                    name: property.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Stable hash over the descriptor lists
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        feed(&mut hasher, &self.type_name);
        for method in &self.methods {
            feed(&mut hasher, "method");
            feed(&mut hasher, &method.name);
            feed(&mut hasher, method.receiver.as_str());
            for parameter in &method.parameters {
                feed(&mut hasher, &parameter.name);
                feed(&mut hasher, parameter.mode.as_str());
                feed(&mut hasher, &parameter.ty);
            }
            feed(&mut hasher, method.return_mode.as_str());
            feed(&mut hasher, method.return_ty.as_deref().unwrap_or(""));
            feed(&mut hasher, method.generics.as_deref().unwrap_or(""));
            feed(&mut hasher, method.where_clause.as_deref().unwrap_or(""));
            feed(&mut hasher, method.visibility.as_str());
            feed(&mut hasher, if method.forwardable { "fwd" } else { "nofwd" });
        }
        for constructor in &self.constructors {
            feed(&mut hasher, "constructor");
            feed(&mut hasher, &constructor.name);
            for parameter in &constructor.parameters {
                feed(&mut hasher, &parameter.name);
                feed(&mut hasher, parameter.mode.as_str());
                feed(&mut hasher, &parameter.ty);
            }
            feed(&mut hasher, constructor.visibility.as_str());
            feed(&mut hasher, constructor.error_ty.as_deref().unwrap_or(""));
        }
        for property in &self.properties {
            feed(&mut hasher, "property");
            feed(&mut hasher, &property.name);
            feed(&mut hasher, &property.ty);
            feed(&mut hasher, property.visibility.as_str());
            feed(&mut hasher, if property.access.read { "r" } else { "-" });
            feed(&mut hasher, if property.access.write { "w" } else { "-" });
            feed(&mut hasher, if property.nullable { "?" } else { "!" });
        }
        Fingerprint(*hasher.finalize().as_bytes())
    }
}

// length-prefixed so adjacent fields cannot run together
fn feed(hasher: &mut blake3::Hasher, text: &str) {
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

/// blake3 hash of a contract, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap raw hash bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight bytes as hex, used in generated identifiers and file names
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Malformed fingerprint text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fingerprint `{0}`")]
pub struct FingerprintParseError(String);

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| FingerprintParseError(s.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FingerprintParseError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
