//! Attribute argument parsing

use interpose_codegen::{SynthesisOptions, DEFAULT_RUNTIME_PATH};
use proc_macro2::TokenStream as TokenStream2;
use syn::meta::ParseNestedMeta;
use syn::parse::Parser;
use syn::{Attribute, LitStr, Result};

/// Options accepted by `#[proxy(..)]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProxyArgs {
    pub synthesis: SynthesisOptions,
    pub runtime: String,
}

impl Default for ProxyArgs {
    fn default() -> Self {
        Self {
            synthesis: SynthesisOptions::default(),
            runtime: DEFAULT_RUNTIME_PATH.to_string(),
        }
    }
}

impl ProxyArgs {
    pub(crate) fn parse(args: TokenStream2) -> Result<Self> {
        let mut parsed = Self::default();
        let parser = syn::meta::parser(|meta| {
            let options = &mut parsed.synthesis;
            if meta.path.is_ident("clone") {
                options.clone = true;
            } else if meta.path.is_ident("serde") {
                options.serde = true;
            } else if meta.path.is_ident("debug") {
                options.debug = true;
            } else if meta.path.is_ident("partial_eq") {
                options.partial_eq = true;
            } else if meta.path.is_ident("name") {
                options.name = Some(string_value(&meta)?.value());
            } else if meta.path.is_ident("vis") {
                options.vis = Some(string_value(&meta)?.value());
            } else if meta.path.is_ident("crate") {
                parsed.runtime = runtime_path(&meta)?;
            } else {
                return Err(meta.error(
                    "expected one of `clone`, `serde`, `debug`, `partial_eq`, `name`, `vis`, `crate`",
                ));
            }
            Ok(())
        });
        parser.parse2(args)?;
        Ok(parsed)
    }
}

/// Runtime path from a struct-level `#[interpose(crate = "..")]`
pub(crate) fn struct_runtime_path(attrs: &[Attribute]) -> Result<String> {
    let mut runtime = DEFAULT_RUNTIME_PATH.to_string();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("interpose")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                runtime = runtime_path(&meta)?;
                Ok(())
            } else {
                Err(meta.error("expected `crate = \"path\"`"))
            }
        })?;
    }
    Ok(runtime)
}

/// Arguments of the pass-through `#[interpose(..)]` method marker
pub(crate) fn check_method_markers(args: TokenStream2) -> Result<()> {
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("variadic") || meta.path.is_ident("dynamic_args") {
            Ok(())
        } else {
            Err(meta.error("expected `variadic` or `dynamic_args`"))
        }
    });
    parser.parse2(args)
}

fn string_value(meta: &ParseNestedMeta<'_>) -> Result<LitStr> {
    meta.value()?.parse()
}

fn runtime_path(meta: &ParseNestedMeta<'_>) -> Result<String> {
    let literal = string_value(meta)?;
    literal.parse::<syn::Path>()?;
    Ok(literal.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn flags_and_values() {
        let args = ProxyArgs::parse(quote!(clone, debug, name = "Guarded", vis = "pub(crate)")).unwrap();
        assert!(args.synthesis.clone);
        assert!(args.synthesis.debug);
        assert!(!args.synthesis.serde);
        assert_eq!(args.synthesis.name.as_deref(), Some("Guarded"));
        assert_eq!(args.synthesis.vis.as_deref(), Some("pub(crate)"));
        assert_eq!(args.runtime, DEFAULT_RUNTIME_PATH);
    }

    #[test]
    fn empty_arguments_use_defaults() {
        assert_eq!(ProxyArgs::parse(TokenStream2::new()).unwrap(), ProxyArgs::default());
    }

    #[test]
    fn runtime_path_must_parse() {
        let args = ProxyArgs::parse(quote!(crate = "my_app::interpose")).unwrap();
        assert_eq!(args.runtime, "my_app::interpose");
        assert!(ProxyArgs::parse(quote!(crate = "not a path")).is_err());
    }

    #[test]
    fn unknown_options_are_rejected() {
        let error = ProxyArgs::parse(quote!(copy)).unwrap_err();
        assert!(error.to_string().contains("expected one of"));
        assert!(check_method_markers(quote!(variadic)).is_ok());
        assert!(check_method_markers(quote!(lazy)).is_err());
    }
}
