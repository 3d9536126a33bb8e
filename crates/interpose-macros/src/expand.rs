//! Macro expansion on `proc_macro2` tokens

use interpose_codegen::{
    emit_property_table, extract_contract, extract_properties, strip_markers, EmitBackend,
    SynthesisError, Synthesizer, TokenBackend,
};
use interpose_core::UnsupportedContract;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{quote, ToTokens};
use syn::{ImplItem, ItemImpl, ItemStruct, Result};

use crate::args::{struct_runtime_path, ProxyArgs};

/// `#[proxy]`: the impl block without markers, followed by the proxy type
pub(crate) fn proxy(args: TokenStream2, item: TokenStream2) -> Result<TokenStream2> {
    let args = ProxyArgs::parse(args)?;
    let mut item: ItemImpl = syn::parse2(item)?;

    let extracted = extract_contract(None, &[&item]).map_err(|e| unsupported(&item, e))?;
    let description = Synthesizer::global()
        .synthesize(&extracted, &args.synthesis)
        .map_err(|e| match e {
            SynthesisError::Unsupported(inner) => unsupported(&item, inner),
            other => syn::Error::new(Span::call_site(), other),
        })?;
    let backend = TokenBackend::with_runtime_path(&args.runtime)
        .map_err(|e| syn::Error::new(Span::call_site(), e))?;
    let generated = backend
        .emit(&description)
        .map_err(|e| syn::Error::new_spanned(&item.self_ty, e))?;

    strip_markers(&mut item);
    Ok(quote! {
        #item
        #generated
    })
}

/// `#[derive(PropertyTable)]`
pub(crate) fn property_table(item: ItemStruct) -> Result<TokenStream2> {
    let runtime = struct_runtime_path(&item.attrs)?;
    let runtime: syn::Path = syn::parse_str(&runtime)?;
    let properties = extract_properties(&item).map_err(|e| syn::Error::new_spanned(&item.ident, e))?;
    emit_property_table(&item.ident.to_string(), &properties, &runtime)
        .map_err(|e| syn::Error::new_spanned(&item.ident, e))
}

// point at the offending member when the error names one
fn unsupported(item: &ItemImpl, error: UnsupportedContract) -> syn::Error {
    let member = match &error {
        UnsupportedContract::AsyncMethod { method }
        | UnsupportedContract::ConsumingReceiver { method }
        | UnsupportedContract::MisplacedVariadic { method, .. }
        | UnsupportedContract::CVariadic { method }
        | UnsupportedContract::OpaqueReturn { method, .. } => Some(method),
        UnsupportedContract::ReservedName { name } | UnsupportedContract::DuplicateMember { name } => {
            Some(name)
        }
        UnsupportedContract::UnsupportedType { .. } => None,
    };
    let signature = member.and_then(|member| {
        item.items.iter().rev().find_map(|entry| match entry {
            ImplItem::Fn(function) if function.sig.ident == member => Some(function.sig.to_token_stream()),
            _ => None,
        })
    });
    match signature {
        Some(tokens) => syn::Error::new_spanned(tokens, error),
        None => syn::Error::new_spanned(&item.self_ty, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::{Item, ItemImpl};

    fn expand(args: TokenStream2, item: TokenStream2) -> syn::File {
        syn::parse2(proxy(args, item).unwrap()).unwrap()
    }

    #[test]
    fn keeps_the_impl_block_and_adds_the_proxy() {
        let file = expand(
            quote!(name = "Tally"),
            quote! {
                impl Counter {
                    pub fn new() -> Self { Counter { total: 0 } }
                    pub fn add(&mut self, first: i64, #[variadic] rest: Vec<i64>) -> i64 {
                        self.total += first + rest.iter().sum::<i64>();
                        self.total
                    }
                }
            },
        );

        let Some(Item::Impl(original)) = file.items.first() else {
            panic!("impl block must come first");
        };
        let rendered = original.to_token_stream().to_string();
        assert!(!rendered.contains("variadic"));

        let declares_proxy = file
            .items
            .iter()
            .any(|item| matches!(item, Item::Struct(s) if s.ident == "Tally"));
        assert!(declares_proxy);
    }

    #[test]
    fn rejection_points_at_the_member() {
        let item: ItemImpl = syn::parse_quote! {
            impl Counter {
                pub fn ok(&self) {}
                pub async fn fetch(&self) -> i64 { 0 }
            }
        };
        let error = proxy(TokenStream2::new(), item.to_token_stream()).unwrap_err();
        assert!(error.to_string().contains("`fetch` is async"));

        let error = proxy(TokenStream2::new(), quote!(impl Display for Counter {})).unwrap_err();
        assert!(error.to_string().contains("only inherent impl blocks"));
    }

    #[test]
    fn invalid_names_are_reported() {
        let error = proxy(quote!(name = "two words"), quote!(impl Counter {})).unwrap_err();
        assert!(error.to_string().contains("not a valid proxy type name"));
    }

    #[test]
    fn derive_emits_a_property_table() {
        let item: ItemStruct = syn::parse_quote! {
            #[interpose(crate = "crate::rt")]
            pub struct Meter {
                pub reading: i64,
                #[interpose(skip)]
                cache: Vec<u8>,
            }
        };
        let tokens = property_table(item).unwrap().to_string();
        assert!(tokens.contains("crate :: rt :: PropertyTable for Meter"));
        assert!(tokens.contains("\"reading\""));
        assert!(!tokens.contains("\"cache\""));

        let tuple: ItemStruct = syn::parse_quote!(pub struct Pair(u8, u8););
        assert!(property_table(tuple).is_err());
    }
}
