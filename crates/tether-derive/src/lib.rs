//! Tether derive macros: concrete fragment types without boilerplate.
//!
//! A concrete fragment type wraps a `tether::Fragment` (or another concrete
//! fragment type) and opts into capability traits. `#[derive(Fragment)]`
//! writes the `AsFragment` impl and one empty impl per requested capability.
//!
//! # Example
//!
//! ```ignore
//! use tether::prelude::*;
//! use tether::mock::MockDriver;
//!
//! #[derive(Fragment)]
//! #[tether(capabilities(clickable, texted))]
//! struct SaveButton {
//!     #[tether(root)]
//!     root: Fragment<MockDriver>,
//!     label: String,
//! }
//!
//! #[derive(Fragment)]
//! #[tether(name = "orders", capabilities(countable))]
//! struct OrderRows<D: Driver>(Fragment<D>);
//! ```
//!
//! # Attributes
//!
//! - `#[tether(capabilities(...))]` on the type: any of `clickable`,
//!   `texted`, `countable`, `typeable`, `displayed`, `attributed`
//! - `#[tether(name = "...")]` on the type: name returned by the generated
//!   `fragment_name()` (defaults to the snake_case type name)
//! - `#[tether(root)]` on one field: the fragment to delegate to (defaults to
//!   the first field)

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Fields, Ident, Index, LitStr,
    Member, Type,
};

/// Capability names accepted in `#[tether(capabilities(...))]`, with the
/// trait each one implements
const CAPABILITIES: &[(&str, &str)] = &[
    ("clickable", "Clickable"),
    ("texted", "Texted"),
    ("countable", "Countable"),
    ("typeable", "Typeable"),
    ("displayed", "Displayed"),
    ("attributed", "Attributed"),
];

/// Derive `AsFragment` plus the requested capability traits.
///
/// See the crate docs for the accepted attributes.
#[proc_macro_derive(Fragment, attributes(tether))]
pub fn derive_fragment(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_fragment(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Debug, Default)]
struct TypeOptions {
    name: Option<String>,
    capabilities: Vec<Ident>,
}

fn expand_fragment(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let options = parse_type_options(&input.attrs)?;
    let (member, root_ty) = find_root(input)?;

    let fragment_name = options
        .name
        .unwrap_or_else(|| to_snake_case(&name.to_string()));

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let mut bounded = where_clause.cloned().unwrap_or_else(|| parse_quote!(where));
    if !input.generics.params.is_empty() {
        bounded
            .predicates
            .push(parse_quote!(#root_ty: ::tether::AsFragment));
    }

    let capability_impls = options.capabilities.iter().map(|capability| {
        quote! {
            impl #impl_generics ::tether::#capability for #name #ty_generics #bounded {}
        }
    });

    Ok(quote! {
        impl #impl_generics ::tether::AsFragment for #name #ty_generics #bounded {
            type Driver = <#root_ty as ::tether::AsFragment>::Driver;

            fn fragment(&self) -> &::tether::Fragment<Self::Driver> {
                ::tether::AsFragment::fragment(&self.#member)
            }
        }

        #(#capability_impls)*

        impl #impl_generics #name #ty_generics #where_clause {
            /// Name of this fragment type, for logs and reports
            #[inline]
            pub const fn fragment_name() -> &'static str {
                #fragment_name
            }
        }
    })
}

/// Parse `#[tether(name = "...", capabilities(...))]` on the type
fn parse_type_options(attrs: &[Attribute]) -> syn::Result<TypeOptions> {
    let mut options = TypeOptions::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("tether")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                options.name = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("capabilities") {
                meta.parse_nested_meta(|capability| {
                    let ident = capability
                        .path
                        .get_ident()
                        .ok_or_else(|| capability.error("expected a capability name"))?;
                    let trait_ident = capability_trait(ident)?;
                    if !options.capabilities.contains(&trait_ident) {
                        options.capabilities.push(trait_ident);
                    }
                    Ok(())
                })
            } else {
                Err(meta.error("unsupported tether attribute; expected `name` or `capabilities`"))
            }
        })?;
    }
    Ok(options)
}

/// Map a capability name to its trait
fn capability_trait(ident: &Ident) -> syn::Result<Ident> {
    let wanted = ident.to_string();
    CAPABILITIES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, trait_name)| format_ident!("{}", trait_name, span = ident.span()))
        .ok_or_else(|| {
            let known: Vec<&str> = CAPABILITIES.iter().map(|(name, _)| *name).collect();
            syn::Error::new_spanned(
                ident,
                format!("unknown capability `{wanted}`; expected one of {}", known.join(", ")),
            )
        })
}

fn is_root_field(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut root = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("tether")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("root") {
                root = true;
                Ok(())
            } else {
                Err(meta.error("unsupported tether field attribute; expected `root`"))
            }
        })?;
    }
    Ok(root)
}

/// Find the field to delegate to: the one marked `#[tether(root)]`, else the
/// first field
fn find_root(input: &DeriveInput) -> syn::Result<(Member, Type)> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "#[derive(Fragment)] only supports structs",
        ));
    };

    let members: Vec<(Member, &syn::Field)> = match &data.fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .filter_map(|f| f.ident.clone().map(|i| (Member::Named(i), f)))
            .collect(),
        Fields::Unnamed(fields) => fields
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, f)| (Member::Unnamed(Index::from(i)), f))
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let mut marked = Vec::new();
    for (member, field) in &members {
        if is_root_field(&field.attrs)? {
            marked.push((member.clone(), field.ty.clone()));
        }
    }

    match marked.len() {
        0 => members
            .first()
            .map(|(member, field)| (member.clone(), field.ty.clone()))
            .ok_or_else(|| {
                syn::Error::new_spanned(
                    &input.ident,
                    "#[derive(Fragment)] needs a field holding the fragment",
                )
            }),
        1 => Ok(marked.remove(0)),
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            "only one field may be marked #[tether(root)]",
        )),
    }
}

/// Convert PascalCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            result.push(c);
            prev_lower = true;
        }
    }

    result
}
