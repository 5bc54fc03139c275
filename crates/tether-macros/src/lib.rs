//! Procedural macros for Tether lifetime-tracked receivers.
//!
//! This crate provides the `#[derive(Trackable)]` macro, which implements
//! `tether_core::AsTrackable` for a struct that embeds a `Trackable`.
//!
//! # Attributes
//!
//! ## `#[trackable]` on a field
//!
//! Selects the embedded `Trackable` field:
//!
//! ```ignore
//! #[derive(Trackable)]
//! struct Label {
//!     #[trackable]
//!     lifetime: Trackable,
//!     text: RefCell<String>,
//! }
//! ```
//!
//! Without the attribute, the field named `trackable` is used.
//!
//! ## `#[trackable(crate = path)]` on the struct
//!
//! Overrides the path to the core crate, for code that re-exports it:
//!
//! ```ignore
//! #[derive(Trackable)]
//! #[trackable(crate = my_toolkit::core)]
//! struct Button {
//!     trackable: my_toolkit::core::Trackable,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Field, Fields, Ident, Path, parse_macro_input};

/// Derive `AsTrackable` for a struct embedding a `Trackable`.
///
/// Connections made with `Signal::connect_receiver` or tracked with
/// `Connection::track` then disconnect when the struct is dropped.
///
/// # Example
///
/// ```ignore
/// use tether_core::{Signal, Trackable};
/// use tether_macros::Trackable;
///
/// #[derive(Trackable)]
/// struct Window {
///     trackable: Trackable,
///     title: String,
/// }
/// ```
#[proc_macro_derive(Trackable, attributes(trackable))]
pub fn derive_trackable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_trackable(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed struct-level trackable attributes.
struct TrackableAttrs {
    crate_path: Path,
}

fn impl_derive_trackable(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let attrs = parse_struct_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Trackable derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Trackable derive only supports structs",
            ));
        }
    };

    let field_name = find_trackable_field(input, fields.iter())?;
    let crate_path = &attrs.crate_path;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #crate_path::AsTrackable for #struct_name #ty_generics #where_clause {
            fn trackable(&self) -> &#crate_path::Trackable {
                #crate_path::AsTrackable::trackable(&self.#field_name)
            }
        }
    })
}

/// Parse struct-level #[trackable(...)] attributes.
fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<TrackableAttrs> {
    let mut result = TrackableAttrs {
        crate_path: syn::parse_quote!(::tether_core),
    };

    for attr in attrs {
        if !attr.path().is_ident("trackable") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                result.crate_path = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported trackable attribute; expected `crate = path`"))
            }
        })?;
    }

    Ok(result)
}

/// Pick the field marked `#[trackable]`, or else the one named `trackable`.
fn find_trackable_field<'a>(
    input: &DeriveInput,
    fields: impl Iterator<Item = &'a Field> + Clone,
) -> syn::Result<&'a Ident> {
    let mut marked = fields
        .clone()
        .filter(|field| field.attrs.iter().any(|attr| attr.path().is_ident("trackable")));

    if let Some(field) = marked.next() {
        if let Some(extra) = marked.next() {
            return Err(syn::Error::new_spanned(
                extra,
                "only one field may be marked #[trackable]",
            ));
        }
        for attr in &field.attrs {
            if attr.path().is_ident("trackable") {
                attr.meta.require_path_only()?;
            }
        }
        return field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"));
    }

    fields
        .filter_map(|field| field.ident.as_ref())
        .find(|ident| *ident == "trackable")
        .ok_or_else(|| {
            syn::Error::new_spanned(
                input,
                "Trackable derive requires a field marked #[trackable] or named `trackable`",
            )
        })
}
