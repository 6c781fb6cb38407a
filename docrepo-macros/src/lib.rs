//! Procedural macros for the docrepo project.
//!
//! Provides `#[derive(Entity)]`, which implements `docrepo::entity::Entity` for a struct
//! embedding an `EntityHeader`.
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
//! #[entity(collection = "catalog")]
//! pub struct Product {
//!     #[serde(skip)]
//!     pub header: EntityHeader,
//!     pub name: String,
//! }
//! ```
//!
//! The header field is the one typed `EntityHeader`, or the one marked `#[entity(header)]`
//! when the type is aliased.

#[allow(unused_extern_crates)]
extern crate self as docrepo_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DataStruct, DeriveInput, Field, Fields, Ident, LitStr, Type,
    parse_macro_input, punctuated::Punctuated, token::Comma,
};

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_entity(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(DataStruct { fields: Fields::Named(fields), .. }) => &fields.named,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Entity can only be derived for structs with named fields",
            ));
        }
    };

    let header = header_field(name, fields)?;
    let collection_name = container_collection(&input.attrs)?.map(|collection| {
        quote! {
            fn collection_name() -> ::std::string::String {
                ::std::string::String::from(#collection)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::docrepo::entity::Entity for #name #ty_generics #where_clause {
            fn header(&self) -> &::docrepo::entity::EntityHeader {
                &self.#header
            }

            fn header_mut(&mut self) -> &mut ::docrepo::entity::EntityHeader {
                &mut self.#header
            }

            #collection_name
        }
    })
}

/// Reads `#[entity(collection = "...")]` from the struct attributes.
fn container_collection(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut collection = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("collection name must not be empty"));
                }
                collection = Some(value);
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute, expected `collection = \"...\"`"))
            }
        })?;
    }

    Ok(collection)
}

fn is_marked_header(field: &Field) -> syn::Result<bool> {
    let mut marked = false;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("header") {
                marked = true;
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute, expected `header`"))
            }
        })?;
    }

    Ok(marked)
}

fn is_header_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "EntityHeader"),
        _ => false,
    }
}

fn header_field<'a>(name: &Ident, fields: &'a Punctuated<Field, Comma>) -> syn::Result<&'a Ident> {
    let mut marked = Vec::new();
    for field in fields {
        if is_marked_header(field)? {
            marked.push(field);
        }
    }

    let candidates = if marked.is_empty() {
        fields
            .iter()
            .filter(|field| is_header_type(&field.ty))
            .collect::<Vec<_>>()
    } else {
        marked
    };

    match candidates.as_slice() {
        [field] => field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "header field must be named")),
        [] => Err(syn::Error::new_spanned(
            name,
            "Entity requires a field of type `EntityHeader` or one marked `#[entity(header)]`",
        )),
        [_, second, ..] => Err(syn::Error::new_spanned(
            second,
            "Entity allows exactly one header field, mark the intended one with `#[entity(header)]`",
        )),
    }
}
