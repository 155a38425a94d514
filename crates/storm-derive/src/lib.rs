//! Derive macro for storm entities.
//!
//! This crate provides `#[derive(Entity)]`, which maps a struct holding a
//! `storm_orm::Record` onto a table or collection.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, LitStr, Token, Type};

/// Derives the `Entity` trait for a struct.
///
/// The struct must have exactly one field of type `Record`; every other
/// field is filled with `Default::default()` when an entity is loaded.
///
/// # Attributes
///
/// - `#[entity(table = "posts")]` - Table or collection name (optional,
///   defaults to the lower-cased struct name)
/// - `#[entity(primary_key = "id")]` - Single key field (optional, defaults
///   to `_id`)
/// - `#[entity(primary_key("org", "user"))]` - Compound key; a single name
///   is the same as `primary_key = "..."`
/// - `#[entity(json_fields("tags", "settings"))]` - Fields stored as JSON
///   text
/// - `#[entity(modified = "modified_on")]` - Field stamped with the server
///   time on every update
/// - `#[entity(hooks)]` - Skip the empty `EntityHooks` impl so the struct can
///   provide its own
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_entity_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_entity_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let attrs = parse_entity_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity derive only supports structs",
            ));
        }
    };

    let mut record_field: Option<&Ident> = None;
    let mut other_fields: Vec<&Ident> = Vec::new();
    for field in fields {
        let Some(name) = field.ident.as_ref() else {
            continue;
        };
        if is_record_type(&field.ty) {
            if record_field.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "Entity derive expects exactly one `Record` field",
                ));
            }
            record_field = Some(name);
        } else {
            other_fields.push(name);
        }
    }
    let record_field = record_field.ok_or_else(|| {
        syn::Error::new_spanned(&input, "Entity derive requires a field of type `Record`")
    })?;

    let type_name = struct_name.to_string();

    let table_fn = attrs.table.map(|table| {
        quote! {
            fn table() -> ::std::string::String {
                ::std::string::String::from(#table)
            }
        }
    });

    let primary_key_fn = match attrs.primary_key {
        Some(PrimaryKeyAttr::Simple(name)) => Some(quote! {
            fn primary_key() -> ::storm_orm::PrimaryKey {
                ::storm_orm::PrimaryKey::simple(#name)
            }
        }),
        Some(PrimaryKeyAttr::Compound(names)) => Some(quote! {
            fn primary_key() -> ::storm_orm::PrimaryKey {
                ::storm_orm::PrimaryKey::compound([#(#names),*])
            }
        }),
        None => None,
    };

    let json_fields_fn = (!attrs.json_fields.is_empty()).then(|| {
        let names = &attrs.json_fields;
        quote! {
            fn json_fields() -> &'static [&'static str] {
                &[#(#names),*]
            }
        }
    });

    let modified_fn = attrs.modified.map(|name| {
        quote! {
            fn modified_field() -> ::std::option::Option<&'static str> {
                ::std::option::Option::Some(#name)
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let hooks_impl = (!attrs.custom_hooks).then(|| {
        quote! {
            impl #impl_generics ::storm_orm::EntityHooks for #struct_name #ty_generics #where_clause {}
        }
    });

    let expanded = quote! {
        impl #impl_generics ::storm_orm::Entity for #struct_name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;

            #table_fn
            #primary_key_fn
            #json_fields_fn
            #modified_fn

            fn from_record(record: ::storm_orm::Record) -> Self {
                Self {
                    #record_field: record,
                    #(#other_fields: ::std::default::Default::default(),)*
                }
            }

            fn record(&self) -> &::storm_orm::Record {
                &self.#record_field
            }

            fn record_mut(&mut self) -> &mut ::storm_orm::Record {
                &mut self.#record_field
            }
        }

        #hooks_impl
    };

    Ok(expanded)
}

enum PrimaryKeyAttr {
    Simple(String),
    Compound(Vec<String>),
}

#[derive(Default)]
struct EntityAttrs {
    table: Option<String>,
    primary_key: Option<PrimaryKeyAttr>,
    json_fields: Vec<String>,
    modified: Option<String>,
    custom_hooks: bool,
}

fn parse_entity_attrs(attrs: &[Attribute]) -> syn::Result<EntityAttrs> {
    let mut result = EntityAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                result.table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("primary_key") {
                result.primary_key = Some(if meta.input.peek(Token![=]) {
                    PrimaryKeyAttr::Simple(meta.value()?.parse::<LitStr>()?.value())
                } else {
                    let mut names = parse_string_list(&meta)?;
                    match names.len() {
                        0 => return Err(meta.error("primary_key needs at least one field")),
                        1 => PrimaryKeyAttr::Simple(names.remove(0)),
                        _ => PrimaryKeyAttr::Compound(names),
                    }
                });
            } else if meta.path.is_ident("json_fields") {
                result.json_fields.extend(parse_string_list(&meta)?);
            } else if meta.path.is_ident("modified") {
                result.modified = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("hooks") {
                result.custom_hooks = true;
            } else {
                return Err(meta.error("unsupported entity attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

/// Parses `name("a", "b", ...)`.
fn parse_string_list(meta: &ParseNestedMeta<'_>) -> syn::Result<Vec<String>> {
    let content;
    syn::parenthesized!(content in meta.input);
    let list = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
    Ok(list.iter().map(LitStr::value).collect())
}

fn is_record_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Record"),
        _ => false,
    }
}
