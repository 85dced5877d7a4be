//! Derive macros for `FieldCrypt`.
//!
//! `#[derive(Encryptable)]` implements `fieldcrypt::schema::Encryptable` for
//! structs with named fields, turning `#[encrypt(...)]` field attributes into
//! the field handle table the engine walks.

#![warn(clippy::pedantic, clippy::nursery)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, Data, DeriveInput, Field, Fields, GenericArgument,
    Ident, LitStr, PathArguments, Type,
};

/// Derive macro for field encryption.
///
/// Mark each protected field with `#[encrypt]`. Options:
///
/// - `lazy`: skipped by eager decryption
/// - `searchable`: maintain a blind index in the sibling `<field>_blind_id`
/// - `algorithm = "..."`: content mechanism type (default `AES-GCM`)
/// - `blind_id_algorithm = "..."`: blind index mechanism (default `HMAC-SHA256`)
/// - `embedded`: the field holds nested `Encryptable` objects (`T`,
///   `Box<T>`, `Option<T>` or `Vec<T>`); cannot be combined with `lazy`
/// - `list` / `set` / `value`: force the field shape when it cannot be read
///   from the type (type aliases)
///
/// Without a shape option, `Vec<String>` is a list, `BTreeSet<String>` and
/// `HashSet<String>` are sets (optionally wrapped in `Option`), and anything
/// else is a single value.
///
/// # Example
///
/// ```rust,ignore
/// use fieldcrypt::Encryptable;
///
/// #[derive(Encryptable)]
/// struct User {
///     #[encrypt(searchable)]
///     email: String,
///     email_blind_id: Option<String>,
///     #[encrypt(lazy)]
///     notes: Option<String>,
///     #[encrypt(embedded)]
///     address: Option<Address>,
/// }
/// ```
#[proc_macro_derive(Encryptable, attributes(encrypt))]
pub fn derive_encryptable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(syn::Error::into_compile_error).into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Shape {
    Value,
    List,
    Set,
    Embedded,
}

#[derive(Default)]
struct Options {
    lazy: bool,
    searchable: bool,
    algorithm: Option<LitStr>,
    blind_id_algorithm: Option<LitStr>,
    shape: Option<Shape>,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.span(), "Encryptable can only be derived for structs"));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "Encryptable can only be derived for structs with named fields",
        ));
    };

    let field_names: Vec<&Ident> = named.named.iter().filter_map(|f| f.ident.as_ref()).collect();
    let mut handles = Vec::new();
    for field in &named.named {
        if let Some(options) = parse_options(field)? {
            handles.push(field_handle(field, &options, &field_names)?);
        }
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let as_any = input.generics.params.is_empty().then(|| {
        quote! {
            fn as_any_mut(&mut self) -> ::std::option::Option<&mut dyn ::std::any::Any> {
                ::std::option::Option::Some(self)
            }
        }
    });
    Ok(quote! {
        impl #impl_generics ::fieldcrypt::schema::Encryptable<::std::string::String>
            for #name #ty_generics #where_clause
        {
            fn fields(
                &mut self,
            ) -> ::std::vec::Vec<::fieldcrypt::schema::FieldHandle<'_, ::std::string::String>> {
                ::std::vec![#(#handles),*]
            }

            fn entity_name(&self) -> &'static str {
                ::std::stringify!(#name)
            }

            #as_any
        }
    })
}

fn parse_options(field: &Field) -> syn::Result<Option<Options>> {
    let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("encrypt")) else {
        return Ok(None);
    };
    let mut options = Options::default();
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(Some(options));
    }

    attr.parse_nested_meta(|meta| {
        let shape = if meta.path.is_ident("lazy") {
            options.lazy = true;
            None
        } else if meta.path.is_ident("searchable") {
            options.searchable = true;
            None
        } else if meta.path.is_ident("algorithm") {
            options.algorithm = Some(meta.value()?.parse()?);
            None
        } else if meta.path.is_ident("blind_id_algorithm") {
            options.blind_id_algorithm = Some(meta.value()?.parse()?);
            None
        } else if meta.path.is_ident("embedded") {
            Some(Shape::Embedded)
        } else if meta.path.is_ident("list") {
            Some(Shape::List)
        } else if meta.path.is_ident("set") {
            Some(Shape::Set)
        } else if meta.path.is_ident("value") {
            Some(Shape::Value)
        } else {
            return Err(meta.error("unsupported encrypt option"));
        };
        if let Some(shape) = shape {
            if options.shape.replace(shape).is_some() {
                return Err(meta.error("only one of embedded, list, set, value may be given"));
            }
        }
        Ok(())
    })?;
    Ok(Some(options))
}

fn field_handle(
    field: &Field,
    options: &Options,
    siblings: &[&Ident],
) -> syn::Result<TokenStream2> {
    let ident =
        field.ident.as_ref().ok_or_else(|| syn::Error::new(field.span(), "unnamed field"))?;
    let name = ident.to_string();
    let shape = options.shape.unwrap_or_else(|| infer_shape(&field.ty));

    let constructor = match shape {
        Shape::Value => quote!(value),
        Shape::List => quote!(list),
        Shape::Set => quote!(set),
        Shape::Embedded => quote!(embedded),
    };
    if options.lazy && shape == Shape::Embedded {
        return Err(syn::Error::new(
            ident.span(),
            "embedded fields cannot be lazy; mark the nested fields lazy instead",
        ));
    }
    let mut schema = quote!(::fieldcrypt::schema::FieldSchema::#constructor(#name));
    if options.lazy {
        schema = quote!(#schema.lazy());
    }
    if options.searchable {
        if shape != Shape::Value {
            return Err(syn::Error::new(ident.span(), "only single value fields can be searchable"));
        }
        schema = quote!(#schema.searchable());
    }
    if let Some(algorithm) = &options.algorithm {
        schema = quote!(#schema.with_algorithm(#algorithm));
    }
    if let Some(algorithm) = &options.blind_id_algorithm {
        schema = quote!(#schema.with_blind_id_algorithm(#algorithm));
    }

    let handle = match shape {
        Shape::Value => quote!(::fieldcrypt::schema::FieldHandle::value(#schema, &mut self.#ident)),
        Shape::List | Shape::Set => {
            quote!(::fieldcrypt::schema::FieldHandle::collection(#schema, &mut self.#ident))
        }
        Shape::Embedded => embedded_handle(ident, &field.ty, &schema),
    };

    if !options.searchable {
        return Ok(handle);
    }
    let blind_id = format_ident!("{}_blind_id", ident);
    if !siblings.contains(&&blind_id) {
        return Err(syn::Error::new(
            ident.span(),
            format!("BlindId field not found. Consider define field: {blind_id}"),
        ));
    }
    Ok(quote!(#handle.with_blind_id(&mut self.#blind_id)))
}

fn embedded_handle(ident: &Ident, ty: &Type, schema: &TokenStream2) -> TokenStream2 {
    let target = quote!(&mut dyn ::fieldcrypt::schema::Encryptable<::std::string::String>);
    match outer(ty) {
        Some(("Option" | "Vec", Some(inner))) => {
            let element = if matches!(outer(inner), Some(("Box", _))) {
                quote!(|v| &mut **v as #target)
            } else {
                quote!(|v| v as #target)
            };
            quote!(::fieldcrypt::schema::FieldHandle::embedded_all(
                #schema,
                self.#ident.iter_mut().map(#element),
            ))
        }
        Some(("Box", _)) => {
            quote!(::fieldcrypt::schema::FieldHandle::embedded(#schema, &mut *self.#ident))
        }
        _ => quote!(::fieldcrypt::schema::FieldHandle::embedded(#schema, &mut self.#ident)),
    }
}

fn infer_shape(ty: &Type) -> Shape {
    let target = match outer(ty) {
        Some(("Option", Some(inner))) => inner,
        _ => ty,
    };
    match outer(target) {
        Some(("Vec", _)) => Shape::List,
        Some(("BTreeSet" | "HashSet", _)) => Shape::Set,
        _ => Shape::Value,
    }
}

/// Returns the last path segment name of a type and its first type argument.
fn outer(ty: &Type) -> Option<(&'static str, Option<&Type>)> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    let name = ["Option", "Vec", "Box", "BTreeSet", "HashSet"]
        .into_iter()
        .find(|known| segment.ident == known)?;
    let argument = match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    };
    Some((name, argument))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(input: DeriveInput) -> String {
        expand(&input).err().map(|e| e.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_lazy_embedded_rejected() {
        let input = syn::parse_quote! {
            struct Person {
                #[encrypt(embedded, lazy)]
                address: Option<Address>,
            }
        };
        assert!(error(input).contains("embedded fields cannot be lazy"));
    }

    #[test]
    fn test_searchable_requires_blind_id_sibling() {
        let input = syn::parse_quote! {
            struct Person {
                #[encrypt(searchable)]
                surname: String,
            }
        };
        assert!(error(input).contains("surname_blind_id"));
    }

    #[test]
    fn test_lazy_value_expands() {
        let input: DeriveInput = syn::parse_quote! {
            struct Person {
                #[encrypt(lazy)]
                notes: Option<String>,
                #[encrypt(embedded)]
                address: Option<Address>,
            }
        };
        let tokens = expand(&input).unwrap().to_string();
        assert!(tokens.contains("lazy"));
        assert!(tokens.contains("as_any_mut"));
    }
}
