use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

mod interface;

/// Derive macro for the `Reflect` trait.
///
/// - a struct with named fields becomes a record
/// - an enum becomes an interface over the concrete types of its variants
/// - `#[resin(repr)]` makes the type opaque, carried through its
///   `CustomRepresentation` impl
///
/// # Example
///
/// ```ignore
/// use resin_core::{Reflect, Timestamp};
///
/// #[derive(Reflect)]
/// #[resin(name = "Payment", pointer_preferred)]
/// struct Payment {
///     timestamp: Option<Timestamp>,
///     #[resin(unsafe)]
///     amount: f64,
///     #[resin(rename = "memo", omit_empty)]
///     note: String,
/// }
///
/// #[derive(Reflect)]
/// enum Instrument {
///     Card(Card),
///     Transfer(Box<Payment>),
///     #[resin(nil)]
///     Unset,
/// }
/// ```
///
/// # Container attributes
///
/// - `#[resin(name = "...")]` - Registered name (defaults to the type name)
/// - `#[resin(pointer_preferred)]` - Values are idiomatically held boxed
/// - `#[resin(repr)]` - Opaque type encoded through its representation
/// - `#[resin(crate = path)]` - Path to `resin_core` (use `crate` inside it)
///
/// # Field attributes
///
/// - `#[resin(rename = "name")]` - Use custom name in the textual encoding
/// - `#[resin(index = N)]` - Field index (defaults to position, from 1)
/// - `#[resin(unsafe)]` - Allow a floating-point type
/// - `#[resin(omit_empty)]` - Omit from the textual encoding when empty
/// - `#[resin(skip)]` - Not encoded (field must impl Default)
///
/// # Variant attributes
///
/// - `#[resin(nil)]` - Unit variant standing for the nil interface
#[proc_macro_derive(Reflect, attributes(resin))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_reflect_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_reflect_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let attrs = parse_container_attrs(&input.attrs)?;
    let krate = match &attrs.crate_path {
        Some(path) => quote! { #path },
        None => quote! { ::resin_core },
    };
    let name = &input.ident;
    let type_name = attrs.name.clone().unwrap_or_else(|| name.to_string());

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let where_clause = build_where_clause(&input.generics, where_clause, &krate);

    let body = if attrs.repr {
        generate_opaque(&krate, attrs.pointer_preferred)
    } else {
        match &input.data {
            syn::Data::Struct(data) => {
                generate_record(data, &type_name, &krate, attrs.pointer_preferred)?
            }
            syn::Data::Enum(data) => {
                if attrs.pointer_preferred {
                    return Err(syn::Error::new_spanned(
                        name,
                        "pointer_preferred applies to concrete types, not interfaces",
                    ));
                }
                interface::generate_interface(data, &type_name, &krate)?
            }
            syn::Data::Union(_) => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Reflect cannot be derived for unions",
                ));
            }
        }
    };

    Ok(quote! {
        impl #impl_generics #krate::Reflect for #name #ty_generics #where_clause {
            fn type_name() -> ::std::string::String {
                ::std::string::String::from(#type_name)
            }

            #body
        }
    })
}

fn build_where_clause(
    generics: &syn::Generics,
    existing: Option<&syn::WhereClause>,
    krate: &TokenStream2,
) -> TokenStream2 {
    let type_params: Vec<_> = generics.type_params().map(|p| &p.ident).collect();

    if type_params.is_empty() && existing.is_none() {
        return quote! {};
    }

    let reflect_bounds = type_params.iter().map(|p| {
        quote! { #p: #krate::Reflect }
    });

    let existing_predicates = existing
        .map(|w| {
            let predicates = &w.predicates;
            quote! { #predicates, }
        })
        .unwrap_or_default();

    quote! {
        where
            #existing_predicates
            #(#reflect_bounds),*
    }
}

fn generate_record(
    data: &syn::DataStruct,
    type_name: &str,
    krate: &TokenStream2,
    pointer_preferred: bool,
) -> syn::Result<TokenStream2> {
    let syn::Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &data.fields,
            "Reflect records need named fields",
        ));
    };

    let mut descriptors = Vec::new();
    let mut to_values = Vec::new();
    let mut from_values = Vec::new();
    let mut seen = std::collections::HashMap::new();

    for f in &named.named {
        let attrs = parse_field_attrs(&f.attrs)?;
        let Some(ident) = f.ident.as_ref() else {
            continue;
        };
        if attrs.skip {
            from_values.push(quote! { #ident: ::std::default::Default::default() });
            continue;
        }

        let position = descriptors.len() as u32 + 1;
        let index = attrs.index.unwrap_or(position);
        if index == 0 {
            return Err(syn::Error::new_spanned(f, "field indexes start at 1"));
        }
        if let Some(other) = seen.insert(index, ident.to_string()) {
            return Err(syn::Error::new_spanned(
                f,
                format!("field index {index} already used by `{other}`"),
            ));
        }

        let field_name = attrs.rename.clone().unwrap_or_else(|| ident.to_string());
        let ty = &f.ty;
        let is_unsafe = attrs.is_unsafe;
        let omit_empty = attrs.omit_empty;

        descriptors.push(quote! {
            #krate::FieldDescriptor::new(#index, #field_name, registry.descriptor::<#ty>()?)
                .with_unsafe(#is_unsafe)
                .with_omit_empty(#omit_empty)
        });
        to_values.push(quote! { #krate::Reflect::to_value(&self.#ident) });
        from_values.push(quote! {
            #ident: #krate::__private::next_field(&mut fields, #type_name, #field_name)?
        });
    }

    let count = descriptors.len();

    Ok(quote! {
        #[allow(unused_variables)]
        fn describe(
            registry: &#krate::Registry,
        ) -> ::std::result::Result<#krate::TypeDescriptor, #krate::CodecError> {
            let fields = ::std::vec![#(#descriptors),*];
            ::std::result::Result::Ok(
                #krate::TypeDescriptor::record(#type_name, fields)?
                    .with_pointer_preferred(#pointer_preferred),
            )
        }

        fn to_value(&self) -> #krate::Value {
            #krate::Value::Record(::std::vec![#(#to_values),*])
        }

        #[allow(unused_mut, unused_variables)]
        fn from_value(
            value: #krate::Value,
        ) -> ::std::result::Result<Self, #krate::CodecError> {
            let mut fields = #krate::__private::record_fields(value, #count, #type_name)?;
            ::std::result::Result::Ok(Self {
                #(#from_values),*
            })
        }
    })
}

fn generate_opaque(krate: &TokenStream2, pointer_preferred: bool) -> TokenStream2 {
    quote! {
        fn describe(
            registry: &#krate::Registry,
        ) -> ::std::result::Result<#krate::TypeDescriptor, #krate::CodecError> {
            let repr = #krate::Representation::typed::<Self>(registry)?;
            ::std::result::Result::Ok(
                #krate::TypeDescriptor::opaque(<Self as #krate::Reflect>::type_name(), repr)
                    .with_pointer_preferred(#pointer_preferred),
            )
        }

        fn to_value(&self) -> #krate::Value {
            #krate::Value::Opaque(#krate::Opaque::new(::std::clone::Clone::clone(self)))
        }

        fn from_value(
            value: #krate::Value,
        ) -> ::std::result::Result<Self, #krate::CodecError> {
            #krate::__private::from_opaque::<Self>(value)
        }
    }
}

#[derive(Default)]
pub(crate) struct ContainerAttrs {
    pub name: Option<String>,
    pub pointer_preferred: bool,
    pub repr: bool,
    pub crate_path: Option<syn::Path>,
}

pub(crate) fn parse_container_attrs(attrs: &[syn::Attribute]) -> syn::Result<ContainerAttrs> {
    let mut result = ContainerAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("resin") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
            } else if meta.path.is_ident("pointer_preferred") {
                result.pointer_preferred = true;
            } else if meta.path.is_ident("repr") {
                result.repr = true;
            } else if meta.path.is_ident("crate") {
                result.crate_path = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown resin container attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub skip: bool,
    pub rename: Option<String>,
    pub index: Option<u32>,
    pub is_unsafe: bool,
    pub omit_empty: bool,
}

pub(crate) fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("resin") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                result.skip = true;
            } else if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.rename = Some(value.value());
            } else if meta.path.is_ident("index") {
                let value: syn::LitInt = meta.value()?.parse()?;
                result.index = Some(value.base10_parse()?);
            } else if meta.path.is_ident("unsafe") {
                result.is_unsafe = true;
            } else if meta.path.is_ident("omit_empty") {
                result.omit_empty = true;
            } else {
                return Err(meta.error("unknown resin field attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}
