use proc_macro2::TokenStream;
use quote::quote;
use syn::Type;

/// How an enum variant holds its concrete value.
enum Holding {
    /// `Variant(T)`
    ByValue(Type),
    /// `Variant(Box<T>)`; `T` must be pointer-preferred.
    Boxed(Type),
    /// `Variant(Option<Box<T>>)`; `None` is the typed nil.
    Nilable(Type),
}

impl Holding {
    fn concrete(&self) -> &Type {
        match self {
            Holding::ByValue(ty) | Holding::Boxed(ty) | Holding::Nilable(ty) => ty,
        }
    }

    fn is_pointer(&self) -> bool {
        !matches!(self, Holding::ByValue(_))
    }
}

/// Generates `describe`, `to_value` and `from_value` for an enum over
/// concrete variants.
pub fn generate_interface(
    data: &syn::DataEnum,
    type_name: &str,
    krate: &TokenStream,
) -> syn::Result<TokenStream> {
    let mut variant_descriptors = Vec::new();
    let mut to_value_arms = Vec::new();
    let mut from_value_checks = Vec::new();
    let mut nil_variant = None;

    for variant in &data.variants {
        let variant_ident = &variant.ident;
        let is_nil = parse_variant_attrs(&variant.attrs)?;

        match &variant.fields {
            syn::Fields::Unit if is_nil => {
                if nil_variant.is_some() {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "only one variant may be marked nil",
                    ));
                }
                nil_variant = Some(variant_ident);
                to_value_arms.push(quote! {
                    Self::#variant_ident => #krate::Value::Interface(::std::option::Option::None)
                });
            }
            syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 && !is_nil => {
                let holding = classify(&fields.unnamed[0].ty);
                let concrete = holding.concrete();
                let pointer = holding.is_pointer();

                variant_descriptors.push(quote! {
                    #krate::__private::variant::<#concrete>(registry, #pointer)?
                });

                let payload = match &holding {
                    Holding::ByValue(_) => quote! { #krate::Reflect::to_value(inner) },
                    Holding::Boxed(_) => {
                        quote! { #krate::Value::pointer(#krate::Reflect::to_value(&**inner)) }
                    }
                    Holding::Nilable(_) => quote! { #krate::Reflect::to_value(inner) },
                };
                to_value_arms.push(quote! {
                    Self::#variant_ident(inner) => #krate::Value::interface(
                        <#concrete as #krate::Reflect>::type_name(),
                        #payload,
                    )
                });

                let rebuild = match &holding {
                    Holding::ByValue(_) => {
                        quote! { <#concrete as #krate::Reflect>::from_value(variant.value)? }
                    }
                    Holding::Boxed(_) => {
                        quote! { #krate::__private::unbox::<#concrete>(variant.value)? }
                    }
                    Holding::Nilable(_) => quote! {
                        <::std::option::Option<::std::boxed::Box<#concrete>> as #krate::Reflect>
                            ::from_value(variant.value)?
                    },
                };
                from_value_checks.push(quote! {
                    if variant.name == <#concrete as #krate::Reflect>::type_name() {
                        return ::std::result::Result::Ok(Self::#variant_ident(#rebuild));
                    }
                });
            }
            _ => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "interface variants hold exactly one concrete value, or are a unit variant marked #[resin(nil)]",
                ));
            }
        }
    }

    let on_nil = match nil_variant {
        Some(ident) => quote! { ::std::result::Result::Ok(Self::#ident) },
        None => quote! {
            ::std::result::Result::Err(#krate::__private::nil_interface(#type_name))
        },
    };

    Ok(quote! {
        #[allow(unused_variables)]
        fn describe(
            registry: &#krate::Registry,
        ) -> ::std::result::Result<#krate::TypeDescriptor, #krate::CodecError> {
            let variants = ::std::vec![#(#variant_descriptors),*];
            #krate::TypeDescriptor::interface(#type_name, variants)
        }

        fn to_value(&self) -> #krate::Value {
            match self {
                #(#to_value_arms),*
            }
        }

        fn from_value(
            value: #krate::Value,
        ) -> ::std::result::Result<Self, #krate::CodecError> {
            let ::std::option::Option::Some(variant) =
                #krate::__private::interface_parts(value, #type_name)?
            else {
                return #on_nil;
            };
            #(#from_value_checks)*
            ::std::result::Result::Err(
                #krate::__private::unknown_variant(#type_name, &variant.name),
            )
        }
    })
}

fn classify(ty: &Type) -> Holding {
    if let Some(inner) = single_generic_arg(ty, "Box") {
        return Holding::Boxed(inner);
    }
    if let Some(boxed) = single_generic_arg(ty, "Option") {
        if let Some(inner) = single_generic_arg(&boxed, "Box") {
            return Holding::Nilable(inner);
        }
    }
    Holding::ByValue(ty.clone())
}

/// Extract `T` from `Wrapper<T>` when the last path segment is `wrapper`.
fn single_generic_arg(ty: &Type, wrapper: &str) -> Option<Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(angle) if angle.args.len() == 1 => {
            match &angle.args[0] {
                syn::GenericArgument::Type(inner) => Some(inner.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Returns whether the variant is marked `#[resin(nil)]`.
fn parse_variant_attrs(attrs: &[syn::Attribute]) -> syn::Result<bool> {
    let mut nil = false;

    for attr in attrs {
        if !attr.path().is_ident("resin") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("nil") {
                nil = true;
                Ok(())
            } else {
                Err(meta.error("unknown resin variant attribute"))
            }
        })?;
    }

    Ok(nil)
}
