use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Field, Fields, GenericArgument, Ident,
    LitStr, Meta, PathArguments, Token, Type,
};

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    generate_injectable_impl(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// `#[injectable(...)]` on the struct.
#[derive(Default)]
struct ClassOptions {
    providers: Vec<Type>,
    after_construct: bool,
}

/// `#[inject(...)]` on a field.
struct InjectOptions {
    token: Option<LitStr>,
    property: bool,
}

enum Injection {
    Constructor { key: TokenStream2, value: TokenStream2 },
    Property { key: TokenStream2, mutable: bool },
    Skipped,
}

fn generate_injectable_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "#[derive(Injectable)] only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Injectable)] can only be applied to structs",
            ));
        }
    };

    let options = parse_class_options(&input.attrs)?;

    let mut inject_keys = Vec::new();
    let mut initializers = Vec::new();
    let mut property_keys = Vec::new();
    let mut property_arms = Vec::new();

    for field in fields {
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;

        match classify(field)? {
            Injection::Constructor { key, value } => {
                inject_keys.push(key);
                initializers.push(quote!(#field_name: #value));
            }
            Injection::Property { key, mutable } => {
                let name = field_name.to_string();
                property_keys.push(quote! {
                    ::strata::PropertyKey::new(#name, #key, #mutable)
                });
                property_arms.push(quote! {
                    #name => self.#field_name.inject(property.key(), value)
                });
                initializers.push(quote!(#field_name: ::std::default::Default::default()));
            }
            Injection::Skipped => {
                initializers.push(quote!(#field_name: ::std::default::Default::default()));
            }
        }
    }

    let providers = options.providers.iter().map(|ty| {
        quote!(::strata::Provider::class::<#ty>())
    });

    let inject_property = if property_arms.is_empty() {
        quote!()
    } else {
        let class = struct_name.to_string();
        quote! {
            fn inject_property(
                &mut self,
                property: &::strata::PropertyKey,
                value: ::strata::Instance,
            ) -> ::strata::Result<()> {
                match property.name() {
                    #(#property_arms,)*
                    other => Err(::strata::StrataError::UnknownProperty {
                        class: #class.to_string(),
                        property: other.to_string(),
                    }),
                }
            }
        }
    };

    let after_construct = if options.after_construct {
        quote! {
            fn after_construct(&mut self) {
                <Self as ::strata::AfterConstruct>::after_construct(self)
            }
        }
    } else {
        quote!()
    };

    Ok(quote! {
        impl #impl_generics ::strata::Injectable for #struct_name #ty_generics #where_clause {
            fn providers() -> ::std::vec::Vec<::strata::Provider> {
                ::std::vec![#(#providers),*]
            }

            fn inject_keys() -> ::std::vec::Vec<::strata::Key> {
                ::std::vec![#(#inject_keys),*]
            }

            fn property_keys() -> ::std::vec::Vec<::strata::PropertyKey> {
                ::std::vec![#(#property_keys),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn construct(mut args: ::strata::Arguments) -> ::strata::Result<Self> {
                Ok(Self {
                    #(#initializers),*
                })
            }

            #inject_property

            #after_construct
        }
    })
}

fn parse_class_options(attrs: &[Attribute]) -> syn::Result<ClassOptions> {
    let mut options = ClassOptions::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("injectable")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("providers") {
                let content;
                syn::parenthesized!(content in meta.input);
                let types = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
                options.providers.extend(types);
                Ok(())
            } else if meta.path.is_ident("after_construct") {
                options.after_construct = true;
                Ok(())
            } else {
                Err(meta.error("expected `providers(..)` or `after_construct`"))
            }
        })?;
    }
    Ok(options)
}

fn parse_inject_options(attr: &Attribute) -> syn::Result<InjectOptions> {
    let mut options = InjectOptions {
        token: None,
        property: false,
    };
    if matches!(attr.meta, Meta::Path(_)) {
        return Ok(options);
    }
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("token") {
            options.token = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("property") {
            options.property = true;
            Ok(())
        } else {
            Err(meta.error("expected `token = \"..\"` or `property`"))
        }
    })?;
    Ok(options)
}

fn classify(field: &Field) -> syn::Result<Injection> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("inject")) else {
        return Ok(Injection::Skipped);
    };
    let options = parse_inject_options(attr)?;

    if options.property {
        let (wrapper, inner) = generic_inner(&field.ty, &["Property", "MutableProperty"])
            .ok_or_else(|| {
                syn::Error::new_spanned(
                    &field.ty,
                    "#[inject(property)] expects a `Property<T>` or `MutableProperty<T>` field",
                )
            })?;
        if matches!(inner, Type::TraitObject(_)) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "trait objects cannot be injected as properties",
            ));
        }
        let key = key_for(options.token.as_ref(), inner);
        return Ok(Injection::Property {
            key,
            mutable: wrapper == "MutableProperty",
        });
    }

    let (key, value) = match generic_inner(&field.ty, &["Arc"]) {
        Some((_, inner @ Type::TraitObject(_))) => (
            key_for(options.token.as_ref(), inner),
            quote!(args.next_trait::<#inner>()?),
        ),
        Some((_, inner)) => (
            key_for(options.token.as_ref(), inner),
            quote!(args.next::<#inner>()?),
        ),
        // Plain values are cloned out of the container.
        None => {
            let ty = &field.ty;
            (
                key_for(options.token.as_ref(), ty),
                quote!(args.next_value::<#ty>()?),
            )
        }
    };
    Ok(Injection::Constructor { key, value })
}

fn key_for(token: Option<&LitStr>, ty: &Type) -> TokenStream2 {
    match token {
        Some(token) => quote!(::strata::Key::token(#token)),
        None => quote!(::strata::Key::of::<#ty>()),
    }
}

/// `Some((wrapper, T))` when `ty` is `Wrapper<T>` for one of `wrappers`.
fn generic_inner<'a>(ty: &'a Type, wrappers: &[&str]) -> Option<(&'a Ident, &'a Type)> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if !wrappers.iter().any(|wrapper| segment.ident == wrapper) {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some((&segment.ident, inner)),
        _ => None,
    }
}
