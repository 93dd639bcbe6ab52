use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::parse::Parse;
use syn::{Data, DeriveInput, Expr, Field, Fields, Lit, LitInt, Token, parse_macro_input};

/// Derives `FormSchema` for a struct with named fields.
///
/// Every field gets a lens (`<Struct><Field>Lens`) reachable through
/// `<Struct>::fields()`, and a spec built from the field's `FieldType` plus
/// the checks listed in `#[form(...)]`:
///
/// - `min_length = N`, `max_length = N`
/// - `min = EXPR`, `max = EXPR`, `integer`
/// - `email`, `must_be_true`
/// - `one_of(LIT, ...)`
///
/// Each field also rejects values that would not deserialize into its type.
#[proc_macro_derive(FormSchema, attributes(form))]
pub fn derive_form_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormSchema derive currently supports only non-generic structs",
        ));
    }

    let model_ident = input.ident;
    let vis = input.vis;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormSchema derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormSchema derive is only supported on structs",
            ));
        }
    };

    let root = simple_form_path();
    let mut lens_defs = Vec::new();
    let mut fields_methods = Vec::new();
    let mut field_specs = Vec::new();

    for field in named_fields {
        let checks = field_checks(&field, &root)?;
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;
        let raw_name = field_ident.to_string();
        let field_name = raw_name.trim_start_matches("r#").to_string();
        let lens_ident = format_ident!("{model_ident}{}Lens", to_pascal_case(&field_name));

        lens_defs.push(quote! {
            #[derive(Clone, Copy, Debug, Default)]
            #vis struct #lens_ident;

            impl #root::form::FieldLens<#model_ident> for #lens_ident {
                type Value = #field_ty;

                fn key(self) -> #root::form::FieldKey {
                    #root::form::FieldKey::new(#field_name)
                }
            }

            impl ::core::convert::From<#lens_ident> for #root::form::FieldKey {
                fn from(_: #lens_ident) -> Self {
                    #root::form::FieldKey::new(#field_name)
                }
            }
        });

        fields_methods.push(quote! {
            pub const fn #field_ident(&self) -> #lens_ident {
                #lens_ident
            }
        });

        field_specs.push(quote! {
            .field(
                <#field_ty as #root::form::FieldType>::field_spec(
                    #root::form::FieldKey::new(#field_name)
                )
                #(#checks)*
                .decodes_as::<#field_ty>()
            )
        });
    }

    Ok(quote! {
        #[derive(Clone, Copy, Debug, Default)]
        #vis struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #root::form::FormSchema for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn model_builder() -> #root::form::FormModelBuilder {
                #root::form::FormModel::builder()
                    #(#field_specs)*
            }
        }

        #(#lens_defs)*
    })
}

fn field_checks(field: &Field, root: &TokenStream2) -> syn::Result<Vec<TokenStream2>> {
    let mut checks = Vec::new();
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("min_length") {
                let value: LitInt = meta.value()?.parse()?;
                checks.push(quote!(.min_length(#value)));
            } else if path.is_ident("max_length") {
                let value: LitInt = meta.value()?.parse()?;
                checks.push(quote!(.max_length(#value)));
            } else if path.is_ident("min") {
                let value: Expr = meta.value()?.parse()?;
                checks.push(quote!(.min((#value) as f64)));
            } else if path.is_ident("max") {
                let value: Expr = meta.value()?.parse()?;
                checks.push(quote!(.max((#value) as f64)));
            } else if path.is_ident("integer") {
                checks.push(quote!(.integer()));
            } else if path.is_ident("email") {
                checks.push(quote!(.email()));
            } else if path.is_ident("must_be_true") {
                checks.push(quote!(.must_be_true()));
            } else if path.is_ident("one_of") {
                let content;
                syn::parenthesized!(content in meta.input);
                let options = content.parse_terminated(Lit::parse, Token![,])?;
                let options = options.iter();
                checks.push(quote!(.one_of([#(#root::form::Value::from(#options)),*])));
            } else {
                let name = path
                    .get_ident()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "?".to_string());
                return Err(syn::Error::new_spanned(
                    path,
                    format!("unsupported form attribute `{name}`"),
                ));
            }
            Ok(())
        })?;
    }
    Ok(checks)
}

fn simple_form_path() -> TokenStream2 {
    match crate_name("simple-form") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        // The library aliases itself as `simple_form`, so this path also
        // resolves inside its own unit tests.
        Ok(FoundCrate::Itself) | Err(_) => quote!(::simple_form),
    }
}

fn to_pascal_case(input: &str) -> String {
    let mut out = String::new();
    for segment in input.split('_') {
        if segment.is_empty() {
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
