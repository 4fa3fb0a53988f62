use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub(crate) fn derive_parcelable_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_parcelable_impl(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

pub(crate) fn derive_serializable_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_serializable_impl(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

// Implementations

fn generate_parcelable_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    reject_generics(input, "Parcelable")?;
    let name = &input.ident;

    Ok(quote! {
        impl ::saved_state::bundle::Parcelable for #name {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        ::saved_state::__private::inventory::submit! {
            ::saved_state::bundle::ParcelableEntry::of::<#name>()
        }
    })
}

fn generate_serializable_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    reject_generics(input, "Serializable")?;
    let name = &input.ident;

    Ok(quote! {
        impl ::saved_state::bundle::Serializable for #name {}

        ::saved_state::__private::inventory::submit! {
            ::saved_state::bundle::SerializableEntry::of::<#name>()
        }
    })
}

// Helper functions

/// Capability entries are keyed by `TypeId`, one per concrete type.
fn reject_generics(input: &DeriveInput, derive: &str) -> syn::Result<()> {
    if input.generics.params.is_empty() {
        return Ok(());
    }

    Err(syn::Error::new_spanned(
        &input.generics,
        format!("{derive} can not be derived for generic types"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_generate_parcelable_impl() {
        let input: DeriveInput = parse_quote! {
            #[derive(Clone, Debug)]
            struct Cursor {
                row: u32,
            }
        };

        let token_string = generate_parcelable_impl(&input).unwrap().to_string();

        assert!(token_string.contains("impl :: saved_state :: bundle :: Parcelable for Cursor"));
        assert!(token_string.contains("ParcelableEntry :: of :: < Cursor > ()"));
    }

    #[test]
    fn test_generate_serializable_impl() {
        let input: DeriveInput = parse_quote! {
            enum Filter {
                All,
                Done,
            }
        };

        let token_string = generate_serializable_impl(&input).unwrap().to_string();

        assert!(
            token_string.contains("impl :: saved_state :: bundle :: Serializable for Filter { }")
        );
        assert!(token_string.contains("SerializableEntry :: of :: < Filter > ()"));
    }

    #[test]
    fn test_generic_type_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Wrapper<T> {
                inner: T,
            }
        };

        let err = generate_parcelable_impl(&input).unwrap_err();
        assert_eq!(err.to_string(), "Parcelable can not be derived for generic types");
    }
}
