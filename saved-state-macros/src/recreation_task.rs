use proc_macro::TokenStream;
use quote::quote;
use syn::parse_macro_input;

pub(crate) fn recreation_task_attr_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as syn::LitStr);
    let input = parse_macro_input!(input as syn::ItemImpl);

    match generate_recreation_task_impl(input, args) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

// Implementations

fn generate_recreation_task_impl(
    input: syn::ItemImpl,
    task_id: syn::LitStr,
) -> syn::Result<proc_macro2::TokenStream> {
    check_trait(&input)?;
    check_task_id(&task_id)?;

    let input = task_id_const_inserted(input, &task_id)?;
    let type_name = &input.self_ty;

    Ok(quote! {
        #input

        ::saved_state::__private::inventory::submit! {
            ::saved_state::recreation::RegisterTask(
                ::saved_state::recreation::TaskType::of::<#type_name>()
            )
        }
    })
}

// Helper functions

fn check_trait(input: &syn::ItemImpl) -> syn::Result<()> {
    let trait_path = &input
        .trait_
        .as_ref()
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input.self_ty,
                "recreation_task can only be used on RecreationTask implementations",
            )
        })?
        .1;

    match trait_path.segments.last() {
        Some(segment) if segment.ident == "RecreationTask" => {}
        _ => {
            return Err(syn::Error::new_spanned(
                trait_path,
                "recreation_task can only be used on RecreationTask implementations",
            ));
        }
    }

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "recreation tasks are registered per concrete type and can not be generic",
        ));
    }

    Ok(())
}

/// Parse early so a malformed id points at the attribute, not at generated code.
fn check_task_id(task_id: &syn::LitStr) -> syn::Result<()> {
    let value = task_id.value();
    let hex: String = value.chars().filter(|c| *c != '-').collect();

    let well_formed = value.len() == 36
        && [8, 13, 18, 23].iter().all(|i| value.as_bytes()[*i] == b'-')
        && hex.len() == 32
        && hex.chars().all(|c| c.is_ascii_hexdigit());

    if well_formed {
        Ok(())
    } else {
        Err(syn::Error::new_spanned(
            task_id,
            "expected a hyphenated uuid, e.g. \"1d6c1f5e-5a43-4c59-9d1b-4c1f6b0f4a51\"",
        ))
    }
}

fn task_id_const_inserted(
    mut input: syn::ItemImpl,
    task_id: &syn::LitStr,
) -> syn::Result<syn::ItemImpl> {
    let task_id_const = quote! {
        const TASK_ID: ::saved_state::recreation::TaskId =
            ::saved_state::__private::uuid::uuid!(#task_id);
    };

    let const_item: syn::ImplItemConst = syn::parse2(task_id_const)?;

    input.items.push(syn::ImplItem::Const(const_item));

    Ok(input)
}
