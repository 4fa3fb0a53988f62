// lib.rs - Root of macro crate
use proc_macro::TokenStream;

mod capability;
mod recreation_task;

/// Stores the type by reference in plain typed properties.
///
/// The type must be `Clone + Debug + Send + Sync + 'static` and not generic.
#[proc_macro_derive(Parcelable)]
pub fn derive_parcelable(input: TokenStream) -> TokenStream {
    capability::derive_parcelable_impl(input)
}

/// Stores the type in `postcard` form in plain typed properties.
///
/// The type must also implement `serde::Serialize` and `serde::Deserialize`.
#[proc_macro_derive(Serializable)]
pub fn derive_serializable(input: TokenStream) -> TokenStream {
    capability::derive_serializable_impl(input)
}

/// Gives a `RecreationTask` implementation its stable id and registers it.
///
/// ```ignore
/// #[recreation_task("1d6c1f5e-5a43-4c59-9d1b-4c1f6b0f4a51")]
/// impl RecreationTask for ShowWelcomeBack { ... }
/// ```
#[proc_macro_attribute]
pub fn recreation_task(args: TokenStream, input: TokenStream) -> TokenStream {
    recreation_task::recreation_task_attr_impl(args, input)
}
