use proc_macro::TokenStream;
use syn_utils::into_macro_output;

#[macro_use]
mod syn_utils;

mod view_model_impl;

/// Implements `ViewModel`, `PartialEq`, `Eq`, `Hash` and `Debug` by delegating to the embedded `Vm`.
///
/// The `Vm` is the only field of type `Vm`, or the field marked with `#[vm]`.
///
/// ```ignore
/// #[derive(ViewModel)]
/// struct Item {
///     #[vm]
///     base: statevm::Vm,
///     on_tap: Callback,
/// }
/// ```
#[proc_macro_derive(ViewModel, attributes(vm))]
pub fn derive_view_model(input: TokenStream) -> TokenStream {
    into_macro_output(view_model_impl::derive_view_model(input.into()))
}
