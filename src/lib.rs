//! A redux-style store with view-models that decide when a UI subtree must rebuild.
//!
//! - [`Store`] holds an immutable state and runs [`Action`]s that produce the next state.
//! - A [`VmFactory`] turns a state snapshot into a view-model.
//! - A view-model embeds a [`Vm`] built from its relevant [`Field`]s. Two view-models compare equal
//!   when their types and relevant fields match, so a UI node rebuilds only when something it displays has changed.
//! - [`Rebuilder`] drives a factory for one UI node and reports when a rebuild is needed.

extern crate self as statevm;

mod factory;
mod field;
mod store;
pub mod utils;
mod vm;

#[cfg(doctest)]
mod tests_readme;

pub use factory::*;
pub use field::*;
pub use store::*;
pub use vm::*;

/// Derives [`ViewModel`](trait@ViewModel), `PartialEq`, `Eq`, `Hash` and `Debug` from the embedded [`Vm`].
///
/// The `Vm` is the field of type `Vm`, or the field marked with `#[vm]`.
pub use statevm_macros::ViewModel;
