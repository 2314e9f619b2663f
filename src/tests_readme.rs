// #![include_doc("../README.md", start)]
//! # statevm
//!
//! A redux-style store with view-models that decide when a UI subtree must rebuild.
//!
//! - `Store` holds an immutable state. Dispatched actions compute the next state, synchronously or asynchronously.
//! - A `VmFactory` turns one state snapshot into a view-model.
//! - A view-model embeds a `Vm` built from its relevant fields. Callbacks are kept out of it, so two view-models built from the same data compare equal and the UI node is not rebuilt.
//!
//! ```rust
//! use futures::executor::LocalPool;
//! use statevm::{fields, Action, Bound, Callback, Rebuilder, Reduction, Store, Unbound, ViewModel, Vm, VmFactory};
//!
//! struct Increment;
//! impl Action<i32> for Increment {
//!     fn reduce(&self, store: &Store<i32>) -> Reduction<i32> {
//!         Reduction::state(*store.state() + 1)
//!     }
//! }
//!
//! #[derive(ViewModel)]
//! struct CounterVm {
//!     vm: Vm,
//!     count: i32,
//!     on_increment: Callback,
//! }
//!
//! struct CounterFactory;
//! impl VmFactory for CounterFactory {
//!     type State = i32;
//!     type Env = ();
//!     type Connector = ();
//!     type Vm = CounterVm;
//!
//!     fn from_store(&self, cx: &Bound<Self>) -> Option<CounterVm> {
//!         let count = **cx.state();
//!         let store = cx.store().clone();
//!         Some(CounterVm {
//!             vm: Vm::new::<CounterVm>(fields![count]),
//!             count,
//!             on_increment: Callback::new(move |()| {
//!                 store.dispatch(Increment);
//!             }),
//!         })
//!     }
//! }
//!
//! let pool = LocalPool::new();
//! let store = Store::new(0, (), pool.spawner());
//! let mut rebuilder = Rebuilder::new(&store, || Unbound::new(CounterFactory));
//! assert!(rebuilder.refresh());
//! assert!(!rebuilder.refresh());
//!
//! rebuilder.vm().unwrap().on_increment.call(());
//! assert!(rebuilder.refresh());
//! assert_eq!(rebuilder.vm().unwrap().count, 1);
//! ```
//!
//! ## License
//!
//! Licensed under either of Apache-2.0 or MIT at your option.
// #![include_doc("../README.md", end)]
