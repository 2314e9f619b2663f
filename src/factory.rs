use std::{any::type_name, future::Future, ops::Deref, rc::Rc, time::Duration};

use parse_display::Display;

use crate::{
    utils::timer::TimeoutError, Action, ActionId, ActionKeys, ActionStatus, Store, UserException,
    ViewModel, VmSlot, WaitActionsError,
};


/// Builds the view-model of a UI node from one state snapshot.
///
/// A factory is used once: it is bound to a state and a store with [`Unbound::bind`],
/// produces its view-model with [`Bound::produce`], and is then discarded.
///
/// ```
/// use futures::executor::LocalPool;
/// use statevm::{fields, produce_vm, Bound, Store, ViewModel, Vm, VmFactory};
///
/// #[derive(ViewModel)]
/// struct CounterVm {
///     vm: Vm,
///     count: i32,
/// }
///
/// struct CounterFactory;
///
/// impl VmFactory for CounterFactory {
///     type State = i32;
///     type Env = ();
///     type Connector = ();
///     type Vm = CounterVm;
///
///     fn from_store(&self, cx: &Bound<Self>) -> Option<CounterVm> {
///         let count = **cx.state();
///         Some(CounterVm {
///             vm: Vm::new::<CounterVm>(fields![count]),
///             count,
///         })
///     }
/// }
///
/// let pool = LocalPool::new();
/// let store = Store::new(3, (), pool.spawner());
/// let vm = produce_vm(CounterFactory, store.state(), &store).unwrap();
/// assert_eq!(vm.count, 3);
/// ```
pub trait VmFactory: Sized + 'static {
    type State: 'static;
    type Env: 'static;
    /// The UI node that creates this factory. Use `()` if the factory never needs one.
    type Connector: 'static;
    type Vm: ViewModel;

    /// Creates the view-model. Called exactly once per factory.
    ///
    /// Returning `None` is allowed. Callers must check [`VmLifecycle::if_vm_is_null`] before using the view-model.
    fn from_store(&self, cx: &Bound<Self>) -> Option<Self::Vm>;
}

#[derive(Debug, Display, PartialEq, Eq, Clone, Copy)]
#[display(
    "`{factory}` was created without a connector. Use `Unbound::with_connector` to pass the UI node to the factory."
)]
pub struct ConfigurationError {
    factory: &'static str,
}

impl std::error::Error for ConfigurationError {}

#[derive(Debug, Display, PartialEq, Eq, Clone, Copy)]
pub enum LifecycleError {
    #[display(
        "the view-model is not created yet. It is available after `from_store` has returned."
    )]
    NotProduced,
    #[display("`from_store` returned no view-model. Check `if_vm_is_null` before calling `vm`.")]
    ProducedNone,
}

impl std::error::Error for LifecycleError {}

/// Access to the view-model of a factory in any phase.
pub trait VmLifecycle {
    type Vm;

    fn try_vm(&self) -> Result<&Self::Vm, LifecycleError>;

    /// Returns the produced view-model.
    ///
    /// # Panics
    ///
    /// Panics with [`LifecycleError`] if the view-model is not produced yet or if production returned `None`.
    fn vm(&self) -> &Self::Vm {
        self.try_vm().unwrap_or_else(|e| panic!("{e}"))
    }

    /// Returns true if production returned `None`.
    ///
    /// # Panics
    ///
    /// Panics with [`LifecycleError::NotProduced`] if the view-model is not produced yet.
    fn if_vm_is_null(&self) -> bool {
        match self.try_vm() {
            Ok(_) => false,
            Err(LifecycleError::ProducedNone) => true,
            Err(e) => panic!("{e}"),
        }
    }
}

/// A factory that is not bound to a state yet.
pub struct Unbound<F: VmFactory> {
    factory: F,
    connector: Option<F::Connector>,
}

impl<F: VmFactory> Unbound<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            connector: None,
        }
    }

    pub fn with_connector(self, connector: F::Connector) -> Self {
        Self {
            connector: Some(connector),
            ..self
        }
    }

    /// Binds the factory to a state snapshot and a store.
    pub fn bind(self, state: Rc<F::State>, store: &Store<F::State, F::Env>) -> Bound<F> {
        Bound {
            factory: self.factory,
            scope: Scope {
                connector: self.connector,
                state,
                store: store.clone(),
            },
        }
    }

    /// Binds the factory to the current state of `store`.
    pub fn bind_current(self, store: &Store<F::State, F::Env>) -> Bound<F> {
        self.bind(store.state(), store)
    }
}
impl<F: VmFactory> VmLifecycle for Unbound<F> {
    type Vm = F::Vm;
    fn try_vm(&self) -> Result<&F::Vm, LifecycleError> {
        Err(LifecycleError::NotProduced)
    }
}

/// A factory bound to a state snapshot and a store, ready to produce its view-model.
pub struct Bound<F: VmFactory> {
    factory: F,
    scope: Scope<F>,
}

impl<F: VmFactory> Bound<F> {
    /// Runs [`VmFactory::from_store`].
    pub fn produce(self) -> Produced<F> {
        let vm = self.factory.from_store(&self);
        log::trace!(
            "{} produced {}",
            type_name::<F>(),
            if vm.is_some() { "a view-model" } else { "none" }
        );
        Produced {
            scope: self.scope,
            vm,
        }
    }
}
impl<F: VmFactory> VmLifecycle for Bound<F> {
    type Vm = F::Vm;
    fn try_vm(&self) -> Result<&F::Vm, LifecycleError> {
        Err(LifecycleError::NotProduced)
    }
}
impl<F: VmFactory> Deref for Bound<F> {
    type Target = Scope<F>;
    fn deref(&self) -> &Self::Target {
        &self.scope
    }
}

/// A factory that has produced its view-model.
pub struct Produced<F: VmFactory> {
    scope: Scope<F>,
    vm: Option<F::Vm>,
}

impl<F: VmFactory> Produced<F> {
    pub fn into_vm(self) -> Option<F::Vm> {
        self.vm
    }
}
impl<F: VmFactory> VmLifecycle for Produced<F> {
    type Vm = F::Vm;
    fn try_vm(&self) -> Result<&F::Vm, LifecycleError> {
        self.vm.as_ref().ok_or(LifecycleError::ProducedNone)
    }
}
impl<F: VmFactory> Deref for Produced<F> {
    type Target = Scope<F>;
    fn deref(&self) -> &Self::Target {
        &self.scope
    }
}

/// Helpers available to a bound factory, scoped to its state snapshot and store.
pub struct Scope<F: VmFactory> {
    connector: Option<F::Connector>,
    state: Rc<F::State>,
    store: Store<F::State, F::Env>,
}

impl<F: VmFactory> Scope<F> {
    /// Returns the UI node passed with [`Unbound::with_connector`].
    ///
    /// # Panics
    ///
    /// Panics with [`ConfigurationError`] if the factory was created without a connector.
    pub fn connector(&self) -> &F::Connector {
        self.try_connector().unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_connector(&self) -> Result<&F::Connector, ConfigurationError> {
        self.connector.as_ref().ok_or(ConfigurationError {
            factory: type_name::<F>(),
        })
    }

    /// The state the factory was bound to. Never changes.
    pub fn state(&self) -> &Rc<F::State> {
        &self.state
    }

    /// The state of the store now, which may be newer than [`state`](Self::state).
    pub fn current_state(&self) -> Rc<F::State> {
        self.store.state()
    }

    pub fn store(&self) -> &Store<F::State, F::Env> {
        &self.store
    }

    pub fn env(&self) -> &F::Env {
        self.store.env()
    }

    pub fn dispatch(&self, action: impl Action<F::State, F::Env>) -> ActionId {
        self.store.dispatch(action)
    }

    pub fn dispatch_sync(&self, action: impl Action<F::State, F::Env>) -> ActionStatus {
        self.store.dispatch_sync(action)
    }

    pub fn dispatch_and_wait(
        &self,
        action: impl Action<F::State, F::Env>,
    ) -> impl Future<Output = ActionStatus> + 'static {
        self.store.dispatch_and_wait(action)
    }

    pub fn is_waiting(&self, keys: impl Into<ActionKeys>) -> bool {
        self.store.is_waiting(keys)
    }

    pub fn is_failed(&self, keys: impl Into<ActionKeys>) -> bool {
        self.store.is_failed(keys)
    }

    pub fn exception_for(&self, keys: impl Into<ActionKeys>) -> Option<UserException> {
        self.store.exception_for(keys)
    }

    pub fn clear_exception_for(&self, keys: impl Into<ActionKeys>) {
        self.store.clear_exception_for(keys)
    }

    /// Waits until `condition` holds, giving up after [`StoreConfig::wait_timeout`](crate::StoreConfig::wait_timeout).
    pub fn wait_condition(
        &self,
        condition: impl Fn(&F::State) -> bool + 'static,
    ) -> impl Future<Output = Result<(), TimeoutError>> + 'static {
        self.store.wait_condition(condition, None)
    }

    pub fn wait_condition_with(
        &self,
        condition: impl Fn(&F::State) -> bool + 'static,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TimeoutError>> + 'static {
        self.store.wait_condition(condition, Some(timeout))
    }

    /// Waits until none of `ids` is in flight. See [`Store::wait_all_actions`].
    pub fn wait_all_actions(
        &self,
        ids: impl IntoIterator<Item = ActionId>,
    ) -> Result<impl Future<Output = ()> + 'static, WaitActionsError> {
        self.store.wait_all_actions(ids, None)
    }

    pub fn wait_all_actions_with(
        &self,
        ids: impl IntoIterator<Item = ActionId>,
        complete_immediately: bool,
    ) -> Result<impl Future<Output = ()> + 'static, WaitActionsError> {
        self.store.wait_all_actions(ids, Some(complete_immediately))
    }

    pub fn get_and_remove_first_error(&self) -> Option<UserException> {
        self.store.get_and_remove_first_error()
    }

    pub fn prop<V: 'static>(&self, key: &str) -> Option<Rc<V>> {
        self.store.prop(key)
    }

    pub fn set_prop<V: 'static>(&self, key: impl Into<String>, value: V) {
        self.store.set_prop(key, value)
    }
}

/// Binds `factory` to `state` and `store`, produces, and returns the view-model.
///
/// Drives a factory outside of a [`Rebuilder`], typically in tests.
pub fn produce_vm<F: VmFactory>(
    factory: F,
    state: Rc<F::State>,
    store: &Store<F::State, F::Env>,
) -> Option<F::Vm> {
    Unbound::new(factory).bind(state, store).produce().into_vm()
}

/// Recomputes the view-model of one UI node and reports when it must be rebuilt.
pub struct Rebuilder<F: VmFactory> {
    store: Store<F::State, F::Env>,
    new_factory: Box<dyn Fn() -> Unbound<F>>,
    slot: VmSlot<F::Vm>,
}

impl<F: VmFactory> Rebuilder<F>
where
    F::Vm: PartialEq,
{
    /// Creates a `Rebuilder` that obtains a fresh factory from `new_factory` on every recomputation.
    pub fn new(
        store: &Store<F::State, F::Env>,
        new_factory: impl Fn() -> Unbound<F> + 'static,
    ) -> Self {
        Self {
            store: store.clone(),
            new_factory: Box::new(new_factory),
            slot: VmSlot::new(),
        }
    }

    /// Produces a view-model from the current state. Returns true if it differs from the previous one.
    pub fn refresh(&mut self) -> bool {
        let vm = (self.new_factory)()
            .bind_current(&self.store)
            .produce()
            .into_vm();
        let rebuild = self.slot.replace(vm);
        log::debug!(
            "{}: {}",
            type_name::<F::Vm>(),
            if rebuild { "rebuild" } else { "skip rebuild" }
        );
        rebuild
    }

    /// Refreshes on every store change until the view-model differs from the previous one.
    ///
    /// Actions starting or finishing count as changes even if the state stays the same,
    /// so view-models built from [`Scope::is_waiting`] or [`Scope::is_failed`] stay current.
    pub async fn wait_rebuild(&mut self) {
        loop {
            let changes = self.store.changes();
            if self.refresh() {
                return;
            }
            self.store.changed(changes).await;
        }
    }

    pub fn vm(&self) -> Option<&F::Vm> {
        self.slot.get()
    }
}
