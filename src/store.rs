use std::{
    any::{type_name, Any, TypeId},
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
    time::Duration,
};

use derive_ex::derive_ex;
use futures::{
    future::LocalBoxFuture,
    task::{LocalSpawn, LocalSpawnExt},
    FutureExt,
};
use parse_display::Display;
use slabmap::SlabMap;

use crate::utils::timer::{with_timeout_async, TimeoutError};


/// Settings of a [`Store`].
#[derive(Clone, Debug)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct StoreConfig {
    /// Timeout used by `wait_condition` when none is given.
    pub wait_timeout: Duration,

    /// Whether `wait_all_actions` succeeds when none of the actions is in flight, when not specified per call.
    pub complete_immediately: bool,

    /// Maximum number of errors kept for [`Store::get_and_remove_first_error`]. Older errors are dropped.
    pub max_errors_queued: usize,
}
impl StoreConfig {
    pub const fn new() -> Self {
        Self {
            wait_timeout: Duration::from_secs(10 * 60),
            complete_immediately: false,
            max_errors_queued: 10,
        }
    }
}

/// An application-level failure of an action, meant to be shown to the user.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display("{message}")]
pub struct UserException {
    message: String,
    reason: Option<String>,
}
impl UserException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reason: None,
        }
    }
    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..self
        }
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl std::error::Error for UserException {}

/// Identifies one dispatched action.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("#{0}")]
pub struct ActionId(u64);

/// Selects dispatched actions by instance or by type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKey {
    Instance(ActionId),
    Type(TypeId),
}
impl ActionKey {
    /// Selects every action of type `A`.
    pub fn of<A: 'static>() -> Self {
        Self::Type(TypeId::of::<A>())
    }

    fn matches(&self, meta: &ActionMeta) -> bool {
        match self {
            Self::Instance(id) => *id == meta.id,
            Self::Type(type_id) => *type_id == meta.type_id,
        }
    }
}
impl From<ActionId> for ActionKey {
    fn from(id: ActionId) -> Self {
        Self::Instance(id)
    }
}

/// A set of [`ActionKey`]s. Matches an action if any of its keys does.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionKeys(Vec<ActionKey>);

impl ActionKeys {
    fn matches(&self, meta: &ActionMeta) -> bool {
        self.0.iter().any(|key| key.matches(meta))
    }
}
impl From<ActionId> for ActionKeys {
    fn from(id: ActionId) -> Self {
        Self(vec![id.into()])
    }
}
impl From<ActionKey> for ActionKeys {
    fn from(key: ActionKey) -> Self {
        Self(vec![key])
    }
}
impl<T: Into<ActionKey>> From<Vec<T>> for ActionKeys {
    fn from(keys: Vec<T>) -> Self {
        keys.into_iter().collect()
    }
}
impl<T: Into<ActionKey>, const N: usize> From<[T; N]> for ActionKeys {
    fn from(keys: [T; N]) -> Self {
        keys.into_iter().collect()
    }
}
impl<T: Into<ActionKey> + Copy> From<&[T]> for ActionKeys {
    fn from(keys: &[T]) -> Self {
        keys.iter().copied().collect()
    }
}
impl<T: Into<ActionKey>> FromIterator<T> for ActionKeys {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Copy, Debug)]
struct ActionMeta {
    id: ActionId,
    type_id: TypeId,
    type_name: &'static str,
}

/// Outcome of a finished action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionStatus {
    id: ActionId,
    error: Option<UserException>,
}
impl ActionStatus {
    pub fn id(&self) -> ActionId {
        self.id
    }
    pub fn is_completed_ok(&self) -> bool {
        self.error.is_none()
    }
    pub fn is_completed_failed(&self) -> bool {
        self.error.is_some()
    }
    pub fn error(&self) -> Option<&UserException> {
        self.error.as_ref()
    }
}

/// Result of [`Action::reduce`].
///
/// `Ok(None)` keeps the current state.
pub enum Reduction<S> {
    Ready(Result<Option<S>, UserException>),
    Pending(LocalBoxFuture<'static, Result<Option<S>, UserException>>),
}
impl<S> Reduction<S> {
    pub fn state(state: S) -> Self {
        Self::Ready(Ok(Some(state)))
    }
    pub fn unchanged() -> Self {
        Self::Ready(Ok(None))
    }
    pub fn fail(e: UserException) -> Self {
        Self::Ready(Err(e))
    }
    pub fn pending(fut: impl Future<Output = Result<Option<S>, UserException>> + 'static) -> Self {
        Self::Pending(fut.boxed_local())
    }
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// An intended state transition.
pub trait Action<S: 'static, E: 'static = ()>: 'static {
    /// Computes the next state.
    ///
    /// Called once, synchronously, when the action is dispatched.
    /// An asynchronous reducer should read [`Store::state`] when it completes rather than capture the state up front.
    fn reduce(&self, store: &Store<S, E>) -> Reduction<S>;
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum WaitActionsError {
    #[display("`wait_all_actions` was called with no actions.")]
    Empty,
    #[display("none of the actions passed to `wait_all_actions` is in flight.")]
    NotInFlight,
}

impl std::error::Error for WaitActionsError {}

/// Single-threaded container of the application state.
///
/// Cloning a `Store` yields another handle to the same store.
#[derive_ex(Clone, bound())]
pub struct Store<S: 'static, E: 'static = ()>(Rc<StoreNode<S, E>>);

struct StoreNode<S: 'static, E: 'static> {
    state: RefCell<Rc<S>>,
    revision: Cell<u64>,
    changes: Cell<u64>,
    env: E,
    props: RefCell<HashMap<String, Rc<dyn Any>>>,
    spawner: Box<dyn LocalSpawn>,
    config: StoreConfig,
    next_id: Cell<u64>,
    in_flight: RefCell<Vec<ActionMeta>>,
    statuses: RefCell<HashMap<ActionId, Option<ActionStatus>>>,
    failures: RefCell<Vec<(ActionMeta, UserException)>>,
    errors: RefCell<VecDeque<UserException>>,
    watchers: RefCell<SlabMap<Waker>>,
}

impl<S: 'static, E: 'static> Store<S, E> {
    /// Creates a store that runs asynchronous reducers on `spawner`.
    pub fn new(state: S, env: E, spawner: impl LocalSpawn + 'static) -> Self {
        Self::with_config(state, env, spawner, StoreConfig::new())
    }

    pub fn with_config(
        state: S,
        env: E,
        spawner: impl LocalSpawn + 'static,
        config: StoreConfig,
    ) -> Self {
        Self(Rc::new(StoreNode {
            state: RefCell::new(Rc::new(state)),
            revision: Cell::new(0),
            changes: Cell::new(0),
            env,
            props: RefCell::new(HashMap::new()),
            spawner: Box::new(spawner),
            config,
            next_id: Cell::new(0),
            in_flight: RefCell::new(Vec::new()),
            statuses: RefCell::new(HashMap::new()),
            failures: RefCell::new(Vec::new()),
            errors: RefCell::new(VecDeque::new()),
            watchers: RefCell::new(SlabMap::new()),
        }))
    }

    /// Returns the current state.
    pub fn state(&self) -> Rc<S> {
        self.0.state.borrow().clone()
    }

    /// Number of state changes so far.
    pub fn revision(&self) -> u64 {
        self.0.revision.get()
    }

    /// Number of observable changes so far.
    ///
    /// Counts state changes, actions starting or finishing, and cleared failures,
    /// so it also moves when only [`is_waiting`](Self::is_waiting) or [`is_failed`](Self::is_failed) would answer differently.
    pub fn changes(&self) -> u64 {
        self.0.changes.get()
    }

    pub fn env(&self) -> &E {
        &self.0.env
    }

    pub fn config(&self) -> &StoreConfig {
        &self.0.config
    }

    /// Runs `action`.
    ///
    /// A synchronous reducer is applied before this method returns.
    /// An asynchronous reducer is spawned, and the action stays in flight until it completes.
    pub fn dispatch<A: Action<S, E>>(&self, action: A) -> ActionId {
        self.start(action, false, false)
    }

    /// Runs `action`, which must have a synchronous reducer, and returns its outcome.
    ///
    /// # Panics
    ///
    /// Panics if the reducer of `action` is asynchronous.
    pub fn dispatch_sync<A: Action<S, E>>(&self, action: A) -> ActionStatus {
        let id = self.start(action, true, true);
        match self.take_status(id) {
            Some(status) => status,
            None => unreachable!("synchronous action {id} did not complete"),
        }
    }

    /// Runs `action` and returns a future that completes when the action has finished.
    ///
    /// The action is dispatched immediately, not when the future is first polled.
    pub fn dispatch_and_wait<A: Action<S, E>>(
        &self,
        action: A,
    ) -> impl Future<Output = ActionStatus> + 'static {
        let id = self.start(action, true, false);
        let guard = StatusGuard {
            store: self.clone(),
            id,
        };
        self.watch(move |store| {
            let _ = &guard;
            store.take_status(id)
        })
    }

    fn start<A: Action<S, E>>(&self, action: A, track_status: bool, sync_only: bool) -> ActionId {
        let reduction = action.reduce(self);
        if sync_only && reduction.is_async() {
            panic!(
                "`dispatch_sync` cannot run `{}` because its reducer is asynchronous.",
                type_name::<A>()
            );
        }
        let meta = self.0.next_meta::<A>();
        log::trace!("dispatch {} {}", meta.type_name, meta.id);
        self.0
            .failures
            .borrow_mut()
            .retain(|(failed, _)| failed.type_id != meta.type_id);
        if track_status {
            self.0.statuses.borrow_mut().insert(meta.id, None);
        }
        match reduction {
            Reduction::Ready(result) => self.finish(meta, result),
            Reduction::Pending(fut) => {
                self.0.in_flight.borrow_mut().push(meta);
                self.0.notify();
                let store = self.clone();
                let task = async move {
                    let result = fut.await;
                    store.finish(meta, result);
                };
                if let Err(e) = self.0.spawner.spawn_local(task) {
                    log::error!("cannot spawn {} {}: {e}", meta.type_name, meta.id);
                    self.finish(meta, Err(UserException::new(e.to_string())));
                }
            }
        }
        meta.id
    }

    fn finish(&self, meta: ActionMeta, result: Result<Option<S>, UserException>) {
        let error = match result {
            Ok(Some(state)) => {
                *self.0.state.borrow_mut() = Rc::new(state);
                self.0.revision.set(self.0.revision.get() + 1);
                log::debug!("{} {} changed the state", meta.type_name, meta.id);
                None
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("{} {} failed: {e}", meta.type_name, meta.id);
                self.0.push_failure(meta, e.clone());
                Some(e)
            }
        };
        self.0.in_flight.borrow_mut().retain(|m| m.id != meta.id);
        if let Some(status) = self.0.statuses.borrow_mut().get_mut(&meta.id) {
            *status = Some(ActionStatus { id: meta.id, error });
        }
        log::trace!("finish {} {}", meta.type_name, meta.id);
        self.0.notify();
    }

    fn take_status(&self, id: ActionId) -> Option<ActionStatus> {
        let mut statuses = self.0.statuses.borrow_mut();
        if !matches!(statuses.get(&id), Some(Some(_))) {
            return None;
        }
        statuses.remove(&id).flatten()
    }

    /// Returns true if any action selected by `keys` is in flight.
    pub fn is_waiting(&self, keys: impl Into<ActionKeys>) -> bool {
        let keys = keys.into();
        self.0.in_flight.borrow().iter().any(|m| keys.matches(m))
    }

    /// Returns true if the last action of a type selected by `keys` failed.
    pub fn is_failed(&self, keys: impl Into<ActionKeys>) -> bool {
        self.exception_for(keys).is_some()
    }

    /// Returns the error of the last failed action selected by `keys`.
    pub fn exception_for(&self, keys: impl Into<ActionKeys>) -> Option<UserException> {
        let keys = keys.into();
        let failures = self.0.failures.borrow();
        failures
            .iter()
            .find(|(meta, _)| keys.matches(meta))
            .map(|(_, e)| e.clone())
    }

    /// Forgets the failures selected by `keys`.
    pub fn clear_exception_for(&self, keys: impl Into<ActionKeys>) {
        let keys = keys.into();
        let removed = {
            let mut failures = self.0.failures.borrow_mut();
            let len = failures.len();
            failures.retain(|(meta, _)| !keys.matches(meta));
            len - failures.len()
        };
        if removed != 0 {
            self.0.notify();
        }
    }

    /// Waits until `condition` holds for the state.
    ///
    /// Completes on the first poll if `condition` already holds.
    /// Fails with [`TimeoutError`] after `timeout`, or after [`StoreConfig::wait_timeout`] if `timeout` is `None`.
    pub fn wait_condition(
        &self,
        condition: impl Fn(&S) -> bool + 'static,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<(), TimeoutError>> + 'static {
        let timeout = timeout.unwrap_or(self.0.config.wait_timeout);
        let watch = self.watch(move |store| condition(&store.state()).then_some(()));
        with_timeout_async(watch, timeout)
    }

    /// Waits until none of `ids` is in flight.
    ///
    /// Fails immediately if `ids` is empty,
    /// or if none of `ids` is in flight and `complete_immediately` is false.
    /// `complete_immediately` defaults to [`StoreConfig::complete_immediately`].
    pub fn wait_all_actions(
        &self,
        ids: impl IntoIterator<Item = ActionId>,
        complete_immediately: Option<bool>,
    ) -> Result<impl Future<Output = ()> + 'static, WaitActionsError> {
        let keys: ActionKeys = ids.into_iter().collect();
        if keys.0.is_empty() {
            return Err(WaitActionsError::Empty);
        }
        let complete_immediately =
            complete_immediately.unwrap_or(self.0.config.complete_immediately);
        if !complete_immediately && !self.is_waiting(keys.clone()) {
            return Err(WaitActionsError::NotInFlight);
        }
        Ok(self.watch(move |store| (!store.is_waiting(keys.clone())).then_some(())))
    }

    /// Waits until the state changes after `revision`. Returns the new revision.
    pub fn state_changed(&self, revision: u64) -> impl Future<Output = u64> + 'static {
        self.watch(move |store| Some(store.revision()).filter(|&r| r != revision))
    }

    /// Waits until anything counted by [`changes`](Self::changes) happens after `changes`. Returns the new count.
    pub fn changed(&self, changes: u64) -> impl Future<Output = u64> + 'static {
        self.watch(move |store| Some(store.changes()).filter(|&c| c != changes))
    }

    /// Removes and returns the oldest queued user error.
    pub fn get_and_remove_first_error(&self) -> Option<UserException> {
        self.0.errors.borrow_mut().pop_front()
    }

    /// Returns the property stored under `key` if it has type `V`.
    pub fn prop<V: Any>(&self, key: &str) -> Option<Rc<V>> {
        let value = self.0.props.borrow().get(key)?.clone();
        value.downcast().ok()
    }

    pub fn set_prop<V: Any>(&self, key: impl Into<String>, value: V) {
        self.0.props.borrow_mut().insert(key.into(), Rc::new(value));
    }

    pub fn remove_prop(&self, key: &str) -> bool {
        self.0.props.borrow_mut().remove(key).is_some()
    }

    fn watch<T, F>(&self, check: F) -> Watch<S, E, F>
    where
        F: FnMut(&Self) -> Option<T>,
    {
        Watch {
            store: self.clone(),
            key: None,
            check,
        }
    }
}

impl<S: 'static, E: 'static> StoreNode<S, E> {
    fn next_meta<A: 'static>(&self) -> ActionMeta {
        let id = ActionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        ActionMeta {
            id,
            type_id: TypeId::of::<A>(),
            type_name: type_name::<A>(),
        }
    }

    fn push_failure(&self, meta: ActionMeta, e: UserException) {
        let mut failures = self.failures.borrow_mut();
        failures.retain(|(failed, _)| failed.type_id != meta.type_id);
        failures.push((meta, e.clone()));

        let mut errors = self.errors.borrow_mut();
        errors.push_back(e);
        while errors.len() > self.config.max_errors_queued {
            errors.pop_front();
        }
    }

    fn notify(&self) {
        self.changes.set(self.changes.get() + 1);
        let wakers: Vec<Waker> = self
            .watchers
            .borrow()
            .iter()
            .map(|(_, waker)| waker.clone())
            .collect();
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<S: fmt::Debug + 'static, E: 'static> fmt::Debug for Store<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.0.state.borrow())
            .field("in_flight", &self.0.in_flight.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Future completing when `check` returns `Some`. Re-checked whenever the store changes.
struct Watch<S: 'static, E: 'static, F> {
    store: Store<S, E>,
    key: Option<usize>,
    check: F,
}

// `check` is never pinned.
impl<S: 'static, E: 'static, F> Unpin for Watch<S, E, F> {}

impl<S, E, T, F> Future for Watch<S, E, F>
where
    S: 'static,
    E: 'static,
    F: FnMut(&Store<S, E>) -> Option<T>,
{
    type Output = T;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        if let Some(value) = (this.check)(&this.store) {
            this.unregister();
            return Poll::Ready(value);
        }
        let mut watchers = this.store.0.watchers.borrow_mut();
        let registered = match this.key {
            Some(key) => watchers.get_mut(key),
            None => None,
        };
        match registered {
            Some(waker) => {
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => this.key = Some(watchers.insert(cx.waker().clone())),
        }
        Poll::Pending
    }
}
impl<S: 'static, E: 'static, F> Watch<S, E, F> {
    fn unregister(&mut self) {
        if let Some(key) = self.key.take() {
            self.store.0.watchers.borrow_mut().remove(key);
        }
    }
}
impl<S: 'static, E: 'static, F> Drop for Watch<S, E, F> {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Discards the status slot of an abandoned `dispatch_and_wait`.
struct StatusGuard<S: 'static, E: 'static> {
    store: Store<S, E>,
    id: ActionId,
}
impl<S: 'static, E: 'static> Drop for StatusGuard<S, E> {
    fn drop(&mut self) {
        self.store.0.statuses.borrow_mut().remove(&self.id);
    }
}
