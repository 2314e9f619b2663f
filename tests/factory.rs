use std::{cell::RefCell, rc::Rc};

use futures::{channel::oneshot, executor::LocalPool, task::LocalSpawnExt};
use pretty_assertions::assert_eq;
use statevm::{
    fields, Action, ActionKey, Bound, Callback, Rebuilder, Reduction, Store, Unbound,
    UserException, ViewModel, Vm, VmFactory, VmLifecycle,
};

#[derive(Clone, Debug, Default)]
struct TodoState {
    items: Vec<String>,
    filter: String,
}

struct AddItem(String);
impl Action<TodoState, Services> for AddItem {
    fn reduce(&self, store: &Store<TodoState, Services>) -> Reduction<TodoState> {
        if self.0.is_empty() {
            return Reduction::fail(UserException::new("empty item").with_reason("text is empty"));
        }
        let mut s = (*store.state()).clone();
        s.items.push(self.0.clone());
        Reduction::state(s)
    }
}

struct SetFilter(String);
impl Action<TodoState, Services> for SetFilter {
    fn reduce(&self, store: &Store<TodoState, Services>) -> Reduction<TodoState> {
        let mut s = (*store.state()).clone();
        s.filter = self.0.clone();
        Reduction::state(s)
    }
}

struct Load;
impl Action<TodoState, Services> for Load {
    fn reduce(&self, store: &Store<TodoState, Services>) -> Reduction<TodoState> {
        let loaded = store.env().loaded.borrow_mut().take();
        let store = store.clone();
        Reduction::pending(async move {
            let items = match loaded {
                Some(loaded) => loaded.await.map_err(|_| UserException::new("load failed"))?,
                None => return Err(UserException::new("already loaded")),
            };
            let mut s = (*store.state()).clone();
            s.items.extend(items);
            Ok::<_, UserException>(Some(s))
        })
    }
}

struct Services {
    loaded: RefCell<Option<oneshot::Receiver<Vec<String>>>>,
}

#[derive(ViewModel)]
struct ListVm {
    vm: Vm,
    visible: Vec<String>,
    is_loading: bool,
    on_add: Callback<String>,
}

struct ListFactory;

impl VmFactory for ListFactory {
    type State = TodoState;
    type Env = Services;
    type Connector = ();
    type Vm = ListVm;

    fn from_store(&self, cx: &Bound<Self>) -> Option<ListVm> {
        let state = cx.state();
        let visible: Vec<String> = state
            .items
            .iter()
            .filter(|item| item.contains(state.filter.as_str()))
            .cloned()
            .collect();
        let is_loading = cx.is_waiting(ActionKey::of::<Load>());
        let store = cx.store().clone();
        Some(ListVm {
            vm: Vm::new::<ListVm>(fields![visible, is_loading]),
            visible,
            is_loading,
            on_add: Callback::new(move |text| {
                store.dispatch(AddItem(text));
            }),
        })
    }
}

fn todo_store() -> (LocalPool, Store<TodoState, Services>, oneshot::Sender<Vec<String>>) {
    let (sender, receiver) = oneshot::channel();
    let pool = LocalPool::new();
    let services = Services {
        loaded: RefCell::new(Some(receiver)),
    };
    let store = Store::new(TodoState::default(), services, pool.spawner());
    (pool, store, sender)
}

#[test]
fn rebuilds_only_on_visible_changes() {
    let (mut pool, store, loaded) = todo_store();
    let rebuilds = Rc::new(RefCell::new(Vec::new()));
    pool.spawner()
        .spawn_local({
            let store = store.clone();
            let rebuilds = rebuilds.clone();
            async move {
                let mut rebuilder = Rebuilder::new(&store, || Unbound::new(ListFactory));
                loop {
                    rebuilder.wait_rebuild().await;
                    if let Some(vm) = rebuilder.vm() {
                        rebuilds
                            .borrow_mut()
                            .push((vm.visible.clone(), vm.is_loading));
                    }
                }
            }
        })
        .unwrap();
    pool.run_until_stalled();
    assert_eq!(*rebuilds.borrow(), vec![(vec![], false)]);

    store.dispatch(Load);
    store.dispatch(SetFilter("x".into()));
    pool.run_until_stalled();
    assert_eq!(*rebuilds.borrow(), vec![(vec![], false), (vec![], true)]);

    store.dispatch(SetFilter("xy".into()));
    pool.run_until_stalled();
    assert_eq!(rebuilds.borrow().len(), 2);

    store.dispatch(SetFilter("x".into()));
    loaded.send(vec!["a".into(), "xb".into()]).unwrap();
    pool.run_until_stalled();
    assert_eq!(rebuilds.borrow().len(), 3);
    assert_eq!(rebuilds.borrow()[2], (vec!["xb".to_string()], false));
    assert_eq!(store.state().items.len(), 2);
}

#[test]
fn loading_flag_is_relevant() {
    let (mut pool, store, loaded) = todo_store();
    let mut rebuilder = Rebuilder::new(&store, || Unbound::new(ListFactory));
    assert!(rebuilder.refresh());

    store.dispatch(Load);
    assert!(rebuilder.refresh());
    assert_eq!(rebuilder.vm().map(|vm| vm.is_loading), Some(true));

    loaded.send(vec![]).unwrap();
    pool.run_until_stalled();
    assert!(rebuilder.refresh());
    assert_eq!(rebuilder.vm().map(|vm| vm.is_loading), Some(false));
}

#[test]
fn callback_from_view_model_dispatches() {
    let (_pool, store, _loaded) = todo_store();
    let produced = Unbound::new(ListFactory).bind_current(&store).produce();
    produced.vm().on_add.call("milk".into());
    assert_eq!(store.state().items, vec!["milk".to_string()]);
    assert_eq!(produced.vm().visible, Vec::<String>::new());

    produced.vm().on_add.call(String::new());
    assert!(store.is_failed(ActionKey::of::<AddItem>()));
    let e = store.get_and_remove_first_error().unwrap();
    assert_eq!(e.message(), "empty item");
    assert_eq!(e.reason(), Some("text is empty"));
}

#[test]
fn failed_load_is_reported() {
    let (mut pool, store, loaded) = todo_store();
    let id = store.dispatch(Load);
    drop(loaded);
    pool.run_until_stalled();
    assert!(store.is_failed(id));
    assert_eq!(
        store.exception_for(ActionKey::of::<Load>()).map(|e| e.message().to_string()),
        Some("load failed".to_string())
    );
}

#[test]
fn loading_alone_triggers_rebuild() {
    let (mut pool, store, loaded) = todo_store();
    let rebuilds = Rc::new(RefCell::new(Vec::new()));
    pool.spawner()
        .spawn_local({
            let store = store.clone();
            let rebuilds = rebuilds.clone();
            async move {
                let mut rebuilder = Rebuilder::new(&store, || Unbound::new(ListFactory));
                loop {
                    rebuilder.wait_rebuild().await;
                    if let Some(vm) = rebuilder.vm() {
                        rebuilds.borrow_mut().push(vm.is_loading);
                    }
                }
            }
        })
        .unwrap();
    pool.run_until_stalled();

    store.dispatch(Load);
    pool.run_until_stalled();
    assert_eq!(*rebuilds.borrow(), vec![false, true]);

    drop(loaded);
    pool.run_until_stalled();
    assert_eq!(*rebuilds.borrow(), vec![false, true, false]);
    assert!(store.is_failed(ActionKey::of::<Load>()));
}
