use futures::executor::LocalPool;

use crate::{Store, StoreConfig};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn local_store<S: 'static>(state: S) -> (LocalPool, Store<S>) {
    local_store_with(state, StoreConfig::new())
}

pub fn local_store_with<S: 'static>(state: S, config: StoreConfig) -> (LocalPool, Store<S>) {
    init_logger();
    let pool = LocalPool::new();
    let store = Store::with_config(state, (), pool.spawner(), config);
    (pool, store)
}
