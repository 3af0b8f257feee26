//! A process-wide, thread-shareable collection of loaded [`TableSet`]s.

use crate::table_set::TableSet;
use crate::version::TableVersionKey;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// Owns zero or more loaded [`TableSet`]s, keyed by [`TableVersionKey`].
///
/// "a `TableStore` owns a map of `(master_version, local_version) -> Arc<TableSet>`
/// so engine instances share table data across threads without cloning it."
/// (SPEC_FULL §4.8)
#[derive(Debug, Default)]
pub struct TableStore {
    sets: RwLock<FxHashMap<TableVersionKey, Arc<TableSet>>>,
}

impl TableStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table snapshot under the given key, replacing any previous
    /// snapshot for that key.
    pub fn insert(&self, key: TableVersionKey, set: TableSet) {
        self.sets.write().unwrap().insert(key, Arc::new(set));
    }

    /// Fetch the snapshot for a key, if loaded.
    pub fn get(&self, key: TableVersionKey) -> Option<Arc<TableSet>> {
        self.sets.read().unwrap().get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standard::seed_table_set;

    #[test]
    fn insert_and_fetch() {
        let store = TableStore::new();
        let key = TableVersionKey::new(0, 0, 0, 0, 0);
        store.insert(key, seed_table_set());

        assert!(store.get(key).is_some());
        assert!(store.get(TableVersionKey::new(0, 0, 0, 99, 0)).is_none());
    }
}
