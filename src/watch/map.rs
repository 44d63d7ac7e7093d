//! Directory-watch map (C9): thread-safe bidirectional path ↔ watch-id
//! map with subtree queries.
//!
//! Grounded on `repo/state.rs`'s shared-map pattern, but backed by a
//! `RwLock<BTreeMap<..>>` rather than `scc::HashMap`: `subdirs`/
//! `subdirWatches` need an ordered lexicographic prefix scan, which `scc`'s
//! hash-bucket iteration doesn't give us cheaply.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Inner {
    path_to_watch: BTreeMap<Arc<str>, u64>,
    watch_to_path: HashMap<u64, Arc<str>>,
}

#[derive(Default)]
pub struct WatchMap {
    inner: RwLock<Inner>,
}

impl WatchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` under `id`. A duplicate add on an
    /// already-watched directory is idempotent and returns the existing
    /// id rather than overwriting it.
    pub fn add(&self, path: &str, id: u64) -> u64 {
        let mut inner = self.inner.write().expect("watch map lock poisoned");
        if let Some(&existing) = inner.path_to_watch.get(path) {
            return existing;
        }
        let path: Arc<str> = Arc::from(path);
        inner.path_to_watch.insert(path.clone(), id);
        inner.watch_to_path.insert(id, path);
        id
    }

    /// Unregisters `id`. A no-op if `id` isn't registered.
    pub fn remove(&self, id: u64) {
        let mut inner = self.inner.write().expect("watch map lock poisoned");
        if let Some(path) = inner.watch_to_path.remove(&id) {
            inner.path_to_watch.remove(&path);
        }
    }

    pub fn watch_of(&self, path: &str) -> Option<u64> {
        self.inner
            .read()
            .expect("watch map lock poisoned")
            .path_to_watch
            .get(path)
            .copied()
    }

    pub fn path_of(&self, id: u64) -> Option<Arc<str>> {
        self.inner
            .read()
            .expect("watch map lock poisoned")
            .watch_to_path
            .get(&id)
            .cloned()
    }

    pub fn subdirs(&self, prefix: &str) -> Vec<Arc<str>> {
        let inner = self.inner.read().expect("watch map lock poisoned");
        inner
            .path_to_watch
            .range(Arc::from(prefix)..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn subdir_watches(&self, prefix: &str) -> Vec<u64> {
        let inner = self.inner.read().expect("watch map lock poisoned");
        inner
            .path_to_watch
            .range(Arc::from(prefix)..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("watch map lock poisoned").path_to_watch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_lookup_both_directions() {
        let map = WatchMap::new();
        map.add("/a/b", 1);
        assert_eq!(map.watch_of("/a/b"), Some(1));
        assert_eq!(map.path_of(1).as_deref(), Some("/a/b"));
    }

    #[test]
    fn duplicate_add_returns_existing_id() {
        let map = WatchMap::new();
        assert_eq!(map.add("/a/b", 1), 1);
        assert_eq!(map.add("/a/b", 2), 1);
        assert_eq!(map.watch_of("/a/b"), Some(1));
    }

    #[test]
    fn remove_is_a_no_op_for_unknown_id() {
        let map = WatchMap::new();
        map.remove(999);
        assert!(map.is_empty());
    }

    #[test]
    fn subdirs_returns_only_matching_prefix() {
        let map = WatchMap::new();
        map.add("/a/b", 1);
        map.add("/a/c", 2);
        map.add("/x/y", 3);
        let mut subdirs: Vec<_> = map.subdirs("/a").iter().map(|s| s.to_string()).collect();
        subdirs.sort();
        assert_eq!(subdirs, vec!["/a/b".to_string(), "/a/c".to_string()]);
        assert_eq!(map.subdir_watches("/x").len(), 1);
    }

    #[test]
    fn add_then_remove_leaves_no_entries_under_prefix() {
        let map = WatchMap::new();
        let id = map.add("/a/b", 1);
        map.remove(id);
        assert!(map.subdirs("/a").is_empty());
        assert_eq!(map.watch_of("/a/b"), None);
    }
}
