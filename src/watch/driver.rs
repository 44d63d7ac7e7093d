//! Watch driver (C10): recursive add/remove over the watch map, the
//! exclude list, and the event filter chain that turns kernel events into
//! index-queue entries.
//!
//! Grounded on `bg_poll/background_polling.rs`'s debounced-watcher setup,
//! generalized from "poll one repo's dirty flag" to the full recursive
//! add/remove/exclude state machine described in
//! `original_source/trunk/filewatcher.cc`. Driven directly over `notify`
//! (not `notify-debouncer-mini`) since the quiescence coalescing here is
//! a purpose-built step in the index batcher (C11), not a generic
//! debounce.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;

use notify::Watcher as _;

use super::map::WatchMap;

#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    #[error("i/o error from kernel watch")]
    Io(#[from] std::io::Error),
    #[error("notify backend error")]
    Notify(#[from] notify::Error),
}

/// Basename-only exclude set, mutable at runtime via `EXCLUDE`/`UN_EXCLUDE`.
pub type ExcludeSet = scc::HashSet<String>;

pub struct WatchDriver {
    map: Arc<WatchMap>,
    exclude: Arc<ExcludeSet>,
    index_tx: flume::Sender<PathBuf>,
    next_id: AtomicU64,
    watcher: Mutex<notify::RecommendedWatcher>,
    allowed_extensions: Option<HashSet<String>>,
}

impl WatchDriver {
    /// Creates a driver plus the raw channel its background notify
    /// callback feeds; the caller is expected to forward that channel
    /// into [`WatchDriver::handle_event`] from a blocking task (notify's
    /// own callback runs on a foreign thread, not inside tokio).
    pub fn new(
        index_tx: flume::Sender<PathBuf>,
        allowed_extensions: Option<HashSet<String>>,
    ) -> Result<(Arc<Self>, std::sync::mpsc::Receiver<notify::Result<notify::Event>>), WatchError>
    {
        let (raw_tx, raw_rx) = std::sync::mpsc::channel();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        let driver = Arc::new(WatchDriver {
            map: Arc::new(WatchMap::new()),
            exclude: Arc::new(scc::HashSet::new()),
            index_tx,
            next_id: AtomicU64::new(1),
            watcher: Mutex::new(watcher),
            allowed_extensions,
        });
        Ok((driver, raw_rx))
    }

    pub fn map(&self) -> &WatchMap {
        &self.map
    }

    pub fn exclude(&self, basename: &str) {
        let _ = self.exclude.insert(basename.to_string());
    }

    pub fn un_exclude(&self, basename: &str) {
        self.exclude.remove(basename);
    }

    fn is_excluded(&self, basename: &str) -> bool {
        self.exclude.contains(basename)
    }

    fn passes_filters(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if forbidden_prefix(name) {
            return false;
        }
        if let Some(allowed) = &self.allowed_extensions {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !allowed.contains(ext) {
                return false;
            }
        }
        true
    }

    /// Descends `root` with `lstat` semantics (symlinks are never
    /// followed), skipping excluded basenames; every file that passes the
    /// filters is emitted once as an import, then every directory is
    /// registered post-order so a directory's children are already
    /// watchable by the time it starts receiving events.
    pub fn add_directory_recursive(&self, root: &Path) -> Result<(), WatchError> {
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            let basename = entry.file_name().to_string_lossy().into_owned();
            if self.is_excluded(&basename) {
                continue;
            }
            let meta = fs::symlink_metadata(&path)?;
            if meta.is_dir() {
                self.add_directory_recursive(&path)?;
            } else if meta.is_file() && self.passes_filters(&path) {
                let _ = self.index_tx.send(path);
            }
        }
        self.register_watch(root)
    }

    fn register_watch(&self, dir: &Path) -> Result<(), WatchError> {
        let path_str = dir.to_string_lossy().into_owned();
        if self.map.watch_of(&path_str).is_some() {
            return Ok(()); // duplicate add on an already-watched dir is idempotent
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.watcher
            .lock()
            .expect("watcher mutex poisoned")
            .watch(dir, notify::RecursiveMode::NonRecursive)?;
        self.map.add(&path_str, id);
        Ok(())
    }

    /// Unwatches every directory at or under `root`. Does not touch the
    /// tag store; purging loaded tags for the removed subtree is the
    /// watch-command worker's job (C12).
    pub fn remove_directory_recursive(&self, root: &Path) -> Result<(), WatchError> {
        let prefix = root.to_string_lossy().into_owned();
        for path in self.map.subdirs(&prefix) {
            let _ = self.watcher.lock().expect("watcher mutex poisoned").unwatch(Path::new(&*path));
            if let Some(id) = self.map.watch_of(&path) {
                self.map.remove(id);
            }
        }
        Ok(())
    }

    pub fn handle_event(&self, event: notify::Event) {
        use notify::EventKind;
        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    if let Ok(meta) = fs::symlink_metadata(path) {
                        if meta.is_dir() {
                            let _ = self.add_directory_recursive(path);
                        } else if self.passes_filters(path) {
                            let _ = self.index_tx.send(path.clone());
                        }
                    }
                }
            }
            EventKind::Modify(_) => {
                for path in &event.paths {
                    if self.passes_filters(path) {
                        let _ = self.index_tx.send(path.clone());
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    let path_str = path.to_string_lossy().into_owned();
                    if self.map.watch_of(&path_str).is_some() {
                        let _ = self.remove_directory_recursive(path);
                    } else if self.passes_filters(path) {
                        let _ = self.index_tx.send(path.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

/// Forbidden-prefix filter: dotfiles, editor lock/backup files.
fn forbidden_prefix(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('#') || name.ends_with('#') || name.ends_with('~')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_driver() -> (Arc<WatchDriver>, std::sync::mpsc::Receiver<notify::Result<notify::Event>>) {
        let (tx, _rx) = flume::unbounded();
        WatchDriver::new(tx, None).unwrap()
    }

    #[test]
    fn s9_exclude_then_add_skips_excluded_subdir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("x")).unwrap();
        fs::write(dir.path().join("x").join("f.txt"), "hi").unwrap();
        fs::write(dir.path().join("keep.txt"), "hi").unwrap();

        let (driver, _rx) = new_driver();
        driver.exclude("x");
        driver.add_directory_recursive(dir.path()).unwrap();

        let prefix = dir.path().join("x").to_string_lossy().into_owned();
        assert!(driver.map().subdirs(&prefix).is_empty());
        assert!(driver.map().watch_of(&dir.path().to_string_lossy()).is_some());
    }

    #[test]
    fn s8_add_then_remove_leaves_no_watch_under_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let (driver, _rx) = new_driver();
        driver.add_directory_recursive(dir.path()).unwrap();
        assert!(driver.map().watch_of(&dir.path().to_string_lossy()).is_some());

        driver.remove_directory_recursive(dir.path()).unwrap();
        let prefix = dir.path().to_string_lossy().into_owned();
        assert!(driver.map().subdirs(&prefix).is_empty());
    }

    #[test]
    fn dotfiles_are_filtered_out_of_imports() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".hidden"), "hi").unwrap();
        fs::write(dir.path().join("visible.rs"), "hi").unwrap();

        let (tx, rx) = flume::unbounded();
        let (driver, _raw) = WatchDriver::new(tx, None).unwrap();
        driver.add_directory_recursive(dir.path()).unwrap();

        let imported: Vec<_> = rx.try_iter().collect();
        assert_eq!(imported.len(), 1);
        assert!(imported[0].to_string_lossy().ends_with("visible.rs"));
    }
}
