//! Watch-command worker (C12): a single consumer serializing external
//! add/remove/exclude operations onto the watch driver.
//!
//! Grounded on `original_source/filewatcherrequesthandler.cc`'s
//! `FileWatcherRequestWorker::Run` and `FileWatcherRequestHandler::Push`,
//! which establish the EXCLUDE-before/UN_EXCLUDE-after ordering around an
//! ADD or REMOVE so excludes are scoped to one operation.

use std::path::PathBuf;
use std::sync::Arc;

use super::driver::WatchDriver;
use crate::tags::LocalEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(PathBuf),
    Remove(PathBuf),
    Exclude(String),
    UnExclude(String),
}

/// Runs until `rx` closes, applying commands to `driver` one at a time.
/// A `Remove` additionally purges the removed subtree's tags from every
/// engine passed in (the definition store and, if present, the caller
/// store).
pub async fn run(rx: flume::Receiver<Command>, driver: Arc<WatchDriver>, engines: Vec<Arc<LocalEngine>>) {
    while let Ok(command) = rx.recv_async().await {
        match command {
            Command::Add(dir) => {
                if let Err(err) = driver.add_directory_recursive(&dir) {
                    tracing::warn!(dir = %dir.display(), error = %err, "failed to add watch directory");
                }
            }
            Command::Remove(dir) => {
                if let Err(err) = driver.remove_directory_recursive(&dir) {
                    tracing::warn!(dir = %dir.display(), error = %err, "failed to remove watch directory");
                }
                let prefix = dir.to_string_lossy().into_owned();
                for engine in &engines {
                    engine.unload_files_in_dir(&prefix);
                }
            }
            Command::Exclude(basename) => driver.exclude(&basename),
            Command::UnExclude(basename) => driver.un_exclude(&basename),
        }
    }
}

/// Producer API: enqueues `EXCLUDE` for every entry in `excludes`, then
/// `ADD` for every directory, then `UN_EXCLUDE` to unwind the excludes —
/// they're scoped to this one operation, not left behind.
pub fn add(tx: &flume::Sender<Command>, dirs: &[PathBuf], excludes: &[String]) {
    push_scoped(tx, dirs.iter().cloned().map(Command::Add), excludes);
}

pub fn remove(tx: &flume::Sender<Command>, dirs: &[PathBuf], excludes: &[String]) {
    push_scoped(tx, dirs.iter().cloned().map(Command::Remove), excludes);
}

fn push_scoped(tx: &flume::Sender<Command>, ops: impl Iterator<Item = Command>, excludes: &[String]) {
    for basename in excludes {
        let _ = tx.send(Command::Exclude(basename.clone()));
    }
    for op in ops {
        let _ = tx.send(op);
    }
    for basename in excludes {
        let _ = tx.send(Command::UnExclude(basename.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_add_emits_exclude_add_unexclude_in_order() {
        let (tx, rx) = flume::unbounded();
        add(
            &tx,
            &[PathBuf::from("dir1"), PathBuf::from("dir2"), PathBuf::from("dir3")],
            &["dir1".to_string(), "dir2".to_string()],
        );
        drop(tx);
        let drained: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            drained,
            vec![
                Command::Exclude("dir1".into()),
                Command::Exclude("dir2".into()),
                Command::Add(PathBuf::from("dir1")),
                Command::Add(PathBuf::from("dir2")),
                Command::Add(PathBuf::from("dir3")),
                Command::UnExclude("dir1".into()),
                Command::UnExclude("dir2".into()),
            ]
        );
    }
}
