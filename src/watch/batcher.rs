//! Index batcher (C11): coalesces a burst of changed-file notifications
//! into one indexer invocation and loads the resulting delta into the
//! local tag store.
//!
//! Grounded on `original_source/indexagent.cc`'s `IndexAgent::Run`/
//! `GetRequests`/`MakeTempFile`/`Index` loop, and on `bg_poll/background_polling.rs`
//! for the `tokio::select!`/`flume` shape of the surrounding task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use crate::tags::LocalEngine;

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub quiescence_window: Duration,
    pub indexer_path: PathBuf,
    pub callgraph: Option<CallgraphConfig>,
}

#[derive(Debug, Clone)]
pub struct CallgraphConfig {
    pub indexer_path: PathBuf,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        BatcherConfig {
            quiescence_window: Duration::from_millis(100),
            indexer_path: PathBuf::from("gtags-indexer"),
            callgraph: None,
        }
    }
}

/// Runs until `index_rx` closes. One iteration: block for the first
/// changed path, sleep out the quiescence window, drain whatever else
/// arrived, sort+dedupe, invoke the indexer, and load its output.
pub async fn run(
    index_rx: flume::Receiver<PathBuf>,
    engine: Arc<LocalEngine>,
    callgraph_engine: Option<Arc<LocalEngine>>,
    config: BatcherConfig,
) {
    while let Ok(first) = index_rx.recv_async().await {
        tokio::time::sleep(config.quiescence_window).await;

        let mut batch = vec![first];
        while let Ok(path) = index_rx.try_recv() {
            batch.push(path);
        }
        batch.sort();
        batch.dedup();

        run_indexer(&config.indexer_path, &batch, &engine, false).await;

        if let Some(callgraph) = &config.callgraph {
            let target = callgraph_engine.as_ref().unwrap_or(&engine);
            run_indexer(&callgraph.indexer_path, &batch, target, true).await;
        }
    }
}

async fn run_indexer(indexer_path: &std::path::Path, batch: &[PathBuf], engine: &LocalEngine, callgraph: bool) {
    let Ok(tmp) = tempfile::NamedTempFile::new() else {
        tracing::error!("failed to create temp file for indexer output");
        return;
    };

    let mut command = Command::new(indexer_path);
    command.arg(format!("--output_file={}", tmp.path().display()));
    if callgraph {
        command.arg("--callgraph");
    }
    command.args(batch);

    match command.status().await {
        Ok(status) if status.success() => {
            if !engine.update_tags_file(tmp.path(), false) {
                tracing::warn!(path = %tmp.path().display(), "indexer output failed to load");
            }
        }
        Ok(status) => {
            tracing::warn!(?status, "indexer subprocess exited non-zero, discarding batch");
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to spawn indexer subprocess");
        }
    }
    // tmp is removed on drop regardless of outcome.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{Interner, TagStore, TagStoreConfig};

    #[tokio::test]
    async fn quiescence_window_coalesces_a_burst_into_one_batch() {
        let (tx, rx) = flume::unbounded();
        for i in 0..5 {
            tx.send(PathBuf::from(format!("/repo/file{i}.rs"))).unwrap();
        }
        drop(tx);

        // Drive one iteration manually to confirm the drain picks up the
        // whole burst rather than processing one path at a time.
        let first = rx.recv_async().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut batch = vec![first];
        while let Ok(p) = rx.try_recv() {
            batch.push(p);
        }
        assert_eq!(batch.len(), 5);
    }

    #[test]
    fn engine_exposes_update_for_batcher() {
        let interner = Arc::new(Interner::new());
        let store = TagStore::new(interner, TagStoreConfig::default());
        let engine = LocalEngine::new(store);
        assert!(!engine.update_tags_file(std::path::Path::new("/nonexistent"), false));
    }
}
