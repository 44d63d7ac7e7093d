use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::warn;

use super::{config::configuration::Configuration, logging::tracing::tracing_subscribe};
use crate::mixer::{LanguageSources, Router, RouterDefaults, SourceMap};
use crate::tags::{Interner, LocalEngine, TagStore, TagStoreConfig};
use crate::watch::{WatchDriver, WatchError};

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// Owns the process's long-lived state: the local tag engine, the mixer
/// router sitting in front of it, and the directory watcher feeding it.
/// Construction never binds sockets or spawns tasks; `main` does that
/// once every piece is wired together.
pub struct Application {
    pub config: Configuration,
    pub engine: Arc<LocalEngine>,
    pub router: Arc<Router>,
}

impl Application {
    pub async fn initialize(config: Configuration) -> Self {
        let interner = Arc::new(Interner::new());
        let store_config = TagStoreConfig {
            enable_by_file: !config.disable_by_file_index,
            max_results: config.max_results,
            max_snippet_size: config.max_snippet_size,
        };
        let store = TagStore::new(interner, store_config);
        let engine = Arc::new(LocalEngine::new(store));

        let mut sources = SourceMap::new();
        let corpus = sources.corpus_mut(&config.default_corpus);
        corpus.local = Some(engine.clone());
        corpus
            .languages
            .entry(config.default_language.clone())
            .or_insert_with(LanguageSources::default);
        let router = Arc::new(Router::new(
            sources,
            RouterDefaults {
                corpus: config.default_corpus.clone(),
                language: config.default_language.clone(),
                callers: config.default_callers,
            },
        ));

        Self { config, engine, router }
    }

    pub fn query_addr(&self) -> SocketAddr {
        self.socket(self.config.query_port)
    }

    pub fn version_addr(&self) -> SocketAddr {
        self.socket(self.config.version_port)
    }

    pub fn watcher_addr(&self) -> SocketAddr {
        self.socket(self.config.watcher_port)
    }

    fn socket(&self, port: u16) -> SocketAddr {
        SocketAddr::from_str(&format!("{}:{port}", self.config.host))
            .expect("host:port configuration is a valid socket address")
    }

    pub fn install_logging(config: &Configuration) {
        if let Some(true) = LOGGER_INSTALLED.get() {
            return;
        }

        if let Err(err) = std::fs::create_dir_all(config.log_dir()) {
            warn!(error = %err, "failed to create log directory");
        }

        if !tracing_subscribe(config) {
            warn!("Failed to install tracing_subscriber. There's probably one already...");
        };

        if color_eyre::install().is_err() {
            warn!("Failed to install color-eyre. Oh well...");
        };

        let _ = LOGGER_INSTALLED.set(true);
    }
}

/// Satisfies the watch pipeline's need for a driver without binding any
/// network socket; kept separate from `Application::initialize` because
/// the driver owns an `index_tx` the caller must also hand to the batcher.
pub fn build_watch_driver(
    index_tx: flume::Sender<std::path::PathBuf>,
) -> Result<(Arc<WatchDriver>, std::sync::mpsc::Receiver<notify::Result<notify::Event>>), WatchError> {
    WatchDriver::new(index_tx, None)
}
