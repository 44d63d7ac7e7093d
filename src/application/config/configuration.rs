use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Runtime configuration. Loading the on-disk S-expression config file
/// format (corpus/language/host tables) is out of scope for this crate;
/// these fields are the CLI/env-var surface a future loader would
/// otherwise populate, plus the ambient tunables the mixer needs.
#[derive(Serialize, Deserialize, Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    #[clap(long, default_value_os_t = default_index_dir())]
    #[serde(default = "default_index_dir")]
    /// Directory to store all persistent state (logs, temp indexer output)
    pub index_dir: PathBuf,

    #[clap(long, default_value_t = default_host())]
    #[serde(default = "default_host")]
    /// Loopback host the mixer's ports bind to
    pub host: String,

    #[clap(long, default_value_t = default_query_port())]
    #[serde(default = "default_query_port")]
    /// Port editor clients send queries to
    pub query_port: u16,

    #[clap(long, default_value_t = default_version_port())]
    #[serde(default = "default_version_port")]
    /// Port the version/shutdown service listens on
    pub version_port: u16,

    #[clap(long, default_value_t = default_watcher_port())]
    #[serde(default = "default_watcher_port")]
    /// Port the watcher-command listener listens on
    pub watcher_port: u16,

    #[clap(long, default_value_t = default_max_results())]
    #[serde(default = "default_max_results")]
    /// Cardinality cap applied to every result-returning tag store query
    pub max_results: usize,

    #[clap(long, default_value_t = default_max_snippet_size())]
    #[serde(default = "default_max_snippet_size")]
    /// Truncation length applied to stored tag snippets
    pub max_snippet_size: usize,

    #[clap(long, default_value_t = default_quiescence_window_ms())]
    #[serde(default = "default_quiescence_window_ms")]
    /// Index batcher coalescing window, in milliseconds
    pub quiescence_window_ms: u64,

    #[clap(long)]
    #[serde(default)]
    /// Disable the by-file index (falls back to a linear byTag scan on unload)
    pub disable_by_file_index: bool,

    #[clap(long, default_value_t = default_corpus())]
    #[serde(default = "default_corpus")]
    pub default_corpus: String,

    #[clap(long, default_value_t = default_language())]
    #[serde(default = "default_language")]
    pub default_language: String,

    #[clap(long)]
    #[serde(default)]
    pub default_callers: bool,

    #[clap(long, default_value_os_t = default_indexer_path())]
    #[serde(default = "default_indexer_path")]
    /// Path to the out-of-process indexer binary
    pub indexer_path: PathBuf,
}

impl Configuration {
    /// Directory where logs are written to
    pub fn log_dir(&self) -> PathBuf {
        self.index_dir.join("logs")
    }
}

fn default_index_dir() -> PathBuf {
    match directories::ProjectDirs::from("com", "gtags", "tagmixer") {
        Some(dirs) => dirs.data_dir().to_owned(),
        None => "tagmixer_state".into(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_query_port() -> u16 {
    34271
}

fn default_version_port() -> u16 {
    34272
}

fn default_watcher_port() -> u16 {
    34273
}

fn default_max_results() -> usize {
    2000
}

fn default_max_snippet_size() -> usize {
    512
}

fn default_quiescence_window_ms() -> u64 {
    100
}

fn default_corpus() -> String {
    "default".to_owned()
}

fn default_language() -> String {
    "default".to_owned()
}

fn default_indexer_path() -> PathBuf {
    "gtags-indexer".into()
}
