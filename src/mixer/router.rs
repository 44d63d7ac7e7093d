//! Request router (C7): parses one query, resolves it to a source set,
//! spawns the remote RPCs and the local lookup, and owns the mixer that
//! joins them.
//!
//! Grounded on `MixerRequestHandler::Execute`/`CreateDataSourceRequest` in
//! the reference mixer: the ping short-circuit, the corpus/language
//! mapping failure messages, and the "copy before any network call"
//! discipline for the request buffer (satisfied here simply by owning
//! `String`s rather than borrowing the caller's buffer).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::sexpr::{self, Value};
use crate::tags::LocalEngine;

use super::result_holder::ResultHolder;
use super::result_mixer::{ResultMixer, LOCAL, REMOTE};
use super::shard_client::query_shard;

/// The remote shard addresses serving one (corpus, language) pair.
#[derive(Debug, Clone, Default)]
pub struct LanguageSources {
    pub definitions: Vec<SocketAddr>,
    pub callers: Option<Vec<SocketAddr>>,
}

#[derive(Default)]
pub struct CorpusSources {
    pub languages: HashMap<String, LanguageSources>,
    pub local: Option<Arc<LocalEngine>>,
}

/// The `sources[corpus][language] -> (definitions, callers)` map described
/// in `original_source/settings.h`'s `DataSourceMap`/`LanguageMap`, built
/// from the (out-of-scope) config-file bootstrap.
#[derive(Default)]
pub struct SourceMap {
    pub corpora: HashMap<String, CorpusSources>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn corpus_mut(&mut self, corpus: impl Into<String>) -> &mut CorpusSources {
        self.corpora.entry(corpus.into()).or_default()
    }
}

#[derive(Debug, Clone)]
pub struct RouterDefaults {
    pub corpus: String,
    pub language: String,
    pub callers: bool,
}

pub struct Router {
    sources: SourceMap,
    defaults: RouterDefaults,
}

struct DataSourceRequest {
    corpus: String,
    language: String,
    callers: bool,
    canonical_request: String,
}

impl Router {
    pub fn new(sources: SourceMap, defaults: RouterDefaults) -> Self {
        Router { sources, defaults }
    }

    /// Handles one already-unframed command line and returns the response
    /// to write back to the client, without the trailing newline.
    pub async fn handle(&self, raw: &str) -> String {
        let parsed = match sexpr::parse(raw) {
            Ok(value) => value,
            // A malformed request is treated as a ping.
            Err(_) => return "((value t))".to_string(),
        };

        if is_ping(&parsed) {
            return "((value t))".to_string();
        }

        let request = self.build_request(&parsed);

        let Some(corpus_sources) = self.sources.corpora.get(&request.corpus) else {
            return error_response(&format!("Failed to find corpus {}", request.corpus));
        };
        let Some(language_sources) = corpus_sources.languages.get(&request.language) else {
            return error_response(&format!(
                "Failed to map language {}, callers: {}, corpus: {} into RPC stubs.",
                request.language, request.callers, request.corpus
            ));
        };
        let shards: &[SocketAddr] = if request.callers {
            match &language_sources.callers {
                Some(shards) => shards,
                None => {
                    return error_response(&format!(
                        "{} does not support caller type {}",
                        request.language, request.callers
                    ))
                }
            }
        } else {
            &language_sources.definitions
        };

        let (tx, rx) = oneshot::channel::<String>();
        let tx = std::sync::Mutex::new(Some(tx));
        let mixer = Arc::new(ResultMixer::new(Box::new(move |response| {
            if let Some(tx) = tx.lock().expect("oneshot mutex poisoned").take() {
                let _ = tx.send(response);
            }
        })));

        let remote_holder = ResultHolder::new(mixer.clone(), REMOTE, shards.len());
        for &addr in shards {
            let holder = remote_holder.clone();
            let request_text = request.canonical_request.clone();
            tokio::spawn(async move { query_shard(addr, request_text, holder).await });
        }
        if shards.is_empty() {
            remote_holder.report_failure("no shards configured".to_string());
        }

        match &corpus_sources.local {
            Some(engine) => {
                let holder = ResultHolder::new(mixer.clone(), LOCAL, 1);
                let response = sexpr::repr(&engine.handle(&parsed));
                holder.report_success(response);
            }
            None => mixer.set_result(LOCAL, String::new()),
        }

        rx.await.unwrap_or_else(|_| error_response("mixer dropped without completing"))
    }

    fn build_request(&self, parsed: &Value) -> DataSourceRequest {
        let corpus = sexpr::assoc_get_one(parsed, "corpus")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.corpus.clone());
        let language = sexpr::assoc_get_one(parsed, "language")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.language.clone());
        let callers = sexpr::assoc_get_one(parsed, "callers")
            .map(Value::truthy)
            .unwrap_or(self.defaults.callers);
        DataSourceRequest {
            corpus,
            language,
            callers,
            canonical_request: sexpr::repr(parsed),
        }
    }
}

fn is_ping(parsed: &Value) -> bool {
    parsed.car().and_then(Value::symbol_name) == Some("ping")
}

fn error_response(message: &str) -> String {
    sexpr::repr(&Value::list([Value::list([
        Value::symbol("error"),
        Value::list([Value::list([Value::symbol("message"), Value::string(message)])]),
    ])]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn s1_ping_short_circuits_without_fan_out() {
        let router = Router::new(
            SourceMap::new(),
            RouterDefaults {
                corpus: "corpus1".into(),
                language: "c++".into(),
                callers: false,
            },
        );
        let response = router.handle(r#"(ping (language "c++"))"#).await;
        assert_eq!(response, "((value t))");
    }

    #[tokio::test]
    async fn unknown_corpus_reports_mapping_error() {
        let router = Router::new(
            SourceMap::new(),
            RouterDefaults {
                corpus: "corpus1".into(),
                language: "c++".into(),
                callers: false,
            },
        );
        let response = router.handle(r#"((language "c++"))"#).await;
        assert_eq!(response, r#"((error ((message "Failed to find corpus corpus1"))))"#);
    }

    #[tokio::test]
    async fn no_local_entry_waits_for_remote_alone() {
        let mut sources = SourceMap::new();
        sources.corpus_mut("corpus1").languages.insert(
            "c++".into(),
            LanguageSources {
                definitions: vec![],
                callers: None,
            },
        );
        let router = Router::new(
            sources,
            RouterDefaults {
                corpus: "corpus1".into(),
                language: "c++".into(),
                callers: false,
            },
        );
        let response = router.handle(r#"((language "c++"))"#).await;
        assert_eq!(response, "((error ((message \"no shards configured\"))))");
    }
}
