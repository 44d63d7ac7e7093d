//! Local query engine (C4): wraps the tag store with the S-expression
//! protocol surface, the local-only predicate filter, and a single
//! exclusive lock shared by reads and writes.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::sexpr::{self, Value};
use crate::tags::store::{TagRecord, TagStore};

pub struct LocalEngine {
    store: Mutex<TagStore>,
    server_start_time: (i64, i64),
    sequence: AtomicU64,
}

impl LocalEngine {
    pub fn new(store: TagStore) -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        LocalEngine {
            store: Mutex::new(store),
            server_start_time: (epoch >> 16, epoch & 0xffff),
            sequence: AtomicU64::new(0),
        }
    }

    /// Dispatches one command and returns the fully enveloped response.
    pub fn handle(&self, command: &Value) -> Value {
        let value = self.dispatch(command);
        self.envelope(value)
    }

    fn envelope(&self, value: Value) -> Value {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) as i64;
        Value::list([
            Value::list([
                Value::symbol("server-start-time"),
                Value::list([
                    Value::Int(self.server_start_time.0),
                    Value::Int(self.server_start_time.1),
                ]),
            ]),
            Value::list([Value::symbol("sequence-number"), Value::Int(seq)]),
            Value::list([Value::symbol("value"), value]),
        ])
    }

    fn dispatch(&self, command: &Value) -> Value {
        let Some(op) = command.car().and_then(Value::symbol_name) else {
            return Value::Nil;
        };
        match op {
            "ping" => bool_value(true),
            "log" => bool_value(true),
            "get-server-version" => Value::Int(2),
            "get-supported-protocol-versions" => Value::list([Value::Int(1), Value::Int(2)]),
            "reload-tags-file" => self.reload(command),
            "load-update-file" => self.update(command),
            "lookup-tag-exact" => self.lookup(command, TagStore::find_exact),
            "lookup-tag-prefix-regexp" => self.lookup(command, TagStore::find_prefix),
            "lookup-tag-snippet-regexp" => self.lookup(command, TagStore::find_snippet),
            "lookup-tags-in-file" => self.lookup_in_file(command),
            _ => Value::Nil,
        }
    }

    fn reload(&self, command: &Value) -> Value {
        let Some(path) = string_attr(command, "file") else {
            return bool_value(false);
        };
        bool_value(self.reload_tags_file(Path::new(&path), path.ends_with(".gz")))
    }

    fn update(&self, command: &Value) -> Value {
        let Some(path) = string_attr(command, "file") else {
            return bool_value(false);
        };
        bool_value(self.update_tags_file(Path::new(&path), path.ends_with(".gz")))
    }

    /// Typed entry point used by the index batcher (C11), which has no
    /// reason to round-trip through the S-expression command dispatch.
    pub fn reload_tags_file(&self, path: &Path, gunzip: bool) -> bool {
        let mut store = self.store.lock().expect("tag store mutex poisoned");
        store.reload(path, gunzip)
    }

    pub fn update_tags_file(&self, path: &Path, gunzip: bool) -> bool {
        let mut store = self.store.lock().expect("tag store mutex poisoned");
        store.update(path, gunzip)
    }

    pub fn unload_files_in_dir(&self, prefix: &str) {
        let mut store = self.store.lock().expect("tag store mutex poisoned");
        store.unload_files_in_dir(prefix);
    }

    fn lookup(&self, command: &Value, find: impl Fn(&TagStore, &str) -> Vec<std::sync::Arc<TagRecord>>) -> Value {
        let Some(tag) = string_attr(command, "tag") else {
            return Value::Nil;
        };
        let store = self.store.lock().expect("tag store mutex poisoned");
        let (language, path_prefix) = predicate_attrs(command);
        let records = find(&store, &tag);
        tag_list(records.iter().filter(|r| matches_predicate(r, &language, &path_prefix)))
    }

    fn lookup_in_file(&self, command: &Value) -> Value {
        let Some(file) = string_attr(command, "file") else {
            return Value::Nil;
        };
        let store = self.store.lock().expect("tag store mutex poisoned");
        let (language, path_prefix) = predicate_attrs(command);
        let callers_requested = bool_attr(command, "callers").unwrap_or_else(|| store.callers_default());
        match store.find_by_file(&file) {
            Some(records) => tag_list(
                records
                    .iter()
                    .filter(|r| matches_predicate(r, &language, &path_prefix))
                    .filter(|r| (r.kind == crate::tags::store::TagKind::Call) == callers_requested),
            ),
            None => Value::Nil,
        }
    }
}

/// `record.language` must be prefixed by the request's language, and
/// `record.file` must be prefixed by the client's working-tree root; an
/// empty request attribute matches everything.
fn matches_predicate(record: &TagRecord, language: &str, path_prefix: &str) -> bool {
    record.language.starts_with(language) && record.file.starts_with(path_prefix)
}

fn predicate_attrs(command: &Value) -> (String, String) {
    let language = string_attr(command, "language").unwrap_or_default();
    let path_prefix = string_attr(command, "current-file").unwrap_or_default();
    (language, path_prefix)
}

fn string_attr(command: &Value, key: &str) -> Option<String> {
    sexpr::assoc_get_one(command, key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn bool_attr(command: &Value, key: &str) -> Option<bool> {
    sexpr::assoc_get_one(command, key).map(Value::truthy)
}

fn bool_value(b: bool) -> Value {
    if b {
        Value::symbol("t")
    } else {
        Value::Nil
    }
}

fn tag_list<'a>(records: impl Iterator<Item = &'a std::sync::Arc<TagRecord>>) -> Value {
    Value::list(records.map(|r| record_entry(r)))
}

fn record_entry(record: &TagRecord) -> Value {
    Value::list([
        Value::list([Value::symbol("tag"), Value::string(record.tag.to_string())]),
        Value::list([Value::symbol("snippet"), Value::string(record.snippet.to_string())]),
        Value::list([Value::symbol("filename"), Value::string(record.file.to_string())]),
        Value::list([Value::symbol("lineno"), Value::Int(record.line as i64)]),
        Value::list([Value::symbol("offset"), Value::Int(record.offset as i64)]),
        // directory-distance is reserved for a future ranking heuristic;
        // this codebase always emits 0.
        Value::list([Value::symbol("directory-distance"), Value::Int(0)]),
    ])
}
