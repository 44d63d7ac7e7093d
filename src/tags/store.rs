//! In-memory tag index: by-tag, by-file and by-basename multimaps over
//! immutable tag records, plus the tag-file grammar parser that feeds
//! them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Read as _;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::sexpr::{self, ReadOutcome, Value};

use super::intern::{intern_path, Interner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Call,
    GenericDefn,
    TypeDefn,
    VariableDefn,
    FunctionDefn,
}

impl TagKind {
    fn is_definition(self) -> bool {
        !matches!(self, TagKind::Call)
    }
}

#[derive(Debug)]
pub struct TagRecord {
    pub kind: TagKind,
    pub tag: Arc<str>,
    pub snippet: Arc<str>,
    pub line: u32,
    pub offset: u64,
    pub file: Arc<str>,
    pub language: Arc<str>,
}

#[derive(thiserror::Error, Debug)]
pub enum TagStoreError {
    #[error("malformed tags file: {0}")]
    Parse(String),
    #[error("unknown item descriptor")]
    UnknownDescriptor,
    #[error("i/o error reading tags file")]
    Io(#[from] std::io::Error),
}

/// Configuration the store is constructed with: result cardinality cap
/// and snippet truncation length.
#[derive(Debug, Clone)]
pub struct TagStoreConfig {
    pub enable_by_file: bool,
    pub max_results: usize,
    pub max_snippet_size: usize,
}

impl Default for TagStoreConfig {
    fn default() -> Self {
        TagStoreConfig {
            enable_by_file: true,
            max_results: 2000,
            max_snippet_size: 512,
        }
    }
}

pub struct TagStore {
    interner: Arc<Interner>,
    config: TagStoreConfig,
    by_tag: BTreeMap<Arc<str>, Vec<Arc<TagRecord>>>,
    by_file: Option<HashMap<Arc<str>, Vec<Arc<TagRecord>>>>,
    by_basename: HashMap<Arc<str>, Vec<Arc<str>>>,
    loaded_files: HashSet<Arc<str>>,
    /// Set at the top of every `reload`/`update` call and flipped to
    /// `false` the moment that call installs a non-`CALL` descriptor;
    /// reflects only the forms processed by the most recent call, not a
    /// running tally over everything ever loaded.
    callers_default: bool,
}

impl TagStore {
    pub fn new(interner: Arc<Interner>, config: TagStoreConfig) -> Self {
        let by_file = config.enable_by_file.then(HashMap::new);
        TagStore {
            interner,
            config,
            by_tag: BTreeMap::new(),
            by_file,
            by_basename: HashMap::new(),
            loaded_files: HashSet::new(),
            callers_default: true,
        }
    }

    pub fn max_results(&self) -> usize {
        self.config.max_results
    }

    /// True when the most recently loaded/updated file(s) contained only
    /// `CALL` descriptors: the default value protocol dispatch (C4) should
    /// use for `callers` when the request didn't specify one.
    pub fn callers_default(&self) -> bool {
        self.callers_default
    }

    pub fn loaded_files(&self) -> impl Iterator<Item = &Arc<str>> {
        self.loaded_files.iter()
    }

    /// Replaces all state from a tag file. Legal only when no outstanding
    /// queries run against the store; callers are expected to serialize
    /// via the engine's exclusive lock.
    pub fn reload(&mut self, path: &Path, gunzip: bool) -> bool {
        match read_tags_file(path, gunzip).and_then(|src| self.reload_from_str(&src)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "tags file reload failed, keeping prior state");
                false
            }
        }
    }

    fn reload_from_str(&mut self, src: &str) -> Result<(), TagStoreError> {
        let forms = parse_forms(src)?;
        let mut fresh = TagStore::new(self.interner.clone(), self.config.clone());
        fresh.apply_forms(&forms)?;
        *self = fresh;
        Ok(())
    }

    /// Merges a delta file: for each `file` form, unloads that path's
    /// prior records before installing the new ones; for each
    /// `(deleted "path")` form, unloads only.
    pub fn update(&mut self, path: &Path, gunzip: bool) -> bool {
        match read_tags_file(path, gunzip).and_then(|src| self.update_from_str(&src)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "tags file update failed, keeping prior state");
                false
            }
        }
    }

    fn update_from_str(&mut self, src: &str) -> Result<(), TagStoreError> {
        let forms = parse_forms(src)?;
        self.apply_forms(&forms)
    }

    fn apply_forms(&mut self, forms: &[Value]) -> Result<(), TagStoreError> {
        self.callers_default = true;
        for form in forms {
            let Some(head) = form.car().and_then(Value::symbol_name) else {
                continue;
            };
            match head {
                "tags-format-version" | "tags-comment" | "tags-corpus-name" | "timestamp"
                | "features" => {}
                "file" => self.apply_file_form(form)?,
                "deleted" => {
                    let path = form
                        .cdr()
                        .and_then(Value::car)
                        .and_then(Value::as_str)
                        .ok_or_else(|| TagStoreError::Parse("deleted form missing path".into()))?;
                    self.unload_file(path);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply_file_form(&mut self, form: &Value) -> Result<(), TagStoreError> {
        let path = sexpr::assoc_get_one(form, "path")
            .and_then(Value::as_str)
            .ok_or_else(|| TagStoreError::Parse("file form missing path".into()))?
            .to_string();
        let language = sexpr::assoc_get_one(form, "language")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let contents = sexpr::assoc_get_one(form, "contents")
            .ok_or_else(|| TagStoreError::Parse("file form missing contents".into()))?;

        self.unload_file(&path);

        let (interned_path, basename) = intern_path(&self.interner, &path);
        let interned_language = self.interner.intern(&language);

        let mut records = Vec::new();
        for item in contents.iter_list() {
            records.push(self.parse_item(item, interned_path.clone(), interned_language.clone())?);
        }

        self.by_basename
            .entry(basename)
            .or_default()
            .push(interned_path.clone());
        self.loaded_files.insert(interned_path.clone());

        for record in records {
            if record.kind.is_definition() {
                self.callers_default = false;
            }
            let record = Arc::new(record);
            self.by_tag
                .entry(record.tag.clone())
                .or_default()
                .push(record.clone());
            if let Some(by_file) = &mut self.by_file {
                by_file.entry(interned_path.clone()).or_default().push(record);
            }
        }
        Ok(())
    }

    fn parse_item(
        &self,
        item: &Value,
        file: Arc<str>,
        language: Arc<str>,
    ) -> Result<TagRecord, TagStoreError> {
        let head = item
            .car()
            .and_then(Value::symbol_name)
            .filter(|h| *h == "item")
            .ok_or_else(|| TagStoreError::Parse("expected (item ...)".into()))?;
        let _ = head;

        let line = sexpr::assoc_get_one(item, "line")
            .and_then(Value::as_int)
            .unwrap_or(0) as u32;
        let offset = sexpr::assoc_get_one(item, "offset")
            .and_then(Value::as_int)
            .unwrap_or(0) as u64;
        let snippet = sexpr::assoc_get_one(item, "snippet")
            .and_then(Value::as_str)
            .unwrap_or("");
        let snippet = truncate(snippet, self.config.max_snippet_size);

        let descriptor = sexpr::assoc_get_one(item, "descriptor")
            .ok_or(TagStoreError::UnknownDescriptor)?;
        let (kind, tag_name) = parse_descriptor(descriptor)?;

        Ok(TagRecord {
            kind,
            tag: self.interner.intern(&tag_name),
            snippet: self.interner.intern(&snippet),
            line,
            offset,
            file,
            language,
        })
    }

    /// Unloads every record belonging to `path`, and removes `path` from
    /// `byBasename` too — a file present in `loadedFiles` must always be
    /// reachable from its basename entry, and unload must not leave a
    /// stale basename reference once it's gone.
    pub fn unload_file(&mut self, path: &str) {
        let Some(interned) = self.loaded_files.take(path) else {
            return;
        };

        if let Some(by_file) = &mut self.by_file {
            if let Some(records) = by_file.remove(&interned) {
                self.remove_from_by_tag(&records);
            }
        } else {
            // byFile disabled: fall back to a linear scan of byTag.
            for (_, records) in self.by_tag.iter_mut() {
                records.retain(|r| r.file != interned);
            }
            self.by_tag.retain(|_, records| !records.is_empty());
        }

        let basename = interned.rsplit('/').next().unwrap_or(&interned);
        if let Some(entries) = self.by_basename.get_mut(basename) {
            entries.retain(|p| *p != interned);
            if entries.is_empty() {
                self.by_basename.remove(basename);
            }
        }
    }

    fn remove_from_by_tag(&mut self, records: &[Arc<TagRecord>]) {
        for record in records {
            if let Some(bucket) = self.by_tag.get_mut(&record.tag) {
                bucket.retain(|r| !Arc::ptr_eq(r, record));
                if bucket.is_empty() {
                    self.by_tag.remove(&record.tag);
                }
            }
        }
    }

    /// Unloads every loaded file whose path starts with `prefix`.
    pub fn unload_files_in_dir(&mut self, prefix: &str) {
        let victims: Vec<String> = self
            .loaded_files
            .iter()
            .filter(|f| f.starts_with(prefix))
            .map(|f| f.to_string())
            .collect();
        for path in victims {
            self.unload_file(&path);
        }
    }

    pub fn find_exact(&self, tag: &str) -> Vec<Arc<TagRecord>> {
        self.by_tag
            .get(tag)
            .map(|records| self.cap(records.iter().cloned()))
            .unwrap_or_default()
    }

    /// If `tag` contains a byte outside `[A-Za-z0-9_-]`, it's treated as a
    /// regex that must fully match; otherwise it's a lexicographic prefix.
    pub fn find_prefix(&self, tag: &str) -> Vec<Arc<TagRecord>> {
        if tag.bytes().all(is_plain_identifier_byte) {
            let mut out = Vec::new();
            for (key, records) in self.by_tag.range(Arc::from(tag)..) {
                if !key.starts_with(tag) {
                    break;
                }
                out.extend(records.iter().cloned());
                if out.len() >= self.config.max_results {
                    break;
                }
            }
            self.cap(out.into_iter())
        } else {
            let pattern = format!("^(?:{tag})$");
            let Ok(re) = Regex::new(&pattern) else {
                return Vec::new();
            };
            self.cap(
                self.by_tag
                    .iter()
                    .filter(|(key, _)| re.is_match(key))
                    .flat_map(|(_, records)| records.iter().cloned()),
            )
        }
    }

    /// Records whose snippet partial-matches `pattern` as a regex.
    pub fn find_snippet(&self, pattern: &str) -> Vec<Arc<TagRecord>> {
        let Ok(re) = Regex::new(pattern) else {
            return Vec::new();
        };
        self.cap(
            self.by_tag
                .values()
                .flatten()
                .filter(|r| re.is_match(&r.snippet))
                .cloned(),
        )
    }

    pub fn find_by_file(&self, file: &str) -> Option<Vec<Arc<TagRecord>>> {
        let by_file = self.by_file.as_ref()?;
        Some(self.cap(by_file.get(file).into_iter().flatten().cloned()))
    }

    pub fn find_file(&self, basename: &str) -> Vec<Arc<str>> {
        self.cap(
            self.by_basename
                .get(basename)
                .into_iter()
                .flatten()
                .cloned(),
        )
    }

    fn cap<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items.take(self.config.max_results).collect()
    }
}

fn is_plain_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn parse_descriptor(descriptor: &Value) -> Result<(TagKind, String), TagStoreError> {
    let head = descriptor
        .car()
        .and_then(Value::symbol_name)
        .ok_or(TagStoreError::UnknownDescriptor)?;
    match head {
        "call" => {
            let to = sexpr::assoc_get_one(descriptor, "to").ok_or(TagStoreError::UnknownDescriptor)?;
            let name = sexpr::assoc_get_one(to, "name")
                .and_then(Value::as_str)
                .ok_or(TagStoreError::UnknownDescriptor)?;
            Ok((TagKind::Call, name.to_string()))
        }
        "type" => tag_field(descriptor, TagKind::TypeDefn),
        "function" => tag_field(descriptor, TagKind::FunctionDefn),
        "variable" => tag_field(descriptor, TagKind::VariableDefn),
        "generic-tag" => tag_field(descriptor, TagKind::GenericDefn),
        _ => Err(TagStoreError::UnknownDescriptor),
    }
}

fn tag_field(descriptor: &Value, kind: TagKind) -> Result<(TagKind, String), TagStoreError> {
    let name = sexpr::assoc_get_one(descriptor, "tag")
        .and_then(Value::as_str)
        .ok_or(TagStoreError::UnknownDescriptor)?;
    Ok((kind, name.to_string()))
}

fn read_tags_file(path: &Path, gunzip: bool) -> Result<String, TagStoreError> {
    let bytes = if gunzip {
        let file = fs::File::open(path)?;
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        return Ok(out);
    } else {
        fs::read_to_string(path)?
    };
    Ok(bytes)
}

/// Reads a sequence of top-level s-expressions back to back (the tag-file
/// grammar is `HEADER* FILE*` with no enclosing list).
fn parse_forms(src: &str) -> Result<Vec<Value>, TagStoreError> {
    let mut forms = Vec::new();
    let mut rest = src;
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            return Ok(forms);
        }
        match sexpr::read(trimmed).map_err(|e| TagStoreError::Parse(e.to_string()))? {
            ReadOutcome::Complete { value, consumed } => {
                forms.push(value);
                rest = &trimmed[consumed..];
            }
            ReadOutcome::Incomplete => {
                return Err(TagStoreError::Parse("unexpected end of tags file".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn sample_tags_file() -> &'static str {
        r#"(tags-format-version 2)
(file (path "tools/tags/file1.h") (language "c++") (contents (
  (item (line 10) (offset 100) (snippet "int file_size;") (descriptor (variable (tag "file_size")))))))"#
    }

    fn store_with_sample() -> TagStore {
        let interner = Arc::new(Interner::new());
        let mut store = TagStore::new(interner, TagStoreConfig::default());
        store.reload_from_str(sample_tags_file()).unwrap();
        store
    }

    #[test]
    fn reload_then_query_finds_installed_record() {
        let store = store_with_sample();
        let found = store.find_exact("file_size");
        assert_eq!(found.len(), 1);
        assert_eq!(&*found[0].tag, "file_size");
        assert_eq!(&*found[0].file, "tools/tags/file1.h");
        assert_eq!(found[0].line, 10);
        assert_eq!(found[0].offset, 100);
    }

    #[test]
    fn find_prefix_matches_lexicographic_prefix() {
        let store = store_with_sample();
        assert_eq!(store.find_prefix("file_s").len(), 1);
        assert_eq!(store.find_prefix("zzz").len(), 0);
    }

    #[test]
    fn find_prefix_treats_non_identifier_as_regex() {
        let store = store_with_sample();
        assert_eq!(store.find_prefix("file_.*").len(), 1);
    }

    #[test]
    fn find_snippet_partial_matches() {
        let store = store_with_sample();
        assert_eq!(store.find_snippet("int .*;").len(), 1);
        assert_eq!(store.find_snippet("nonexistent").len(), 0);
    }

    #[test]
    fn find_file_resolves_basename() {
        let store = store_with_sample();
        let files = store.find_file("file1.h");
        assert_eq!(files.len(), 1);
        assert_eq!(&*files[0], "tools/tags/file1.h");
    }

    #[test]
    fn unload_file_removes_records_and_basename() {
        let mut store = store_with_sample();
        store.unload_file("tools/tags/file1.h");
        assert_eq!(store.find_exact("file_size").len(), 0);
        assert_eq!(store.find_file("file1.h").len(), 0);
        assert!(!store.loaded_files().any(|_| true));
    }

    #[test]
    fn callers_default_true_when_only_calls_loaded() {
        let interner = Arc::new(Interner::new());
        let mut store = TagStore::new(interner, TagStoreConfig::default());
        let src = r#"(tags-format-version 2)
(file (path "a.c") (language "c") (contents (
  (item (line 1) (offset 0) (snippet "foo();") (descriptor (call (to (ref (name "foo") (id 1)))))))))"#;
        store.reload_from_str(src).unwrap();
        assert!(store.callers_default());
    }

    #[test]
    fn callers_default_false_when_definitions_present() {
        let store = store_with_sample();
        assert!(!store.callers_default());
    }

    #[test]
    fn update_replaces_only_the_named_file() {
        let mut store = store_with_sample();
        let delta = r#"(file (path "tools/tags/file1.h") (language "c++") (contents (
  (item (line 20) (offset 5) (snippet "int other;") (descriptor (variable (tag "other")))))))"#;
        store.update_from_str(delta).unwrap();
        assert_eq!(store.find_exact("file_size").len(), 0);
        assert_eq!(store.find_exact("other").len(), 1);
    }

    #[test]
    fn update_deleted_form_unloads_only() {
        let mut store = store_with_sample();
        store.update_from_str(r#"(deleted "tools/tags/file1.h")"#).unwrap();
        assert_eq!(store.find_exact("file_size").len(), 0);
    }

    #[test]
    fn callers_default_reflects_only_the_most_recent_call() {
        let interner = Arc::new(Interner::new());
        let mut store = TagStore::new(interner, TagStoreConfig::default());
        let calls_only = r#"(file (path "a.c") (language "c") (contents (
  (item (line 1) (offset 0) (snippet "foo();") (descriptor (call (to (ref (name "foo") (id 1)))))))))"#;
        store.reload_from_str(calls_only).unwrap();
        assert!(store.callers_default());

        // a later update installing a definition flips the flag, even
        // though the calls loaded earlier are still sitting in the store.
        let definition = r#"(file (path "b.c") (language "c") (contents (
  (item (line 1) (offset 0) (snippet "int x;") (descriptor (variable (tag "x")))))))"#;
        store.update_from_str(definition).unwrap();
        assert!(!store.callers_default());

        // an update touching only calls again flips it back, regardless
        // of the definition still loaded from the previous call.
        store.update_from_str(calls_only).unwrap();
        assert!(store.callers_default());
    }

    #[test]
    fn reload_from_gzip_file_round_trips() {
        let interner = Arc::new(Interner::new());
        let mut store = TagStore::new(interner, TagStoreConfig::default());
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut encoder =
            flate2::write::GzEncoder::new(tmp.reopen().unwrap(), flate2::Compression::default());
        encoder.write_all(sample_tags_file().as_bytes()).unwrap();
        encoder.finish().unwrap();
        assert!(store.reload(tmp.path(), true));
        assert_eq!(store.find_exact("file_size").len(), 1);
    }
}
