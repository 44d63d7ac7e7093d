//! String interner shared by the tag store: equal byte sequences always
//! resolve to the same `Arc<str>`, which callers use as a stable,
//! pointer-comparable handle instead of carrying owned copies everywhere.

use std::sync::Arc;

/// Process-lifetime table of interned strings. Entries are never removed;
/// the interner is expected to outlive every structure that borrows from
/// it (the tag store holds an `Arc` to one and drops it last).
#[derive(Default)]
pub struct Interner {
    strings: scc::HashSet<Arc<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical `Arc<str>` for `value`, inserting it if this
    /// is the first time it's been seen.
    pub fn intern(&self, value: &str) -> Arc<str> {
        if let Some(existing) = self.strings.read(value, |s| s.clone()) {
            return existing;
        }
        let candidate: Arc<str> = Arc::from(value);
        match self.strings.insert(candidate.clone()) {
            Ok(()) => candidate,
            // Lost a race with another inserter; the winning entry is
            // equal by value, so fetch and return it instead.
            Err(_) => self
                .strings
                .read(value, |s| s.clone())
                .expect("entry inserted by the winning racer must be present"),
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Splits a normalized path into its own interned handle plus an interned
/// basename (the component after the final `/`).
pub fn intern_path(interner: &Interner, path: &str) -> (Arc<str>, Arc<str>) {
    let basename = path.rsplit('/').next().unwrap_or(path);
    (interner.intern(path), interner.intern(basename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_intern_to_the_same_pointer() {
        let interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_strings_intern_to_distinct_pointers() {
        let interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("world");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn basename_of_nested_path() {
        let interner = Interner::new();
        let (path, basename) = intern_path(&interner, "tools/tags/file1.h");
        assert_eq!(&*path, "tools/tags/file1.h");
        assert_eq!(&*basename, "file1.h");
    }

    #[test]
    fn basename_of_bare_filename_is_itself() {
        let interner = Interner::new();
        let (_, basename) = intern_path(&interner, "file1.h");
        assert_eq!(&*basename, "file1.h");
    }
}
