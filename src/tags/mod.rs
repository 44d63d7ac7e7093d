//! Local tag store and query engine: string interning, the in-memory
//! index, and the protocol surface that wraps it.

pub mod engine;
pub mod intern;
pub mod store;

pub use engine::LocalEngine;
pub use intern::Interner;
pub use store::{TagKind, TagRecord, TagStore, TagStoreConfig, TagStoreError};
