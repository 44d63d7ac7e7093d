//! S-expression values: the wire and tag-file grammar shared by every
//! other component.

mod assoc;
mod reader;
mod value;
mod writer;

pub use assoc::{assoc_get, assoc_get_one, assoc_replace};
pub use reader::{parse, read, ReadOutcome, SexprError};
pub use value::{ListIter, Value};
pub use writer::{repr, symbol_needs_quoting};
