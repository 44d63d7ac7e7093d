//! Filesystem-watch pipeline: the watch map, the driver that turns
//! kernel events into index-queue entries, the batcher that coalesces
//! them into indexer invocations, and the command worker that serializes
//! external add/remove/exclude requests.

pub mod batcher;
pub mod commands;
pub mod driver;
pub mod map;

pub use batcher::{run as run_batcher, BatcherConfig};
pub use commands::{add as enqueue_add, remove as enqueue_remove, run as run_commands, Command};
pub use driver::{WatchDriver, WatchError};
pub use map::WatchMap;
