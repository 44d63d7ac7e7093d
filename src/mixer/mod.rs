//! Fan-out/merge engine: result mixer and holder, the request router, and
//! the remote shard RPC client.

pub mod result_holder;
pub mod result_mixer;
pub mod router;
pub mod shard_client;

pub use result_holder::ResultHolder;
pub use result_mixer::ResultMixer;
pub use router::{CorpusSources, LanguageSources, Router, RouterDefaults, SourceMap};
