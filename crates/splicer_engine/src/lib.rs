pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod sdk;

pub use builder::{ConcatBuilder, EncodeBuilder, MergeBuilder};
pub use config::EngineConfig;
pub use engine::{ConcatEngine, EncodeEngine, MergeEngine, RequestEngine};
pub use error::{EngineError, Result};
pub use sdk::{ProcessCallback, Splicer};

#[cfg(test)]
pub(crate) mod testing;
