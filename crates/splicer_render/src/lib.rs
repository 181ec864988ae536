pub mod command;
pub mod compare;
pub mod concat;
pub mod encode;
pub mod error;
pub mod execute;
pub mod filter;
pub mod merge;
pub mod probe;

pub use command::{FfmpegCommand, SynthesisSettings};
pub use error::{RenderError, Result};

#[cfg(test)]
pub(crate) mod fixtures;
