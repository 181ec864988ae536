pub mod error;
pub mod options;
pub mod repository;
pub mod request;
pub mod store;
pub mod types;

pub use error::{CoreError, Result};
