//! Shared configuration, error type, and data model for AutoSpec.

pub mod config;
pub mod error;
pub mod types;

pub use config::AutoSpecConfig;
pub use error::{AutoSpecError, Result};
pub use types::*;
