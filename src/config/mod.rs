//! Configuration: prompts, app catalog, and validation errors.

mod apps;
pub mod prompts;

pub use apps::{load_app_catalog, DEFAULT_APP_CATALOG};

use thiserror::Error;

/// Configuration problems; fatal at startup, before the loop begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
