//! Subcommand implementations.

pub mod check_url;
pub mod modules;
pub mod search;

use std::sync::Arc;

use thiserror::Error;
use visual_search_widget::api::ApiError;
use visual_search_widget::config::ConfigError;
use visual_search_widget::loader::LoadError;
use visual_search_widget::validate::ValidationError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Environment configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A widget asset could not be loaded.
    #[error("Module error: {0}")]
    Load(Arc<LoadError>),

    /// The image was rejected before upload.
    #[error("Invalid image: {0}")]
    Validation(#[from] ValidationError),

    /// The search request failed.
    #[error("Search failed: {0}")]
    Api(#[from] ApiError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Arc<LoadError>> for CommandError {
    fn from(err: Arc<LoadError>) -> Self {
        Self::Load(err)
    }
}
