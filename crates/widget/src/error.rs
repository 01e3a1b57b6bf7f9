//! Unified error type for the widget's entry points.
//!
//! Each component has its own error enum; `WidgetError` gathers them for the
//! facade. Internals never reach the shopper: [`WidgetError::user_message`]
//! maps every variant to a short, safe sentence for a toast.

use std::sync::Arc;

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::dom::DomError;
use crate::loader::LoadError;
use crate::validate::ValidationError;

/// Message shown when part of the widget could not be loaded.
pub const UNAVAILABLE_MESSAGE: &str = "Visual search is temporarily unavailable.";

/// Widget-level error type.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// Configuration could not be resolved.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The page structure did not allow an operation.
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    /// A widget module failed to load.
    #[error("Module load error: {0}")]
    Load(Arc<LoadError>),

    /// Input rejected before any request.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Search request failed.
    #[error("Search error: {0}")]
    Api(#[from] ApiError),
}

impl From<Arc<LoadError>> for WidgetError {
    fn from(err: Arc<LoadError>) -> Self {
        Self::Load(err)
    }
}

impl WidgetError {
    /// A message safe to show the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) | Self::Load(_) | Self::Dom(_) => UNAVAILABLE_MESSAGE.to_string(),
            Self::Validation(e) => e.user_message(),
            Self::Api(e) => e.user_message(),
        }
    }
}

/// Result type alias for widget operations.
pub type Result<T> = std::result::Result<T, WidgetError>;
