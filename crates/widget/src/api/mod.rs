//! Search requests to the inference service.
//!
//! # Architecture
//!
//! - One entry point per acquisition path: uploaded file, `blob:` URL,
//!   crop of the current image, and re-search by a result's image
//! - Every path posts the same `multipart/form-data` request
//! - Responses are reconciled into [`SearchResult`]s by [`normalize`]
//!
//! [`SearchResult`]: visual_search_core::SearchResult

mod client;
mod image;
pub mod normalize;

pub use client::{CROP_FIELDS, SearchClient};
pub use image::ImageState;
pub use normalize::{Analysis, ResponseShape, analyze, classify};

use thiserror::Error;

use crate::config::ConfigError;
use crate::validate::ValidationError;

/// Errors that can occur when searching.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never reached the service.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service did not answer in time.
    #[error("Request timed out")]
    Timeout,

    /// The service rejected the upload as too large (HTTP 413).
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request could not be assembled.
    #[error("Invalid request: {0}")]
    Request(String),

    /// A `blob:` URL that is not (or no longer) live.
    #[error("Unknown object URL: {0}")]
    MissingBlob(String),

    /// The widget is not configured to search.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A result image could not be fetched for re-search.
    #[error("Image error: {0}")]
    Image(#[from] ValidationError),
}

impl ApiError {
    pub(crate) fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_builder() {
            Self::Request(error.to_string())
        } else {
            Self::Connection(error.to_string())
        }
    }

    /// Message shown to the shopper.
    ///
    /// Connectivity problems, oversized payloads and everything else get
    /// distinct wording; internal details are never exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection(_) | Self::Timeout => {
                "Unable to connect to the search service. Please check your connection and try again."
                    .to_string()
            }
            Self::PayloadTooLarge => {
                "Image is too large to process. Please choose a smaller image.".to_string()
            }
            Self::Image(e) => e.user_message(),
            Self::Config(_) => "Visual search is temporarily unavailable.".to_string(),
            Self::Status { .. } | Self::Parse(_) | Self::Request(_) | Self::MissingBlob(_) => {
                "Something went wrong while searching. Please try again.".to_string()
            }
        }
    }
}
