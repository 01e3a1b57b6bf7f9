//! Core types for the visual search widget.
//!
//! This module provides type-safe wrappers for the widget's domain concepts.

pub mod geometry;
pub mod id;
pub mod image;
pub mod result;
pub mod shop;

pub use geometry::{PixelRect, Rect, ScaleFactors, Size};
pub use id::*;
pub use image::{ImageMime, ImageMimeError, is_image_content_type};
pub use result::{DetectedItem, SearchResult};
pub use shop::{ShopDomain, ShopDomainError};
