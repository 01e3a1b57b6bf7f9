//! Visual Search storefront widget runtime.
//!
//! Adds "search by image" to a storefront theme without touching its code:
//!
//! - [`loader`] - Lazy, dependency-ordered loading of the widget's assets
//! - [`inject`] - Affordance injection next to search inputs, with rescans
//! - [`api`] - Multipart search requests and response normalization
//! - [`workflow`] - The search drawer state machine
//! - [`runtime`] - The facade a host binding drives
//!
//! The host page is modelled by [`dom::Document`], so every policy here runs
//! and is tested without a browser.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod dom;
pub mod error;
pub mod inject;
pub mod loader;
pub mod notify;
pub mod runtime;
pub mod validate;
pub mod workflow;

pub use error::{Result, WidgetError};
pub use runtime::{VisualSearch, WidgetEvent, install};
