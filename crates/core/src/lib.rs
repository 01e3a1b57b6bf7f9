//! Visual Search Core - Shared types library.
//!
//! This crate provides the types shared by the widget runtime and its tools:
//! - `widget` - The storefront widget runtime
//! - `cli` - Command-line tools for asset checks and one-shot searches
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no DOM
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Shop domains, geometry, image types, search results and ID newtypes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
