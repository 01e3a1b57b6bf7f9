//! Widget configuration.
//!
//! Resolved once per page load, in three layers:
//!
//! 1. Hard-coded defaults ([`WidgetConfig::default`])
//! 2. The host page's global configuration object ([`HostConfig`])
//! 3. CSS custom properties on detected app-block elements ([`CssOverrides`])
//!
//! Later layers win. After first use the only mutation is
//! [`ConfigHandle::update_theme`], which merges a partial theme into the live
//! configuration.
//!
//! # Environment Variables (CLI only)
//!
//! ## Required
//! - `VISUAL_SEARCH_APP_URL` - Base URL of the inference service
//! - `VISUAL_SEARCH_SHOP_DOMAIN` - Shop domain sent with every search
//!
//! ## Optional
//! - `VISUAL_SEARCH_ENDPOINT` - `search` (default) or `product-handle`
//! - `VISUAL_SEARCH_MAX_FILE_SIZE` - Upload limit in bytes (default: 5 MiB)

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use visual_search_core::{ImageMime, NodeId, ShopDomain};

use crate::dom::{Document, parse_px};

/// Default inference service base URL.
pub const DEFAULT_APP_URL: &str = "https://visual-search.example.com";

/// Default upload limit: 5 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid host configuration: {0}")]
    InvalidHostConfig(String),
    #[error("No shop domain configured")]
    MissingShopDomain,
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

// =============================================================================
// Enumerations
// =============================================================================

/// Which inference endpoint the widget talks to.
///
/// The two deployments differ in path and multipart field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointVariant {
    /// `POST {app}/search/{shop}` with fields `image` and `shopDomainURL`.
    #[default]
    Search,
    /// `POST {app}/api/product-handle` with fields `file` and `shop`.
    ProductHandle,
}

impl EndpointVariant {
    /// Multipart field carrying the image.
    #[must_use]
    pub const fn image_field(self) -> &'static str {
        match self {
            Self::Search => "image",
            Self::ProductHandle => "file",
        }
    }

    /// Multipart field carrying the shop domain.
    #[must_use]
    pub const fn shop_field(self) -> &'static str {
        match self {
            Self::Search => "shopDomainURL",
            Self::ProductHandle => "shop",
        }
    }

    fn path(self, shop: &ShopDomain) -> String {
        match self {
            Self::Search => format!("search/{shop}"),
            Self::ProductHandle => "api/product-handle".to_string(),
        }
    }
}

impl FromStr for EndpointVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "product-handle" | "product_handle" => Ok(Self::ProductHandle),
            other => Err(format!("unknown endpoint variant '{other}'")),
        }
    }
}

/// Which side of the search input the affordance sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IconPosition {
    Left,
    #[default]
    Right,
}

impl IconPosition {
    /// The CSS side keyword (`left` / `right`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for IconPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(format!("icon position must be left or right, got '{other}'")),
        }
    }
}

impl fmt::Display for IconPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Theme
// =============================================================================

/// Visual tokens for the affordance and drawer.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeConfig {
    pub icon_color: String,
    pub icon_color_hover: String,
    pub icon_background_hover: String,
    pub primary_color: String,
    pub primary_color_dark: String,
    pub icon_style: String,
    pub icon_size_multiplier: f64,
    pub icon_position: IconPosition,
    /// Distance from the input's edge, in CSS pixels.
    pub icon_offset: f64,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            icon_color: "#5f6368".to_string(),
            icon_color_hover: "#202124".to_string(),
            icon_background_hover: "rgba(0, 0, 0, 0.06)".to_string(),
            primary_color: "#008060".to_string(),
            primary_color_dark: "#004c3f".to_string(),
            icon_style: "camera".to_string(),
            icon_size_multiplier: 1.0,
            icon_position: IconPosition::Right,
            icon_offset: 10.0,
        }
    }
}

impl ThemeConfig {
    /// Largest accepted icon size multiplier.
    pub const MAX_SIZE_MULTIPLIER: f64 = 4.0;

    /// Merge the fields present in `patch`, ignoring invalid values.
    pub fn apply(&mut self, patch: &ThemePatch) {
        let colors = [
            (&mut self.icon_color, &patch.icon_color),
            (&mut self.icon_color_hover, &patch.icon_color_hover),
            (&mut self.icon_background_hover, &patch.icon_background_hover),
            (&mut self.primary_color, &patch.primary_color),
            (&mut self.primary_color_dark, &patch.primary_color_dark),
            (&mut self.icon_style, &patch.icon_style),
        ];
        for (slot, value) in colors {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *slot = value.to_string();
            }
        }

        if let Some(multiplier) = patch.icon_size_multiplier {
            if multiplier.is_finite() && multiplier > 0.0 && multiplier <= Self::MAX_SIZE_MULTIPLIER
            {
                self.icon_size_multiplier = multiplier;
            } else {
                tracing::warn!(multiplier, "Ignoring out-of-range icon size multiplier");
            }
        }

        if let Some(position) = patch.icon_position.as_deref() {
            match position.parse() {
                Ok(position) => self.icon_position = position,
                Err(e) => tracing::warn!(error = %e, "Ignoring icon position"),
            }
        }

        if let Some(offset) = patch.icon_offset {
            if offset.is_finite() && offset >= 0.0 {
                self.icon_offset = offset;
            } else {
                tracing::warn!(offset, "Ignoring negative icon offset");
            }
        }
    }

    /// Render the theme as CSS custom properties on `:root`.
    #[must_use]
    pub fn css_variables(&self) -> String {
        format!(
            ":root {{\n  --vs-icon-color: {};\n  --vs-icon-color-hover: {};\n  \
             --vs-icon-background-hover: {};\n  --vs-primary-color: {};\n  \
             --vs-primary-color-dark: {};\n  --vs-icon-size-multiplier: {};\n  \
             --vs-icon-position: {};\n  --vs-icon-offset: {}px;\n}}\n",
            self.icon_color,
            self.icon_color_hover,
            self.icon_background_hover,
            self.primary_color,
            self.primary_color_dark,
            self.icon_size_multiplier,
            self.icon_position,
            self.icon_offset,
        )
    }
}

/// A partial theme, as supplied by the host page or CSS custom properties.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThemePatch {
    pub icon_color: Option<String>,
    pub icon_color_hover: Option<String>,
    pub icon_background_hover: Option<String>,
    pub primary_color: Option<String>,
    pub primary_color_dark: Option<String>,
    pub icon_style: Option<String>,
    pub icon_size_multiplier: Option<f64>,
    pub icon_position: Option<String>,
    pub icon_offset: Option<f64>,
}

/// The global configuration object a host page may set before the bootstrap
/// script runs (`window.VisualSearchConfig`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    pub app_url: Option<String>,
    pub shop_domain: Option<String>,
    pub theme: Option<ThemePatch>,
}

impl HostConfig {
    /// Parse the host object from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHostConfig` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidHostConfig(e.to_string()))
    }
}

// =============================================================================
// CSS custom properties
// =============================================================================

/// Custom property names read from app-block elements.
pub const CSS_THEME_PROPERTIES: [&str; 9] = [
    "--vs-icon-color",
    "--vs-icon-color-hover",
    "--vs-icon-background-hover",
    "--vs-primary-color",
    "--vs-primary-color-dark",
    "--vs-icon-style",
    "--vs-icon-size-multiplier",
    "--vs-icon-position",
    "--vs-icon-offset",
];

/// Theme values found in computed CSS custom properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssOverrides(BTreeMap<String, String>);

impl CssOverrides {
    /// Read the theme custom properties from each block; the first block
    /// that defines a property wins.
    #[must_use]
    pub fn collect(document: &Document, blocks: &[NodeId]) -> Self {
        let mut values = BTreeMap::new();
        for block in blocks {
            for property in CSS_THEME_PROPERTIES {
                let value = document.computed_style(*block, property);
                let value = value.trim().trim_matches('"').trim();
                if !value.is_empty() && !values.contains_key(property) {
                    values.insert(property.to_string(), value.to_string());
                }
            }
        }
        Self(values)
    }

    /// Set one property directly.
    pub fn insert(&mut self, property: &str, value: &str) {
        self.0.insert(property.to_string(), value.to_string());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a theme patch. Unparseable numbers are dropped with a warning.
    #[must_use]
    pub fn to_patch(&self) -> ThemePatch {
        let text = |name: &str| self.0.get(name).cloned();
        let number = |name: &str| {
            let raw = self.0.get(name)?;
            let parsed = parse_px(raw);
            if parsed.is_none() {
                tracing::warn!(property = name, value = %raw, "Ignoring non-numeric CSS property");
            }
            parsed
        };
        ThemePatch {
            icon_color: text("--vs-icon-color"),
            icon_color_hover: text("--vs-icon-color-hover"),
            icon_background_hover: text("--vs-icon-background-hover"),
            primary_color: text("--vs-primary-color"),
            primary_color_dark: text("--vs-primary-color-dark"),
            icon_style: text("--vs-icon-style"),
            icon_size_multiplier: number("--vs-icon-size-multiplier"),
            icon_position: text("--vs-icon-position"),
            icon_offset: number("--vs-icon-offset"),
        }
    }
}

// =============================================================================
// Timing
// =============================================================================

/// Animation and scheduling intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Drawer open/close animation.
    pub drawer_animation: Duration,
    /// How long a toast stays on screen.
    pub toast_duration: Duration,
    /// Simulated delay before appending the next result page.
    pub page_delay: Duration,
    /// Quiet period before a mutation-triggered rescan.
    pub mutation_debounce: Duration,
    /// Interval of the client-side navigation check.
    pub url_poll_interval: Duration,
    /// Timeout for URL validation and image refetches.
    pub fetch_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            drawer_animation: Duration::from_millis(300),
            toast_duration: Duration::from_secs(4),
            page_delay: Duration::from_millis(300),
            mutation_debounce: Duration::from_millis(150),
            url_poll_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// WidgetConfig
// =============================================================================

/// Fully resolved widget configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetConfig {
    /// Inference service base URL.
    pub app_url: Url,
    /// Shop domain sent with every search.
    pub shop_domain: Option<ShopDomain>,
    /// Endpoint path and field-name variant.
    pub endpoint: EndpointVariant,
    /// Visual tokens.
    pub theme: ThemeConfig,
    /// MIME types accepted for upload.
    pub accepted_types: Vec<ImageMime>,
    /// Upload limit in bytes.
    pub max_file_size: u64,
    /// Results rendered per page.
    pub page_size: usize,
    /// Distance from the bottom (px) that triggers the next page.
    pub scroll_threshold: f64,
    /// Placeholder cards shown while a request is in flight.
    pub skeleton_count: usize,
    /// Smallest affordance size in pixels, before the multiplier.
    pub icon_size_min: f64,
    /// Largest affordance size in pixels, before the multiplier.
    pub icon_size_max: f64,
    /// Animation and scheduling intervals.
    pub timing: Timing,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            app_url: default_app_url(),
            shop_domain: None,
            endpoint: EndpointVariant::default(),
            theme: ThemeConfig::default(),
            accepted_types: ImageMime::ALL.to_vec(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            page_size: 12,
            scroll_threshold: 200.0,
            skeleton_count: 8,
            icon_size_min: 16.0,
            icon_size_max: 32.0,
            timing: Timing::default(),
        }
    }
}

#[allow(clippy::expect_used)]
fn default_app_url() -> Url {
    Url::parse(DEFAULT_APP_URL).expect("default app URL is valid")
}

impl WidgetConfig {
    /// Resolve defaults, then the host object, then CSS overrides.
    ///
    /// Invalid host values are logged and skipped: the host page is outside
    /// our control and a bad value must not disable the widget.
    #[must_use]
    pub fn resolve(host: Option<&HostConfig>, css: &CssOverrides) -> Self {
        let mut config = Self::default();

        if let Some(host) = host {
            if let Some(raw) = host.app_url.as_deref() {
                match parse_base_url(raw) {
                    Ok(url) => config.app_url = url,
                    Err(e) => tracing::warn!(error = %e, app_url = raw, "Ignoring host appUrl"),
                }
            }
            if let Some(raw) = host.shop_domain.as_deref() {
                match ShopDomain::parse(raw) {
                    Ok(shop) => config.shop_domain = Some(shop),
                    Err(e) => tracing::warn!(error = %e, "Ignoring host shopDomain"),
                }
            }
            if let Some(theme) = &host.theme {
                config.theme.apply(theme);
            }
        }

        if !css.is_empty() {
            config.theme.apply(&css.to_patch());
        }

        config
    }

    /// Load configuration for command-line use from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let app_url = parse_base_url(&get_required_env("VISUAL_SEARCH_APP_URL")?).map_err(|e| {
            ConfigError::InvalidEnvVar("VISUAL_SEARCH_APP_URL".to_string(), e.to_string())
        })?;
        let shop_domain = ShopDomain::parse(&get_required_env("VISUAL_SEARCH_SHOP_DOMAIN")?)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("VISUAL_SEARCH_SHOP_DOMAIN".to_string(), e.to_string())
            })?;
        let endpoint = get_env_or_default("VISUAL_SEARCH_ENDPOINT", "search")
            .parse::<EndpointVariant>()
            .map_err(|e| ConfigError::InvalidEnvVar("VISUAL_SEARCH_ENDPOINT".to_string(), e))?;
        let max_file_size = get_env_or_default(
            "VISUAL_SEARCH_MAX_FILE_SIZE",
            &DEFAULT_MAX_FILE_SIZE.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("VISUAL_SEARCH_MAX_FILE_SIZE".to_string(), e.to_string())
        })?;

        Ok(Self {
            app_url,
            shop_domain: Some(shop_domain),
            endpoint,
            max_file_size,
            ..Self::default()
        })
    }

    /// The full URL searches are posted to.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingShopDomain` when no shop domain is known,
    /// for either endpoint variant: both send the shop with the upload.
    pub fn search_endpoint(&self) -> Result<Url, ConfigError> {
        let shop = self
            .shop_domain
            .as_ref()
            .ok_or(ConfigError::MissingShopDomain)?;
        Ok(self.app_url.join(&self.endpoint.path(shop))?)
    }

    /// Whether a MIME type is in the accepted set.
    #[must_use]
    pub fn accepts(&self, mime: ImageMime) -> bool {
        self.accepted_types.contains(&mime)
    }

    /// The `accept` attribute value for file inputs.
    #[must_use]
    pub fn accept_attribute(&self) -> String {
        self.accepted_types
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse a base URL, ensuring a trailing slash so `join` appends paths.
fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{trimmed}/"))
    }
}

// =============================================================================
// Shared handle
// =============================================================================

/// Shared, live configuration.
///
/// Cheap to clone; every component holding a handle sees theme updates.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<WidgetConfig>>,
}

impl ConfigHandle {
    #[must_use]
    pub fn new(config: WidgetConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// A copy of the current configuration.
    #[must_use]
    pub fn snapshot(&self) -> WidgetConfig {
        self.inner.read().clone()
    }

    /// Read one value without cloning the whole config.
    pub fn read<T>(&self, f: impl FnOnce(&WidgetConfig) -> T) -> T {
        f(&self.inner.read())
    }

    /// Merge a partial theme into the live configuration.
    pub fn update_theme(&self, patch: &ThemePatch) -> ThemeConfig {
        let mut config = self.inner.write();
        config.theme.apply(patch);
        tracing::debug!(theme = ?config.theme, "Theme configuration updated");
        config.theme.clone()
    }
}

/// Asset base for command-line use: `VISUAL_SEARCH_ASSET_BASE` if set,
/// otherwise `{app_url}/assets/`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` if the variable is not a URL.
pub fn asset_base_from_env(config: &WidgetConfig) -> Result<Url, ConfigError> {
    match std::env::var("VISUAL_SEARCH_ASSET_BASE") {
        Ok(raw) => parse_base_url(&raw).map_err(|e| {
            ConfigError::InvalidEnvVar("VISUAL_SEARCH_ASSET_BASE".to_string(), e.to_string())
        }),
        Err(_) => Ok(config.app_url.join("assets/")?),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
