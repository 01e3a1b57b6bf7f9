//! Image acquisition checks that run before any search request.
//!
//! Files are checked against the configured size limit and accepted types.
//! URLs are checked with a single `HEAD` request (2xx, `image/*`) and then
//! fetched once. There is no retry loop; the first failure is reported.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;
use visual_search_core::{ImageMime, is_image_content_type};

use crate::config::{DEFAULT_MAX_FILE_SIZE, WidgetConfig};

/// Reasons an image source is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file is empty")]
    EmptyFile,

    #[error("file is {size} bytes, limit is {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("unsupported file type '{0}'")]
    UnsupportedType(String),

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("could not reach {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("{url} responded with HTTP {status}")]
    UrlStatus { url: String, status: u16 },

    #[error("{url} is not an image (content type '{content_type}')")]
    NotAnImage { url: String, content_type: String },
}

impl ValidationError {
    /// Message shown to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyFile => "The selected file is empty. Please choose another image.".to_string(),
            Self::FileTooLarge { max, .. } => format!(
                "File is too large. Maximum size is {}.",
                format_size(*max)
            ),
            Self::UnsupportedType(_) => {
                "Please select a valid image file (JPEG, PNG, WebP or GIF).".to_string()
            }
            Self::InvalidUrl(_) => "Please enter a valid image URL.".to_string(),
            Self::Unreachable { .. } => {
                "Could not load an image from that URL. Please check it and try again.".to_string()
            }
            Self::UrlStatus { status, .. } => {
                format!("That URL could not be loaded (HTTP {status}).")
            }
            Self::NotAnImage { .. } => "That URL does not point to an image.".to_string(),
        }
    }
}

/// Render a byte count the way a shopper reads it (`5MB`, `512KB`).
fn format_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= MIB {
        #[allow(clippy::cast_precision_loss)]
        let mib = bytes as f64 / MIB as f64;
        format!("{mib:.1}MB")
    } else {
        format!("{}KB", bytes.div_ceil(1024))
    }
}

/// An image chosen by the shopper, before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    /// Declared content type; may be empty when the source did not say.
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageFile {
    #[must_use]
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The image type, from the content type or, failing that, the name.
    #[must_use]
    pub fn mime(&self) -> Option<ImageMime> {
        if self.content_type.trim().is_empty() {
            ImageMime::from_file_name(&self.name)
        } else {
            ImageMime::from_content_type(&self.content_type).ok()
        }
    }
}

/// Check a file against the configured limits.
///
/// # Errors
///
/// Returns the first failed check: emptiness, size, then type.
pub fn validate_file(file: &ImageFile, config: &WidgetConfig) -> Result<ImageMime, ValidationError> {
    if file.bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }
    if file.size() > config.max_file_size {
        return Err(ValidationError::FileTooLarge {
            size: file.size(),
            max: config.max_file_size,
        });
    }
    let declared = if file.content_type.is_empty() {
        file.name.clone()
    } else {
        file.content_type.clone()
    };
    match file.mime() {
        Some(mime) if config.accepts(mime) => Ok(mime),
        _ => Err(ValidationError::UnsupportedType(declared)),
    }
}

/// Parse shopper-entered text as an absolute `http(s)` URL.
///
/// # Errors
///
/// Returns `ValidationError::InvalidUrl` for anything else.
pub fn parse_image_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|_| ValidationError::InvalidUrl(trimmed.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ValidationError::InvalidUrl(trimmed.to_string())),
    }
}

/// Checks that a URL serves an image before it is used as a query.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    client: Client,
    timeout: Duration,
    max_size: u64,
}

impl UrlValidator {
    /// A validator whose downloads are capped at the default upload limit.
    #[must_use]
    pub const fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            max_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Cap downloads at `max_size` bytes.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Validate with a single `HEAD` request.
    ///
    /// # Errors
    ///
    /// `InvalidUrl` for malformed input, `Unreachable` on transport failure
    /// or timeout, `UrlStatus` for non-2xx, `NotAnImage` when the reported
    /// content type is not `image/*`.
    #[instrument(skip(self))]
    pub async fn validate(&self, raw: &str) -> Result<Url, ValidationError> {
        let url = parse_image_url(raw)?;

        let response = self
            .client
            .head(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ValidationError::Unreachable {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Image URL check failed");
            return Err(ValidationError::UrlStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = header_content_type(&response);
        if !is_image_content_type(&content_type) {
            return Err(ValidationError::NotAnImage {
                url: url.to_string(),
                content_type,
            });
        }

        debug!(url = %url, content_type = %content_type, "Image URL validated");
        Ok(url)
    }

    /// Fetch a validated URL's image.
    ///
    /// # Errors
    ///
    /// See [`fetch_image`].
    pub async fn fetch(&self, url: &Url) -> Result<ImageFile, ValidationError> {
        fetch_image(&self.client, url, self.timeout, self.max_size).await
    }
}

/// Download an image in a single attempt.
///
/// The file name is taken from the last path segment, or synthesized from
/// the content type when the URL has none.
///
/// # Errors
///
/// `Unreachable` on transport failure or timeout, `UrlStatus` for non-2xx,
/// `NotAnImage` when the body is not declared as an image, `FileTooLarge`
/// once the declared or received size passes `max_size`.
#[instrument(skip(client), fields(url = %url))]
pub async fn fetch_image(
    client: &Client,
    url: &Url,
    timeout: Duration,
    max_size: u64,
) -> Result<ImageFile, ValidationError> {
    let unreachable = |e: reqwest::Error| ValidationError::Unreachable {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(unreachable)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ValidationError::UrlStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = header_content_type(&response);
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if !content_type.is_empty() && !is_image_content_type(&content_type) {
        return Err(ValidationError::NotAnImage {
            url: url.to_string(),
            content_type,
        });
    }

    if let Some(size) = response.content_length().filter(|size| *size > max_size) {
        warn!(size, max = max_size, "Image URL exceeds the size limit");
        return Err(ValidationError::FileTooLarge { size, max: max_size });
    }

    // The declared length may be missing or wrong; stop reading at the limit.
    let mut response = response;
    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await.map_err(unreachable)? {
        body.extend_from_slice(&chunk);
        let size = u64::try_from(body.len()).unwrap_or(u64::MAX);
        if size > max_size {
            warn!(received = size, max = max_size, "Image download exceeded the size limit");
            return Err(ValidationError::FileTooLarge { size, max: max_size });
        }
    }
    let bytes = body.freeze();

    let name = match (segment, ImageMime::from_content_type(&content_type)) {
        (Some(name), _) if ImageMime::from_file_name(&name).is_some() => name,
        (_, Ok(mime)) => format!("image.{}", mime.extension()),
        (Some(name), Err(_)) => name,
        (None, Err(_)) => "image".to_string(),
    };

    debug!(size = bytes.len(), name = %name, "Fetched image");
    Ok(ImageFile::new(name, content_type, bytes))
}

fn header_content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
