//! Multipart client for the inference service.

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, instrument};
use url::Url;
use visual_search_core::{ImageMime, PixelRect};

use super::ApiError;
use super::normalize::{Analysis, analyze};
use crate::config::{ConfigError, ConfigHandle};
use crate::dom::Document;
use crate::validate::{ImageFile, fetch_image, validate_file};

/// Multipart fields carrying a crop rectangle, in natural-image pixels.
pub const CROP_FIELDS: [&str; 4] = ["cropX", "cropY", "cropWidth", "cropHeight"];

// =============================================================================
// SearchClient
// =============================================================================

/// Client for the visual search endpoint.
///
/// Reads the endpoint, shop domain and field names from the live
/// configuration on every call. Cheap to clone.
#[derive(Clone)]
pub struct SearchClient {
    inner: Arc<SearchClientInner>,
}

struct SearchClientInner {
    http: Client,
    config: ConfigHandle,
    document: Document,
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient").finish_non_exhaustive()
    }
}

impl SearchClient {
    /// Create a client with its own connection pool.
    #[must_use]
    pub fn new(config: ConfigHandle, document: Document) -> Self {
        Self::with_client(Client::new(), config, document)
    }

    /// Create a client sharing an existing connection pool.
    #[must_use]
    pub fn with_client(http: Client, config: ConfigHandle, document: Document) -> Self {
        Self {
            inner: Arc::new(SearchClientInner {
                http,
                config,
                document,
            }),
        }
    }

    /// The underlying HTTP client.
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.inner.http
    }

    /// Search with an uploaded file.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, non-2xx status or a body
    /// that is not JSON.
    #[instrument(skip(self, file), fields(file = %file.name, size = file.size()))]
    pub async fn search_file(&self, file: &ImageFile) -> Result<Analysis, ApiError> {
        self.submit(file, None).await
    }

    /// Search with the data behind a live `blob:` URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::MissingBlob` if the URL was revoked, otherwise as
    /// [`Self::search_file`].
    #[instrument(skip(self))]
    pub async fn search_blob_url(&self, blob_url: &str, name: &str) -> Result<Analysis, ApiError> {
        let bytes = self
            .inner
            .document
            .object_url_data(blob_url)
            .ok_or_else(|| ApiError::MissingBlob(blob_url.to_string()))?;
        let content_type = ImageMime::from_file_name(name).map_or("", ImageMime::as_str);
        let file = ImageFile::new(name, content_type, bytes);
        self.submit(&file, None).await
    }

    /// Search a region of `file`. The rectangle must already be in
    /// natural-image pixels (see [`super::ImageState::to_natural`]).
    ///
    /// # Errors
    ///
    /// As [`Self::search_file`].
    #[instrument(skip(self, file), fields(file = %file.name))]
    pub async fn search_crop(&self, file: &ImageFile, crop: PixelRect) -> Result<Analysis, ApiError> {
        self.submit(file, Some(crop)).await
    }

    /// Fetch a result's image and search with it.
    ///
    /// Relative URLs resolve against the page. The image is validated like
    /// an upload and returned with the analysis so the drawer can preview it.
    ///
    /// # Errors
    ///
    /// `ApiError::Image` if the image cannot be fetched or is rejected,
    /// otherwise as [`Self::search_file`].
    #[instrument(skip(self))]
    pub async fn search_by_result_image(
        &self,
        image_url: &str,
    ) -> Result<(ImageFile, Analysis), ApiError> {
        let url = self
            .inner
            .document
            .location()
            .join(image_url)
            .map_err(|_| {
                ApiError::Image(crate::validate::ValidationError::InvalidUrl(
                    image_url.to_string(),
                ))
            })?;

        let (timeout, max_size) = self
            .inner
            .config
            .read(|c| (c.timing.fetch_timeout, c.max_file_size));
        let file = fetch_image(&self.inner.http, &url, timeout, max_size).await?;
        self.inner.config.read(|c| validate_file(&file, c))?;

        let analysis = self.submit(&file, None).await?;
        Ok((file, analysis))
    }

    /// Post one multipart search request.
    async fn submit(&self, file: &ImageFile, crop: Option<PixelRect>) -> Result<Analysis, ApiError> {
        let (endpoint, form) = self.build_form(file, crop)?;
        debug!(endpoint = %endpoint, crop = ?crop, "Submitting visual search");

        let response = self
            .inner
            .http
            .post(endpoint)
            .header("X-Requested-With", "XMLHttpRequest")
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Visual search request failed");
                ApiError::from_transport(&e)
            })?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(ApiError::PayloadTooLarge);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        if !status.is_success() {
            let body: String = body.chars().take(500).collect();
            error!(status = %status, body = %body, "Visual search returned non-success status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse visual search response"
            );
            ApiError::Parse(e)
        })?;

        Ok(analyze(&value))
    }

    fn build_form(&self, file: &ImageFile, crop: Option<PixelRect>) -> Result<(Url, Form), ApiError> {
        let (endpoint, variant, shop) = self.inner.config.read(|c| {
            (c.search_endpoint(), c.endpoint, c.shop_domain.clone())
        });
        let endpoint = endpoint?;
        let shop = shop.ok_or(ConfigError::MissingShopDomain)?;

        let mime = file.mime().map_or("application/octet-stream", ImageMime::as_str);
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(mime)
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let mut form = Form::new()
            .part(variant.image_field(), part)
            .text(variant.shop_field(), shop.to_string());

        if let Some(crop) = crop {
            let values = [crop.x, crop.y, crop.width, crop.height];
            for (field, value) in CROP_FIELDS.into_iter().zip(values) {
                form = form.text(field, value.to_string());
            }
        }

        Ok((endpoint, form))
    }
}
