//! One-shot search with a local image.

use std::path::Path;

use bytes::Bytes;
use tracing::info;
use visual_search_core::{ImageMime, PixelRect};
use visual_search_widget::api::{Analysis, SearchClient};
use visual_search_widget::config::{ConfigHandle, WidgetConfig};
use visual_search_widget::dom::Document;
use visual_search_widget::validate::{ImageFile, validate_file};

use super::CommandError;

/// Parse `x,y,width,height`.
///
/// # Errors
///
/// Returns a message for clap if the value is malformed or empty.
pub fn parse_crop(raw: &str) -> Result<PixelRect, String> {
    let values = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid crop value '{part}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let [x, y, width, height] = values.as_slice() else {
        return Err("crop must be x,y,width,height".to_string());
    };
    let rect = PixelRect::new(*x, *y, *width, *height);
    if rect.is_empty() {
        return Err("crop width and height must be positive".to_string());
    }
    Ok(rect)
}

/// Upload `path` and log the normalized results.
///
/// # Errors
///
/// Fails on missing configuration, an unreadable or rejected file, or a
/// failed request.
pub async fn run(path: &Path, crop: Option<PixelRect>) -> Result<(), CommandError> {
    let config = WidgetConfig::from_env()?;

    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    let content_type = ImageMime::from_file_name(&name).map_or("", ImageMime::as_str);
    let file = ImageFile::new(name, content_type, Bytes::from(bytes));
    validate_file(&file, &config)?;

    let document = Document::new(config.app_url.clone());
    let client = SearchClient::new(ConfigHandle::new(config), document);

    info!(file = %file.name, size = file.size(), ?crop, "Searching...");
    let analysis = match crop {
        Some(crop) => client.search_crop(&file, crop).await?,
        None => client.search_file(&file).await?,
    };

    if let Analysis::Detected(items) = &analysis {
        for item in items {
            info!(label = %item.label, products = item.products.len(), "Detected item");
        }
    }

    let results = analysis.into_results();
    info!(count = results.len(), "Search complete");
    for result in &results {
        info!(
            title = %result.title,
            price = %result.price,
            image = %result.image_url,
            url = result.url.as_deref().unwrap_or("-"),
            "Result"
        );
    }
    Ok(())
}
