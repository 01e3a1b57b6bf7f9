//! Widget asset smoke check.
//!
//! Loads every module through the same loader the widget uses, so a broken
//! or missing asset on the CDN fails here before it fails on a storefront.

use std::sync::Arc;

use tracing::{info, warn};
use visual_search_widget::config::{ConfigHandle, WidgetConfig, asset_base_from_env};
use visual_search_widget::dom::Document;
use visual_search_widget::loader::{HttpAssetFetcher, ModuleLoader, ModuleName, ModuleStatus};

use super::CommandError;

/// Load all modules and report each one's status.
///
/// # Errors
///
/// Returns the first module's load error.
pub async fn check() -> Result<(), CommandError> {
    let config = WidgetConfig::from_env()?;
    let base = asset_base_from_env(&config)?;
    let fetcher = Arc::new(HttpAssetFetcher::new(config.timing.fetch_timeout)?);
    let document = Document::new(config.app_url.clone());
    let loader = ModuleLoader::new(base, document, ConfigHandle::new(config), fetcher);

    info!(base = %loader.base(), "Loading widget modules...");
    let result = loader.load_all(&ModuleName::ALL).await;

    for (name, status) in loader.statuses() {
        match status {
            ModuleStatus::Failed(reason) => warn!(module = %name, %reason, "Module failed"),
            status => info!(module = %name, ?status, "Module status"),
        }
    }
    result?;

    info!(assets = loader.loaded_assets().len(), "All modules loaded!");
    Ok(())
}
