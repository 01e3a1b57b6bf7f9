//! Image URL check.

use reqwest::Client;
use tracing::info;
use visual_search_widget::config::Timing;
use visual_search_widget::validate::UrlValidator;

use super::CommandError;

/// Validate `raw` the way the drawer does before using it as a query.
///
/// # Errors
///
/// Returns the validation failure (malformed, unreachable, non-2xx or not
/// an image).
pub async fn run(raw: &str) -> Result<(), CommandError> {
    let timeout = Timing::default().fetch_timeout;
    let validator = UrlValidator::new(Client::builder().timeout(timeout).build()?, timeout);

    let url = validator.validate(raw).await?;
    info!(url = %url, "URL serves an image");
    Ok(())
}
