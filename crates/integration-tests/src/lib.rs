//! Integration tests for the visual search widget.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p visual-search-integration-tests
//! ```
//!
//! Every test starts its own [`MockInference`] on `127.0.0.1:0`. It serves
//! the widget's assets, a search endpoint for both endpoint variants, and
//! product images, and records every search request it receives.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Value, json};
use url::Url;
use visual_search_core::NodeId;
use visual_search_widget::{VisualSearch, WidgetEvent};
use visual_search_widget::config::HostConfig;
use visual_search_widget::dom::{Document, SelectorList};
use visual_search_widget::loader::{BOOTSTRAP_SCRIPT, HttpAssetFetcher};
use visual_search_widget::validate::ImageFile;

// =============================================================================
// Mock inference service
// =============================================================================

/// One multipart search request as the service saw it.
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub path: String,
    /// Text fields by name; file fields map to `"<file>"`.
    pub fields: HashMap<String, String>,
    pub file_name: Option<String>,
    pub file_len: usize,
    pub requested_with: Option<String>,
}

#[derive(Debug, Clone)]
struct Scripted {
    status: u16,
    body: Value,
    delay: Duration,
}

#[derive(Debug, Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    asset_hits: Arc<Mutex<HashMap<String, usize>>>,
}

/// An in-process inference service.
#[derive(Debug, Clone)]
pub struct MockInference {
    pub base: Url,
    state: MockState,
}

impl MockInference {
    /// Bind to an ephemeral port and serve in the background.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/search/{shop}", post(search))
            .route("/api/product-handle", post(search))
            .route("/assets/{file}", get(asset))
            .route("/images/{file}", get(image))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock inference service");
        let addr = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock inference service");
        });

        Self {
            base: Url::parse(&format!("http://{addr}/")).expect("valid base URL"),
            state,
        }
    }

    /// Queue the next search response.
    pub fn respond(&self, status: u16, body: Value) {
        self.state.responses.lock().push_back(Scripted {
            status,
            body,
            delay: Duration::ZERO,
        });
    }

    /// Queue a successful response that arrives after `delay`.
    pub fn respond_after(&self, delay: Duration, body: Value) {
        self.state.responses.lock().push_back(Scripted {
            status: 200,
            body,
            delay,
        });
    }

    /// Search requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// How often an asset file was requested.
    #[must_use]
    pub fn asset_hits(&self, file: &str) -> usize {
        self.state.asset_hits.lock().get(file).copied().unwrap_or(0)
    }

    /// Where the bootstrap script would be served from.
    #[must_use]
    pub fn bootstrap_src(&self) -> String {
        format!("{}assets/{BOOTSTRAP_SCRIPT}", self.base)
    }
}

async fn search(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut request = RecordedRequest {
        path: uri.path().to_string(),
        requested_with: headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..RecordedRequest::default()
    };
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name() {
            request.file_name = Some(file_name.to_string());
            request.file_len = field.bytes().await.map(|b| b.len()).unwrap_or_default();
            request.fields.insert(name, "<file>".to_string());
        } else {
            request
                .fields
                .insert(name, field.text().await.unwrap_or_default());
        }
    }
    state.requests.lock().push(request);

    let scripted = state.responses.lock().pop_front().unwrap_or(Scripted {
        status: 200,
        body: json!([]),
        delay: Duration::ZERO,
    });
    if !scripted.delay.is_zero() {
        tokio::time::sleep(scripted.delay).await;
    }
    let status = StatusCode::from_u16(scripted.status).unwrap_or(StatusCode::OK);
    (status, axum::Json(scripted.body)).into_response()
}

async fn asset(State(state): State<MockState>, Path(file): Path<String>) -> Response {
    *state.asset_hits.lock().entry(file.clone()).or_default() += 1;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let content_type = if file.ends_with(".css") {
        "text/css"
    } else {
        "application/javascript"
    };
    ([(header::CONTENT_TYPE, content_type)], format!("/* {file} */")).into_response()
}

async fn image() -> Response {
    ([(header::CONTENT_TYPE, "image/png")], Bytes::from(vec![0x89; 256])).into_response()
}

// =============================================================================
// Page fixtures
// =============================================================================

/// A storefront page with the widget's app block and one search input.
#[derive(Debug, Clone)]
pub struct StorefrontPage {
    pub document: Document,
    pub app_block: NodeId,
    pub search_input: NodeId,
}

/// Build a collection page that loads the bootstrap script from `mock`.
///
/// # Panics
///
/// Panics if the fixture cannot be built.
#[must_use]
pub fn storefront_page(mock: &MockInference) -> StorefrontPage {
    let document = Document::new(
        Url::parse("https://demo.myshopify.com/collections/all").expect("page URL"),
    );

    let script = document.create_element("script");
    document
        .set_attribute(script, "src", &mock.bootstrap_src())
        .expect("script src");
    document
        .append_child(document.head(), script)
        .expect("append script");

    let app_block = document.create_element("div");
    document
        .set_attribute(app_block, "data-visual-search-block", "")
        .expect("block marker");
    document
        .append_child(document.body(), app_block)
        .expect("append block");

    let search_input = add_search_input(&document, "q");
    StorefrontPage {
        document,
        app_block,
        search_input,
    }
}

/// Render a header search form and return its input.
///
/// # Panics
///
/// Panics if the fixture cannot be built.
pub fn add_search_input(document: &Document, name: &str) -> NodeId {
    let form = document.create_element("form");
    document
        .set_attribute(form, "action", "/search")
        .expect("form action");
    let input = document.create_element("input");
    document.set_attribute(input, "type", "search").expect("type");
    document.set_attribute(input, "name", name).expect("name");
    document.set_rendered_height(input, 40.0).expect("height");
    document.append_child(form, input).expect("append input");
    document
        .append_child(document.body(), form)
        .expect("append form");
    input
}

/// The host configuration object pointing the widget at `mock`.
///
/// # Panics
///
/// Panics if the JSON is malformed.
#[must_use]
pub fn host_config(mock: &MockInference) -> HostConfig {
    HostConfig::from_json(
        &json!({
            "appUrl": mock.base.as_str(),
            "shopDomain": "demo.myshopify.com",
        })
        .to_string(),
    )
    .expect("host config")
}

/// Bootstrap and start the widget on `page`.
#[must_use]
pub fn start_widget(mock: &MockInference, page: &StorefrontPage) -> VisualSearch {
    start_widget_with(page, host_config(mock))
}

/// Bootstrap and start the widget with an explicit host configuration.
///
/// # Panics
///
/// Panics if bootstrap fails.
#[must_use]
pub fn start_widget_with(page: &StorefrontPage, host: HostConfig) -> VisualSearch {
    let fetcher = HttpAssetFetcher::new(Duration::from_secs(5)).expect("asset fetcher");
    let widget = VisualSearch::bootstrap(page.document.clone(), Some(host), Arc::new(fetcher))
        .expect("bootstrap");
    widget.start();
    widget
}

/// A JPEG-typed file of `len` bytes.
#[must_use]
pub fn jpeg(len: usize) -> ImageFile {
    ImageFile::new("photo.jpg", "image/jpeg", Bytes::from(vec![0xFF; len]))
}

/// A PNG-typed file of `len` bytes.
#[must_use]
pub fn png(len: usize) -> ImageFile {
    ImageFile::new("photo.png", "image/png", Bytes::from(vec![0x89; len]))
}

/// `{products: [...]}` with `n` numbered items.
#[must_use]
pub fn products(n: usize) -> Value {
    let items: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "image": format!("/images/{i}.png"),
                "title": format!("Product {i}"),
                "price": format!("${}.00", 10 + i),
            })
        })
        .collect();
    json!({ "products": items })
}

// =============================================================================
// Interaction helpers
// =============================================================================

/// Click the affordance injected next to `input`.
///
/// # Panics
///
/// Panics if `input` has no affordance.
pub async fn click_affordance(widget: &VisualSearch, input: NodeId) -> bool {
    let affordance = widget
        .injector()
        .affordance_for(input)
        .expect("input has an affordance");
    widget.dispatch(WidgetEvent::Click(affordance)).await
}

/// Click the first element matching `selector`.
///
/// # Panics
///
/// Panics if nothing matches.
pub async fn click_first(widget: &VisualSearch, selector: &str) -> bool {
    let selector = SelectorList::parse(selector).expect("valid selector");
    let target = widget
        .document()
        .query(&selector)
        .expect("element to click");
    widget.dispatch(WidgetEvent::Click(target)).await
}

/// Open the drawer from the page's search input and choose `file`.
///
/// # Panics
///
/// Panics if the drawer does not open or rejects the file.
pub async fn open_with_file(widget: &VisualSearch, page: &StorefrontPage, file: ImageFile) {
    assert!(click_affordance(widget, page.search_input).await, "drawer opened");
    assert!(
        widget.dispatch(WidgetEvent::FileSelected(file)).await,
        "file accepted"
    );
}
