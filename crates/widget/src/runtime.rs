//! The host-facing facade.
//!
//! A host binding creates one [`VisualSearch`] per page load with
//! [`VisualSearch::bootstrap`], registers it with [`install`], calls
//! [`VisualSearch::start`] and then forwards DOM events through
//! [`VisualSearch::dispatch`]. None of these calls fail once bootstrap has
//! succeeded: runtime failures are logged, shown as a toast and settled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, instrument, warn};
use visual_search_core::{NodeId, Rect, SessionId, Size};

use crate::api::SearchClient;
use crate::config::{ConfigHandle, CssOverrides, HostConfig, ThemeConfig, ThemePatch, WidgetConfig};
use crate::dom::Document;
use crate::error::{Result, WidgetError};
use crate::inject::watcher::{DomWatcher, RescanPolicy};
use crate::inject::{InjectionReport, Injector, detect_app_blocks};
use crate::loader::{AssetFetcher, ModuleLoader, ModuleName, ModuleStatus, resolve_asset_base};
use crate::notify::Notifier;
use crate::validate::ImageFile;
use crate::workflow::{DrawerController, SearchOutcome};

/// A DOM event forwarded by the host binding.
#[derive(Debug, Clone)]
pub enum WidgetEvent {
    Click(NodeId),
    KeyDown { target: Option<NodeId>, key: String },
    Scroll(NodeId),
    FileSelected(ImageFile),
    UrlEntered(String),
    ImageLoaded { natural: Size, displayed: Size },
    Resize { displayed: Size },
    Crop(Rect),
    /// A host platform event such as `shopify:section:load`.
    Platform(String),
    Unload,
}

// =============================================================================
// VisualSearch
// =============================================================================

/// The widget for one page. Cheap to clone.
#[derive(Clone)]
pub struct VisualSearch {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    document: Document,
    config: ConfigHandle,
    loader: ModuleLoader,
    injector: Injector,
    watcher: DomWatcher,
    notifier: Notifier,
    drawer: DrawerController,
    app_blocks: usize,
    started: AtomicBool,
}

impl std::fmt::Debug for VisualSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualSearch")
            .field("app_blocks", &self.inner.app_blocks)
            .field("loader", &self.inner.loader)
            .finish_non_exhaustive()
    }
}

impl VisualSearch {
    /// Detect app blocks, resolve configuration and wire up the components.
    ///
    /// Configuration comes from defaults, then `host`, then CSS custom
    /// properties on the detected blocks.
    ///
    /// # Errors
    ///
    /// Fails only if the built-in selectors do not parse.
    #[instrument(skip_all)]
    pub fn bootstrap(
        document: Document,
        host: Option<HostConfig>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Result<Self> {
        let blocks = detect_app_blocks(&document);
        let css = CssOverrides::collect(&document, &blocks);
        let config = ConfigHandle::new(WidgetConfig::resolve(host.as_ref(), &css));
        let timing = config.read(|c| c.timing);

        let base = resolve_asset_base(&document);
        let loader = ModuleLoader::new(base, document.clone(), config.clone(), fetcher);
        let injector = Injector::new(document.clone(), config.clone())?;
        let watcher = DomWatcher::new(
            injector.clone(),
            document.clone(),
            RescanPolicy::from_timing(&timing),
        );
        let notifier = Notifier::new(document.clone(), timing.toast_duration);
        let client = SearchClient::new(config.clone(), document.clone());
        let drawer = DrawerController::new(document.clone(), config.clone(), client, notifier.clone());

        info!(
            app_blocks = blocks.len(),
            asset_base = %loader.base(),
            "Visual search bootstrapped"
        );

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                document,
                config,
                loader,
                injector,
                watcher,
                notifier,
                drawer,
                app_blocks: blocks.len(),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Whether the page carries an app block, i.e. the feature is enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.app_blocks > 0
    }

    /// Inject affordances and start watching for page changes.
    ///
    /// Returns `false` if the feature is inactive on this page or already
    /// started.
    pub fn start(&self) -> bool {
        if !self.is_active() {
            info!("No app block on this page, visual search inactive");
            return false;
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.injector.inject_all();
        self.inner.watcher.start();
        true
    }

    /// Force a rescan for search inputs.
    pub fn inject(&self) -> InjectionReport {
        self.inner.injector.inject_all()
    }

    /// Load the UI modules and open the drawer for `input`.
    ///
    /// A module failure shows an "unavailable" toast and returns `None`.
    #[instrument(skip(self))]
    pub async fn open_drawer(&self, input: Option<NodeId>) -> Option<SessionId> {
        let opened = match self.inner.loader.load(ModuleName::Ui).await {
            Ok(_) => self.inner.drawer.open(input).map_err(WidgetError::from),
            Err(e) => Err(WidgetError::from(e)),
        };
        match opened {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Could not open visual search");
                self.inner.notifier.error(&e.user_message());
                None
            }
        }
    }

    /// The current configuration.
    #[must_use]
    pub fn config(&self) -> WidgetConfig {
        self.inner.config.snapshot()
    }

    /// Merge a partial theme into the live configuration and refresh the
    /// generated stylesheet.
    pub fn update_theme(&self, patch: &ThemePatch) -> ThemeConfig {
        let theme = self.inner.config.update_theme(patch);
        self.inner.loader.refresh_theme_styles();
        theme
    }

    /// Load status of every module.
    #[must_use]
    pub fn module_status(&self) -> BTreeMap<ModuleName, ModuleStatus> {
        self.inner.loader.statuses()
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    #[must_use]
    pub fn drawer(&self) -> &DrawerController {
        &self.inner.drawer
    }

    #[must_use]
    pub fn injector(&self) -> &Injector {
        &self.inner.injector
    }

    #[must_use]
    pub fn watcher(&self) -> &DomWatcher {
        &self.inner.watcher
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Handle one DOM event. Returns whether the widget acted on it.
    pub async fn dispatch(&self, event: WidgetEvent) -> bool {
        let drawer = &self.inner.drawer;
        match event {
            WidgetEvent::Click(target) => match self.inner.injector.input_for(target) {
                Some(input) => self.open_drawer(Some(input)).await.is_some(),
                None => drawer.handle_click(target).await,
            },
            WidgetEvent::KeyDown { target, key } => {
                let input = target.and_then(|t| self.inner.injector.input_for(t));
                match (key.as_str(), input) {
                    ("Enter" | " ", Some(input)) => self.open_drawer(Some(input)).await.is_some(),
                    (key, _) => drawer.handle_key(key),
                }
            }
            WidgetEvent::Scroll(target) => {
                let ours = drawer
                    .snapshot()
                    .is_some_and(|s| s.results_container == target);
                ours && drawer.on_scroll().await > 0
            }
            WidgetEvent::FileSelected(file) => drawer.select_file(file),
            WidgetEvent::UrlEntered(raw) => drawer.enter_url(&raw).await,
            WidgetEvent::ImageLoaded { natural, displayed } => drawer.image_loaded(natural, displayed),
            WidgetEvent::Resize { displayed } => drawer.image_resized(displayed),
            WidgetEvent::Crop(rect) => {
                !matches!(drawer.search_crop(rect).await, SearchOutcome::Ignored)
            }
            WidgetEvent::Platform(name) => {
                debug!(event = %name, "Platform event");
                self.inner.watcher.platform_event(&name)
            }
            WidgetEvent::Unload => {
                self.shutdown();
                true
            }
        }
    }

    /// Close the drawer, stop watching and clear toasts.
    pub fn shutdown(&self) {
        self.inner.drawer.close();
        self.inner.watcher.stop();
        self.inner.notifier.clear();
        info!("Visual search shut down");
    }
}

// =============================================================================
// Global instance
// =============================================================================

static INSTANCE: OnceLock<VisualSearch> = OnceLock::new();

/// Register the page's widget. Later calls return the first instance.
pub fn install(runtime: VisualSearch) -> VisualSearch {
    let installed = INSTANCE.get_or_init(|| runtime);
    installed.clone()
}

/// The registered widget, if any.
#[must_use]
pub fn installed() -> Option<VisualSearch> {
    INSTANCE.get().cloned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use url::Url;

    use super::*;
    use crate::loader::LoadError;
    use crate::workflow::DrawerState;

    #[derive(Default)]
    struct StaticFetcher {
        failing: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl AssetFetcher for StaticFetcher {
        async fn fetch(&self, url: &Url) -> std::result::Result<String, LoadError> {
            if self.failing.lock().iter().any(|f| url.as_str().ends_with(f)) {
                return Err(LoadError::Status {
                    url: url.clone(),
                    status: 404,
                });
            }
            Ok(format!("/* {url} */"))
        }
    }

    fn page(with_block: bool) -> (Document, NodeId) {
        let document = Document::new(Url::parse("https://shop.example.com/").unwrap());
        let body = document.body();
        if with_block {
            let block = document.create_element("div");
            document
                .set_attribute(block, "data-visual-search-block", "")
                .unwrap();
            document
                .set_author_style(block, "--vs-icon-color", "#ff0000")
                .unwrap();
            document.append_child(body, block).unwrap();
        }
        let form = document.create_element("form");
        document.append_child(body, form).unwrap();
        let input = document.create_element("input");
        document.set_attribute(input, "type", "search").unwrap();
        document.set_attribute(input, "name", "q").unwrap();
        document.set_rendered_height(input, 40.0).unwrap();
        document.append_child(form, input).unwrap();
        (document, input)
    }

    fn widget(document: &Document, fetcher: Arc<StaticFetcher>) -> VisualSearch {
        let host = HostConfig::from_json(r#"{"shopDomain":"demo.myshopify.com"}"#).unwrap();
        VisualSearch::bootstrap(document.clone(), Some(host), fetcher).unwrap()
    }

    #[tokio::test]
    async fn test_inactive_without_app_block() {
        let (document, _) = page(false);
        let widget = widget(&document, Arc::default());
        assert!(!widget.is_active());
        assert!(!widget.start());
        assert_eq!(widget.injector().affordance_count(), 0);
    }

    #[tokio::test]
    async fn test_start_injects_once_and_resolves_css_theme() {
        let (document, input) = page(true);
        let widget = widget(&document, Arc::default());
        assert!(widget.start());
        assert!(!widget.start());
        assert!(widget.watcher().is_running());
        assert_eq!(widget.injector().affordance_count(), 1);
        assert!(widget.injector().affordance_for(input).is_some());
        assert_eq!(widget.config().theme.icon_color, "#ff0000");
        assert_eq!(
            widget.config().shop_domain.unwrap().as_str(),
            "demo.myshopify.com"
        );

        let report = widget.inject();
        assert!(report.injected.is_empty());
        assert_eq!(widget.injector().affordance_count(), 1);
        widget.shutdown();
        assert!(!widget.watcher().is_running());
    }

    #[tokio::test]
    async fn test_affordance_click_loads_ui_and_opens_drawer() {
        let (document, input) = page(true);
        let widget = widget(&document, Arc::default());
        widget.start();
        let affordance = widget.injector().affordance_for(input).unwrap();

        assert!(widget.dispatch(WidgetEvent::Click(affordance)).await);
        let snapshot = widget.drawer().snapshot().unwrap();
        assert_eq!(snapshot.input, Some(input));
        assert_eq!(snapshot.state, DrawerState::UploadPending);
        for name in [ModuleName::Config, ModuleName::Utils, ModuleName::Styles, ModuleName::Ui] {
            assert_eq!(widget.module_status()[&name], ModuleStatus::Loaded, "{name}");
        }
        assert_eq!(widget.module_status()[&ModuleName::Api], ModuleStatus::Absent);

        let escape = WidgetEvent::KeyDown {
            target: None,
            key: "Escape".to_string(),
        };
        assert!(widget.dispatch(escape).await);
        assert!(!widget.drawer().is_open());

        let enter = WidgetEvent::KeyDown {
            target: Some(affordance),
            key: "Enter".to_string(),
        };
        assert!(widget.dispatch(enter).await);
        assert!(widget.drawer().is_open());

        assert!(widget.dispatch(WidgetEvent::Unload).await);
        assert!(!widget.drawer().is_open());
    }

    #[tokio::test]
    async fn test_module_failure_shows_unavailable_toast() {
        let (document, input) = page(true);
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.failing.lock().insert("visual-search.css".to_string());
        let widget = widget(&document, fetcher.clone());

        assert_eq!(widget.open_drawer(Some(input)).await, None);
        assert_eq!(widget.notifier().messages(), vec![crate::error::UNAVAILABLE_MESSAGE]);
        assert!(!widget.drawer().is_open());
        assert!(matches!(
            widget.module_status()[&ModuleName::Styles],
            ModuleStatus::Failed(_)
        ));

        fetcher.failing.lock().clear();
        assert!(widget.open_drawer(Some(input)).await.is_some());
    }

    #[tokio::test]
    async fn test_update_theme_refreshes_stylesheet() {
        let (document, _) = page(true);
        let widget = widget(&document, Arc::default());
        widget.open_drawer(None).await.unwrap();

        let theme = widget.update_theme(&ThemePatch {
            icon_color: Some("#00ff00".to_string()),
            ..ThemePatch::default()
        });
        assert_eq!(theme.icon_color, "#00ff00");
        let style = document.element_by_id(crate::loader::THEME_STYLE_ID).unwrap();
        assert!(document.text_content(style).contains("--vs-icon-color: #00ff00;"));
    }

    #[tokio::test]
    async fn test_platform_event_forwarded() {
        let (document, _) = page(true);
        let widget = widget(&document, Arc::default());
        assert!(!widget.dispatch(WidgetEvent::Platform("shopify:section:load".into())).await);
        widget.start();
        assert!(widget.dispatch(WidgetEvent::Platform("shopify:section:load".into())).await);
        assert!(!widget.dispatch(WidgetEvent::Platform("click".into())).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        widget.shutdown();
    }

    #[tokio::test]
    async fn test_install_returns_first_instance() {
        let (document, _) = page(true);
        let first = install(widget(&document, Arc::default()));
        let second = install(widget(&document, Arc::default()));
        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert!(installed().is_some());
    }
}
