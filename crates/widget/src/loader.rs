//! Lazy, dependency-aware loading of the widget's companion assets.
//!
//! The bootstrap script is the only asset a theme includes directly. The
//! rest (configuration, utilities, styles, API and UI modules) are fetched on
//! first use and evaluated once each, in dependency order:
//!
//! ```text
//! config ─┬─> utils ─┬─> api
//!         │          └─> ui <── styles
//!         └──────────────┘
//! ```
//!
//! Loading is backed by a `moka` cache: concurrent `load` calls for the same
//! module share a single in-flight initialization, every caller receives the
//! same `Arc` handle (or the same error), and failures are never cached so a
//! later call retries the fetch.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use moka::future::Cache;
use parking_lot::Mutex;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;
use visual_search_core::NodeId;

use crate::config::ConfigHandle;
use crate::dom::{Document, DomError, SelectorList};

/// File name of the bootstrap script, used to locate the asset base.
pub const BOOTSTRAP_SCRIPT: &str = "visual-search-core.js";

/// Element id of the generated theme stylesheet.
pub const THEME_STYLE_ID: &str = "vs-theme-vars";

/// Errors that can occur while loading a module.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The request never produced a response.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: Url, reason: String },

    /// The server answered with a non-success status.
    #[error("fetching {url} returned HTTP {status}")]
    Status { url: Url, status: u16 },

    /// The asset arrived but could not be evaluated.
    #[error("failed to evaluate module '{module}': {reason}")]
    Evaluate { module: ModuleName, reason: String },

    /// A dependency failed, so this module was not attempted.
    #[error("module '{module}' dependency failed: {source}")]
    Dependency {
        module: ModuleName,
        #[source]
        source: Arc<LoadError>,
    },

    /// The asset URL could not be built.
    #[error("invalid asset URL for '{module}': {reason}")]
    InvalidUrl { module: ModuleName, reason: String },
}

/// A companion module of the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleName {
    Config,
    Utils,
    Styles,
    Api,
    Ui,
}

/// How an asset is attached to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Script,
    Stylesheet,
}

impl ModuleName {
    /// Every module, leaves first.
    pub const ALL: [Self; 5] = [Self::Config, Self::Styles, Self::Utils, Self::Api, Self::Ui];

    /// Modules that must be loaded before this one.
    #[must_use]
    pub const fn dependencies(self) -> &'static [Self] {
        match self {
            Self::Config | Self::Styles => &[],
            Self::Utils => &[Self::Config],
            Self::Api => &[Self::Config, Self::Utils],
            Self::Ui => &[Self::Config, Self::Utils, Self::Styles],
        }
    }

    /// The asset file name relative to the asset base.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Config => "visual-search-config.js",
            Self::Utils => "visual-search-utils.js",
            Self::Styles => "visual-search.css",
            Self::Api => "visual-search-api.js",
            Self::Ui => "visual-search-ui.js",
        }
    }

    #[must_use]
    pub const fn kind(self) -> AssetKind {
        match self {
            Self::Styles => AssetKind::Stylesheet,
            _ => AssetKind::Script,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Utils => "utils",
            Self::Styles => "styles",
            Self::Api => "api",
            Self::Ui => "ui",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config" => Ok(Self::Config),
            "utils" => Ok(Self::Utils),
            "styles" => Ok(Self::Styles),
            "api" => Ok(Self::Api),
            "ui" => Ok(Self::Ui),
            other => Err(format!("unknown module '{other}'")),
        }
    }
}

/// A loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    pub name: ModuleName,
    /// Resolved asset URL.
    pub url: Url,
    /// The `<script>` or `<link>` element carrying the asset.
    pub element: NodeId,
    /// Size of the evaluated source in bytes.
    pub size: usize,
}

/// Lifecycle of one module: `absent → loading → loaded`.
///
/// A failed load is reported as `Failed` and may be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    Absent,
    Loading,
    Loaded,
    Failed(String),
}

impl ModuleStatus {
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

/// Retrieves asset source text.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the asset at `url`.
    ///
    /// # Errors
    ///
    /// `LoadError::Fetch` on transport failure, `LoadError::Status` on a
    /// non-success response.
    async fn fetch(&self, url: &Url) -> Result<String, LoadError>;
}

/// Fetches assets over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    /// Create a fetcher with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Use an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<String, LoadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LoadError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| LoadError::Fetch {
            url: url.clone(),
            reason: e.to_string(),
        })
    }
}

/// Derive the asset base from the bootstrap script's own `src`.
///
/// Strips the file name from the first `<script>` whose `src` names the
/// bootstrap file, so the widget works from any CDN path. Falls back to
/// `{origin}/assets/` when the script is not in the page.
#[must_use]
pub fn resolve_asset_base(document: &Document) -> Url {
    let location = document.location();
    let fallback = || {
        location
            .join("/assets/")
            .unwrap_or_else(|_| location.clone())
    };

    let Ok(selector) = SelectorList::parse(&format!("script[src*=\"{BOOTSTRAP_SCRIPT}\"]")) else {
        return fallback();
    };

    document
        .query(&selector)
        .and_then(|script| document.attribute(script, "src"))
        .and_then(|src| location.join(&src).ok())
        .and_then(|src| src.join("./").ok())
        .unwrap_or_else(fallback)
}

/// Lazily loads widget modules into the page.
///
/// Cheap to clone; clones share the same caches.
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<ModuleLoaderInner>,
}

struct ModuleLoaderInner {
    base: Url,
    document: Document,
    config: ConfigHandle,
    fetcher: Arc<dyn AssetFetcher>,
    modules: Cache<ModuleName, Arc<ModuleHandle>>,
    loaded_assets: Mutex<HashSet<Url>>,
    statuses: Mutex<BTreeMap<ModuleName, ModuleStatus>>,
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("base", &self.inner.base.as_str())
            .field("statuses", &*self.inner.statuses.lock())
            .finish_non_exhaustive()
    }
}

impl ModuleLoader {
    /// Create a loader for assets under `base`.
    #[must_use]
    pub fn new(
        base: Url,
        document: Document,
        config: ConfigHandle,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Self {
        let modules = Cache::builder()
            .max_capacity(ModuleName::ALL.len() as u64)
            .build();

        Self {
            inner: Arc::new(ModuleLoaderInner {
                base,
                document,
                config,
                fetcher,
                modules,
                loaded_assets: Mutex::new(HashSet::new()),
                statuses: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// The base URL assets are resolved against.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.inner.base
    }

    /// Load a module and its dependencies, at most once.
    ///
    /// # Errors
    ///
    /// Returns the shared load error. Every concurrent caller receives the
    /// same `Arc`; the failure is not cached, so a later call retries.
    pub fn load(&self, name: ModuleName) -> BoxFuture<'_, Result<Arc<ModuleHandle>, Arc<LoadError>>> {
        async move {
            if let Some(handle) = self.inner.modules.get(&name).await {
                return Ok(handle);
            }

            let result = self
                .inner
                .modules
                .try_get_with(name, self.load_uncached(name))
                .await;

            if let Err(e) = &result {
                self.set_status(name, ModuleStatus::Failed(e.to_string()));
            }
            result
        }
        .boxed()
    }

    /// Load several modules, failing on the first error.
    ///
    /// # Errors
    ///
    /// Returns the first module's load error.
    pub async fn load_all(
        &self,
        names: &[ModuleName],
    ) -> Result<Vec<Arc<ModuleHandle>>, Arc<LoadError>> {
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            handles.push(self.load(*name).await?);
        }
        Ok(handles)
    }

    /// Current status of one module.
    #[must_use]
    pub fn status(&self, name: ModuleName) -> ModuleStatus {
        self.inner
            .statuses
            .lock()
            .get(&name)
            .cloned()
            .unwrap_or(ModuleStatus::Absent)
    }

    /// Status of every module.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<ModuleName, ModuleStatus> {
        ModuleName::ALL
            .iter()
            .map(|name| (*name, self.status(*name)))
            .collect()
    }

    /// Asset URLs that have been attached to the page.
    #[must_use]
    pub fn loaded_assets(&self) -> Vec<Url> {
        let mut urls: Vec<Url> = self.inner.loaded_assets.lock().iter().cloned().collect();
        urls.sort();
        urls
    }

    /// Rewrite the generated theme stylesheet, if the styles module is loaded.
    pub fn refresh_theme_styles(&self) {
        let Some(style) = self.inner.document.element_by_id(THEME_STYLE_ID) else {
            return;
        };
        let css = self.inner.config.read(|c| c.theme.css_variables());
        if let Err(e) = self.inner.document.set_text(style, &css) {
            warn!(error = %e, "Failed to refresh theme stylesheet");
        }
    }

    fn set_status(&self, name: ModuleName, status: ModuleStatus) {
        let mut statuses = self.inner.statuses.lock();
        // Never move a loaded module backwards.
        if statuses.get(&name).is_some_and(ModuleStatus::is_loaded) {
            return;
        }
        statuses.insert(name, status);
    }

    #[instrument(skip(self), fields(module = %name))]
    async fn load_uncached(&self, name: ModuleName) -> Result<Arc<ModuleHandle>, LoadError> {
        self.set_status(name, ModuleStatus::Loading);

        for dependency in name.dependencies() {
            self.load(*dependency)
                .await
                .map_err(|source| LoadError::Dependency {
                    module: name,
                    source,
                })?;
        }

        let url = self
            .inner
            .base
            .join(name.file_name())
            .map_err(|e| LoadError::InvalidUrl {
                module: name,
                reason: e.to_string(),
            })?;

        debug!(url = %url, "Fetching module asset");
        let source = self.inner.fetcher.fetch(&url).await?;
        let handle = self.evaluate(name, url, &source)?;

        self.set_status(name, ModuleStatus::Loaded);
        info!(url = %handle.url, size = handle.size, "Module loaded");
        Ok(Arc::new(handle))
    }

    /// Attach the fetched asset to the page.
    fn evaluate(&self, name: ModuleName, url: Url, source: &str) -> Result<ModuleHandle, LoadError> {
        if source.trim().is_empty() {
            return Err(LoadError::Evaluate {
                module: name,
                reason: "asset is empty".to_string(),
            });
        }

        let dom_error = |e: DomError| LoadError::Evaluate {
            module: name,
            reason: e.to_string(),
        };

        let document = &self.inner.document;
        let already_attached = !self.inner.loaded_assets.lock().insert(url.clone());
        let existing = if already_attached {
            self.find_asset_element(name, &url)
        } else {
            None
        };

        let element = if let Some(element) = existing {
            element
        } else {
            let element = match name.kind() {
                AssetKind::Script => {
                    let script = document.create_element("script");
                    document
                        .set_attribute(script, "src", url.as_str())
                        .map_err(dom_error)?;
                    document
                        .set_attribute(script, "data-vs-module", name.as_str())
                        .map_err(dom_error)?;
                    document.set_text(script, source).map_err(dom_error)?;
                    script
                }
                AssetKind::Stylesheet => {
                    let link = document.create_element("link");
                    document
                        .set_attribute(link, "rel", "stylesheet")
                        .map_err(dom_error)?;
                    document
                        .set_attribute(link, "href", url.as_str())
                        .map_err(dom_error)?;
                    document
                        .set_attribute(link, "data-vs-module", name.as_str())
                        .map_err(dom_error)?;
                    link
                }
            };
            document
                .append_child(document.head(), element)
                .map_err(dom_error)?;
            element
        };

        if name == ModuleName::Styles {
            self.install_theme_styles().map_err(dom_error)?;
        }

        Ok(ModuleHandle {
            name,
            url,
            element,
            size: source.len(),
        })
    }

    fn find_asset_element(&self, name: ModuleName, url: &Url) -> Option<NodeId> {
        let (tag, attr) = match name.kind() {
            AssetKind::Script => ("script", "src"),
            AssetKind::Stylesheet => ("link", "href"),
        };
        let selector = SelectorList::parse(&format!("{tag}[{attr}=\"{url}\"]")).ok()?;
        self.inner.document.query(&selector)
    }

    fn install_theme_styles(&self) -> Result<(), DomError> {
        let document = &self.inner.document;
        let css = self.inner.config.read(|c| c.theme.css_variables());
        let style = if let Some(existing) = document.element_by_id(THEME_STYLE_ID) {
            existing
        } else {
            let style = document.create_element("style");
            document.set_attribute(style, "id", THEME_STYLE_ID)?;
            document.append_child(document.head(), style)?;
            style
        };
        document.set_text(style, &css)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::{ThemePatch, WidgetConfig};

    /// Serves canned assets after a short delay and counts requests per URL.
    #[derive(Default)]
    struct FakeFetcher {
        counts: Mutex<HashMap<String, usize>>,
        failing: Mutex<HashSet<String>>,
        total: AtomicUsize,
    }

    impl FakeFetcher {
        fn count(&self, file: &str) -> usize {
            self.counts
                .lock()
                .iter()
                .filter(|(url, _)| url.ends_with(file))
                .map(|(_, n)| *n)
                .sum()
        }

        fn fail(&self, file: &str) {
            self.failing.lock().insert(file.to_string());
        }

        fn heal(&self, file: &str) {
            self.failing.lock().remove(file);
        }
    }

    #[async_trait]
    impl AssetFetcher for FakeFetcher {
        async fn fetch(&self, url: &Url) -> Result<String, LoadError> {
            *self.counts.lock().entry(url.to_string()).or_default() += 1;
            self.total.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let failing = self
                .failing
                .lock()
                .iter()
                .any(|file| url.as_str().ends_with(file.as_str()));
            if failing {
                return Err(LoadError::Status {
                    url: url.clone(),
                    status: 404,
                });
            }
            Ok(format!("/* {url} */"))
        }
    }

    fn setup() -> (ModuleLoader, Arc<FakeFetcher>, Document) {
        let document = Document::new(Url::parse("https://shop.example.com/products/a").unwrap());
        let fetcher = Arc::new(FakeFetcher::default());
        let loader = ModuleLoader::new(
            Url::parse("https://cdn.example.com/widget/").unwrap(),
            document.clone(),
            ConfigHandle::new(WidgetConfig::default()),
            fetcher.clone(),
        );
        (loader, fetcher, document)
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let (loader, fetcher, _) = setup();

        let calls: Vec<_> = (0..8).map(|_| loader.load(ModuleName::Api)).collect();
        let handles = futures_util::future::join_all(calls).await;

        let first = handles[0].as_ref().unwrap();
        for handle in &handles {
            assert!(Arc::ptr_eq(first, handle.as_ref().unwrap()));
        }
        assert_eq!(fetcher.count("visual-search-api.js"), 1);
        assert_eq!(fetcher.count("visual-search-config.js"), 1);
        assert_eq!(fetcher.count("visual-search-utils.js"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_across_modules_share_dependencies() {
        let (loader, fetcher, _) = setup();

        let (ui, api) = tokio::join!(loader.load(ModuleName::Ui), loader.load(ModuleName::Api));
        assert!(ui.is_ok());
        assert!(api.is_ok());
        assert_eq!(fetcher.count("visual-search-config.js"), 1);
        assert_eq!(fetcher.count("visual-search-utils.js"), 1);
        assert_eq!(fetcher.total.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_dependencies_load_first_and_attach_once() {
        let (loader, _, document) = setup();
        loader.load(ModuleName::Ui).await.unwrap();
        loader.load(ModuleName::Ui).await.unwrap();

        let statuses = loader.statuses();
        assert!(statuses[&ModuleName::Config].is_loaded());
        assert!(statuses[&ModuleName::Utils].is_loaded());
        assert!(statuses[&ModuleName::Styles].is_loaded());
        assert!(statuses[&ModuleName::Ui].is_loaded());
        assert_eq!(statuses[&ModuleName::Api], ModuleStatus::Absent);

        let scripts = document.query_all(&SelectorList::parse("script[data-vs-module]").unwrap());
        assert_eq!(scripts.len(), 3);
        let links = document.query_all(&SelectorList::parse("link[rel=stylesheet]").unwrap());
        assert_eq!(links.len(), 1);
        assert_eq!(loader.loaded_assets().len(), 4);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_retryable() {
        let (loader, fetcher, _) = setup();
        fetcher.fail("visual-search-utils.js");

        let (a, b) = tokio::join!(loader.load(ModuleName::Utils), loader.load(ModuleName::Utils));
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(matches!(*a, LoadError::Status { status: 404, .. }));
        assert!(matches!(loader.status(ModuleName::Utils), ModuleStatus::Failed(_)));
        assert_eq!(fetcher.count("visual-search-utils.js"), 1);

        fetcher.heal("visual-search-utils.js");
        loader.load(ModuleName::Utils).await.unwrap();
        assert_eq!(fetcher.count("visual-search-utils.js"), 2);
        assert!(loader.status(ModuleName::Utils).is_loaded());
        // Config succeeded the first time and is not refetched.
        assert_eq!(fetcher.count("visual-search-config.js"), 1);
    }

    #[tokio::test]
    async fn test_dependency_failure_is_wrapped() {
        let (loader, fetcher, _) = setup();
        fetcher.fail("visual-search.css");
        let err = loader.load(ModuleName::Ui).await.unwrap_err();
        assert!(matches!(
            &*err,
            LoadError::Dependency {
                module: ModuleName::Ui,
                ..
            }
        ));
        assert_eq!(fetcher.count("visual-search-ui.js"), 0);
    }

    #[tokio::test]
    async fn test_styles_install_theme_variables() {
        let (loader, _, document) = setup();
        loader.load(ModuleName::Styles).await.unwrap();
        let style = document.element_by_id(THEME_STYLE_ID).unwrap();
        assert!(document.text_content(style).contains("--vs-icon-color: #5f6368;"));

        loader.inner.config.update_theme(&ThemePatch {
            icon_color: Some("#123456".to_string()),
            ..ThemePatch::default()
        });
        loader.refresh_theme_styles();
        assert!(document.text_content(style).contains("--vs-icon-color: #123456;"));
    }

    #[test]
    fn test_resolve_asset_base_from_script_src() {
        let document = Document::new(Url::parse("https://shop.example.com/collections/all").unwrap());
        let script = document.create_element("script");
        document
            .set_attribute(
                script,
                "src",
                "//cdn.shopify.com/extensions/abc/assets/visual-search-core.js?v=3",
            )
            .unwrap();
        document.append_child(document.head(), script).unwrap();
        assert_eq!(
            resolve_asset_base(&document).as_str(),
            "https://cdn.shopify.com/extensions/abc/assets/"
        );
    }

    #[test]
    fn test_resolve_asset_base_falls_back_to_origin() {
        let document = Document::new(Url::parse("https://shop.example.com/collections/all").unwrap());
        assert_eq!(
            resolve_asset_base(&document).as_str(),
            "https://shop.example.com/assets/"
        );
    }

    #[test]
    fn test_dependency_graph() {
        assert!(ModuleName::Config.dependencies().is_empty());
        assert!(ModuleName::Styles.dependencies().is_empty());
        assert_eq!(ModuleName::Utils.dependencies(), &[ModuleName::Config]);
        assert_eq!(
            ModuleName::Ui.dependencies(),
            &[ModuleName::Config, ModuleName::Utils, ModuleName::Styles]
        );
        assert_eq!("api".parse(), Ok(ModuleName::Api));
    }
}
