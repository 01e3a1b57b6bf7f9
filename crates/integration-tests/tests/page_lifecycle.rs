//! Page-level behavior: injection across client-side navigation, the
//! single-drawer rule, shared module loading and teardown.
//!
//! Run with: cargo test -p visual-search-integration-tests

use std::time::Duration;

use url::Url;
use visual_search_integration_tests::{
    MockInference, add_search_input, click_affordance, jpeg, open_with_file, start_widget,
    storefront_page,
};
use visual_search_widget::WidgetEvent;
use visual_search_widget::dom::SelectorList;
use visual_search_widget::inject::AFFORDANCE_CLASS;
use visual_search_widget::loader::ModuleName;
use visual_search_widget::workflow::{DRAWER_ID, DrawerState};

fn count(widget: &visual_search_widget::VisualSearch, selector: &str) -> usize {
    let selector = SelectorList::parse(selector).expect("valid selector");
    widget.document().query_all(&selector).len()
}

#[tokio::test]
async fn test_page_without_app_block_stays_inert() {
    let mock = MockInference::start().await;
    let page = storefront_page(&mock);
    page.document.remove(page.app_block);

    let widget = start_widget(&mock, &page);

    assert!(!widget.is_active());
    assert_eq!(widget.injector().affordance_count(), 0);
    assert!(!widget.watcher().is_running());
}

#[tokio::test]
async fn test_spa_navigation_injects_new_inputs() {
    let mock = MockInference::start().await;
    let page = storefront_page(&mock);
    let widget = start_widget(&mock, &page);

    let original = widget
        .injector()
        .affordance_for(page.search_input)
        .expect("initial affordance");
    assert_eq!(count(&widget, &format!(".{AFFORDANCE_CLASS}")), 1);

    page.document
        .push_state(Url::parse("https://demo.myshopify.com/products/linen-shirt").expect("url"));
    let added = add_search_input(&page.document, "q2");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(widget.injector().affordance_for(added).is_some());
    assert_eq!(widget.injector().affordance_for(page.search_input), Some(original));
    assert_eq!(count(&widget, &format!(".{AFFORDANCE_CLASS}")), 2);
    assert!(widget.watcher().stats().navigation_rescans >= 1);
}

#[tokio::test]
async fn test_single_active_drawer() {
    let mock = MockInference::start().await;
    let page = storefront_page(&mock);
    let second_input = add_search_input(&page.document, "q2");
    let widget = start_widget(&mock, &page);

    open_with_file(&widget, &page, jpeg(1024)).await;
    let first = widget.drawer().snapshot().expect("first drawer");
    assert_eq!(page.document.live_object_urls(), 1);

    assert!(click_affordance(&widget, second_input).await);
    let second = widget.drawer().snapshot().expect("second drawer");

    assert_ne!(first.session, second.session);
    assert_eq!(second.input, Some(second_input));
    assert_eq!(second.state, DrawerState::UploadPending);
    assert_eq!(count(&widget, &format!("#{DRAWER_ID}")), 1);
    assert!(!page.document.exists(first.root));
    assert_eq!(page.document.live_object_urls(), 0);

    assert!(
        widget
            .dispatch(WidgetEvent::KeyDown {
                target: None,
                key: "Escape".to_string(),
            })
            .await
    );
    assert!(!widget.drawer().is_open());
    assert!(page.document.element_by_id(DRAWER_ID).is_none());
}

#[tokio::test]
async fn test_module_loads_are_shared() {
    let mock = MockInference::start().await;
    let page = storefront_page(&mock);
    let widget = start_widget(&mock, &page);

    let (a, b) = tokio::join!(
        widget.open_drawer(Some(page.search_input)),
        widget.open_drawer(Some(page.search_input)),
    );
    assert!(a.is_some());
    assert!(b.is_some());

    assert_eq!(mock.asset_hits(ModuleName::Ui.file_name()), 1);
    assert_eq!(mock.asset_hits(ModuleName::Config.file_name()), 1);
    assert_eq!(mock.asset_hits(ModuleName::Styles.file_name()), 1);
    assert_eq!(mock.asset_hits(ModuleName::Api.file_name()), 0);

    let status = widget.module_status();
    assert!(status[&ModuleName::Ui].is_loaded());
    assert!(!status[&ModuleName::Api].is_loaded());
    assert_eq!(count(&widget, &format!("#{DRAWER_ID}")), 1);
}

#[tokio::test]
async fn test_unload_releases_everything() {
    let mock = MockInference::start().await;
    let page = storefront_page(&mock);
    let widget = start_widget(&mock, &page);

    open_with_file(&widget, &page, jpeg(1024)).await;
    assert!(widget.drawer().is_open());

    assert!(widget.dispatch(WidgetEvent::Unload).await);

    assert!(!widget.drawer().is_open());
    assert!(!widget.watcher().is_running());
    assert!(page.document.element_by_id(DRAWER_ID).is_none());
    assert_eq!(page.document.live_object_urls(), 0);
    assert!(widget.notifier().messages().is_empty());
}
