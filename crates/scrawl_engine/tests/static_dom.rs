use std::sync::Once;

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scrawl_core::{ClickOptions, EngineKind};
use scrawl_engine::{
    CapabilityError, Driver, LaunchOptions, NavigateOptions, Page, PageOptions, StaticDriver,
    TextFilter,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(scrawl_logging::initialize_for_tests);
}

async fn open_page(driver: &StaticDriver) -> Box<dyn Page> {
    let mut session = driver
        .launch(EngineKind::Chromium, LaunchOptions::default())
        .await
        .expect("launch");
    session
        .open_page(PageOptions::default())
        .await
        .expect("open page")
}

#[tokio::test]
async fn navigate_fetches_and_parses_a_document() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><h1>Title</h1><a href='/next'>next</a></body></html>",
            "text/html; charset=utf-8",
        ))
        .mount(&server)
        .await;

    let driver = StaticDriver::new();
    let mut page = open_page(&driver).await;
    let url = format!("{}/doc", server.uri());
    page.navigate(&url, NavigateOptions::default()).await.expect("navigate");
    assert_eq!(page.current_url(), url);

    let headings = page
        .locate(None, "h1", &TextFilter::default())
        .await
        .expect("locate");
    assert_eq!(headings.len(), 1);
    assert_eq!(
        page.text(headings[0], None).await.expect("text"),
        Some("Title".to_string())
    );

    let anchors = page
        .locate(None, "a", &TextFilter::default())
        .await
        .expect("locate");
    assert_eq!(
        page.attribute(anchors[0], "href", None).await.expect("attribute"),
        Some("/next".to_string())
    );
    assert_eq!(page.attribute(anchors[0], "title", None).await.expect("attribute"), None);
}

#[tokio::test]
async fn navigate_fails_on_http_status() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let driver = StaticDriver::new();
    let mut page = open_page(&driver).await;
    let url = format!("{}/missing", server.uri());

    let err = page.navigate(&url, NavigateOptions::default()).await.unwrap_err();
    assert!(matches!(err, CapabilityError::Navigation { .. }));
}

#[tokio::test]
async fn text_filters_narrow_matches() {
    init_logging();
    let driver = StaticDriver::new().seed(
        "mem://list",
        ["<ul><li>keep me</li><li>drop me</li><li>keep too</li></ul>"],
    );
    let mut page = open_page(&driver).await;
    page.navigate("mem://list", NavigateOptions::default()).await.expect("navigate");

    let kept = page
        .locate(
            None,
            "li",
            &TextFilter {
                has_text: Some("keep".into()),
                has_not_text: None,
            },
        )
        .await
        .expect("locate");
    assert_eq!(kept.len(), 2);

    let narrowed = page
        .locate(
            None,
            "li",
            &TextFilter {
                has_text: Some("keep".into()),
                has_not_text: Some("too".into()),
            },
        )
        .await
        .expect("locate");
    assert_eq!(narrowed.len(), 1);
    assert_eq!(
        page.text(narrowed[0], None).await.expect("text"),
        Some("keep me".to_string())
    );
}

#[tokio::test]
async fn scoped_locate_searches_within_the_element() {
    init_logging();
    let driver = StaticDriver::new().seed(
        "mem://scoped",
        ["<div class='a'><span>inner</span></div><span>outer</span>"],
    );
    let mut page = open_page(&driver).await;
    page.navigate("mem://scoped", NavigateOptions::default()).await.expect("navigate");

    let containers = page
        .locate(None, "div.a", &TextFilter::default())
        .await
        .expect("locate");
    let spans = page
        .locate(Some(containers[0]), "span", &TextFilter::default())
        .await
        .expect("locate");
    assert_eq!(spans.len(), 1);
    assert_eq!(
        page.text(spans[0], None).await.expect("text"),
        Some("inner".to_string())
    );
}

#[tokio::test]
async fn wait_for_times_out_when_nothing_matches() {
    init_logging();
    let driver = StaticDriver::new().seed("mem://empty", ["<div></div>"]);
    let mut page = open_page(&driver).await;
    page.navigate("mem://empty", NavigateOptions::default()).await.expect("navigate");

    let err = page
        .wait_for(None, "div.never", &TextFilter::default(), 250)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CapabilityError::Timeout { timeout_ms: 250, .. }
    ));

    page.wait_for(None, "div", &TextFilter::default(), 250)
        .await
        .expect("present immediately");
}

#[tokio::test]
async fn click_advances_to_the_next_snapshot_and_detaches_handles() {
    init_logging();
    let driver = StaticDriver::new().seed(
        "mem://paged",
        [
            "<p>one</p><button id='next'>next</button>",
            "<p>two</p><button id='next' disabled>next</button>",
        ],
    );
    let mut page = open_page(&driver).await;
    page.navigate("mem://paged", NavigateOptions::default()).await.expect("navigate");

    let buttons = page
        .locate(None, "#next", &TextFilter::default())
        .await
        .expect("locate");
    assert!(!page.is_disabled(buttons[0]).await.expect("disabled"));
    page.click(buttons[0], &ClickOptions::default()).await.expect("click");

    // The old handle belongs to the replaced document.
    let err = page.text(buttons[0], None).await.unwrap_err();
    assert!(matches!(err, CapabilityError::Detached(_)));

    let paragraphs = page
        .locate(None, "p", &TextFilter::default())
        .await
        .expect("locate");
    assert_eq!(
        page.text(paragraphs[0], None).await.expect("text"),
        Some("two".to_string())
    );
    let buttons = page
        .locate(None, "#next", &TextFilter::default())
        .await
        .expect("locate");
    assert!(page.is_disabled(buttons[0]).await.expect("disabled"));

    // The last snapshot absorbs further clicks.
    page.click(buttons[0], &ClickOptions::default()).await.expect("click");
    let paragraphs = page
        .locate(None, "p", &TextFilter::default())
        .await
        .expect("locate");
    assert_eq!(
        page.text(paragraphs[0], None).await.expect("text"),
        Some("two".to_string())
    );
}

#[tokio::test]
async fn child_indexing_counts_text_nodes() {
    init_logging();
    let driver = StaticDriver::new().seed(
        "mem://children",
        ["<p id='t'>first<span>second</span></p><a id='l'><img src='/pic.png'></a>"],
    );
    let mut page = open_page(&driver).await;
    page.navigate("mem://children", NavigateOptions::default()).await.expect("navigate");

    let paragraphs = page
        .locate(None, "#t", &TextFilter::default())
        .await
        .expect("locate");
    assert_eq!(
        page.text(paragraphs[0], Some(1)).await.expect("text"),
        Some("first".to_string())
    );
    assert_eq!(
        page.text(paragraphs[0], Some(2)).await.expect("text"),
        Some("second".to_string())
    );
    assert_eq!(page.text(paragraphs[0], Some(9)).await.expect("text"), None);

    let anchors = page
        .locate(None, "#l", &TextFilter::default())
        .await
        .expect("locate");
    assert_eq!(
        page.attribute(anchors[0], "src", Some(1)).await.expect("attribute"),
        Some("/pic.png".to_string())
    );
}

#[tokio::test]
async fn invalid_selector_is_reported() {
    init_logging();
    let driver = StaticDriver::new().seed("mem://doc", ["<div></div>"]);
    let mut page = open_page(&driver).await;
    page.navigate("mem://doc", NavigateOptions::default()).await.expect("navigate");

    let err = page
        .locate(None, "div[", &TextFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::InvalidSelector { .. }));
}

#[tokio::test]
async fn screenshot_is_unsupported() {
    init_logging();
    let driver = StaticDriver::new().seed("mem://doc", ["<div></div>"]);
    let mut page = open_page(&driver).await;
    page.navigate("mem://doc", NavigateOptions::default()).await.expect("navigate");

    let err = page.screenshot("out.png", true).await.unwrap_err();
    assert!(matches!(err, CapabilityError::Unsupported("screenshot")));
}
