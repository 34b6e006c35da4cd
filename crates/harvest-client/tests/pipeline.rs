use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use harvest_client::{Fetcher, ListingAdapter, SearchPageSource};
use harvest_core::models::SessionStatus;
use harvest_core::testutil::{fast_pacing, MockProgressStore, MockSink, RecordingReporter};
use harvest_core::{AppError, SessionConfig, SessionController};

#[derive(Clone)]
struct FixtureFetcher {
    pages: Arc<HashMap<String, String>>,
}

impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::HttpError(format!("HTTP 404 for {url}")))
    }
}

fn result_block(asin: &str, title: &str, price: &str) -> String {
    format!(
        r#"<div data-component-type="s-search-result" data-asin="{asin}">
             <h2><a><span>{title}</span></a></h2>
             <span class="a-price"><span class="a-offscreen">{price}</span></span>
             <span class="a-icon-alt">4.0 out of 5 stars</span>
           </div>"#
    )
}

fn results_page(blocks: &[String], next: Option<&str>) -> String {
    let next = match next {
        Some(href) => format!(r#"<a class="s-pagination-next" href="{href}">Next</a>"#),
        None => r#"<span class="s-pagination-next s-pagination-disabled">Next</span>"#.to_string(),
    };
    format!("<html><body>{}{next}</body></html>", blocks.join("\n"))
}

fn fixture() -> FixtureFetcher {
    let page_one = results_page(
        &[
            result_block("B0LAP01", "Slim Laptop", "₹45,990"),
            r#"<div data-component-type="s-search-result" data-asin=""><h2><span>Ad</span></h2></div>"#.to_string(),
            result_block("B0LAP02", "Gaming Laptop", "₹89,990"),
        ],
        Some("/s?k=laptop&page=2"),
    );
    let page_two = results_page(&[result_block("B0LAP03", "Chromebook", "₹21,990")], None);
    FixtureFetcher {
        pages: Arc::new(HashMap::from([
            ("https://shop.example/s?k=laptop&page=1".to_string(), page_one),
            ("https://shop.example/s?k=laptop&page=2".to_string(), page_two),
        ])),
    }
}

#[tokio::test]
async fn harvests_fixture_pages_end_to_end() {
    let source = SearchPageSource::new(fixture(), "https://shop.example").unwrap();
    let adapter = ListingAdapter::new("https://shop.example").unwrap();
    let sink = MockSink::empty();
    let progress = MockProgressStore::empty();
    let reporter = RecordingReporter::new();

    let mut ctl = SessionController::new(
        source,
        adapter,
        sink.clone(),
        progress.clone(),
        fast_pacing(),
        reporter.clone(),
        SessionConfig::default().with_sink_retry(2, Duration::from_millis(1)),
    );

    let outcome = ctl.run("laptop", 10, 5).await;

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.items_captured, 3);
    assert_eq!(outcome.pages_processed, 2);
    assert_eq!(outcome.tally.not_found, 1);
    assert_eq!(sink.identities_in_order(), vec!["B0LAP01", "B0LAP02", "B0LAP03"]);

    let rows = sink.rows.lock().unwrap();
    assert_eq!(rows[1].title.as_deref(), Some("Gaming Laptop"));
    assert_eq!(rows[1].price.as_deref(), Some("₹89,990"));
    assert_eq!(rows[2].page_number, 2);
    assert_eq!(
        rows[2].product_url.as_deref(),
        Some("https://shop.example/dp/B0LAP03")
    );
    assert!(reporter.contains("no further pages"));
}

#[tokio::test]
async fn unreachable_site_fails_setup() {
    let fetcher = FixtureFetcher {
        pages: Arc::new(HashMap::new()),
    };
    let source = SearchPageSource::new(fetcher, "https://shop.example").unwrap();
    let sink = MockSink::empty();

    let mut ctl = SessionController::new(
        source,
        ListingAdapter::new("https://shop.example").unwrap(),
        sink.clone(),
        MockProgressStore::empty(),
        fast_pacing(),
        RecordingReporter::new(),
        SessionConfig::default(),
    );

    let outcome = ctl.run("laptop", 10, 5).await;

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(outcome.cause.unwrap().contains("page source unavailable"));
    assert_eq!(*sink.snapshots.lock().unwrap(), 0);
}
