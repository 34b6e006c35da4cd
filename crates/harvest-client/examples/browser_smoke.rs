/// Smoke test for `BrowserFetcher` against a live results page.
///
/// Opens the first results page for a query in Chromium and prints what the
/// listing adapter reads from each result block. Nothing is written.
///
/// Run with:
///   cargo run -p harvest-client --example browser_smoke --features browser -- "gaming laptop"
use harvest_client::{BrowserFetcher, BrowserOptions, ListingAdapter, SearchPageSource};
use harvest_core::traits::{ExtractionAdapter, PageSource};

const BASE_URL: &str = "https://www.amazon.in";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let query = std::env::args().nth(1).unwrap_or_else(|| "laptop".into());

    println!("Launching headless browser…");
    let fetcher = BrowserFetcher::launch(BrowserOptions::default()).await?;
    let mut source = SearchPageSource::new(fetcher, BASE_URL)?;
    let adapter = ListingAdapter::new(BASE_URL)?;

    source.open(&query, 1).await?;
    let items = source.current_items().await?;
    println!("{} result blocks on page 1", items.len());
    anyhow::ensure!(!items.is_empty(), "no result blocks found (blocked?)");

    for item in items.iter().take(5) {
        match adapter.extract(item, 1).await {
            Ok(record) => println!(
                "{:>12}  {:>10}  {}",
                record.identity,
                record.price.as_deref().unwrap_or("-"),
                record.title.as_deref().unwrap_or("-")
            ),
            Err(e) => println!("{:>12}  skipped: {e}", item.asin.as_deref().unwrap_or("?")),
        }
    }
    Ok(())
}
