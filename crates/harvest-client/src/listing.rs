use harvest_core::error::AppError;
use harvest_core::traits::PageSource;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::fetcher::Fetcher;

/// One search result block.
pub const RESULT_SELECTOR: &str = "div[data-component-type='s-search-result']";
/// Link to the following result page.
pub const NEXT_PAGE_SELECTOR: &str = "a.s-pagination-next";

const DISABLED_CLASS: &str = "s-pagination-disabled";

/// Owned snapshot of one result block on a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingHandle {
    /// Zero-based position on the page.
    pub position: usize,
    /// Raw `data-asin` attribute, if present and non-blank.
    pub asin: Option<String>,
    /// Outer HTML of the result block.
    pub html: String,
}

/// Page source over a site's search results, fetched page by page.
///
/// `<base>/s?k=<query>&page=<n>` opens a page directly, which is also how a
/// checkpointed page is reached on resume. Later pages are reached through
/// the page's own "next" link.
pub struct SearchPageSource<F: Fetcher> {
    fetcher: F,
    base: Url,
    page: u32,
    document: Option<String>,
}

impl<F: Fetcher> SearchPageSource<F> {
    pub fn new(fetcher: F, base_url: &str) -> Result<Self, AppError> {
        let base = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Base URL '{base_url}' must use http or https"
            )));
        }
        Ok(Self {
            fetcher,
            base,
            page: 0,
            document: None,
        })
    }

    /// Results URL for `query` on `page`.
    pub fn search_url(&self, query: &str, page: u32) -> Url {
        let mut url = self.base.join("/s").unwrap_or_else(|_| self.base.clone());
        url.query_pairs_mut()
            .clear()
            .append_pair("k", query)
            .append_pair("page", &page.to_string());
        url
    }

    fn document(&self) -> Result<&str, AppError> {
        self.document
            .as_deref()
            .ok_or_else(|| AppError::NavigationError("no result page is open".into()))
    }
}

impl<F: Fetcher> PageSource for SearchPageSource<F> {
    type Handle = ListingHandle;

    async fn open(&mut self, query: &str, page: u32) -> Result<(), AppError> {
        let url = self.search_url(query, page);
        tracing::info!(%url, page, "Opening search results");
        let html = self.fetcher.fetch(url.as_str()).await?;
        self.document = Some(html);
        self.page = page;
        Ok(())
    }

    fn current_page(&self) -> u32 {
        self.page
    }

    async fn current_items(&mut self) -> Result<Vec<ListingHandle>, AppError> {
        parse_results(self.document()?)
    }

    async fn advance(&mut self) -> Result<bool, AppError> {
        let Some(href) = next_page_href(self.document()?)? else {
            return Ok(false);
        };
        let next = self.page + 1;
        let url = self
            .base
            .join(&href)
            .map_err(|e| AppError::NavigationError(format!("bad next-page link '{href}': {e}")))?;

        tracing::info!(%url, page = next, "Navigating to next page");
        let html = self.fetcher.fetch(url.as_str()).await.map_err(|e| match e {
            AppError::Timeout(secs) => AppError::Timeout(secs),
            other => AppError::NavigationError(format!("page {next}: {other}")),
        })?;

        if parse_results(&html)?.is_empty() {
            return Err(AppError::NavigationError(format!(
                "page {next} has no results"
            )));
        }
        self.document = Some(html);
        self.page = next;
        Ok(true)
    }
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::Generic(format!("bad selector '{css}': {e}")))
}

fn parse_results(html: &str) -> Result<Vec<ListingHandle>, AppError> {
    let results = selector(RESULT_SELECTOR)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&results)
        .enumerate()
        .map(|(position, el)| ListingHandle {
            position,
            asin: asin_of(&el),
            html: el.html(),
        })
        .collect())
}

fn asin_of(el: &ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("data-asin")
        .map(str::trim)
        .filter(|asin| !asin.is_empty())
        .map(str::to_string)
}

/// `href` of an enabled next-page link.
fn next_page_href(html: &str) -> Result<Option<String>, AppError> {
    let next = selector(NEXT_PAGE_SELECTOR)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&next)
        .find(|el| !el.value().classes().any(|c| c == DISABLED_CLASS))
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string))
}
