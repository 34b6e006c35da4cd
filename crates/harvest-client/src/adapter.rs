use harvest_core::error::{AppError, ExtractError};
use harvest_core::models::{Identity, Record};
use harvest_core::traits::ExtractionAdapter;
use scraper::{Html, Selector};
use url::Url;

use crate::listing::ListingHandle;

const TITLE: &[&str] = &["h2 span", "h2 a span", "[data-cy='title-recipe'] span"];
const PRICE: &[&str] = &[
    ".a-price:not(.a-text-price) .a-offscreen",
    ".a-price-whole",
    ".a-price-range .a-price .a-offscreen",
];
const ORIGINAL_PRICE: &[&str] = &[".a-text-price .a-offscreen"];
const RATING: &[&str] = &[".a-icon-alt", "[aria-label*='out of 5 stars']"];
const REVIEW_COUNT: &[&str] = &["a[aria-label*='ratings'] span", ".a-size-base.s-underline-text"];
const IMAGE: &[&str] = &[".s-image", "img[data-image-index]"];
const BADGE: &[&str] = &[".a-badge-text"];
const DELIVERY: &[&str] = &[".udm-primary-delivery-message", "[data-cy='delivery-block']"];

/// Reads product fields out of search result blocks.
#[derive(Debug, Clone)]
pub struct ListingAdapter {
    base: Url,
}

impl ListingAdapter {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;
        Ok(Self { base })
    }

    /// Canonical product page: `<base>/dp/<identity>`.
    pub fn product_url(&self, identity: &Identity) -> String {
        self.base
            .join(&format!("/dp/{identity}"))
            .map(String::from)
            .unwrap_or_else(|_| format!("{}/dp/{identity}", self.base.as_str().trim_end_matches('/')))
    }

    fn read(
        &self,
        handle: &ListingHandle,
        identity: Identity,
        page_number: u32,
    ) -> Result<Record, ExtractError> {
        let fragment = Html::parse_fragment(&handle.html);
        let text = |selectors: &[&str]| first_text(&fragment, selectors);

        let mut record = Record::new(identity, page_number);
        record.title = text(TITLE);
        record.price = text(PRICE).map(|p| p.trim_end_matches('.').to_string());
        record.original_price = text(ORIGINAL_PRICE);
        record.rating = first_match(&fragment, RATING, |el| {
            parse_rating(&element_text(el))
                .or_else(|| el.value().attr("aria-label").and_then(parse_rating))
        });
        record.rating_count = first_match(&fragment, REVIEW_COUNT, |el| parse_count(&element_text(el)));
        record.image_url = first_match(&fragment, IMAGE, |el| el.value().attr("src").map(str::to_string));
        record.best_seller = Some(text(BADGE).is_some_and(|badge| badge.contains("Best seller")));
        record.delivery_info = text(DELIVERY);

        let mut record = record.normalized();
        if record.is_empty() {
            return Err(ExtractError::EmptyListing(record.identity.to_string()));
        }
        record.product_url = Some(self.product_url(&record.identity));
        Ok(record)
    }
}

impl ExtractionAdapter for ListingAdapter {
    type Handle = ListingHandle;

    fn identity_of(&self, handle: &ListingHandle) -> Option<Identity> {
        handle.asin.as_deref().and_then(Identity::parse)
    }

    async fn extract(&self, handle: &ListingHandle, page_number: u32) -> Result<Record, ExtractError> {
        let identity = self.identity_of(handle).ok_or(ExtractError::MissingIdentity)?;
        self.read(handle, identity, page_number)
    }
}

/// Text content with whitespace runs collapsed.
fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First element across `selectors` for which `pick` yields a value.
fn first_match<T>(
    html: &Html,
    selectors: &[&str],
    mut pick: impl FnMut(scraper::ElementRef<'_>) -> Option<T>,
) -> Option<T> {
    selectors
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| html.select(&selector).find_map(&mut pick))
}

fn first_text(html: &Html, selectors: &[&str]) -> Option<String> {
    first_match(html, selectors, |el| {
        let text = element_text(el);
        (!text.is_empty()).then_some(text)
    })
}

/// `"4.3 out of 5 stars"` → `4.3`
pub fn parse_rating(text: &str) -> Option<f32> {
    let (value, _) = text.split_once("out of 5")?;
    let rating: f32 = value.split_whitespace().last()?.parse().ok()?;
    (0.0..=5.0).contains(&rating).then_some(rating)
}

/// `"(1,024)"` → `1024`; anything other than digits and separators is rejected.
pub fn parse_count(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '(' | ')' | ' '))
    {
        return None;
    }
    trimmed
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r##"
      <div data-component-type="s-search-result" data-asin="B0C1XYZ">
        <div class="a-section">
          <img class="s-image" src="https://m.media.example/images/I/71abc.jpg">
          <span class="a-badge-text">Best seller</span>
          <h2 class="a-size-medium"><a href="/sspa/click?x=1"><span>ASUS Vivobook 15,  Intel Core i5
             12th Gen</span></a></h2>
          <span class="a-icon-alt">4.2 out of 5 stars</span>
          <a aria-label="1,024 ratings" href="#"><span class="a-size-base s-underline-text">1,024</span></a>
          <span class="a-price"><span class="a-offscreen">₹45,990</span><span class="a-price-whole">45,990.</span></span>
          <span class="a-price a-text-price"><span class="a-offscreen">₹62,990</span></span>
          <div class="udm-primary-delivery-message">FREE delivery <b>Sat, 4 Jan</b></div>
        </div>
      </div>"##;

    const SPARSE: &str = r#"
      <div data-component-type="s-search-result" data-asin="B0SPARSE">
        <h2><span>Refurbished Laptop</span></h2>
        <span class="a-price-whole">19,499.</span>
      </div>"#;

    fn handle(asin: Option<&str>, html: &str) -> ListingHandle {
        ListingHandle {
            position: 0,
            asin: asin.map(str::to_string),
            html: html.to_string(),
        }
    }

    fn adapter() -> ListingAdapter {
        ListingAdapter::new("https://shop.example").unwrap()
    }

    #[tokio::test]
    async fn extracts_every_field() {
        let record = adapter()
            .extract(&handle(Some("B0C1XYZ"), FULL), 3)
            .await
            .unwrap();

        assert_eq!(record.identity.as_str(), "B0C1XYZ");
        assert_eq!(record.title.as_deref(), Some("ASUS Vivobook 15, Intel Core i5 12th Gen"));
        assert_eq!(record.price.as_deref(), Some("₹45,990"));
        assert_eq!(record.original_price.as_deref(), Some("₹62,990"));
        assert_eq!(record.rating, Some(4.2));
        assert_eq!(record.rating_count, Some(1024));
        assert_eq!(
            record.image_url.as_deref(),
            Some("https://m.media.example/images/I/71abc.jpg")
        );
        assert_eq!(
            record.product_url.as_deref(),
            Some("https://shop.example/dp/B0C1XYZ")
        );
        assert_eq!(record.best_seller, Some(true));
        assert_eq!(record.delivery_info.as_deref(), Some("FREE delivery Sat, 4 Jan"));
        assert_eq!(record.page_number, 3);
    }

    #[tokio::test]
    async fn missing_fields_stay_absent() {
        let record = adapter()
            .extract(&handle(Some("B0SPARSE"), SPARSE), 1)
            .await
            .unwrap();

        assert_eq!(record.price.as_deref(), Some("19,499"));
        assert_eq!(record.original_price, None);
        assert_eq!(record.rating, None);
        assert_eq!(record.rating_count, None);
        assert_eq!(record.best_seller, Some(false));
    }

    #[tokio::test]
    async fn block_without_fields_is_an_error() {
        let err = adapter()
            .extract(&handle(Some("B0EMPTY"), "<div><p>   </p></div>"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::EmptyListing(ref id) if id == "B0EMPTY"));
    }

    #[tokio::test]
    async fn missing_identity() {
        let adapter = adapter();
        let h = handle(None, SPARSE);
        assert_eq!(adapter.identity_of(&h), None);
        assert!(matches!(
            adapter.extract(&h, 1).await,
            Err(ExtractError::MissingIdentity)
        ));
        assert_eq!(adapter.identity_of(&handle(Some("  "), SPARSE)), None);
    }

    #[test]
    fn rating_text() {
        assert_eq!(parse_rating("4.3 out of 5 stars"), Some(4.3));
        assert_eq!(parse_rating("Rated 5.0 out of 5 stars"), Some(5.0));
        assert_eq!(parse_rating("out of 5 stars"), None);
        assert_eq!(parse_rating("9.1 out of 5 stars"), None);
        assert_eq!(parse_rating("no rating"), None);
    }

    #[test]
    fn count_text() {
        assert_eq!(parse_count("1,024"), Some(1024));
        assert_eq!(parse_count("(87)"), Some(87));
        assert_eq!(parse_count("4.2 out of 5"), None);
        assert_eq!(parse_count(""), None);
    }
}
