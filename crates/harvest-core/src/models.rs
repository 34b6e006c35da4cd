use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable, source-assigned key of an item (e.g. a catalog number).
///
/// Used for deduplication across sessions; never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Returns `None` for blank input so an empty attribute can never be
    /// mistaken for a real identity.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One captured item.
///
/// Every field except `identity`, `page_number` and `captured_at` is
/// optional. Text fields hold `None` rather than an empty string; use
/// [`Record::normalized`] before persisting hand-built records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identity: Identity,
    pub title: Option<String>,
    pub price: Option<String>,
    pub original_price: Option<String>,
    pub rating: Option<f32>,
    pub rating_count: Option<u32>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub best_seller: Option<bool>,
    pub delivery_info: Option<String>,
    pub page_number: u32,
    pub captured_at: DateTime<Utc>,
}

impl Record {
    /// A record with only the mandatory fields set, stamped now.
    pub fn new(identity: Identity, page_number: u32) -> Self {
        Self {
            identity,
            title: None,
            price: None,
            original_price: None,
            rating: None,
            rating_count: None,
            image_url: None,
            product_url: None,
            best_seller: None,
            delivery_info: None,
            page_number,
            captured_at: Utc::now(),
        }
    }

    /// Trim text fields and turn blank ones into `None`.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.title,
            &mut self.price,
            &mut self.original_price,
            &mut self.image_url,
            &mut self.product_url,
            &mut self.delivery_info,
        ] {
            *field = field.take().and_then(|v| non_blank(&v));
        }
        self
    }

    /// True when no descriptive field was captured.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.price.is_none()
            && self.original_price.is_none()
            && self.rating.is_none()
            && self.rating_count.is_none()
            && self.image_url.is_none()
            && self.delivery_info.is_none()
    }
}

/// Trimmed copy of `value`, or `None` if nothing is left.
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Result of writing a record to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The row is fully persisted.
    Written,
    /// A row with the same identity was already present; nothing written.
    AlreadyExists,
}

/// Persisted marker of how far a session got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Zero-based position of the last captured item on `page_number`.
    pub last_index: usize,
    /// Number of item handles the page yielded.
    pub total_items: usize,
    pub page_number: u32,
    /// Items captured by the session so far.
    pub captured: u32,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(last_index: usize, total_items: usize, page_number: u32, captured: u32) -> Self {
        Self {
            last_index,
            total_items,
            page_number,
            captured,
            saved_at: Utc::now(),
        }
    }

    /// Index of the first item still to visit on the checkpointed page.
    pub fn resume_index(&self) -> usize {
        self.last_index + 1
    }
}

/// Terminal classification of a session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Completed,
    Failed,
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-item counters that are not captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ItemTally {
    pub not_found: u32,
    pub already_exists: u32,
    pub extract_errors: u32,
    pub sink_errors: u32,
}

/// What a session run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub items_captured: u32,
    pub pages_processed: u32,
    pub tally: ItemTally,
    /// Why the session stopped early, if it did.
    pub cause: Option<String>,
}

impl SessionOutcome {
    /// Outcome for a session that never got past setup.
    pub fn failed(cause: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Failed,
            items_captured: 0,
            pages_processed: 0,
            tally: ItemTally::default(),
            cause: Some(cause.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_rejects_blank() {
        assert_eq!(Identity::parse("   "), None);
        assert_eq!(Identity::parse(""), None);
        assert_eq!(Identity::parse(" B0C1 ").unwrap().as_str(), "B0C1");
    }

    #[test]
    fn test_normalized_drops_blank_text() {
        let mut record = Record::new(Identity::parse("B0C1").unwrap(), 1);
        record.title = Some("  Gaming Laptop ".into());
        record.price = Some("   ".into());
        record.delivery_info = Some(String::new());

        let record = record.normalized();
        assert_eq!(record.title.as_deref(), Some("Gaming Laptop"));
        assert_eq!(record.price, None);
        assert_eq!(record.delivery_info, None);
    }

    #[test]
    fn test_record_is_empty() {
        let mut record = Record::new(Identity::parse("B0C1").unwrap(), 1);
        assert!(record.is_empty());
        record.rating = Some(4.5);
        assert!(!record.is_empty());
    }

    #[test]
    fn test_checkpoint_resume_index() {
        let checkpoint = Checkpoint::new(4, 20, 2, 7);
        assert_eq!(checkpoint.resume_index(), 5);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Interrupted.to_string(), "interrupted");
        assert_eq!(
            serde_json::to_string(&SessionStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
