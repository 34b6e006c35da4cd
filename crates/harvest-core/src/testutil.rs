//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, ExtractError};
use crate::models::{AppendOutcome, Checkpoint, Identity, Record};
use crate::pacing::{DelayRange, PacingConfig, PacingPolicy};
use crate::report::{SessionEvent, StatusReporter};
use crate::traits::{ExtractionAdapter, PageSource, ProgressStore, RecordSink};

// ---------------------------------------------------------------------------
// ItemSpec
// ---------------------------------------------------------------------------

/// How a mock item behaves when extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemBehavior {
    Ok,
    Fail,
    Panic,
}

/// Handle type yielded by [`MockPageSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpec {
    pub identity: Option<String>,
    pub behavior: ItemBehavior,
}

impl ItemSpec {
    pub fn ok(identity: &str) -> Self {
        Self {
            identity: Some(identity.to_string()),
            behavior: ItemBehavior::Ok,
        }
    }

    /// Item without identity.
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            behavior: ItemBehavior::Ok,
        }
    }

    /// Item whose extraction fails.
    pub fn failing(identity: &str) -> Self {
        Self {
            identity: Some(identity.to_string()),
            behavior: ItemBehavior::Fail,
        }
    }

    /// Item whose extraction panics.
    pub fn panicking(identity: &str) -> Self {
        Self {
            identity: Some(identity.to_string()),
            behavior: ItemBehavior::Panic,
        }
    }
}

/// Build a page of successful items from identities.
pub fn page_of(ids: &[&str]) -> Vec<ItemSpec> {
    ids.iter().map(|id| ItemSpec::ok(id)).collect()
}

/// Record as [`MockAdapter`] would extract it.
pub fn sample_record(identity: &str, page_number: u32) -> Record {
    let mut record = Record::new(
        Identity::parse(identity).expect("non-blank identity"),
        page_number,
    );
    record.title = Some(format!("Item {identity}"));
    record.price = Some("₹45,990".to_string());
    record.rating = Some(4.2);
    record.rating_count = Some(1_024);
    record.product_url = Some(format!("https://shop.example/dp/{identity}"));
    record.best_seller = Some(false);
    record
}

/// Pacing with millisecond delays so session tests run fast.
pub fn fast_pacing() -> PacingPolicy {
    let config = PacingConfig::new(
        DelayRange::new(
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(2),
        ),
        DelayRange::new(
            std::time::Duration::from_millis(3),
            std::time::Duration::from_millis(4),
        ),
    );
    PacingPolicy::new(config).expect("valid test pacing")
}

// ---------------------------------------------------------------------------
// MockPageSource
// ---------------------------------------------------------------------------

/// Mock page source serving fixed pages.
#[derive(Clone)]
pub struct MockPageSource {
    pages: Arc<Vec<Vec<ItemSpec>>>,
    current: u32,
    /// Every `open` call as (query, page).
    pub opened: Arc<Mutex<Vec<(String, u32)>>>,
    /// Number of `advance` calls.
    pub advances: Arc<Mutex<u32>>,
    open_error: Arc<Mutex<Option<AppError>>>,
    advance_error: Arc<Mutex<Option<AppError>>>,
}

impl MockPageSource {
    pub fn new(pages: Vec<Vec<ItemSpec>>) -> Self {
        Self {
            pages: Arc::new(pages),
            current: 0,
            opened: Arc::new(Mutex::new(Vec::new())),
            advances: Arc::new(Mutex::new(0)),
            open_error: Arc::new(Mutex::new(None)),
            advance_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Source whose `open` fails.
    pub fn with_open_error(self, error: AppError) -> Self {
        *self.open_error.lock().unwrap() = Some(error);
        self
    }

    /// Source whose first `advance` fails.
    pub fn with_advance_error(self, error: AppError) -> Self {
        *self.advance_error.lock().unwrap() = Some(error);
        self
    }
}

impl PageSource for MockPageSource {
    type Handle = ItemSpec;

    async fn open(&mut self, query: &str, page: u32) -> Result<(), AppError> {
        self.opened.lock().unwrap().push((query.to_string(), page));
        if let Some(e) = self.open_error.lock().unwrap().take() {
            return Err(e);
        }
        self.current = page;
        Ok(())
    }

    fn current_page(&self) -> u32 {
        self.current
    }

    async fn current_items(&mut self) -> Result<Vec<ItemSpec>, AppError> {
        let index = self.current.saturating_sub(1) as usize;
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    async fn advance(&mut self) -> Result<bool, AppError> {
        *self.advances.lock().unwrap() += 1;
        if let Some(e) = self.advance_error.lock().unwrap().take() {
            return Err(e);
        }
        if (self.current as usize) < self.pages.len() {
            self.current += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// MockAdapter
// ---------------------------------------------------------------------------

/// Mock adapter turning [`ItemSpec`]s into records.
#[derive(Clone, Default)]
pub struct MockAdapter {
    /// Identities passed to `extract`, in call order.
    pub extracted: Arc<Mutex<Vec<String>>>,
    cancel_on: Arc<Mutex<Option<(String, CancellationToken)>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `token` while extracting `identity`, simulating an external
    /// stop request arriving mid-item.
    pub fn cancel_on(self, identity: &str, token: CancellationToken) -> Self {
        *self.cancel_on.lock().unwrap() = Some((identity.to_string(), token));
        self
    }
}

impl ExtractionAdapter for MockAdapter {
    type Handle = ItemSpec;

    fn identity_of(&self, handle: &ItemSpec) -> Option<Identity> {
        handle.identity.as_deref().and_then(Identity::parse)
    }

    async fn extract(&self, handle: &ItemSpec, page_number: u32) -> Result<Record, ExtractError> {
        let id = handle.identity.clone().ok_or(ExtractError::MissingIdentity)?;
        self.extracted.lock().unwrap().push(id.clone());

        if let Some((target, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *target == id {
                token.cancel();
            }
        }

        match handle.behavior {
            ItemBehavior::Ok => Ok(sample_record(&id, page_number)),
            ItemBehavior::Fail => Err(ExtractError::Malformed(format!("price block missing for {id}"))),
            ItemBehavior::Panic => panic!("adapter blew up on {id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// In-memory record sink.
#[derive(Clone, Default)]
pub struct MockSink {
    pub rows: Arc<Mutex<Vec<Record>>>,
    /// Number of `snapshot` calls.
    pub snapshots: Arc<Mutex<u32>>,
    append_errors: Arc<Mutex<u32>>,
    /// Identities a concurrent writer "already stored".
    raced: Arc<Mutex<HashSet<Identity>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockSink {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sink pre-populated with records.
    pub fn with_records(records: Vec<Record>) -> Self {
        let sink = Self::default();
        *sink.rows.lock().unwrap() = records;
        sink
    }

    /// The next `count` appends fail.
    pub fn failing_appends(self, count: u32) -> Self {
        *self.append_errors.lock().unwrap() = count;
        self
    }

    /// Appends for `identity` report `AlreadyExists` although the sink's
    /// identity scan never saw it.
    pub fn raced_with(self, identity: &str) -> Self {
        self.raced
            .lock()
            .unwrap()
            .insert(Identity::parse(identity).unwrap());
        self
    }

    /// Sink whose identity scan fails (unreachable storage).
    pub fn unavailable() -> Self {
        let sink = Self::default();
        *sink.unavailable.lock().unwrap() = true;
        sink
    }

    pub fn identities_in_order(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.identity.to_string())
            .collect()
    }
}

impl RecordSink for MockSink {
    async fn identities(&self) -> Result<HashSet<Identity>, AppError> {
        if *self.unavailable.lock().unwrap() {
            return Err(AppError::SinkError("permission denied".into()));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.identity.clone())
            .collect())
    }

    async fn contains(&self, identity: &Identity) -> Result<bool, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| &r.identity == identity))
    }

    async fn append(&self, record: &Record) -> Result<AppendOutcome, AppError> {
        {
            let mut errors = self.append_errors.lock().unwrap();
            if *errors > 0 {
                *errors -= 1;
                return Err(AppError::SinkError("disk full".into()));
            }
        }
        if self.raced.lock().unwrap().contains(&record.identity) {
            return Ok(AppendOutcome::AlreadyExists);
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.identity == record.identity) {
            return Ok(AppendOutcome::AlreadyExists);
        }
        rows.push(record.clone());
        Ok(AppendOutcome::Written)
    }

    async fn snapshot(&self) -> Result<usize, AppError> {
        *self.snapshots.lock().unwrap() += 1;
        Ok(self.rows.lock().unwrap().len())
    }
}

// ---------------------------------------------------------------------------
// MockProgressStore
// ---------------------------------------------------------------------------

/// In-memory progress store that keeps every saved checkpoint.
#[derive(Clone, Default)]
pub struct MockProgressStore {
    pub current: Arc<Mutex<Option<Checkpoint>>>,
    pub history: Arc<Mutex<Vec<Checkpoint>>>,
    pub clears: Arc<Mutex<u32>>,
    pub save_error: Arc<Mutex<Option<String>>>,
}

impl MockProgressStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Store holding the checkpoint of an interrupted session.
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::default();
        *store.current.lock().unwrap() = Some(checkpoint);
        store
    }

    /// Every `save` fails with `error`.
    pub fn with_failing_saves(self, error: &str) -> Self {
        *self.save_error.lock().unwrap() = Some(error.to_string());
        self
    }
}

impl ProgressStore for MockProgressStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        if let Some(error) = self.save_error.lock().unwrap().clone() {
            return Err(AppError::Generic(error));
        }
        *self.current.lock().unwrap() = Some(checkpoint.clone());
        self.history.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Checkpoint>, AppError> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn clear(&self) -> Result<(), AppError> {
        *self.current.lock().unwrap() = None;
        *self.clears.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps the description of every event.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.contains(needle))
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, event: SessionEvent<'_>) {
        self.events.lock().unwrap().push(event.describe());
    }
}
