use std::collections::HashSet;
use std::future::Future;

use crate::error::{AppError, ExtractError};
use crate::models::{AppendOutcome, Checkpoint, Identity, Record};

/// A paginated listing of items, driven by one browsing context.
///
/// Implementations are used strictly sequentially; `&mut self` makes the
/// single-context constraint part of the signature.
pub trait PageSource: Send {
    /// Opaque reference to one item on the current page.
    type Handle: Send + Sync;

    /// Navigate to the results for `query`, positioned on `page` (1-based).
    ///
    /// Also used to seek back to a checkpointed page on resume.
    fn open(&mut self, query: &str, page: u32) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Page number the source is currently positioned on.
    fn current_page(&self) -> u32;

    /// Item handles on the current page, in source order.
    fn current_items(&mut self)
    -> impl Future<Output = Result<Vec<Self::Handle>, AppError>> + Send;

    /// Move to the next page.
    ///
    /// `Ok(false)` means there is no further page; `Err` means navigation
    /// was attempted and failed.
    fn advance(&mut self) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Reads structured records out of item handles.
pub trait ExtractionAdapter: Send + Sync {
    type Handle: Send + Sync;

    /// Cheap identity probe, run before any pacing or full extraction.
    fn identity_of(&self, handle: &Self::Handle) -> Option<Identity>;

    /// Full extraction of one item found on `page_number`.
    fn extract(
        &self,
        handle: &Self::Handle,
        page_number: u32,
    ) -> impl Future<Output = Result<Record, ExtractError>> + Send;
}

/// Durable, deduplicating record storage with a row store and a
/// structured snapshot.
pub trait RecordSink: Send + Sync {
    /// Every identity currently present in the row store.
    fn identities(&self) -> impl Future<Output = Result<HashSet<Identity>, AppError>> + Send;

    fn contains(&self, identity: &Identity) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Persist `record` unless its identity is already stored.
    ///
    /// Returns `Written` only once the row is synced to storage.
    fn append(&self, record: &Record)
    -> impl Future<Output = Result<AppendOutcome, AppError>> + Send;

    /// Rebuild the structured snapshot from the row store. Returns the
    /// number of records written.
    fn snapshot(&self) -> impl Future<Output = Result<usize, AppError>> + Send;
}

/// Persistence for the session checkpoint.
pub trait ProgressStore: Send + Sync {
    /// Replace the stored checkpoint atomically.
    fn save(&self, checkpoint: &Checkpoint) -> impl Future<Output = Result<(), AppError>> + Send;

    /// `Ok(None)` means no session is in flight.
    fn load(&self) -> impl Future<Output = Result<Option<Checkpoint>, AppError>> + Send;

    fn clear(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}
