use crate::models::{Checkpoint, Identity, SessionOutcome, SessionStatus};

/// Why an item was passed over without being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The item has no identity.
    NotFound,
    /// The identity is already in the sink.
    AlreadyExists,
}

/// Events emitted by the session controller for monitoring/logging.
#[derive(Debug, Clone)]
pub enum SessionEvent<'a> {
    Started {
        query: &'a str,
        max_items: u32,
        max_pages: u32,
    },
    Resumed {
        checkpoint: &'a Checkpoint,
    },
    PageOpened {
        page: u32,
        items: usize,
    },
    ItemSkipped {
        page: u32,
        index: usize,
        identity: Option<&'a Identity>,
        reason: SkipReason,
    },
    ItemFailed {
        page: u32,
        index: usize,
        identity: &'a Identity,
        error: &'a str,
    },
    ItemCaptured {
        identity: &'a Identity,
        page: u32,
        index: usize,
        captured: u32,
        requested: u32,
    },
    SinkFailed {
        identity: &'a Identity,
        error: &'a str,
        consecutive: u32,
    },
    CheckpointFailed {
        page: u32,
        captured: u32,
        error: &'a str,
    },
    PageCompleted {
        page: u32,
        captured_on_page: u32,
    },
    NavigationEnded {
        page: u32,
        reason: &'a str,
    },
    SnapshotWritten {
        records: usize,
    },
    Finished {
        outcome: &'a SessionOutcome,
    },
}

impl SessionEvent<'_> {
    /// Capture progress as a percentage of the requested item count.
    pub fn percentage(captured: u32, requested: u32) -> f64 {
        if requested == 0 {
            0.0
        } else {
            f64::from(captured) * 100.0 / f64::from(requested)
        }
    }

    /// One-line human description, used for log forwarding.
    pub fn describe(&self) -> String {
        match self {
            SessionEvent::Started {
                query,
                max_items,
                max_pages,
            } => format!("Starting session for \"{query}\" (max {max_items} items, {max_pages} pages)"),
            SessionEvent::Resumed { checkpoint } => format!(
                "Resuming on page {} at item {} ({} captured so far)",
                checkpoint.page_number,
                checkpoint.resume_index() + 1,
                checkpoint.captured
            ),
            SessionEvent::PageOpened { page, items } => {
                format!("Found {items} items on page {page}")
            }
            SessionEvent::ItemSkipped {
                page,
                index,
                identity,
                reason,
            } => match (reason, identity) {
                (SkipReason::AlreadyExists, Some(id)) => {
                    format!("Skipping item {} on page {page}: {id} already captured", index + 1)
                }
                _ => format!("Skipping item {} on page {page}: no identity", index + 1),
            },
            SessionEvent::ItemFailed {
                page,
                index,
                identity,
                error,
            } => format!("Failed to extract item {} ({identity}) on page {page}: {error}", index + 1),
            SessionEvent::ItemCaptured {
                identity,
                captured,
                requested,
                ..
            } => format!("Captured {identity} ({captured}/{requested})"),
            SessionEvent::SinkFailed {
                identity,
                error,
                consecutive,
            } => format!("Could not persist {identity} (failure {consecutive}): {error}"),
            SessionEvent::CheckpointFailed {
                page,
                captured,
                error,
            } => format!("Could not save progress on page {page} after {captured} captures: {error}"),
            SessionEvent::PageCompleted {
                page,
                captured_on_page,
            } => format!("Page {page} completed: {captured_on_page} items captured"),
            SessionEvent::NavigationEnded { page, reason } => {
                format!("No page after {page}: {reason}")
            }
            SessionEvent::SnapshotWritten { records } => {
                format!("Snapshot rebuilt with {records} records")
            }
            SessionEvent::Finished { outcome } => format!(
                "Session {}: {} items captured across {} pages",
                outcome.status, outcome.items_captured, outcome.pages_processed
            ),
        }
    }
}

/// Trait for receiving session events (decoupled logging and reporting).
///
/// Reporting is best-effort: implementations must not block and must
/// swallow their own failures.
pub trait StatusReporter: Send + Sync {
    fn report(&self, event: SessionEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, event: SessionEvent<'_>) {
        match &event {
            SessionEvent::Started {
                query,
                max_items,
                max_pages,
            } => {
                tracing::info!(%query, max_items, max_pages, "Session started");
            }
            SessionEvent::Resumed { checkpoint } => {
                tracing::info!(
                    page = checkpoint.page_number,
                    index = checkpoint.resume_index(),
                    captured = checkpoint.captured,
                    "Resuming interrupted session"
                );
            }
            SessionEvent::PageOpened { page, items } => {
                tracing::info!(page, items, "Page opened");
            }
            SessionEvent::ItemSkipped {
                reason: SkipReason::AlreadyExists,
                ..
            } => {
                tracing::info!("{}", event.describe());
            }
            SessionEvent::ItemSkipped { .. } => {
                tracing::debug!("{}", event.describe());
            }
            SessionEvent::ItemFailed { .. }
            | SessionEvent::NavigationEnded { .. }
            | SessionEvent::CheckpointFailed { .. } => {
                tracing::warn!("{}", event.describe());
            }
            SessionEvent::ItemCaptured {
                identity,
                page,
                captured,
                requested,
                ..
            } => {
                tracing::info!(%identity, page, captured, requested, "Item captured");
            }
            SessionEvent::SinkFailed { .. } => {
                tracing::error!("{}", event.describe());
            }
            SessionEvent::PageCompleted {
                page,
                captured_on_page,
            } => {
                tracing::info!(page, captured_on_page, "Page completed");
            }
            SessionEvent::SnapshotWritten { records } => {
                tracing::info!(records, "Snapshot rebuilt");
            }
            SessionEvent::Finished { outcome } => match outcome.status {
                SessionStatus::Completed => tracing::info!(
                    captured = outcome.items_captured,
                    pages = outcome.pages_processed,
                    cause = ?outcome.cause,
                    "Session completed"
                ),
                SessionStatus::Interrupted => tracing::warn!(
                    captured = outcome.items_captured,
                    pages = outcome.pages_processed,
                    "Session interrupted"
                ),
                SessionStatus::Failed => tracing::error!(
                    cause = ?outcome.cause,
                    "Session failed"
                ),
            },
        }
    }
}

impl<R: StatusReporter> StatusReporter for Option<R> {
    fn report(&self, event: SessionEvent<'_>) {
        if let Some(reporter) = self {
            reporter.report(event);
        }
    }
}

impl<A: StatusReporter, B: StatusReporter> StatusReporter for (A, B) {
    fn report(&self, event: SessionEvent<'_>) {
        self.0.report(event.clone());
        self.1.report(event);
    }
}
