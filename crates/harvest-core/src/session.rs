use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{
    AppendOutcome, Checkpoint, Identity, ItemTally, Record, SessionOutcome, SessionStatus,
};
use crate::pacing::{PacingPolicy, Transition};
use crate::report::{SessionEvent, SkipReason, StatusReporter};
use crate::traits::{ExtractionAdapter, PageSource, ProgressStore, RecordSink};

/// Query used when the caller passes a blank one.
pub const DEFAULT_QUERY: &str = "laptop";

/// Session-wide settings that are not per-run limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_query: String,
    /// Extra append attempts for one record before a sink error is fatal.
    pub sink_retry_budget: u32,
    /// Pause between append attempts.
    pub sink_retry_backoff: Duration,
    /// Treat a failed page navigation like running out of pages.
    ///
    /// When false the navigation error is recorded as the session cause.
    pub end_session_on_navigation_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_query: DEFAULT_QUERY.to_string(),
            sink_retry_budget: 2,
            sink_retry_backoff: Duration::from_millis(500),
            end_session_on_navigation_error: true,
        }
    }
}

impl SessionConfig {
    pub fn with_default_query(mut self, query: impl Into<String>) -> Self {
        self.default_query = query.into();
        self
    }

    pub fn with_sink_retry(mut self, budget: u32, backoff: Duration) -> Self {
        self.sink_retry_budget = budget;
        self.sink_retry_backoff = backoff;
        self
    }

    pub fn with_strict_navigation(mut self) -> Self {
        self.end_session_on_navigation_error = false;
        self
    }

    /// The query a run will actually use: trimmed, or the default if blank.
    pub fn resolve_query(&self, query: &str) -> String {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            self.default_query.clone()
        } else {
            trimmed.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_items: u32,
    max_pages: u32,
}

/// Mutable bookkeeping for one run.
#[derive(Debug)]
struct SessionState {
    seen: HashSet<Identity>,
    items_captured: u32,
    pages_processed: u32,
    /// First item index to visit on the page the source opened on.
    resume_from: usize,
    tally: ItemTally,
}

/// How the page/item loop ended.
#[derive(Debug)]
enum LoopEnd {
    LimitsReached,
    PagesExhausted,
    Interrupted,
    Fatal(String),
}

enum Visit {
    Captured,
    Skipped,
    Interrupted,
}

/// Drives one bounded harvesting session over a page source.
///
/// Generic over all collaborators via traits, so the whole pipeline runs
/// against in-memory mocks in tests.
pub struct SessionController<P, A, S, K, R>
where
    P: PageSource,
    A: ExtractionAdapter<Handle = P::Handle>,
    S: RecordSink,
    K: ProgressStore,
    R: StatusReporter,
{
    source: P,
    adapter: A,
    sink: S,
    progress: K,
    pacing: PacingPolicy,
    reporter: R,
    config: SessionConfig,
    interrupt: CancellationToken,
}

impl<P, A, S, K, R> SessionController<P, A, S, K, R>
where
    P: PageSource,
    A: ExtractionAdapter<Handle = P::Handle>,
    S: RecordSink,
    K: ProgressStore,
    R: StatusReporter,
{
    pub fn new(
        source: P,
        adapter: A,
        sink: S,
        progress: K,
        pacing: PacingPolicy,
        reporter: R,
        config: SessionConfig,
    ) -> Self {
        Self {
            source,
            adapter,
            sink,
            progress,
            pacing,
            reporter,
            config,
            interrupt: CancellationToken::new(),
        }
    }

    /// Use an externally owned token as the stop signal.
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = token;
        self
    }

    /// Token that stops the session at its next suspension point.
    pub fn interrupt_handle(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one session.
    ///
    /// 1. Load the dedup set and checkpoint, open the source (Setup)
    /// 2. Visit items page by page until a limit is reached, pages run
    ///    out, the session is interrupted or a fatal error occurs
    /// 3. Rebuild the snapshot, clear the checkpoint, report the outcome
    ///
    /// Step 3 runs exactly once whenever step 1 succeeded, including when
    /// a collaborator panics.
    pub async fn run(&mut self, query: &str, max_items: u32, max_pages: u32) -> SessionOutcome {
        let query = self.config.resolve_query(query);
        self.reporter.report(SessionEvent::Started {
            query: &query,
            max_items,
            max_pages,
        });

        if max_items == 0 || max_pages == 0 {
            return self.abort(AppError::SetupError(
                "max_items and max_pages must be at least 1".into(),
            ));
        }

        let mut state = match self.prepare(&query).await {
            Ok(state) => state,
            Err(e) => return self.abort(e),
        };

        let limits = Limits {
            max_items,
            max_pages,
        };
        let end = match AssertUnwindSafe(self.drive(&mut state, limits))
            .catch_unwind()
            .await
        {
            Ok(Ok(end)) => end,
            Ok(Err(e)) => LoopEnd::Fatal(e.to_string()),
            Err(panic) => LoopEnd::Fatal(format!(
                "session aborted by panic: {}",
                panic_message(panic.as_ref())
            )),
        };

        self.finalize(state, end).await
    }

    /// Report a session that never got past setup. Nothing is written.
    fn abort(&self, error: AppError) -> SessionOutcome {
        let outcome = SessionOutcome::failed(error.to_string());
        self.reporter
            .report(SessionEvent::Finished { outcome: &outcome });
        outcome
    }

    async fn prepare(&mut self, query: &str) -> Result<SessionState, AppError> {
        let seen = self
            .sink
            .identities()
            .await
            .map_err(|e| AppError::SetupError(format!("record sink unavailable: {e}")))?;
        let checkpoint = self
            .progress
            .load()
            .await
            .map_err(|e| AppError::SetupError(format!("progress store unavailable: {e}")))?;

        let start_page = checkpoint.as_ref().map_or(1, |c| c.page_number.max(1));
        self.source
            .open(query, start_page)
            .await
            .map_err(|e| AppError::SetupError(format!("page source unavailable: {e}")))?;

        tracing::debug!(known = seen.len(), start_page, "Session prepared");

        let state = match checkpoint {
            Some(checkpoint) => {
                self.reporter.report(SessionEvent::Resumed {
                    checkpoint: &checkpoint,
                });
                SessionState {
                    seen,
                    items_captured: checkpoint.captured,
                    pages_processed: start_page - 1,
                    resume_from: checkpoint.resume_index(),
                    tally: ItemTally::default(),
                }
            }
            None => SessionState {
                seen,
                items_captured: 0,
                pages_processed: 0,
                resume_from: 0,
                tally: ItemTally::default(),
            },
        };
        Ok(state)
    }

    async fn drive(&mut self, state: &mut SessionState, limits: Limits) -> Result<LoopEnd, AppError> {
        while state.pages_processed < limits.max_pages && state.items_captured < limits.max_items {
            if self.interrupt.is_cancelled() {
                return Ok(LoopEnd::Interrupted);
            }

            let page = self.source.current_page();
            let handles = match self.source.current_items().await {
                Ok(handles) => handles,
                Err(e) => return Ok(self.navigation_failed(page, e)),
            };
            self.reporter.report(SessionEvent::PageOpened {
                page,
                items: handles.len(),
            });

            let start = std::mem::take(&mut state.resume_from);
            let mut captured_on_page = 0;
            for (index, handle) in handles.iter().enumerate().skip(start) {
                if state.items_captured >= limits.max_items {
                    break;
                }
                if self.interrupt.is_cancelled() {
                    return Ok(LoopEnd::Interrupted);
                }
                match self
                    .visit(state, handle, page, index, handles.len(), limits)
                    .await?
                {
                    Visit::Captured => captured_on_page += 1,
                    Visit::Skipped => {}
                    Visit::Interrupted => return Ok(LoopEnd::Interrupted),
                }
            }

            state.pages_processed += 1;
            self.reporter.report(SessionEvent::PageCompleted {
                page,
                captured_on_page,
            });

            if state.pages_processed >= limits.max_pages || state.items_captured >= limits.max_items {
                break;
            }

            let delay = self.pacing.delay_for(Transition::Page, page + 1);
            if !self.pause(delay).await {
                return Ok(LoopEnd::Interrupted);
            }
            match self.source.advance().await {
                Ok(true) => {}
                Ok(false) => {
                    self.reporter.report(SessionEvent::NavigationEnded {
                        page,
                        reason: "no further pages",
                    });
                    return Ok(LoopEnd::PagesExhausted);
                }
                Err(e) => return Ok(self.navigation_failed(page, e)),
            }
        }

        Ok(LoopEnd::LimitsReached)
    }

    /// Process one item handle. Only a spent sink retry budget escapes as
    /// an error; every other failure stays local to the item.
    async fn visit(
        &mut self,
        state: &mut SessionState,
        handle: &P::Handle,
        page: u32,
        index: usize,
        total: usize,
        limits: Limits,
    ) -> Result<Visit, AppError> {
        let Some(identity) = self.adapter.identity_of(handle) else {
            state.tally.not_found += 1;
            self.reporter.report(SessionEvent::ItemSkipped {
                page,
                index,
                identity: None,
                reason: SkipReason::NotFound,
            });
            return Ok(Visit::Skipped);
        };

        if state.seen.contains(&identity) {
            self.skip_existing(state, &identity, page, index);
            return Ok(Visit::Skipped);
        }

        let delay = self.pacing.delay_for(Transition::Item, index as u32 + 1);
        if !self.pause(delay).await {
            return Ok(Visit::Interrupted);
        }

        let record = match self.adapter.extract(handle, page).await {
            Ok(record) if record.identity == identity => record.normalized(),
            Ok(record) => {
                let error = format!("adapter returned record for {}", record.identity);
                self.item_failed(state, &identity, page, index, &error);
                return Ok(Visit::Skipped);
            }
            Err(e) => {
                self.item_failed(state, &identity, page, index, &e.to_string());
                return Ok(Visit::Skipped);
            }
        };

        match self.append_with_retry(state, &record).await? {
            AppendOutcome::AlreadyExists => {
                self.skip_existing(state, &identity, page, index);
                state.seen.insert(identity);
                Ok(Visit::Skipped)
            }
            AppendOutcome::Written => {
                self.pacing.record_success();
                state.items_captured += 1;
                let checkpoint = Checkpoint::new(index, total, page, state.items_captured);
                if let Err(e) = self.progress.save(&checkpoint).await {
                    let error = e.to_string();
                    self.reporter.report(SessionEvent::CheckpointFailed {
                        page,
                        captured: state.items_captured,
                        error: &error,
                    });
                }
                self.reporter.report(SessionEvent::ItemCaptured {
                    identity: &identity,
                    page,
                    index,
                    captured: state.items_captured,
                    requested: limits.max_items,
                });
                state.seen.insert(identity);
                Ok(Visit::Captured)
            }
        }
    }

    async fn append_with_retry(
        &mut self,
        state: &mut SessionState,
        record: &Record,
    ) -> Result<AppendOutcome, AppError> {
        let mut failures = 0;
        loop {
            match self.sink.append(record).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    failures += 1;
                    state.tally.sink_errors += 1;
                    self.pacing.record_failure();
                    let error = e.to_string();
                    self.reporter.report(SessionEvent::SinkFailed {
                        identity: &record.identity,
                        error: &error,
                        consecutive: failures,
                    });
                    if failures > self.config.sink_retry_budget {
                        return Err(AppError::SinkError(format!(
                            "giving up on {} after {failures} attempts: {error}",
                            record.identity
                        )));
                    }
                    tokio::time::sleep(self.config.sink_retry_backoff * failures).await;
                }
            }
        }
    }

    fn skip_existing(&self, state: &mut SessionState, identity: &Identity, page: u32, index: usize) {
        state.tally.already_exists += 1;
        self.reporter.report(SessionEvent::ItemSkipped {
            page,
            index,
            identity: Some(identity),
            reason: SkipReason::AlreadyExists,
        });
    }

    fn item_failed(
        &mut self,
        state: &mut SessionState,
        identity: &Identity,
        page: u32,
        index: usize,
        error: &str,
    ) {
        state.tally.extract_errors += 1;
        self.pacing.record_failure();
        self.reporter.report(SessionEvent::ItemFailed {
            page,
            index,
            identity,
            error,
        });
    }

    fn navigation_failed(&mut self, page: u32, error: AppError) -> LoopEnd {
        if error.is_transient() {
            self.pacing.record_failure();
        }
        let reason = error.to_string();
        self.reporter.report(SessionEvent::NavigationEnded {
            page,
            reason: &reason,
        });
        if self.config.end_session_on_navigation_error && !error.is_fatal() {
            LoopEnd::PagesExhausted
        } else {
            LoopEnd::Fatal(reason)
        }
    }

    /// Wait for `delay` unless interrupted first. Returns false if the
    /// session should stop.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => !self.interrupt.is_cancelled(),
            () = self.interrupt.cancelled() => false,
        }
    }

    async fn finalize(&mut self, state: SessionState, end: LoopEnd) -> SessionOutcome {
        let mut cause = match &end {
            LoopEnd::Fatal(cause) => Some(cause.clone()),
            _ => None,
        };

        match self.sink.snapshot().await {
            Ok(records) => self
                .reporter
                .report(SessionEvent::SnapshotWritten { records }),
            Err(e) => {
                tracing::error!(error = %e, "Failed to rebuild snapshot");
                cause.get_or_insert_with(|| format!("snapshot failed: {e}"));
            }
        }

        if let Err(e) = self.progress.clear().await {
            tracing::warn!(error = %e, "Failed to clear checkpoint");
        }

        let status = match end {
            LoopEnd::Interrupted => SessionStatus::Interrupted,
            LoopEnd::Fatal(_) if state.items_captured == 0 => SessionStatus::Failed,
            LoopEnd::Fatal(_) | LoopEnd::LimitsReached | LoopEnd::PagesExhausted => {
                SessionStatus::Completed
            }
        };

        let outcome = SessionOutcome {
            status,
            items_captured: state.items_captured,
            pages_processed: state.pages_processed,
            tally: state.tally,
            cause,
        };
        self.reporter
            .report(SessionEvent::Finished { outcome: &outcome });
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
