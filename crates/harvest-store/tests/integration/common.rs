use std::time::Duration;

use harvest_core::testutil::{fast_pacing, MockAdapter, MockPageSource, RecordingReporter};
use harvest_core::{SessionConfig, SessionController};
use harvest_store::{CsvRecordSink, JsonProgressStore, OutputConfig, OutputLayout};
use tempfile::TempDir;

pub type FileController = SessionController<
    MockPageSource,
    MockAdapter,
    CsvRecordSink,
    JsonProgressStore,
    RecordingReporter,
>;

/// Output layout for `query` under a fresh temporary directory.
///
/// The `TempDir` must be kept in scope for the test duration; dropping it
/// deletes the directory.
pub async fn setup_layout(query: &str) -> (OutputLayout, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let layout = OutputLayout::for_query(&OutputConfig::new(dir.path()), query);
    layout
        .ensure_dirs()
        .await
        .expect("Failed to create output dirs");
    (layout, dir)
}

/// Controller writing through the real file-backed sink and progress store.
pub fn file_controller(
    layout: &OutputLayout,
    source: MockPageSource,
    adapter: MockAdapter,
) -> (FileController, RecordingReporter) {
    let reporter = RecordingReporter::new();
    let config = SessionConfig::default().with_sink_retry(2, Duration::from_millis(1));
    let ctl = SessionController::new(
        source,
        adapter,
        layout.record_sink(),
        layout.progress_store(),
        fast_pacing(),
        reporter.clone(),
        config,
    );
    (ctl, reporter)
}

/// Identities of the row store, in file order.
pub async fn stored_ids(sink: &CsvRecordSink) -> Vec<String> {
    sink.read_all()
        .await
        .expect("Failed to read row store")
        .into_iter()
        .map(|r| r.identity.to_string())
        .collect()
}
