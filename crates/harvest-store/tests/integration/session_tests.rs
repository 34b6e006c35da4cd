use harvest_core::models::{Checkpoint, SessionStatus};
use harvest_core::testutil::{page_of, sample_record, ItemSpec, MockAdapter, MockPageSource};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{file_controller, setup_layout, stored_ids};

#[tokio::test]
async fn completed_session_leaves_rows_snapshot_and_no_checkpoint() {
    let (layout, _dir) = setup_layout("laptop").await;
    let source = MockPageSource::new(vec![
        vec![ItemSpec::ok("A1"), ItemSpec::anonymous(), ItemSpec::ok("A2")],
        page_of(&["B1", "B2"]),
    ]);
    let (mut ctl, _) = file_controller(&layout, source, MockAdapter::new());

    let outcome = ctl.run("laptop", 10, 2).await;

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.items_captured, 4);
    assert_eq!(outcome.tally.not_found, 1);

    let sink = layout.record_sink();
    assert_eq!(stored_ids(&sink).await, vec!["A1", "A2", "B1", "B2"]);
    assert_eq!(sink.read_snapshot().await.unwrap(), sink.read_all().await.unwrap());
    assert!(!layout.checkpoint_path().exists());
}

#[tokio::test]
async fn rerun_of_finished_query_adds_nothing() {
    let (layout, _dir) = setup_layout("laptop").await;
    let pages = vec![page_of(&["A1", "A2", "A3"])];

    let (mut first, _) = file_controller(&layout, MockPageSource::new(pages.clone()), MockAdapter::new());
    assert_eq!(first.run("laptop", 10, 1).await.items_captured, 3);

    let adapter = MockAdapter::new();
    let (mut second, reporter) =
        file_controller(&layout, MockPageSource::new(pages), adapter.clone());
    let outcome = second.run("laptop", 10, 1).await;

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.items_captured, 0);
    assert_eq!(outcome.tally.already_exists, 3);
    assert!(adapter.extracted.lock().unwrap().is_empty());
    assert!(reporter.contains("A2 already captured"));
    assert_eq!(stored_ids(&layout.record_sink()).await, vec!["A1", "A2", "A3"]);
}

#[tokio::test]
async fn resumes_after_crash_without_duplicates() {
    let (layout, _dir) = setup_layout("laptop").await;

    // State left by a process killed right after capturing A2.
    let sink = layout.record_sink();
    sink.append(&sample_record("A1", 1)).await.unwrap();
    sink.append(&sample_record("A2", 1)).await.unwrap();
    layout
        .progress_store()
        .save(&Checkpoint::new(1, 3, 1, 2))
        .await
        .unwrap();

    let source = MockPageSource::new(vec![page_of(&["A1", "A2", "A3"]), page_of(&["B1", "B2"])]);
    let adapter = MockAdapter::new();
    let (mut ctl, reporter) = file_controller(&layout, source.clone(), adapter.clone());

    let outcome = ctl.run("laptop", 4, 2).await;

    assert!(reporter.contains("Resuming on page 1 at item 3"));
    assert_eq!(*adapter.extracted.lock().unwrap(), vec!["A3", "B1"]);
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.items_captured, 4);
    assert_eq!(stored_ids(&sink).await, vec!["A1", "A2", "A3", "B1"]);
    assert!(layout.progress_store().load().await.unwrap().is_none());
}

#[tokio::test]
async fn stale_checkpoint_only_costs_a_dedup_check() {
    let (layout, _dir) = setup_layout("laptop").await;

    // Row for A1 exists, checkpoint still points at the item before it.
    layout
        .record_sink()
        .append(&sample_record("A1", 1))
        .await
        .unwrap();
    layout
        .progress_store()
        .save(&Checkpoint::new(0, 3, 1, 1))
        .await
        .unwrap();

    let adapter = MockAdapter::new();
    let (mut ctl, _) = file_controller(
        &layout,
        MockPageSource::new(vec![page_of(&["A0", "A1", "A2"])]),
        adapter.clone(),
    );

    let outcome = ctl.run("laptop", 10, 1).await;

    assert_eq!(outcome.tally.already_exists, 1);
    assert_eq!(*adapter.extracted.lock().unwrap(), vec!["A2"]);
    assert_eq!(stored_ids(&layout.record_sink()).await, vec!["A1", "A2"]);
}

#[tokio::test]
async fn interrupted_session_still_writes_snapshot() {
    let (layout, _dir) = setup_layout("laptop").await;
    let token = CancellationToken::new();
    let adapter = MockAdapter::new().cancel_on("A2", token.clone());
    let (ctl, _) = file_controller(
        &layout,
        MockPageSource::new(vec![page_of(&["A1", "A2", "A3", "A4"])]),
        adapter,
    );
    let mut ctl = ctl.with_interrupt(token);

    let outcome = ctl.run("laptop", 10, 1).await;

    assert_eq!(outcome.status, SessionStatus::Interrupted);
    let sink = layout.record_sink();
    assert_eq!(stored_ids(&sink).await, vec!["A1", "A2"]);
    assert_eq!(sink.read_snapshot().await.unwrap().len(), 2);
}

#[tokio::test]
async fn panicking_adapter_keeps_rows_written_before_it() {
    let (layout, _dir) = setup_layout("laptop").await;
    let (mut ctl, _) = file_controller(
        &layout,
        MockPageSource::new(vec![vec![
            ItemSpec::ok("A1"),
            ItemSpec::panicking("A2"),
            ItemSpec::ok("A3"),
        ]]),
        MockAdapter::new(),
    );

    let outcome = ctl.run("laptop", 10, 1).await;

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert!(outcome.cause.as_deref().unwrap().contains("adapter blew up on A2"));
    let sink = layout.record_sink();
    assert_eq!(stored_ids(&sink).await, vec!["A1"]);
    assert_eq!(sink.read_snapshot().await.unwrap().len(), 1);
}
