use std::collections::HashSet;

use harvest_core::models::{AppendOutcome, Identity};
use harvest_core::testutil::sample_record;
use harvest_store::COLUMNS;

use crate::integration::common::{setup_layout, stored_ids};

#[tokio::test]
async fn separate_writers_never_duplicate_an_identity() {
    let (layout, _dir) = setup_layout("laptop").await;
    // Two sink instances share nothing but the file, like two processes.
    let first = layout.record_sink();
    let second = layout.record_sink();

    let mut tasks = Vec::new();
    for round in 0..20 {
        for sink in [first.clone(), second.clone()] {
            tasks.push(tokio::spawn(async move {
                let id = format!("B0{:02}", round % 10);
                sink.append(&sample_record(&id, 1)).await.unwrap()
            }));
        }
    }
    let mut written = 0;
    for task in tasks {
        if task.await.unwrap() == AppendOutcome::Written {
            written += 1;
        }
    }

    let ids = stored_ids(&first).await;
    let unique: HashSet<_> = ids.iter().cloned().collect();
    assert_eq!(written, 10);
    assert_eq!(ids.len(), 10);
    assert_eq!(unique.len(), 10);

    let text = std::fs::read_to_string(layout.rows_path()).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with("timestamp,")).count(), 1);
}

#[tokio::test]
async fn sees_rows_appended_by_another_writer() {
    let (layout, _dir) = setup_layout("laptop").await;
    let reader = layout.record_sink();
    let writer = layout.record_sink();

    assert!(reader.identities().await.unwrap().is_empty());
    writer.append(&sample_record("B0NEW", 1)).await.unwrap();

    let id = Identity::parse("B0NEW").unwrap();
    assert!(reader.contains(&id).await.unwrap());
    assert_eq!(
        reader.append(&sample_record("B0NEW", 1)).await.unwrap(),
        AppendOutcome::AlreadyExists
    );
}

#[tokio::test]
async fn snapshot_equals_row_store_field_for_field() {
    let (layout, _dir) = setup_layout("laptop").await;
    let sink = layout.record_sink();

    let mut sparse = sample_record("B0SPARSE", 2);
    sparse.price = None;
    sparse.rating = None;
    sparse.best_seller = None;
    let mut quoted = sample_record("B0QUOTE", 2);
    quoted.title = Some("15.6\" FHD, 16GB RAM\nBacklit".into());
    quoted.best_seller = Some(true);

    for record in [sample_record("B0FULL", 1), sparse, quoted] {
        sink.append(&record).await.unwrap();
    }
    sink.snapshot().await.unwrap();

    let rows = sink.read_all().await.unwrap();
    let snapshot = sink.read_snapshot().await.unwrap();
    assert_eq!(rows, snapshot);
    assert_eq!(rows[1].price, None);
    assert_eq!(rows[2].title.as_deref(), Some("15.6\" FHD, 16GB RAM\nBacklit"));
}

#[tokio::test]
async fn reads_rows_written_by_older_tooling() {
    let (layout, _dir) = setup_layout("laptop").await;
    let legacy = "timestamp,asin,title,price,original_price,rating,review_count,image_url,product_url,best_seller,delivery_info,scraped_successfully\n\
                  2025-01-04 10:22:31,B0OLD1,Old Laptop,\"₹39,990\",\"₹49,990\",4.1,812,,https://www.amazon.in/dp/B0OLD1,YES,FREE delivery,YES\n\
                  2025-01-04 10:22:40,B0OLD2,,,,,,,,NO,,NO\n";
    std::fs::write(layout.rows_path(), legacy).unwrap();

    let sink = layout.record_sink();
    let ids: HashSet<_> = sink.identities().await.unwrap();
    assert_eq!(ids.len(), 1);
    assert!(ids.contains(&Identity::parse("B0OLD1").unwrap()));

    let records = sink.read_all().await.unwrap();
    assert_eq!(records[0].original_price.as_deref(), Some("₹49,990"));
    assert_eq!(records[0].rating_count, Some(812));
    assert_eq!(records[0].best_seller, Some(true));
}

#[tokio::test]
async fn header_matches_column_order() {
    let (layout, _dir) = setup_layout("laptop").await;
    layout
        .record_sink()
        .append(&sample_record("B0A", 1))
        .await
        .unwrap();

    let text = std::fs::read_to_string(layout.rows_path()).unwrap();
    assert_eq!(text.lines().next().unwrap(), COLUMNS.join(","));
}
