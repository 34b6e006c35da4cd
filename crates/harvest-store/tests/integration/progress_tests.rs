use harvest_core::models::Checkpoint;

use crate::integration::common::setup_layout;

#[tokio::test]
async fn checkpoint_survives_a_new_store_instance() {
    let (layout, _dir) = setup_layout("laptop").await;

    layout
        .progress_store()
        .save(&Checkpoint::new(5, 16, 3, 37))
        .await
        .unwrap();

    let loaded = layout.progress_store().load().await.unwrap().unwrap();
    assert_eq!(loaded.page_number, 3);
    assert_eq!(loaded.resume_index(), 6);
    assert_eq!(loaded.captured, 37);
}

#[tokio::test]
async fn no_temp_files_left_after_saves() {
    let (layout, dir) = setup_layout("laptop").await;
    let store = layout.progress_store();
    for i in 0..5 {
        store.save(&Checkpoint::new(i, 16, 1, i as u32 + 1)).await.unwrap();
    }

    let names: Vec<String> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["laptop_progress.json".to_string()]);
}
