//! Durability tests: the queue and its media survive process restarts

use crate::common::{capture_file, observation, open_engine, test_config, ArchiveServer};
use assert_matches::assert_matches;
use fieldsync::client::local_db::QUEUE_SLOT;
use fieldsync::client::{DurableStore, KeyValueStore, LocalDatabase, SyncReport};
use fieldsync::shared::item::INTERRUPTED_MESSAGE;
use fieldsync::shared::{AssetState, ItemPayload, NewItem, NewMedia, ObservationState, SyncState};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    let id = {
        let engine = open_engine(test_config(dir.path(), &server.api_url())).await;
        let id = assert_ok!(engine.add_item(observation(dir.path(), &["a.jpg"], 512)).await);
        engine.dispose();
        id
    };

    let engine = open_engine(test_config(dir.path(), &server.api_url())).await;
    let items = engine.get_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].local_id, id);
    assert_observation_state!(engine, &id, Pending);

    let media = &items[0].media[0];
    assert!(media.local_uri.starts_with(dir.path().join("media")));
    assert!(media.local_uri.exists());
    assert_eq!(media.file_size, 512);
}

#[tokio::test]
async fn test_interrupted_upload_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server.mount_happy_path().await;

    let mut item = {
        let engine = open_engine(test_config(dir.path(), &server.api_url())).await;
        let id = assert_ok!(engine.add_item(observation(dir.path(), &["a.jpg", "b.jpg"], 512)).await);
        let item = engine.get_item(&id).await.unwrap();
        engine.dispose();
        item
    };

    // Leave the item as a process killed mid-upload would
    item.sync_state = SyncState::Observation(ObservationState::UploadingMedia);
    item.remote_id = Some("42".to_string());
    item.media[0].sync_state = AssetState::Complete;
    item.media[0].upload_progress = 100;
    item.media[0].remote_url = Some("https://cdn.test/items/42/asset".to_string());
    item.media[1].sync_state = AssetState::Uploading;
    item.media[1].upload_progress = 40;
    let db = assert_ok!(LocalDatabase::open(dir.path().join("fieldsync.db")).await);
    assert_ok!(db.set(QUEUE_SLOT, &serde_json::to_string(&vec![item.clone()]).unwrap()).await);

    let engine = open_engine(test_config(dir.path(), &server.api_url())).await;
    let recovered = engine.get_item(&item.local_id).await.unwrap();
    assert_eq!(recovered.sync_state, SyncState::Observation(ObservationState::Pending));
    assert_eq!(recovered.last_sync_error.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(recovered.media[1].sync_state, AssetState::Pending);
    assert_eq!(recovered.media[1].upload_progress, 0);
    assert!(recovered.media[0].is_complete());

    let report = engine.start_sync().await;
    assert_matches!(report, SyncReport::Finished { next_retry: None, .. });
    assert_observation_state!(engine, &item.local_id, Complete);

    assert!(server.requests("POST", "/api/items").await.is_empty());
    assert_eq!(server.requests("PUT", "/storage/object").await.len(), 1);
}

#[tokio::test]
async fn test_upload_reads_durable_copy_after_capture_is_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server.mount_happy_path().await;
    let engine = open_engine(test_config(dir.path(), &server.api_url())).await;

    let new_item = observation(dir.path(), &["a.jpg"], 4096);
    let capture = new_item.media[0].source_uri.clone();
    let id = assert_ok!(engine.add_item(new_item).await);
    std::fs::remove_file(&capture).unwrap();

    engine.start_sync().await;
    assert_observation_state!(engine, &id, Complete);
    let puts = server.requests("PUT", "/storage/object").await;
    assert_eq!(puts[0].body.len(), 4096);
}

#[tokio::test]
async fn test_missing_durable_file_is_permanent() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server.mount_happy_path().await;
    let engine = open_engine(test_config(dir.path(), &server.api_url())).await;
    let id = assert_ok!(engine.add_item(observation(dir.path(), &["a.jpg"], 512)).await);
    let durable = engine.get_item(&id).await.unwrap().media[0].local_uri.clone();
    std::fs::remove_file(&durable).unwrap();

    let report = engine.start_sync().await;
    assert_eq!(report.next_retry(), None);

    assert_observation_state!(engine, &id, Failed);
    let item = engine.get_item(&id).await.unwrap();
    assert!(item.requires_manual_retry);
    assert_eq!(item.media[0].sync_state, AssetState::Failed);
    assert_contains!(item.last_sync_error.unwrap(), "no longer available");
    assert!(server.requests("PUT", "/storage/object").await.is_empty());
}

#[tokio::test]
async fn test_durable_copy_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = assert_ok!(LocalDatabase::in_memory().await);
    let store = DurableStore::new(Arc::new(db), dir.path().join("media"));
    let capture = capture_file(dir.path(), "a.jpg", 256);

    let first = store.copy_to_durable_storage(&capture, "asset-1_a.jpg").await;
    let second = store.copy_to_durable_storage(&first, "asset-1_a.jpg").await;
    assert_eq!(first, second);
    assert!(store.is_durable(&first));
    assert_eq!(std::fs::read_dir(dir.path().join("media")).unwrap().count(), 1);
}

#[tokio::test]
async fn test_capture_reached_through_media_dir_is_still_copied() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    let engine = open_engine(test_config(dir.path(), &server.api_url())).await;
    let media_dir = dir.path().join("media");
    std::fs::create_dir_all(&media_dir).unwrap();
    std::fs::write(dir.path().join("user_photo.jpg"), vec![1u8; 64]).unwrap();

    let capture = media_dir.join("..").join("user_photo.jpg");
    let id = assert_ok!(
        engine
            .add_item(NewItem::observation(
                ItemPayload {
                    project_id: Some("p1".to_string()),
                    ..Default::default()
                },
                vec![NewMedia::photo(capture.clone())],
            ))
            .await
    );
    let local_uri = engine.get_item(&id).await.unwrap().media[0].local_uri.clone();
    assert_ne!(local_uri, capture);
    assert_eq!(local_uri.parent(), Some(media_dir.as_path()));
    assert!(local_uri.exists());

    assert_ok!(engine.remove_item(&id).await);
    assert!(!local_uri.exists());
    assert!(dir.path().join("user_photo.jpg").exists());
}
