//! HTTP archive client tests

use crate::common::{capture_file, test_config, ArchiveServer};
use assert_matches::assert_matches;
use fieldsync::client::archive_client::{
    ArchiveApi, HttpArchiveClient, ItemMetadata, RegisterAssetRequest, UploadLocation, UploadLocationRequest,
};
use fieldsync::client::Config;
use fieldsync::shared::{ItemKind, ItemPayload, SyncError};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn client(server: &ArchiveServer, dir: &std::path::Path) -> HttpArchiveClient {
    let config = Config::with_builder(test_config(dir, &server.api_url())).unwrap();
    HttpArchiveClient::new(config).unwrap()
}

fn metadata() -> ItemMetadata {
    ItemMetadata {
        local_id: "obs-1".to_string(),
        kind: ItemKind::Observation,
        payload: ItemPayload {
            project_id: Some("p1".to_string()),
            ..Default::default()
        },
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_health_route_missing_counts_as_reachable() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server.mount_health(404).await;

    assert_ok!(client(&server, dir.path()).check_health().await);
}

#[tokio::test]
async fn test_health_route_missing_can_be_strict() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server.mount_health(404).await;
    let config = Config::with_builder(
        test_config(dir.path(), &server.api_url()).health_route_missing_is_reachable(false),
    )
    .unwrap();

    let error = HttpArchiveClient::new(config).unwrap().check_health().await.unwrap_err();
    assert_retryable!(error, true);
}

#[tokio::test]
async fn test_health_probe_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server.server)
        .await;
    let config = Config::with_builder(
        test_config(dir.path(), &server.api_url()).probe_timeout(Duration::from_millis(100)),
    )
    .unwrap();

    let error = HttpArchiveClient::new(config).unwrap().check_health().await.unwrap_err();
    assert_matches!(error, SyncError::Timeout { .. });
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::with_builder(test_config(dir.path(), "http://127.0.0.1:9/api")).unwrap();

    let error = HttpArchiveClient::new(config).unwrap().check_health().await.unwrap_err();
    assert_retryable!(error, true);
}

#[tokio::test]
async fn test_create_item_sends_token_and_reads_numeric_id() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_partial_json(json!({ "localId": "obs-1", "projectId": "p1", "kind": "observation" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(&server.server)
        .await;

    let remote_id = assert_ok!(client(&server, dir.path()).create_item(&metadata()).await);
    assert_eq!(remote_id, "42");
}

#[tokio::test]
async fn test_create_item_without_id_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server
        .mount_create(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .await;

    let error = client(&server, dir.path()).create_item(&metadata()).await.unwrap_err();
    assert_matches!(error, SyncError::Server { status: None, .. });
}

#[tokio::test]
async fn test_client_error_keeps_server_message() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server
        .mount_create(ResponseTemplate::new(400).set_body_json(json!({ "message": "Unknown project" })))
        .await;

    let error = client(&server, dir.path()).create_item(&metadata()).await.unwrap_err();
    assert_retryable!(error.clone(), false);
    assert_eq!(error.user_message(), "Unknown project");
}

#[tokio::test]
async fn test_server_error_hides_markup() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server
        .mount_create(ResponseTemplate::new(503).set_body_string("<!DOCTYPE html><html><body>Bad gateway</body></html>"))
        .await;

    let error = client(&server, dir.path()).create_item(&metadata()).await.unwrap_err();
    assert_retryable!(error.clone(), true);
    assert!(!error.user_message().contains('<'));
}

#[tokio::test]
async fn test_update_item_patches_remote_item() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/items/42"))
        .and(body_partial_json(json!({ "projectId": "p1" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server.server)
        .await;

    assert_ok!(client(&server, dir.path()).update_item("42", &metadata()).await);
}

#[tokio::test]
async fn test_upload_streams_bytes_and_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server.mount_upload_routes().await;
    let api = client(&server, dir.path());

    let location = assert_ok!(
        api.request_upload_location(&UploadLocationRequest {
            file_name: "a.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            asset_type: "photo".to_string(),
        })
        .await
    );
    assert_eq!(location.object_path, "objects/object");

    let size = 200 * 1024;
    let file = tokio::fs::File::open(capture_file(dir.path(), "a.jpg", size)).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert_ok!(api.upload_binary(&location, "image/jpeg", file, size as u64, tx).await);

    let mut reports = Vec::new();
    while let Ok(sent) = rx.try_recv() {
        reports.push(sent);
    }
    assert!(reports.len() > 1);
    assert_non_decreasing!(reports);
    assert_eq!(reports.last(), Some(&(size as u64)));

    let puts = server.requests("PUT", "/storage/object").await;
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body.len(), size);
    assert_eq!(
        puts[0].headers.get("content-length").and_then(|value| value.to_str().ok()),
        Some("204800")
    );
    assert!(puts[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_rejected_upload_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/storage/object"))
        .respond_with(ResponseTemplate::new(403).set_body_string("signature expired"))
        .mount(&server.server)
        .await;
    let location = UploadLocation {
        upload_url: format!("{}/storage/object", server.server.uri()),
        object_path: "objects/object".to_string(),
    };
    let file = tokio::fs::File::open(capture_file(dir.path(), "a.jpg", 10)).await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let error = client(&server, dir.path())
        .upload_binary(&location, "image/jpeg", file, 10, tx)
        .await
        .unwrap_err();
    assert_retryable!(error, false);
}

#[tokio::test]
async fn test_register_asset_falls_back_to_object_path() {
    let dir = tempfile::tempdir().unwrap();
    let server = ArchiveServer::start().await;
    server.mount_register(ResponseTemplate::new(201)).await;

    let url = assert_ok!(
        client(&server, dir.path())
            .register_asset(
                "42",
                &RegisterAssetRequest {
                    asset_type: "photo".to_string(),
                    object_path: "objects/a.jpg".to_string(),
                    file_name: "a.jpg".to_string(),
                    mime_type: "image/jpeg".to_string(),
                },
            )
            .await
    );
    assert_eq!(url, "objects/a.jpg");
}
