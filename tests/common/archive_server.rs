//! Mock archive server for integration tests
//!
//! Wraps a wiremock [`MockServer`] that speaks the archive API under `/api`
//! plus a signed-upload target under `/storage`.

use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Remote id returned by the default create-item mock
pub const REMOTE_ID: u64 = 42;

/// Running mock archive
pub struct ArchiveServer {
    pub server: MockServer,
}

impl ArchiveServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to configure the engine with
    pub fn api_url(&self) -> String {
        format!("{}/api", self.server.uri())
    }

    pub async fn mount_health(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Every route succeeds; items are created as [`REMOTE_ID`]
    pub async fn mount_happy_path(&self) {
        self.mount_health(200).await;
        self.mount_create(ResponseTemplate::new(201).set_body_json(json!({ "id": REMOTE_ID })))
            .await;
        self.mount_upload_routes().await;
        self.mount_register(ResponseTemplate::new(201).set_body_json(json!({
            "url": format!("https://cdn.test/items/{}/asset", REMOTE_ID)
        })))
        .await;
    }

    pub async fn mount_create(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/api/items"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Upload-location and signed PUT routes
    pub async fn mount_upload_routes(&self) {
        let storage = format!("{}/storage/object", self.server.uri());
        Mock::given(method("POST"))
            .and(path("/api/uploads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uploadUrl": storage,
                "objectPath": "objects/object",
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/storage/object"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_register(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path_regex(r"^/api/items/[^/]+/assets$"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Fail the next `times` asset registrations with `status`, ahead of other mocks
    pub async fn fail_register(&self, status: u16, body: serde_json::Value, times: u64) {
        Mock::given(method("POST"))
            .and(path_regex(r"^/api/items/[^/]+/assets$"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Requests received so far matching `method_name` and `route`
    pub async fn requests(&self, method_name: &str, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.method.as_str() == method_name && request.url.path() == route)
            .collect()
    }
}
