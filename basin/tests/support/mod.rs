//! In-process test harness (ported from the teacher's `TestApp`): drives
//! the real router through `tower::ServiceExt::oneshot`, no TCP socket, no
//! mocked storage or script runtime.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use basin::{router as basin_router, AppState, DescriptorStore};
use basin_core::AppBuilder;
use basin_data::MemoryAdapter;
use basin_script::HandlerCache;
use basin_security::{SecurityConfig, TokenValidator};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tower::util::ServiceExt;

pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new(collections_dir: &Path) -> Self {
        let security_config = SecurityConfig::new("test-secret", "test-master");
        let token_validator = TokenValidator::new(&security_config);
        let descriptors = Arc::new(DescriptorStore::new(collections_dir));
        descriptors.load_all().expect("descriptor load");

        let state = AppState {
            storage: Arc::new(MemoryAdapter::new()),
            descriptors,
            handler_cache: Arc::new(HandlerCache::new(collections_dir)),
            token_validator: Arc::new(token_validator),
            security_config,
            handler_timeout: Duration::from_secs(2),
        };

        let router_state = state.clone();
        let (router, _shutdown_hooks) = AppBuilder::new()
            .build_state(move |_beans| router_state)
            .with(basin_core::ErrorHandling)
            .merge_router(basin_router::build_router())
            .build();

        Self { router, state }
    }

    pub fn root_token(&self) -> String {
        self.state.token_validator.issue("root", "root", "root", 3600)
    }

    pub fn user_token(&self, id: &str, username: &str) -> String {
        self.state.token_validator.issue(id, username, "user", 3600)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("request failed");
        let status = response.status();
        let body = response.into_body().collect().await.expect("body read failed").to_bytes();
        TestResponse { status, body }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.get_authenticated(path, None).await
    }

    pub async fn get_authenticated(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &impl serde::Serialize,
        token: Option<&str>,
    ) -> TestResponse {
        self.body_request(Method::POST, path, body, token).await
    }

    pub async fn put_json(
        &self,
        path: &str,
        body: &impl serde::Serialize,
        token: Option<&str>,
    ) -> TestResponse {
        self.body_request(Method::PUT, path, body, token).await
    }

    async fn body_request(
        &self,
        method: Method,
        path: &str,
        body: &impl serde::Serialize,
        token: Option<&str>,
    ) -> TestResponse {
        let json = serde_json::to_vec(body).unwrap();
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(json)).unwrap()).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::DELETE).uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl TestResponse {
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(self.status, expected, "expected {expected}, got {} ({})", self.status, self.text());
        self
    }

    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("failed to parse JSON: {e}\nbody: {}", self.text()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Write a collection descriptor and a handler source file directly to
/// disk, the way the admin API or a deployed project layout would.
pub fn write_descriptor(dir: &Path, name: &str) {
    let descriptor = basin::CollectionDescriptor::new(name);
    let yaml = serde_yaml::to_string(&descriptor).unwrap();
    let collection_dir = dir.join(name);
    std::fs::create_dir_all(&collection_dir).unwrap();
    std::fs::write(collection_dir.join("descriptor.yaml"), yaml).unwrap();
}

pub fn write_handler(dir: &Path, collection: &str, event: &str, source: &str) {
    let handlers_dir = dir.join(collection).join("handlers");
    std::fs::create_dir_all(&handlers_dir).unwrap();
    std::fs::write(handlers_dir.join(format!("{event}.lua")), source).unwrap();
}
