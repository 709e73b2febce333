//! Router driver for HTTP tests

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use cyberpitch_core::domains::auth::models::Identity;
use cyberpitch_core::kernel::TestDependencies;
use cyberpitch_core::server::build_app;
use cyberpitch_core::RateLimitConfig;
use serde_json::Value;
use tower::ServiceExt;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn error_code(&self) -> &str {
        self.body["error"]["code"].as_str().unwrap_or_default()
    }
}

/// In-memory app plus handles on its mocks
pub struct TestApp {
    pub router: Router,
    pub test: TestDependencies,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(TestDependencies::new())
    }

    pub fn with(test: TestDependencies) -> Self {
        let router = build_app(test.deps.clone(), None);
        Self { router, test }
    }

    /// App with the per-IP limiter on the auth routes
    pub fn rate_limited(limits: RateLimitConfig) -> Self {
        let test = TestDependencies::new();
        let router = build_app(test.deps.clone(), Some(limits));
        Self { router, test }
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> TestResponse {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    pub async fn post_authed(&self, uri: &str, token: &str) -> TestResponse {
        self.send(
            Request::post(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut request = Request::get(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    /// GET as if forwarded by a proxy for `client_ip`
    pub async fn get_from(&self, uri: &str, client_ip: &str) -> TestResponse {
        self.send(
            Request::get(uri)
                .header("x-forwarded-for", client_ip)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Request a code and return what the mock delivery captured
    pub async fn request_code(&self, identity: &str) -> String {
        let response = self
            .post("/auth/send-code", serde_json::json!({ "identity": identity }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "send-code failed: {:?}", response.body);
        let identity = Identity::parse(identity).unwrap();
        self.test.delivery.last_code_for(identity.as_str()).unwrap()
    }
}
