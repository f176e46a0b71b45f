//! Shared setup for the router-level tests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::clock::ManualClock;
use crate::config::AppConfig;
use crate::middleware::csrf::CSRF_HEADER;
use crate::state::{AppState, Backends};

pub const TEST_SECRET: &str = "formgate-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "password123";

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.auth.token_secret = TEST_SECRET.to_string();
    cfg.auth.bcrypt_cost = 4;
    cfg
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: ManualClock,
}

pub fn test_app() -> TestApp {
    test_app_with(test_config())
}

pub fn test_app_with(config: AppConfig) -> TestApp {
    test_app_on(config, Backends::in_memory())
}

pub fn test_app_on(config: AppConfig, backends: Backends) -> TestApp {
    let clock = ManualClock::starting_now();
    let state = AppState::with_clock(config, backends, Arc::new(clock.clone())).unwrap();
    TestApp { router: crate::build_router(state.clone()), state, clock }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Builds a request; `auth` is `(bearer token, csrf token)`.
pub fn request(method: Method, uri: &str, auth: Option<(&str, Option<&str>)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((token, csrf)) = auth {
        builder = builder.header("authorization", format!("Bearer {}", token));
        if let Some(csrf) = csrf {
            builder = builder.header(CSRF_HEADER, csrf);
        }
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::GET, uri, token.map(|t| (t, None)), None)).await
    }

    /// Registers `username` and returns the auth response body.
    pub async fn register(&self, username: &str) -> Value {
        let res = self
            .send(request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "username": username,
                    "password": PASSWORD,
                    "email": format!("{}@example.com", username),
                })),
            ))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);
        res.body
    }

    /// Registers a user and creates one form; returns `(token, csrf, form id)`.
    pub async fn user_with_form(&self, username: &str, form: Value) -> (String, String, String) {
        let auth = self.register(username).await;
        let token = auth["token"].as_str().unwrap().to_string();
        let csrf = auth["csrfToken"].as_str().unwrap().to_string();
        let res = self.send(request(Method::POST, "/api/forms", Some((&token, Some(&csrf))), Some(form))).await;
        assert_eq!(res.status, StatusCode::CREATED, "create form failed: {}", res.body);
        let id = res.body["id"].as_str().unwrap().to_string();
        (token, csrf, id)
    }
}
