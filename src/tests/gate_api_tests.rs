#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use axum::{routing::get, Router};

    use crate::config::RateLimit;
    use crate::error::{AppError, AppResult};
    use crate::state::AppState;
    use crate::tests::support::{request, test_app, test_app_with, test_config, TestApp, PASSWORD};

    fn assert_security_headers(headers: &axum::http::HeaderMap) {
        for name in [
            "x-content-type-options",
            "x-frame-options",
            "x-xss-protection",
            "referrer-policy",
            "permissions-policy",
            "content-security-policy",
            "strict-transport-security",
            "access-control-allow-origin",
            "access-control-allow-methods",
            "access-control-allow-headers",
            "access-control-max-age",
        ] {
            assert!(headers.contains_key(name), "missing header {}", name);
        }
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_register_returns_token_and_user() {
        let app = test_app();
        let res = app
            .send(request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": "alice", "password": "Str0ng!pw", "email": "a@b.com" })),
            ))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        let body = res.body;

        assert_eq!(body["success"], true);
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert!(body["csrfToken"].as_str().is_some_and(|t| t.len() == 64));
        assert_eq!(body["user"]["username"], "alice");
        assert_eq!(body["user"]["role"], "user");
        assert!(body["user"].get("passwordHash").is_none());
        assert_eq!(body["user"]["email"], "a@b.com");

        let res = app
            .send(request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "alice", "password": "Str0ng!pw" })),
            ))
            .await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sixth_failed_login_is_rate_limited() {
        let app = test_app();
        let bad_login = || {
            request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "nobody", "password": "wrong-password1" })),
            )
        };

        for _ in 0..5 {
            let res = app.send(bad_login()).await;
            assert_eq!(res.status, StatusCode::UNAUTHORIZED);
            assert_eq!(res.body["error"], "Invalid credentials");
        }
        let res = app.send(bad_login()).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers.contains_key("retry-after"));
        assert_security_headers(&res.headers);

        // window slides open again
        app.clock.advance_secs(61);
        let res = app.send(bad_login()).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_budget_is_per_client() {
        let app = test_app();
        let login_from = |ip: &str| {
            let mut req = request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "nobody", "password": PASSWORD })),
            );
            req.headers_mut().insert("x-forwarded-for", ip.parse().unwrap());
            req
        };
        for _ in 0..5 {
            assert_eq!(app.send(login_from("10.0.0.1")).await.status, StatusCode::UNAUTHORIZED);
        }
        assert_eq!(app.send(login_from("10.0.0.1")).await.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(app.send(login_from("10.0.0.2")).await.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_mutation_without_csrf_is_forbidden() {
        let app = test_app();
        let body = app.register("alice").await;
        let token = body["token"].as_str().unwrap();

        let res = app
            .send(request(Method::POST, "/api/forms", Some((token, None)), Some(json!({ "title": "Contact" }))))
            .await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(res.body["error"], "CSRF validation failed");

        let res = app
            .send(request(
                Method::POST,
                "/api/forms",
                Some((token, Some("not-the-token"))),
                Some(json!({ "title": "Contact" })),
            ))
            .await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);

        // reads never need the header
        let res = app.get("/api/forms", Some(token)).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_csrf_token_is_rejected() {
        let app = test_app();
        let body = app.register("alice").await;
        let token = body["token"].as_str().unwrap();
        let csrf = body["csrfToken"].as_str().unwrap();

        app.clock.advance_secs(app.state.config.auth.csrf_ttl_secs + 1);
        let res = app
            .send(request(Method::POST, "/api/forms", Some((token, Some(csrf))), Some(json!({ "title": "Late" }))))
            .await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);

        let res = app.get("/api/csrf-token", Some(token)).await;
        assert_eq!(res.status, StatusCode::OK);
        let fresh = res.body["csrfToken"].as_str().unwrap();
        let res = app
            .send(request(Method::POST, "/api/forms", Some((token, Some(fresh))), Some(json!({ "title": "Late" }))))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_csrf_can_be_disabled_by_policy() {
        let mut cfg = test_config();
        cfg.policy.enforce_csrf = false;
        let app = test_app_with(cfg);
        let body = app.register("alice").await;
        assert!(body.get("csrfToken").is_none());

        let token = body["token"].as_str().unwrap();
        let res = app
            .send(request(Method::POST, "/api/forms", Some((token, None)), Some(json!({ "title": "Open" }))))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_health_skips_limits() {
        let mut cfg = test_config();
        cfg.policy.rate_limits.global = RateLimit::new(2, 60_000);
        let app = test_app_with(cfg);

        for _ in 0..10 {
            let res = app.get("/api/health", None).await;
            assert_eq!(res.status, StatusCode::OK);
            assert_eq!(res.body["status"], "healthy");
            assert!(res.body["timestamp"].is_string());
            assert_eq!(res.body["version"], env!("CARGO_PKG_VERSION"));
            assert_security_headers(&res.headers);
        }

        // the full budget is still available
        assert_eq!(app.get("/api/forms", None).await.status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.get("/api/forms", None).await.status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.get("/api/forms", None).await.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_preflight_answers_no_content() {
        let app = test_app();
        let res = app.send(request(Method::OPTIONS, "/api/forms", None, None)).await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);
        assert_security_headers(&res.headers);
        assert!(res.headers["access-control-allow-headers"].to_str().unwrap().contains("X-CSRF-Token"));

        let res = app.send(request(Method::OPTIONS, "/does/not/exist", None, None)).await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let app = test_app();
        let res = app.get("/api/dashboard/stats", None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["error"], "Authentication required");
        assert_security_headers(&res.headers);

        let res = app.get("/api/dashboard/stats", Some("garbage")).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let app = test_app();
        let body = app.register("alice").await;
        let token = body["token"].as_str().unwrap();

        assert_eq!(app.get("/api/forms", Some(token)).await.status, StatusCode::OK);
        app.clock.advance_secs(app.state.config.auth.token_ttl_secs);
        let res = app.get("/api/forms", Some(token)).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = test_app();
        let res = app.get("/nope", None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.body["error"], "Not found");
        assert_security_headers(&res.headers);
    }

    async fn explode() -> &'static str {
        panic!("db password is hunter2")
    }

    async fn fail() -> AppResult<&'static str> {
        Err(AppError::Internal(anyhow::anyhow!("connection string sqlite://hunter2")))
    }

    #[tokio::test]
    async fn test_handler_failures_render_generic_500() {
        let base = test_app();
        let routes = Router::<AppState>::new().route("/explode", get(explode)).route("/fail", get(fail));
        let app = TestApp {
            router: crate::with_layers(routes, base.state.clone()),
            state: base.state,
            clock: base.clock,
        };

        for uri in ["/explode", "/fail"] {
            let res = app.get(uri, None).await;
            assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
            assert_eq!(res.body["error"], "Internal server error");
            let message = res.body["message"].as_str().unwrap();
            assert!(message.starts_with("An unexpected error occurred"));
            assert!(!res.body.to_string().contains("hunter2"));
            assert_security_headers(&res.headers);
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = test_app();
        let req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let res = app.send(req).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["error"], "Validation failed");
    }

    #[tokio::test]
    async fn test_metrics_count_gate_outcomes() {
        let app = test_app();
        app.get("/api/forms", None).await;
        app.get("/api/health", None).await;

        let res = app.get("/metrics", None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["unauthorized"], 1);
        assert!(res.body["requests"].as_u64().unwrap() >= 1);
        assert!(res.body.get("uptimeSeconds").is_some());
    }
}
