#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::config::RateLimit;
    use crate::tests::support::{request, test_app, test_app_with, test_config};

    fn contact_form() -> Value {
        json!({
            "title": "Contact",
            "description": "Get in touch",
            "fields": [
                { "name": "name", "label": "Name", "type": "text", "required": true },
                { "name": "email", "label": "Email", "type": "email", "required": true },
                { "name": "message", "type": "textarea" }
            ]
        })
    }

    fn submit(form_id: &str, data: Value) -> axum::http::Request<axum::body::Body> {
        request(Method::POST, &format!("/api/submit/{}", form_id), None, Some(data))
    }

    #[tokio::test]
    async fn test_form_crud() {
        let app = test_app();
        let (token, csrf, id) = app.user_with_form("alice", contact_form()).await;
        let auth = Some((token.as_str(), Some(csrf.as_str())));

        let res = app.get(&format!("/api/forms/{}", id), Some(&token)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["title"], "Contact");
        assert_eq!(res.body["isActive"], true);
        assert_eq!(res.body["fields"].as_array().unwrap().len(), 3);
        assert_eq!(res.body["fields"][2]["required"], false);

        let res = app
            .send(request(
                Method::PUT,
                &format!("/api/forms/{}", id),
                auth,
                Some(json!({ "title": "Contact us", "isActive": false })),
            ))
            .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["title"], "Contact us");
        assert_eq!(res.body["isActive"], false);
        assert_eq!(res.body["description"], "Get in touch");

        let res = app.get("/api/forms", Some(&token)).await;
        assert_eq!(res.body.as_array().unwrap().len(), 1);

        let res = app.send(request(Method::DELETE, &format!("/api/forms/{}", id), auth, None)).await;
        assert_eq!(res.status, StatusCode::OK);
        let res = app.get(&format!("/api/forms/{}", id), Some(&token)).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_form_validates() {
        let app = test_app();
        let body = app.register("alice").await;
        let token = body["token"].as_str().unwrap();
        let csrf = body["csrfToken"].as_str().unwrap();

        for form in [
            json!({ "title": "  " }),
            json!({ "title": "Dupes", "fields": [{ "name": "a" }, { "name": "a" }] }),
            json!({ "title": "Blank field", "fields": [{ "name": "" }] }),
        ] {
            let res = app.send(request(Method::POST, "/api/forms", Some((token, Some(csrf))), Some(form))).await;
            assert_eq!(res.status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_forms_are_private_to_owner() {
        let app = test_app();
        let (_, _, id) = app.user_with_form("alice", contact_form()).await;
        let mallory = app.register("mallory").await;
        let token = mallory["token"].as_str().unwrap();
        let csrf = mallory["csrfToken"].as_str().unwrap();

        assert_eq!(app.get(&format!("/api/forms/{}", id), Some(token)).await.status, StatusCode::NOT_FOUND);
        assert_eq!(
            app.get(&format!("/api/forms/{}/submissions", id), Some(token)).await.status,
            StatusCode::NOT_FOUND
        );
        let res = app
            .send(request(Method::DELETE, &format!("/api/forms/{}", id), Some((token, Some(csrf))), None))
            .await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert!(app.get("/api/forms", Some(token)).await.body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_submission_flow() {
        let app = test_app();
        let (token, _, id) = app.user_with_form("alice", contact_form()).await;

        let res = app.send(submit(&id, json!({ "name": "Bob", "email": "bob@example.com" }))).await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.body["success"], true);
        let submission_id = res.body["submissionId"].as_str().unwrap().to_string();

        let res = app.send(submit(&id, json!({ "name": "Bob" }))).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(res.body["message"].as_str().unwrap().contains("email"));

        let res = app.get(&format!("/api/forms/{}/submissions", id), Some(&token)).await;
        assert_eq!(res.status, StatusCode::OK);
        let list = res.body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], submission_id.as_str());
        assert_eq!(list[0]["data"]["name"], "Bob");
    }

    #[tokio::test]
    async fn test_submit_to_missing_form() {
        let app = test_app();
        let res = app.send(submit("no-such-form", json!({}))).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submit_to_inactive_form() {
        let app = test_app();
        let mut form = contact_form();
        form["isActive"] = json!(false);
        let (_, _, id) = app.user_with_form("alice", form).await;

        let res = app.send(submit(&id, json!({ "name": "Bob", "email": "bob@example.com" }))).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(res.body["error"], "Form is not accepting submissions");
    }

    #[tokio::test]
    async fn test_submission_budget_is_per_form() {
        let mut cfg = test_config();
        cfg.policy.rate_limits.submission = RateLimit::new(2, 60_000);
        let app = test_app_with(cfg);
        let (token, csrf, first) = app.user_with_form("alice", json!({ "title": "One" })).await;
        let res = app
            .send(request(Method::POST, "/api/forms", Some((&token, Some(&csrf))), Some(json!({ "title": "Two" }))))
            .await;
        let second = res.body["id"].as_str().unwrap().to_string();

        assert_eq!(app.send(submit(&first, json!({}))).await.status, StatusCode::CREATED);
        assert_eq!(app.send(submit(&first, json!({}))).await.status, StatusCode::CREATED);
        let res = app.send(submit(&first, json!({}))).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers.contains_key("retry-after"));
        assert_eq!(app.send(submit(&second, json!({}))).await.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let app = test_app();
        let (token, csrf, id) = app.user_with_form("alice", json!({ "title": "One" })).await;
        let res = app
            .send(request(
                Method::POST,
                "/api/forms",
                Some((&token, Some(&csrf))),
                Some(json!({ "title": "Two", "isActive": false })),
            ))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        for _ in 0..3 {
            assert_eq!(app.send(submit(&id, json!({ "x": 1 }))).await.status, StatusCode::CREATED);
        }

        let res = app.get("/api/dashboard/stats", Some(&token)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, json!({ "totalForms": 2, "activeForms": 1, "totalSubmissions": 3 }));

        let other = app.register("bob").await;
        let res = app.get("/api/dashboard/stats", other["token"].as_str()).await;
        assert_eq!(res.body, json!({ "totalForms": 0, "activeForms": 0, "totalSubmissions": 0 }));
    }
}
