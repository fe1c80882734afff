mod common;

use common::{spawn_app, spawn_app_with, test_settings, PASSWORD};
use serde_json::Value;
use umkm_consultant::configuration::RateLimitSettings;

#[tokio::test]
async fn auth_routes_are_limited_to_five_per_window() {
    let mut settings = test_settings();
    settings.rate_limit = RateLimitSettings::default();
    let app = spawn_app_with(settings);

    for expected_remaining in (0..5).rev() {
        let response = app
            .client
            .post(app.url("/auth/login"))
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .json(&serde_json::json!({ "email": "a@example.com", "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(401, response.status().as_u16());
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            expected_remaining.to_string().as_str()
        );
    }

    let limited = app
        .client
        .post(app.url("/auth/login"))
        .header("X-Forwarded-For", "203.0.113.7")
        .json(&serde_json::json!({ "email": "a@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(429, limited.status().as_u16());
    assert_eq!(limited.headers()["x-ratelimit-remaining"], "0");
    let retry_after: u64 = limited.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    // another client has its own budget
    let other = app
        .client
        .post(app.url("/auth/login"))
        .header("X-Real-IP", "198.51.100.1")
        .json(&serde_json::json!({ "email": "b@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(401, other.status().as_u16());

    // the default class is unaffected for the limited client
    let health = app
        .client
        .get(app.url("/health_check"))
        .header("X-Forwarded-For", "203.0.113.7")
        .send()
        .await
        .unwrap();
    assert_eq!(200, health.status().as_u16());
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = spawn_app();

    for path in ["/api/business", "/api/chat", "/api/analytics/summary"] {
        let response = app.client.get(app.url(path)).send().await.unwrap();
        assert_eq!(401, response.status().as_u16(), "{} should be protected", path);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "Please log in first");
    }
}

#[tokio::test]
async fn invalid_token_reports_expired_session() {
    let app = spawn_app();

    let response = app
        .client
        .get(app.url("/api/business"))
        .bearer_auth("not.a.jwt")
        .send()
        .await
        .unwrap();

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Session has expired. Please log in again.");
}

#[tokio::test]
async fn authenticated_request_passes_the_gate() {
    let app = spawn_app();
    let token = app.signed_up_user("gate@example.com").await;

    let response = app
        .client
        .get(app.url("/api/business"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(200, response.status().as_u16());
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
}
