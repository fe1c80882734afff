#![allow(dead_code)]

use std::net::TcpListener;

use reqwest::Response;
use serde_json::{json, Value};
use umkm_consultant::configuration::{
    ApplicationSettings, DatabaseSettings, JwtSettings, RateLimitSettings, SecuritySettings,
    Settings,
};
use umkm_consultant::startup::run;
use umkm_consultant::store::Stores;

pub const PASSWORD: &str = "Str0ng!Password";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

pub fn test_settings() -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".into(),
            password: "password".into(),
            port: 5432,
            host: "localhost".into(),
            database_name: "unused".into(),
            max_connections: 1,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".into(),
            port: 0,
            name: "UMKM Consultant AI".into(),
            production: false,
        },
        jwt: JwtSettings {
            access_secret: "integration-access-secret-0123456789abcdef".into(),
            refresh_secret: "integration-refresh-secret-0123456789abcdef".into(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
        },
        security: SecuritySettings {
            bcrypt_cost: 4,
            max_login_attempts: 5,
            lockout_duration_secs: 900,
        },
        // generous so only the dedicated rate-limit tests hit the ceiling
        rate_limit: RateLimitSettings {
            auth_limit: 1_000,
            default_limit: 1_000,
            ..RateLimitSettings::default()
        },
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_settings())
}

pub fn spawn_app_with(settings: Settings) -> TestApp {
    spawn_app_with_stores(settings, Stores::in_memory())
}

pub fn spawn_app_with_stores(settings: Settings, stores: Stores) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let server = run(listener, stores, settings).expect("Failed to create server");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

/// Value of a cookie set by `response`, if any
pub fn cookie_value(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .map(|v| v[prefix.len()..].split(';').next().unwrap_or("").to_string())
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register(&self, email: &str, name: &str) -> Response {
        self.client
            .post(self.url("/auth/register"))
            .json(&json!({
                "email": email,
                "name": name,
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
            }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn refresh(&self, refresh_token: &str) -> Response {
        self.client
            .post(self.url("/auth/refresh"))
            .header(reqwest::header::COOKIE, format!("refresh_token={}", refresh_token))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn me(&self, access_token: &str) -> Response {
        self.client
            .get(self.url("/auth/me"))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register a user and return the access token from the response body
    pub async fn signed_up_user(&self, email: &str) -> String {
        let response = self.register(email, "Test User").await;
        assert_eq!(201, response.status().as_u16());
        let body: Value = response.json().await.unwrap();
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }

    /// Fetch a CSRF token; the cookie and header value are the same string
    pub async fn csrf_token(&self) -> String {
        let response = self
            .client
            .get(self.url("/auth/csrf"))
            .send()
            .await
            .expect("Failed to execute request.");
        let cookie = cookie_value(&response, "csrf_token").expect("csrf cookie set");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["data"]["csrfToken"], cookie.as_str());
        cookie
    }
}
