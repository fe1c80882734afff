/// Request Gate Middleware
///
/// Outermost check on every request, in order:
/// 1. Rate limit by route class and client; over budget → 429
/// 2. Protected paths need a verified access token; claims are injected
///    into request extensions and `X-User-*` headers
/// 3. Everything else gets baseline security headers
///
/// Rate-limit headers are attached to every response that reaches a handler.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{self, HeaderName, HeaderValue},
    Error, HttpMessage, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{bearer_token, TokenCodec, TokenKind, NOT_LOGGED_IN, SESSION_EXPIRED};
use crate::error::AppError;
use crate::security::{
    client_identifier, now_millis, RateLimitClass, RateLimitResult, RateLimiter, SecurityHeaders,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

const PROTECTED_PREFIXES: [&str; 3] = ["/api/business", "/api/chat", "/api/analytics"];
const PUBLIC_PATHS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/refresh"];

pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        && !PUBLIC_PATHS.contains(&path)
}

fn insert_rate_limit_headers(headers: &mut header::HeaderMap, result: &RateLimitResult) {
    for (name, value) in result.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Render `err` with the rate-limit headers attached and short-circuit the chain
fn reject(err: AppError, rate: &RateLimitResult) -> Error {
    let mut response = err.error_response();
    insert_rate_limit_headers(response.headers_mut(), rate);
    actix_web::error::InternalError::from_response(err, response).into()
}

/// Gate applied to the whole application
pub struct RequestGate {
    limiter: Arc<RateLimiter>,
    codec: Arc<TokenCodec>,
}

impl RequestGate {
    pub fn new(limiter: Arc<RateLimiter>, codec: Arc<TokenCodec>) -> Self {
        Self { limiter, codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestGateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestGateService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            codec: self.codec.clone(),
        }))
    }
}

pub struct RequestGateService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    codec: Arc<TokenCodec>,
}

impl<S, B> Service<ServiceRequest> for RequestGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let path = req.path().to_string();
        let client = client_identifier(req.headers());
        let class = RateLimitClass::for_path(&path);
        let now_ms = now_millis();
        let rate = self.limiter.check_at(class, &client, now_ms);

        if !rate.success {
            tracing::warn!(client = %client, class = class.as_str(), path = %path, "Rate limit exceeded");
            let err = reject(
                AppError::RateLimited {
                    retry_after_secs: rate.retry_after_secs(now_ms),
                },
                &rate,
            );
            return Box::pin(async move { Err(err) });
        }

        // identity headers are only ever set by this gate
        req.headers_mut().remove(USER_ID_HEADER);
        req.headers_mut().remove(USER_EMAIL_HEADER);

        let protected = is_protected(&path);
        if protected {
            let Some(token) = bearer_token(req.request()) else {
                tracing::info!(path = %path, "Missing access token");
                let err = reject(AppError::unauthorized(NOT_LOGGED_IN), &rate);
                return Box::pin(async move { Err(err) });
            };

            let Some(claims) = self.codec.verify(TokenKind::Access, &token) else {
                tracing::info!(path = %path, "Access token rejected");
                let err = reject(AppError::unauthorized(SESSION_EXPIRED), &rate);
                return Box::pin(async move { Err(err) });
            };

            if let Ok(value) = HeaderValue::from_str(&claims.sub) {
                req.headers_mut().insert(HeaderName::from_static(USER_ID_HEADER), value);
            }
            if let Ok(value) = HeaderValue::from_str(&claims.email) {
                req.headers_mut().insert(HeaderName::from_static(USER_EMAIL_HEADER), value);
            }
            tracing::debug!(user_id = %claims.sub, "Access token verified");
            req.extensions_mut().insert(claims);
        }

        let service = self.service.clone();
        Box::pin(async move {
            let mut res = service.call(req).await?;
            let headers = res.headers_mut();
            if !protected {
                for (name, value) in SecurityHeaders::get_headers() {
                    headers.insert(name, value);
                }
            }
            insert_rate_limit_headers(headers, &rate);
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::configuration::{JwtSettings, RateLimitSettings};
    use actix_web::{body::to_bytes, http::StatusCode, test, web, App, HttpRequest, HttpResponse};
    use uuid::Uuid;

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(
            &JwtSettings {
                access_secret: "access-secret-key-at-least-32-characters".to_string(),
                refresh_secret: "refresh-secret-key-at-least-32-characters".to_string(),
                access_token_expiry: 900,
                refresh_token_expiry: 604_800,
            },
            "test",
        ))
    }

    fn limiter(default_limit: u32) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(&RateLimitSettings {
            default_limit,
            ..RateLimitSettings::default()
        }))
    }

    async fn echo_identity(req: HttpRequest) -> HttpResponse {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let has_claims = req.extensions().get::<Claims>().is_some();
        HttpResponse::Ok().json(serde_json::json!({ "userId": user_id, "claims": has_claims }))
    }

    #[::core::prelude::v1::test]
    fn test_protected_paths() {
        assert!(is_protected("/api/business"));
        assert!(is_protected("/api/business/123"));
        assert!(is_protected("/api/chat"));
        assert!(is_protected("/api/analytics/summary"));
        assert!(!is_protected("/auth/login"));
        assert!(!is_protected("/health_check"));
    }

    #[actix_web::test]
    async fn test_protected_path_requires_token() {
        let app = test::init_service(
            App::new()
                .wrap(RequestGate::new(limiter(60), codec()))
                .route("/api/business", web::get().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/business").to_request();
        let err = test::try_call_service(&app, req).await.err().expect("rejected");
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-ratelimit-limit"));
    }

    #[actix_web::test]
    async fn test_invalid_token_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(RequestGate::new(limiter(60), codec()))
                .route("/api/business", web::get().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/business")
            .insert_header((header::AUTHORIZATION, "Bearer not.a.token"))
            .to_request();
        let err = test::try_call_service(&app, req).await.err().expect("rejected");
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_valid_token_injects_identity_and_strips_spoofed_headers() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let token = codec.issue(TokenKind::Access, user_id, "a@b.co").unwrap();
        let app = test::init_service(
            App::new()
                .wrap(RequestGate::new(limiter(60), codec.clone()))
                .route("/api/business", web::get().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/business")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .insert_header((USER_ID_HEADER, "spoofed"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "59");

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["userId"], user_id.to_string());
        assert_eq!(body["claims"], true);
    }

    #[actix_web::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let codec = codec();
        let token = codec.issue(TokenKind::Refresh, Uuid::new_v4(), "a@b.co").unwrap();
        let app = test::init_service(
            App::new()
                .wrap(RequestGate::new(limiter(60), codec.clone()))
                .route("/api/business", web::get().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/business")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        assert!(test::try_call_service(&app, req).await.is_err());
    }

    #[actix_web::test]
    async fn test_public_path_gets_security_headers_and_spoofed_identity_removed() {
        let app = test::init_service(
            App::new()
                .wrap(RequestGate::new(limiter(60), codec()))
                .route("/health_check", web::get().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/health_check")
            .insert_header((USER_ID_HEADER, "spoofed"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(res.headers().get("x-content-type-options").unwrap(), "nosniff");
        assert!(res.headers().contains_key("x-ratelimit-reset"));

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["userId"], "");
        assert_eq!(body["claims"], false);
    }

    #[actix_web::test]
    async fn test_rate_limit_short_circuits_with_retry_after() {
        let app = test::init_service(
            App::new()
                .wrap(RequestGate::new(limiter(2), codec()))
                .route("/health_check", web::get().to(echo_identity)),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get()
                .uri("/health_check")
                .insert_header(("x-forwarded-for", "1.2.3.4"))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        let req = test::TestRequest::get()
            .uri("/health_check")
            .insert_header(("x-forwarded-for", "1.2.3.4"))
            .to_request();
        let response = test::try_call_service(&app, req).await.err().expect("limited").error_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "0");
        let retry: u64 = response.headers().get(header::RETRY_AFTER).unwrap().to_str().unwrap().parse().unwrap();
        assert!(retry >= 1 && retry <= 60);
        let body: serde_json::Value = serde_json::from_slice(&to_bytes(response.into_body()).await.unwrap()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Too many requests. Please try again later.");

        // a different client still has budget
        let req = test::TestRequest::get()
            .uri("/health_check")
            .insert_header(("x-forwarded-for", "5.6.7.8"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
