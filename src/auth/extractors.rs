/// Request Authentication Extractors
///
/// Pulls the access token out of a request and resolves it to an
/// [`AuthUser`]. Claims already verified by the request gate are reused
/// from request extensions.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpMessage, HttpRequest};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::cookies::ACCESS_COOKIE;
use crate::error::AppError;
use crate::startup::AppState;

pub const NOT_LOGGED_IN: &str = "Please log in first";
pub const SESSION_EXPIRED: &str = "Session has expired. Please log in again.";

/// Bearer token from `Authorization`, falling back to the access-token cookie.
/// The header wins when both are present.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        req.cookie(ACCESS_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Authenticated caller resolved from a verified access token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

impl AuthUser {
    fn from_claims(claims: &Claims) -> Option<Self> {
        Some(Self {
            user_id: claims.user_id()?,
            email: claims.email.clone(),
        })
    }

    fn resolve(req: &HttpRequest) -> Result<Self, AppError> {
        // claims injected by the request gate on protected paths
        if let Some(claims) = req.extensions().get::<Claims>() {
            return Self::from_claims(claims).ok_or_else(|| AppError::unauthorized(SESSION_EXPIRED));
        }

        let token = bearer_token(req).ok_or_else(|| AppError::unauthorized(NOT_LOGGED_IN))?;
        let state = req
            .app_data::<web::Data<AppState>>()
            .ok_or_else(|| AppError::Internal("application state not configured".to_string()))?;

        state
            .codec
            .verify(TokenKind::Access, &token)
            .as_ref()
            .and_then(Self::from_claims)
            .ok_or_else(|| AppError::unauthorized(SESSION_EXPIRED))
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::resolve(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[test]
    fn header_takes_precedence_over_cookie() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer from-header"))
            .cookie(Cookie::new(ACCESS_COOKIE, "from-cookie"))
            .to_http_request();

        assert_eq!(bearer_token(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_is_used_without_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_COOKIE, "from-cookie"))
            .to_http_request();

        assert_eq!(bearer_token(&req).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn non_bearer_scheme_is_ignored() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();

        assert!(bearer_token(&req).is_none());
    }

    #[test]
    fn gate_claims_resolve_user() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(
            TokenKind::Access,
            user_id,
            "a@b.co",
            "test",
            chrono::Utc::now(),
            chrono::Duration::minutes(15),
        );
        let req = TestRequest::default().to_http_request();
        req.extensions_mut().insert(claims);

        let user = AuthUser::resolve(&req).unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email, "a@b.co");
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        match AuthUser::resolve(&req) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, NOT_LOGGED_IN),
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }
}
