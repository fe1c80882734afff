/// CSRF Guard
///
/// Double-submit scheme: a random token lives in a `SameSite=Strict`
/// cookie and the client echoes it in the `x-csrf-token` header. The two
/// values are compared in constant time.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::AppError;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_TOKEN_BYTES: usize = 32;
const CSRF_COOKIE_HOURS: i64 = 24;

/// 32 random bytes, hex encoded
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn csrf_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(CSRF_COOKIE, token)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::hours(CSRF_COOKIE_HOURS))
        .finish()
}

/// Constant-time comparison. Unequal lengths are a mismatch, not an error.
pub fn tokens_match(cookie: &str, header: &str) -> bool {
    let (a, b) = (cookie.as_bytes(), header.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Fails closed when either half of the pair is missing.
pub fn validate_csrf_token(req: &HttpRequest) -> bool {
    let Some(cookie) = req.cookie(CSRF_COOKIE) else {
        return false;
    };
    let Some(header) = req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    if cookie.value().is_empty() || header.is_empty() {
        return false;
    }
    tokens_match(cookie.value(), header)
}

pub fn require_csrf(req: &HttpRequest) -> Result<(), AppError> {
    if validate_csrf_token(req) {
        Ok(())
    } else {
        tracing::warn!(path = %req.path(), "CSRF validation failed");
        Err(AppError::Forbidden("Invalid CSRF token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn generated_tokens_are_random_hex() {
        let a = generate_csrf_token();
        let b = generate_csrf_token();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn cookie_attributes() {
        let cookie = csrf_cookie("abc".to_string(), true);

        assert_eq!(cookie.name(), CSRF_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(CookieDuration::hours(24)));
    }

    #[test]
    fn matching_pair_is_valid() {
        let token = generate_csrf_token();
        let req = TestRequest::default()
            .cookie(Cookie::new(CSRF_COOKIE, token.clone()))
            .insert_header((CSRF_HEADER, token))
            .to_http_request();

        assert!(validate_csrf_token(&req));
        assert!(require_csrf(&req).is_ok());
    }

    #[test]
    fn single_byte_difference_is_rejected() {
        let token = generate_csrf_token();
        let mut tampered = token.clone().into_bytes();
        tampered[10] = if tampered[10] == b'a' { b'b' } else { b'a' };
        let tampered = String::from_utf8(tampered).unwrap();

        let req = TestRequest::default()
            .cookie(Cookie::new(CSRF_COOKIE, token))
            .insert_header((CSRF_HEADER, tampered))
            .to_http_request();

        assert!(!validate_csrf_token(&req));
    }

    #[test]
    fn missing_half_is_rejected() {
        let token = generate_csrf_token();

        let header_only = TestRequest::default()
            .insert_header((CSRF_HEADER, token.clone()))
            .to_http_request();
        assert!(!validate_csrf_token(&header_only));

        let cookie_only = TestRequest::default()
            .cookie(Cookie::new(CSRF_COOKIE, token))
            .to_http_request();
        assert!(!validate_csrf_token(&cookie_only));
        assert!(matches!(require_csrf(&cookie_only), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn length_mismatch_is_false_not_panic() {
        assert!(!tokens_match("abcd", "abc"));
        assert!(!tokens_match("", "abc"));
        assert!(tokens_match("abc", "abc"));
    }
}
