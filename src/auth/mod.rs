/// Authentication module
///
/// Token issuing and verification, password hashing, refresh-token
/// rotation, brute-force lockout and CSRF protection.

mod claims;
mod codec;
mod cookies;
mod csrf;
mod extractors;
mod login_attempts;
mod password;
mod refresh_token;

pub use claims::{Claims, TokenKind};
pub use codec::TokenCodec;
pub use cookies::{AuthCookies, ACCESS_COOKIE, REFRESH_COOKIE};
pub use csrf::{
    csrf_cookie, generate_csrf_token, require_csrf, tokens_match, validate_csrf_token,
    CSRF_COOKIE, CSRF_HEADER,
};
pub use extractors::{bearer_token, AuthUser, NOT_LOGGED_IN, SESSION_EXPIRED};
pub use login_attempts::{LoginAttemptTracker, LoginCheck};
pub use password::PasswordHasher;
pub use refresh_token::{RefreshTokenRegistry, TokenPair};
