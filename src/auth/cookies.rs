/// Session cookies carrying the token pair
///
/// Both cookies are HttpOnly, `SameSite=Lax`, scoped to `/`, and marked
/// `Secure` in production. Lifetimes track the token lifetimes.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpResponseBuilder;

use crate::auth::refresh_token::TokenPair;
use crate::configuration::Settings;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Clone)]
pub struct AuthCookies {
    secure: bool,
    access_max_age: CookieDuration,
    refresh_max_age: CookieDuration,
}

impl AuthCookies {
    pub fn new(secure: bool, access_secs: i64, refresh_secs: i64) -> Self {
        Self {
            secure,
            access_max_age: CookieDuration::seconds(access_secs),
            refresh_max_age: CookieDuration::seconds(refresh_secs),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.application.production,
            settings.jwt.access_token_expiry,
            settings.jwt.refresh_token_expiry,
        )
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    fn build(&self, name: &'static str, value: String, max_age: CookieDuration) -> Cookie<'static> {
        Cookie::build(name, value)
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(max_age)
            .finish()
    }

    pub fn access(&self, token: String) -> Cookie<'static> {
        self.build(ACCESS_COOKIE, token, self.access_max_age)
    }

    pub fn refresh(&self, token: String) -> Cookie<'static> {
        self.build(REFRESH_COOKIE, token, self.refresh_max_age)
    }

    /// Set both cookies for a freshly issued pair.
    pub fn set_pair(&self, builder: &mut HttpResponseBuilder, pair: &TokenPair) {
        builder
            .cookie(self.access(pair.access_token.clone()))
            .cookie(self.refresh(pair.refresh_token.clone()));
    }

    /// Expire both cookies on the client.
    pub fn clear(&self, builder: &mut HttpResponseBuilder) {
        let mut access = self.build(ACCESS_COOKIE, String::new(), CookieDuration::ZERO);
        access.make_removal();
        let mut refresh = self.build(REFRESH_COOKIE, String::new(), CookieDuration::ZERO);
        refresh.make_removal();
        builder.cookie(access).cookie(refresh);
    }
}
