/// Middleware module
///
/// The request gate (rate limiting, authentication, security headers) and
/// the per-request access log.

mod request_gate;
mod request_logger;

pub use request_gate::{is_protected, RequestGate, USER_EMAIL_HEADER, USER_ID_HEADER};
pub use request_logger::RequestLogger;
