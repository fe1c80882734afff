/// Request-level protection shared by every route
/// Features:
/// - Fixed-window rate limiting per (route class, client)
/// - Client identification from proxy headers
/// - Baseline security headers

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::configuration::RateLimitSettings;

/// Route classes with independent budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitClass {
    Default,
    Auth,
    Chat,
}

impl RateLimitClass {
    pub fn for_path(path: &str) -> Self {
        if path == "/auth/login" || path == "/auth/register" {
            RateLimitClass::Auth
        } else if path.starts_with("/api/chat") {
            RateLimitClass::Chat
        } else {
            RateLimitClass::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitClass::Default => "default",
            RateLimitClass::Auth => "auth",
            RateLimitClass::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub success: bool,
    pub remaining: u32,
    /// End of the current window, epoch milliseconds
    pub reset: u64,
    pub limit: u32,
}

impl RateLimitResult {
    /// Whole seconds until the window resets, rounded up
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        let wait = self.reset.saturating_sub(now_ms);
        (wait + 999) / 1000
    }

    /// `X-RateLimit-*` headers describing this result
    pub fn headers(&self) -> [(HeaderName, String); 3] {
        [
            (HeaderName::from_static("x-ratelimit-limit"), self.limit.to_string()),
            (HeaderName::from_static("x-ratelimit-remaining"), self.remaining.to_string()),
            (HeaderName::from_static("x-ratelimit-reset"), self.reset.to_string()),
        ]
    }
}

type WindowKey = (RateLimitClass, String);

struct WindowEntry {
    count: u32,
    reset_at: u64,
    /// Recency stamp; also the entry's key in `Windows::recency`
    last_used: u64,
}

/// Counter map plus a recency index ordered by last touch, so the least
/// recently used key is always the first entry of `recency`.
#[derive(Default)]
struct Windows {
    entries: HashMap<WindowKey, WindowEntry>,
    recency: BTreeMap<u64, WindowKey>,
    clock: u64,
}

impl Windows {
    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Move `key` to the most recently used position.
    fn touch(&mut self, key: &WindowKey, old_stamp: u64, stamp: u64) {
        self.recency.remove(&old_stamp);
        self.recency.insert(stamp, key.clone());
    }

    /// Drop least recently used entries until there is room for one more.
    fn evict(&mut self, capacity: usize) {
        while self.entries.len() >= capacity {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&key);
        }
    }
}

/// In-memory fixed-window limiter. Capacity-bounded with least recently
/// used eviction; a window past its reset time counts as absent.
pub struct RateLimiter {
    window_ms: u64,
    capacity: usize,
    default_limit: u32,
    auth_limit: u32,
    chat_limit: u32,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitSettings) -> Self {
        Self {
            window_ms: config.window_ms,
            capacity: usize::try_from(config.capacity).unwrap_or(usize::MAX).max(1),
            default_limit: config.default_limit,
            auth_limit: config.auth_limit,
            chat_limit: config.chat_limit,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn limit_for(&self, class: RateLimitClass) -> u32 {
        match class {
            RateLimitClass::Default => self.default_limit,
            RateLimitClass::Auth => self.auth_limit,
            RateLimitClass::Chat => self.chat_limit,
        }
    }

    pub fn check(&self, class: RateLimitClass, client: &str) -> RateLimitResult {
        self.check_at(class, client, now_millis())
    }

    /// Count one request for `(class, client)` at `now_ms`.
    pub fn check_at(&self, class: RateLimitClass, client: &str, now_ms: u64) -> RateLimitResult {
        let limit = self.limit_for(class);
        // a poisoned lock only means another request panicked mid-update
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = windows.next_stamp();
        let key = (class, client.to_string());

        let (count, reset_at, old_stamp) = match windows.entries.get_mut(&key) {
            Some(entry) => {
                let old_stamp = entry.last_used;
                entry.last_used = stamp;
                if now_ms <= entry.reset_at {
                    entry.count = entry.count.saturating_add(1);
                } else {
                    entry.count = 1;
                    entry.reset_at = now_ms + self.window_ms;
                }
                (entry.count, entry.reset_at, Some(old_stamp))
            }
            None => (1, now_ms + self.window_ms, None),
        };

        match old_stamp {
            Some(old_stamp) => windows.touch(&key, old_stamp, stamp),
            None => {
                windows.evict(self.capacity);
                windows.recency.insert(stamp, key.clone());
                windows.entries.insert(
                    key,
                    WindowEntry {
                        count,
                        reset_at,
                        last_used: stamp,
                    },
                );
            }
        }

        RateLimitResult {
            success: count <= limit,
            remaining: limit.saturating_sub(count),
            reset: reset_at,
            limit,
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .map(|w| w.entries.len())
            .unwrap_or_else(|e| e.into_inner().entries.len())
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// First of `X-Forwarded-For` (leftmost hop), `X-Real-IP`, `CF-Connecting-IP`.
/// Unidentified clients share the `"unknown"` bucket.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|v| !v.is_empty()) {
            return first.to_string();
        }
    }
    header("x-real-ip")
        .or_else(|| header("cf-connecting-ip"))
        .unwrap_or("unknown")
        .to_string()
}

/// Security headers for HTTP responses
pub struct SecurityHeaders;

impl SecurityHeaders {
    pub fn get_headers() -> [(HeaderName, HeaderValue); 4] {
        [
            (
                HeaderName::from_static("x-content-type-options"),
                HeaderValue::from_static("nosniff"),
            ),
            (HeaderName::from_static("x-frame-options"), HeaderValue::from_static("DENY")),
            (
                HeaderName::from_static("x-xss-protection"),
                HeaderValue::from_static("1; mode=block"),
            ),
            (
                HeaderName::from_static("referrer-policy"),
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(&RateLimitSettings::default())
    }

    #[test]
    fn test_route_classes() {
        assert_eq!(RateLimitClass::for_path("/auth/login"), RateLimitClass::Auth);
        assert_eq!(RateLimitClass::for_path("/auth/register"), RateLimitClass::Auth);
        assert_eq!(RateLimitClass::for_path("/auth/refresh"), RateLimitClass::Default);
        assert_eq!(RateLimitClass::for_path("/api/chat/messages"), RateLimitClass::Chat);
        assert_eq!(RateLimitClass::for_path("/api/business"), RateLimitClass::Default);
    }

    #[test]
    fn test_auth_limit_example() {
        let limiter = limiter();
        let now = 1_700_000_000_000;

        for expected_remaining in (0..5).rev() {
            let result = limiter.check_at(RateLimitClass::Auth, "1.2.3.4", now);
            assert!(result.success);
            assert_eq!(result.remaining, expected_remaining);
            assert_eq!(result.limit, 5);
        }

        let sixth = limiter.check_at(RateLimitClass::Auth, "1.2.3.4", now);
        assert!(!sixth.success);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.reset, now + 60_000);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = limiter();
        let now = 1_700_000_000_000;
        for _ in 0..6 {
            limiter.check_at(RateLimitClass::Auth, "1.2.3.4", now);
        }

        assert!(!limiter.check_at(RateLimitClass::Auth, "1.2.3.4", now + 60_000).success);

        let fresh = limiter.check_at(RateLimitClass::Auth, "1.2.3.4", now + 60_001);
        assert!(fresh.success);
        assert_eq!(fresh.remaining, 4);
        assert_eq!(fresh.reset, now + 60_001 + 60_000);
    }

    #[test]
    fn test_classes_and_clients_are_independent() {
        let limiter = limiter();
        let now = 1_700_000_000_000;
        for _ in 0..6 {
            limiter.check_at(RateLimitClass::Auth, "1.2.3.4", now);
        }

        assert!(limiter.check_at(RateLimitClass::Default, "1.2.3.4", now).success);
        assert!(limiter.check_at(RateLimitClass::Auth, "5.6.7.8", now).success);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let limiter = RateLimiter::new(&RateLimitSettings {
            capacity: 2,
            ..RateLimitSettings::default()
        });
        let now = 1_700_000_000_000;

        limiter.check_at(RateLimitClass::Auth, "a", now);
        limiter.check_at(RateLimitClass::Auth, "b", now);
        // touch "a" so "b" becomes the oldest
        limiter.check_at(RateLimitClass::Auth, "a", now);
        limiter.check_at(RateLimitClass::Auth, "c", now);

        assert_eq!(limiter.tracked_keys(), 2);
        assert_eq!(limiter.check_at(RateLimitClass::Auth, "a", now).remaining, 2);
        // "b" was evicted and starts over (this insert evicts "c")
        assert_eq!(limiter.check_at(RateLimitClass::Auth, "b", now).remaining, 4);
    }

    #[test]
    fn test_eviction_keeps_index_in_step_with_entries() {
        let limiter = RateLimiter::new(&RateLimitSettings {
            capacity: 100,
            ..RateLimitSettings::default()
        });
        let now = 1_700_000_000_000;

        for i in 0..100 {
            limiter.check_at(RateLimitClass::Default, &format!("fill-{}", i), now);
        }
        // keep the first filler warm while fresh clients push the rest out
        for i in 0..150 {
            limiter.check_at(RateLimitClass::Default, "fill-0", now);
            limiter.check_at(RateLimitClass::Default, &format!("spoof-{}", i), now);
        }

        {
            let windows = limiter.windows.lock().unwrap();
            assert_eq!(windows.entries.len(), 100);
            assert_eq!(windows.recency.len(), 100);
            for (stamp, key) in &windows.recency {
                assert_eq!(windows.entries[key].last_used, *stamp);
            }
        }
        // the warm key kept its window; an evicted one starts over
        assert!(!limiter.check_at(RateLimitClass::Default, "fill-0", now).success);
        assert_eq!(limiter.check_at(RateLimitClass::Default, "fill-1", now).remaining, 59);
    }

    #[test]
    fn test_expired_window_is_reused_in_place() {
        let limiter = RateLimiter::new(&RateLimitSettings {
            capacity: 1,
            ..RateLimitSettings::default()
        });
        let now = 1_700_000_000_000;

        limiter.check_at(RateLimitClass::Auth, "a", now);
        let fresh = limiter.check_at(RateLimitClass::Auth, "a", now + 60_001);
        assert!(fresh.success);
        assert_eq!(fresh.remaining, 4);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.windows.lock().unwrap().recency.len(), 1);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let result = RateLimitResult {
            success: false,
            remaining: 0,
            reset: 10_500,
            limit: 5,
        };
        assert_eq!(result.retry_after_secs(10_000), 1);
        assert_eq!(result.retry_after_secs(9_000), 2);
        assert_eq!(result.retry_after_secs(11_000), 0);
    }

    #[test]
    fn test_client_identifier_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers), "unknown");

        headers.insert(HeaderName::from_static("cf-connecting-ip"), HeaderValue::from_static("9.9.9.9"));
        assert_eq!(client_identifier(&headers), "9.9.9.9");

        headers.insert(HeaderName::from_static("x-real-ip"), HeaderValue::from_static("8.8.8.8"));
        assert_eq!(client_identifier(&headers), "8.8.8.8");

        headers.insert(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static(" 1.2.3.4 , 10.0.0.1"),
        );
        assert_eq!(client_identifier(&headers), "1.2.3.4");
    }

    #[test]
    fn test_security_headers() {
        let headers = SecurityHeaders::get_headers();
        let names: Vec<_> = headers.iter().map(|(name, _)| name.as_str()).collect();

        assert!(names.contains(&"x-content-type-options"));
        assert!(names.contains(&"x-frame-options"));
        assert!(names.contains(&"x-xss-protection"));
        assert!(names.contains(&"referrer-policy"));
    }
}
