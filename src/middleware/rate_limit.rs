use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::error::Error;
use crate::middleware::auth::Claims;
use crate::AppState;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Fixed-window limiter with one window per key.
#[derive(Clone, Debug)]
pub struct KeyedRateLimiter {
    limit: u32,
    window: Duration,
    buckets: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl KeyedRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let window = self.window;
        buckets.retain(|_, w| now.duration_since(w.start) < window);

        let state = buckets.entry(key.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            false
        }
    }
}

/// Limits authorize calls per signed-in user, slowing teacher-password guessing.
pub async fn limit_per_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    req: Request,
    next: Next,
) -> Response {
    if !state.authorize_limiter.allow(&claims.sub) {
        tracing::warn!(user = %claims.sub, "authorize rate limit exceeded");
        return Error::TooManyRequests.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_key_gets_its_own_window() {
        let limiter = KeyedRateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.allow_at("a", t0));
        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0));
        assert!(limiter.allow_at("b", t0));
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let limiter = KeyedRateLimiter::new(1, Duration::from_millis(10));
        let t0 = Instant::now();
        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0 + Duration::from_millis(5)));
        assert!(limiter.allow_at("a", t0 + Duration::from_millis(11)));
    }
}
