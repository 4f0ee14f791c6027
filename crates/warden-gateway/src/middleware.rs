//! Gateway middleware.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::time::Instant;
use warden_core::config::RateLimiterConfig;

use crate::auth::AuthError;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub permitted: bool,
    /// Time until the key's window ends. Zero when permitted.
    pub retry_after: Duration,
}

impl Decision {
    const PERMIT: Self = Self {
        permitted: true,
        retry_after: Duration::ZERO,
    };
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counters exposed on the debug endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStats {
    /// Requests admitted since startup.
    pub permitted: u64,
    /// Requests rejected since startup.
    pub rejected: u64,
    /// Keys currently tracked.
    pub tracked_keys: usize,
}

/// Fixed-window rate limiter keyed by client.
///
/// Each key's window starts at its first request, independent of other
/// keys and of wall-clock boundaries. A client may therefore get up to
/// twice the limit through by straddling a window edge.
///
/// Windows expire lazily on the next request for the key, and
/// [`RateLimiter::purge_expired`] drops idle keys.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
    window: Duration,
    enabled: bool,
    permitted: AtomicU64,
    rejected: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `window` per key.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
            enabled: true,
            permitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// A limiter that admits everything without bookkeeping.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0, Duration::ZERO)
        }
    }

    /// Create a limiter from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimiterConfig) -> Self {
        if config.enabled {
            Self::new(config.requests_per_window, config.window())
        } else {
            Self::disabled()
        }
    }

    /// Whether limiting is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a request for `key` and decide whether it may proceed.
    pub fn allow(&self, key: &str) -> Decision {
        if !self.enabled {
            return Decision::PERMIT;
        }

        let now = Instant::now();
        let decision = match self.windows.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Window {
                    started: now,
                    count: 1,
                });
                Decision::PERMIT
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                let elapsed = now.saturating_duration_since(window.started);
                if elapsed >= self.window {
                    *window = Window {
                        started: now,
                        count: 1,
                    };
                    Decision::PERMIT
                } else if window.count < self.limit {
                    window.count += 1;
                    Decision::PERMIT
                } else {
                    Decision {
                        permitted: false,
                        retry_after: self.window - elapsed,
                    }
                }
            }
        };

        if decision.permitted {
            self.permitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        decision
    }

    /// Drop keys whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Snapshot of counters.
    #[must_use]
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            permitted: self.permitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            tracked_keys: self.windows.len(),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("tracked_keys", &self.windows.len())
            .finish_non_exhaustive()
    }
}

/// Middleware applying the limiter to every request, keyed by remote IP.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());

    let decision = limiter.allow(&key);
    if decision.permitted {
        next.run(request).await
    } else {
        tracing::info!(client = %key, retry_after = ?decision.retry_after, "rate limited");
        AuthError::RateLimited {
            retry_after: decision.retry_after,
        }
        .into_response()
    }
}
