use axum::extract::{ ConnectInfo, FromRef, FromRequestParts, Request, State };
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{ IntoResponse, Response };
use governor::{ DefaultDirectRateLimiter, Quota };
use log::{ debug, warn };
use std::collections::{ HashMap, VecDeque };
use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{ Arc, Mutex };
use std::time::{ Duration, Instant };

use super::error::ApiError;

pub const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window admission control, one window per client key.
///
/// A denied request does not take a slot. Keys are only dropped by
/// [`prune`](Self::prune).
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, WINDOW)
    }

    pub fn admit(&self, client_key: &str) -> bool {
        self.admit_at(client_key, Instant::now())
    }

    pub fn admit_at(&self, client_key: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = clients.entry(client_key.to_string()).or_default();

        while timestamps.front().is_some_and(|t| now.saturating_duration_since(*t) > self.window) {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_requests {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Drops keys with nothing left inside the window.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let before = clients.len();
        clients.retain(|_, timestamps| {
            timestamps.back().is_some_and(|t| now.saturating_duration_since(*t) <= self.window)
        });
        let removed = before - clients.len();
        if removed > 0 {
            debug!("Pruned {} idle rate limit windows", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether `X-Forwarded-For` may name the client. Off unless the server sits
/// behind a proxy that overwrites the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustForwardedFor(pub bool);

/// Who a request counts against: the peer address, else `anonymous`. With
/// [`TrustForwardedFor`] set, the first `X-Forwarded-For` hop wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl<S> FromRequestParts<S> for ClientKey
    where S: Send + Sync, TrustForwardedFor: FromRef<S>
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TrustForwardedFor(trust) = TrustForwardedFor::from_ref(state);
        if trust {
            let forwarded = parts.headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            if let Some(ip) = forwarded {
                return Ok(ClientKey(ip));
            }
        }

        let peer = parts.extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientKey(peer.unwrap_or_else(|| "anonymous".to_string())))
    }
}

pub fn global_limiter(requests_per_second: u32) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    DefaultDirectRateLimiter::direct(Quota::per_second(rate))
}

const UNLIMITED_PATHS: [&str; 3] = ["/health", "/readiness", "/ping"];

/// Process-wide flood guard in front of the router. Probe endpoints are exempt.
pub async fn flood_guard(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    req: Request,
    next: Next
) -> Response {
    if UNLIMITED_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }
    if limiter.check().is_err() {
        warn!("Global request rate exceeded, rejecting {}", req.uri().path());
        return ApiError::TooManyRequests(
            "The server is busy. Please try again in a moment.".to_string()
        ).into_response();
    }
    next.run(req).await
}
