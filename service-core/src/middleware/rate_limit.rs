//! Process-local flood guard.
//!
//! A coarse per-IP token bucket that runs before any handler. It protects a
//! single worker from bursts; per-action limits that must hold across workers
//! live in the shared store.

use crate::error::AppError;
use crate::middleware::client_ip::{TrustedProxies, client_ip_from_parts};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{net::IpAddr, num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter keyed by IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Create a keyed rate limiter (by IP)
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = attempts.max(1);
    let window_ms = window_seconds.max(1) * 1000;
    let period = Duration::from_millis((window_ms / attempts as u64).max(1));
    let burst = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);

    Arc::new(RateLimiter::dashmap(quota))
}

/// Limiter plus the proxy list used to resolve the caller it is keyed on.
#[derive(Clone)]
pub struct FloodGuard {
    limiter: IpRateLimiter,
    proxies: TrustedProxies,
}

impl FloodGuard {
    pub fn new(limiter: IpRateLimiter, proxies: TrustedProxies) -> Self {
        Self { limiter, proxies }
    }
}

/// Middleware for IP-based flood protection
pub async fn ip_rate_limit_middleware(
    State(guard): State<FloodGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_ip = client_ip_from_parts(request.headers(), request.extensions(), &guard.proxies);

    match client_ip.0 {
        Some(ip) => match guard.limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(ip = %ip, "Flood guard tripped");
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs().max(1)),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
