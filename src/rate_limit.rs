/// Rate limiting
use crate::config::RateLimitConfig;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter with separate budgets for authenticated and anonymous
/// traffic
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(
            NonZeroU32::new(config.authenticated_rps).unwrap_or(NonZeroU32::new(50).unwrap()),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::new(20).unwrap()));

        let unauth_quota = Quota::per_second(
            NonZeroU32::new(config.unauthenticated_rps).unwrap_or(NonZeroU32::new(10).unwrap()),
        )
        .allow_burst(
            NonZeroU32::new(config.burst_size / 2).unwrap_or(NonZeroU32::new(10).unwrap()),
        );

        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    pub fn check_authenticated(&self) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.authenticated
            .check()
            .map_err(|_| ApiError::RateLimitExceeded)
    }

    pub fn check_unauthenticated(&self) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.unauthenticated
            .check()
            .map_err(|_| ApiError::RateLimitExceeded)
    }
}

/// Rate limiting middleware: requests carrying an Authorization header
/// draw from the authenticated budget, everything else from the
/// anonymous one
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let has_auth_header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .is_some();

    let result = if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            authenticated_rps: 10,
            unauthenticated_rps: 5,
            burst_size: 4,
        }
    }

    #[test]
    fn test_burst_limit_enforced() {
        let limiter = RateLimiter::new(&config(true));

        for _ in 0..4 {
            assert!(limiter.check_authenticated().is_ok());
        }
        assert!(limiter.check_authenticated().is_err());
    }

    #[test]
    fn test_disabled_limiter_always_passes() {
        let limiter = RateLimiter::new(&config(false));

        for _ in 0..100 {
            assert!(limiter.check_unauthenticated().is_ok());
        }
    }
}
