//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use synthesis_common::errors::AppError;

/// Process-wide rate limiter using governor crate
pub struct GlobalRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
    requests_per_second: u32,
}

/// Create a new rate limiter; zero values are raised to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<GlobalRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    let quota = Quota::per_second(rate).allow_burst(burst);

    Arc::new(GlobalRateLimiter {
        limiter: RateLimiter::direct(quota),
        requests_per_second: rate.get(),
    })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    request: Request,
    next: Next,
    limiter: Arc<GlobalRateLimiter>,
) -> Response {
    match limiter.limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            AppError::RateLimited {
                limit: limiter.requests_per_second,
            }
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(100, 200);
        assert!(limiter.limiter.check().is_ok());
    }

    #[test]
    fn test_burst_is_enforced() {
        let limiter = create_rate_limiter(1, 2);
        assert!(limiter.limiter.check().is_ok());
        assert!(limiter.limiter.check().is_ok());
        assert!(limiter.limiter.check().is_err());
    }

    #[test]
    fn test_zero_config_does_not_panic() {
        let limiter = create_rate_limiter(0, 0);
        assert_eq!(limiter.requests_per_second, 1);
        assert!(limiter.limiter.check().is_ok());
    }
}
