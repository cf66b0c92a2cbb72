//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: strict limits for `/api/auth/*` (~10/min)
//! - `checkout_rate_limiter`: relaxed limits for `/api/checkout-session` (~30/min)

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers carrying the client IP, in order of trust.
const CLIENT_IP_HEADERS: &[&str] = &["cf-connecting-ip", "x-real-ip", "fly-client-ip"];

/// Key extractor reading the client IP from proxy headers.
///
/// `X-Forwarded-For` is consulted after the single-value headers, using its
/// first entry.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        let parse = |raw: &str| raw.trim().parse::<IpAddr>().ok();

        CLIENT_IP_HEADERS
            .iter()
            .find_map(|name| headers.get(*name)?.to_str().ok().and_then(parse))
            .or_else(|| {
                headers
                    .get("x-forwarded-for")?
                    .to_str()
                    .ok()?
                    .split(',')
                    .next()
                    .and_then(parse)
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

fn rate_limiter(replenish_seconds: u64, burst: u32) -> Option<RateLimiterLayer> {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(replenish_seconds)
        .burst_size(burst)
        .finish()?;
    Some(GovernorLayer::new(Arc::new(config)))
}

/// Rate limiter for sign-in, registration and password reset: one request
/// every 6 seconds, burst of 5.
///
/// # Panics
///
/// Never: the periods are non-zero constants, the only input the builder rejects.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    rate_limiter(6, 5).expect("rate limiter config with per_second(6) and burst_size(5) is valid")
}

/// Rate limiter for payment-session creation: one request every 2 seconds,
/// burst of 10.
///
/// # Panics
///
/// Never: the periods are non-zero constants, the only input the builder rejects.
#[must_use]
pub fn checkout_rate_limiter() -> RateLimiterLayer {
    rate_limiter(2, 10).expect("rate limiter config with per_second(2) and burst_size(10) is valid")
}
