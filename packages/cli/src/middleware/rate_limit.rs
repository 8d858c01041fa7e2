use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::{debug, warn};

use cube_api::error::ApiError;

type DirectLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Requests per minute for each endpoint category, plus the burst multiplier
/// applied on top (burst = rpm * burst_size / 10).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub health_rpm: u32,
    pub auth_rpm: u32,
    pub catalog_rpm: u32,
    pub selections_rpm: u32,
    pub downloads_rpm: u32,
    pub global_rpm: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_rpm: 60,
            // Strict on credentials, moderate on the archive-assembly path
            auth_rpm: 10,
            catalog_rpm: 30,
            selections_rpm: 60,
            downloads_rpm: 20,
            global_rpm: 30,
            burst_size: 5,
        }
    }
}

impl RateLimitConfig {
    /// Default quotas with the enable switch read from the environment.
    pub fn from_env() -> Self {
        let enabled = std::env::var("CUBE_RATE_LIMIT_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        Self {
            enabled,
            ..Self::default()
        }
    }
}

/// Shared limiter table handed to the middleware through an `Extension`.
/// One governor instance per `{category}:{client ip}` pair, created lazily.
#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    limiters: Arc<Mutex<HashMap<String, DirectLimiter>>>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn rpm_for(&self, category: EndpointCategory) -> u32 {
        match category {
            EndpointCategory::Health => self.config.health_rpm,
            EndpointCategory::Auth => self.config.auth_rpm,
            EndpointCategory::Catalog => self.config.catalog_rpm,
            EndpointCategory::Selections => self.config.selections_rpm,
            EndpointCategory::Downloads => self.config.downloads_rpm,
            EndpointCategory::Other => self.config.global_rpm,
        }
    }

    fn limiter_for(&self, category: EndpointCategory, ip: &str) -> DirectLimiter {
        let rpm = self.rpm_for(category);
        let burst = self.config.burst_size;
        let mut limiters = self.limiters.lock().unwrap();

        limiters
            .entry(format!("{}:{ip}", category.as_str()))
            .or_insert_with(|| {
                debug!(category = category.as_str(), ip, rpm, "new rate limiter");
                Arc::new(RateLimiter::direct(quota(rpm, burst)))
            })
            .clone()
    }
}

// Quota fields are NonZero; zero config values floor at one.
fn quota(rpm: u32, burst_size: u32) -> Quota {
    let per_minute = NonZeroU32::new(rpm).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(rpm.saturating_mul(burst_size) / 10).unwrap_or(NonZeroU32::MIN);
    Quota::per_minute(per_minute).allow_burst(burst)
}

#[derive(Debug, Clone, Copy)]
enum EndpointCategory {
    Health,
    Auth,
    Catalog,
    Selections,
    Downloads,
    Other,
}

impl EndpointCategory {
    fn as_str(self) -> &'static str {
        match self {
            EndpointCategory::Health => "health",
            EndpointCategory::Auth => "auth",
            EndpointCategory::Catalog => "catalog",
            EndpointCategory::Selections => "selections",
            EndpointCategory::Downloads => "downloads",
            EndpointCategory::Other => "other",
        }
    }
}

/// Bucket a request path. `/download` is checked before the catalog and
/// selection prefixes so `/selections/{id}/download` lands on the
/// redemption quota.
fn categorize_endpoint(path: &str) -> EndpointCategory {
    if path.contains("/health") || path.contains("/status") {
        EndpointCategory::Health
    } else if path.contains("/users") {
        EndpointCategory::Auth
    } else if path.contains("/download") {
        EndpointCategory::Downloads
    } else if path.contains("/products") || path.contains("/modules") || path.contains("/materials")
    {
        EndpointCategory::Catalog
    } else if path.contains("/selections") {
        EndpointCategory::Selections
    } else {
        EndpointCategory::Other
    }
}

/// Applied with `axum::middleware::from_fn` ahead of every route. The limiter
/// table arrives through request extensions; when it was never installed the
/// request passes through untouched.
pub async fn rate_limit_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(layer) = request.extensions().get::<RateLimitLayer>().cloned() else {
        return Ok(next.run(request).await);
    };
    if !layer.config.enabled {
        return Ok(next.run(request).await);
    }

    let category = categorize_endpoint(request.uri().path());

    // ConnectInfo is absent when the router is driven directly in tests;
    // those requests share one local bucket.
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "local".to_string());

    let limit = layer.rpm_for(category);
    if layer.limiter_for(category, &client).check().is_err() {
        warn!(
            ip = %client,
            path = %request.uri().path(),
            "rate limit exceeded"
        );
        // The quota window is one minute; a full window is the safe wait
        return Err(ApiError::rate_limited(60));
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert("x-ratelimit-limit", HeaderValue::from(limit));
    Ok(response)
}
