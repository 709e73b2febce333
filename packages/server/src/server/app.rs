//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::RateLimitConfig;
use crate::kernel::ServerDeps;
use crate::server::routes::{
    health_handler, logout_handler, me_handler, refresh_handler, send_code_handler,
    verify_code_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub deps: Arc<ServerDeps>,
}

/// Build the Axum application router
///
/// The per-IP rate limiter reads the client address from proxy headers or
/// the connection, so it needs `into_make_service_with_connect_info` when
/// enabled. Pass `None` to run without it (tests, behind a gateway).
pub fn build_app(deps: ServerDeps, rate_limit: Option<RateLimitConfig>) -> Router {
    let app_state = AxumAppState {
        deps: Arc::new(deps),
    };

    // CORS configuration - allow any origin for development
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let mut auth_routes = Router::new()
        .route("/send-code", post(send_code_handler))
        .route("/verify-code", post(verify_code_handler))
        .route("/refresh", post(refresh_handler))
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler));

    if let Some(limits) = rate_limit {
        // The builder takes the period that refills one slot, not a rate
        let governor_config = GovernorConfigBuilder::default()
            .per_millisecond(replenish_millis(limits.per_second))
            .burst_size(limits.burst)
            .key_extractor(SmartIpKeyExtractor) // X-Forwarded-For, then peer address
            .use_headers()
            .finish();

        match governor_config {
            Some(config) => {
                auth_routes = auth_routes.layer(GovernorLayer {
                    config: Arc::new(config),
                });
            }
            None => tracing::warn!(?limits, "Invalid rate limit configuration, limiter disabled"),
        }
    }

    Router::new()
        .nest("/auth", auth_routes)
        // Health check (no rate limit)
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Milliseconds between refills for `per_second` requests per second
fn replenish_millis(per_second: u64) -> u64 {
    (1000 / per_second.max(1)).max(1)
}
