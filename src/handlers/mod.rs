pub mod health;
pub mod predict;

pub use health::*;
pub use predict::*;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::{correlation_id_middleware, processing_time_middleware};
use crate::models::ApiVersion;
use crate::state::AppContext;

/// Router for one API version. Every version shares the handler; the
/// version itself travels as a request extension.
fn version_router(version: ApiVersion) -> Router<AppContext> {
    Router::new()
        .route("/predict", post(predict_handler))
        .layer(Extension(version))
}

/// Builds the full application: one prefix per entry of
/// [`ApiVersion::ALL`], `/latest` for the newest version, and the
/// unversioned service endpoints. Middleware runs outermost first:
/// correlation id, HTTP tracing, then processing time.
pub fn create_router(ctx: AppContext, max_body_size: usize) -> Router {
    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/readiness", get(readiness_handler))
        .route("/versions", get(versions_handler));

    for version in ApiVersion::ALL {
        router = router.nest(&version.prefix(), version_router(version));
    }
    router = router.nest("/latest", version_router(ApiVersion::LATEST));

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(correlation_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(processing_time_middleware))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .with_state(ctx)
}
