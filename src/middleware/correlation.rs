use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Assigns a fresh correlation id to every request, runs the rest of the
/// chain inside a `request` span carrying it, and echoes it back in the
/// `X-Correlation-ID` response header.
pub async fn correlation_id_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let correlation_id = Uuid::new_v4().simple().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!("request", correlation_id = %correlation_id);

    let mut response = async move {
        tracing::info!(method = %method, uri = %uri, "Request started");

        let response = next.run(request).await;

        tracing::info!(
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = %start.elapsed().as_millis(),
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}
