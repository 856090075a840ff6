use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

pub const PROCESSING_TIME_HEADER: HeaderName = HeaderName::from_static("x-request-processing-time");

/// Adds `X-Request-Processing-Time`, in seconds, to every response.
pub async fn processing_time_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let mut response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&elapsed.to_string()) {
        response.headers_mut().insert(PROCESSING_TIME_HEADER, value);
    }

    response
}
