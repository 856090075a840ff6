use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use http_body::{Frame, SizeHint};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{ApiVersion, PredictResponse, Prediction, UploadedDocument};
use crate::services::{DeferredCacheWrite, PredictionService};
use crate::state::AppContext;

pub const DOCUMENT_FIELD: &str = "document";

pub const FROM_CACHE_HEADER: HeaderName = HeaderName::from_static("x-readed-from-cache");

/// `POST /v{N}/predict`. The version comes from the route table.
pub async fn predict_handler(
    State(ctx): State<AppContext>,
    Extension(version): Extension<ApiVersion>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let mut multipart = multipart.map_err(|e| AppError::InvalidMultipart {
        message: e.body_text(),
    })?;
    let document = extract_document(&mut multipart, &ctx.predictor).await?;
    info!(
        version = %version,
        file_name = %document.name,
        file_size = document.size,
        "Prediction requested"
    );

    let outcome = ctx.predictor.predict(version, document).await?;
    let response = assemble_response(outcome.prediction, outcome.from_cache);
    Ok(match outcome.cache_write {
        Some(cache_write) => write_after_body(response, cache_write),
        None => response,
    })
}

/// Builds `{"prediction": ...}` with the cache indicator header.
pub fn assemble_response(prediction: Prediction, from_cache: bool) -> Response {
    let mut response = Json(PredictResponse { prediction }).into_response();
    let indicator = if from_cache { "true" } else { "false" };
    response
        .headers_mut()
        .insert(FROM_CACHE_HEADER, HeaderValue::from_static(indicator));
    response
}

/// Moves the pending cache write into the response body, so it starts once
/// the server has finished with the body.
fn write_after_body(response: Response, cache_write: DeferredCacheWrite) -> Response {
    response.map(|inner| {
        Body::new(WriteAfterBody {
            inner,
            _cache_write: cache_write,
        })
    })
}

struct WriteAfterBody {
    inner: Body,
    _cache_write: DeferredCacheWrite,
}

impl HttpBody for WriteAfterBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

async fn extract_document(
    multipart: &mut Multipart,
    predictor: &PredictionService,
) -> AppResult<UploadedDocument> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Failed to read multipart field", predictor))?
    {
        if field.name() != Some(DOCUMENT_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("document").to_string();
        let content_type = field.content_type().map(|ct| ct.to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, "Failed to read file data", predictor))?;

        let mut document = UploadedDocument::new(file_name, data);
        if let Some(content_type) = content_type {
            document = document.with_declared_content_type(content_type);
        }

        debug!(
            "Extracted document: {} ({} bytes, declared type: {:?})",
            document.name,
            document.size,
            document.declared_content_type
        );
        return Ok(document);
    }

    Err(AppError::MissingDocument)
}

/// A body cut off by the request size limit is a size violation; anything
/// else is a malformed multipart body.
fn multipart_error(err: MultipartError, context: &str, predictor: &PredictionService) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload exceeded the request body limit: {}", err.body_text());
        return predictor.oversized_upload();
    }
    AppError::InvalidMultipart {
        message: format!("{}: {}", context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelPrediction;

    #[tokio::test]
    async fn assembles_envelope_and_indicator() {
        let response = assemble_response(Prediction::Label(LabelPrediction { label: 2 }), true);

        assert_eq!(response.headers()[&FROM_CACHE_HEADER], "true");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"prediction": {"label": 2}}));
    }

    #[test]
    fn indicator_reports_misses() {
        let response = assemble_response(Prediction::Distribution(Vec::new()), false);
        assert_eq!(response.headers()[&FROM_CACHE_HEADER], "false");
    }
}
