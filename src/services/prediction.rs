//! Per-request prediction pipeline:
//! scan, validate, hash, cache lookup, then convert and infer on a miss.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{ApiVersion, Prediction, UploadedDocument};
use crate::services::cache_writer::DeferredCacheWrite;
use crate::services::classifier::Classifier;
use crate::services::clamav::AntivirusScanner;
use crate::services::converter::DocumentConverter;
use crate::services::hashing::{calculate_hash, CacheKey};
use crate::services::validator::InputValidator;
use crate::services::valkey::CacheStore;

pub struct PredictionOutcome {
    pub key: CacheKey,
    pub prediction: Prediction,
    pub from_cache: bool,
    /// Set on a miss. The write to the cache starts when this is dropped.
    pub cache_write: Option<DeferredCacheWrite>,
}

pub struct PredictionService {
    scanner: AntivirusScanner,
    validator: InputValidator,
    cache: CacheStore,
    converter: Arc<dyn DocumentConverter>,
    classifier: Arc<dyn Classifier>,
    inference_permits: Arc<Semaphore>,
}

impl PredictionService {
    pub fn new(
        scanner: AntivirusScanner,
        validator: InputValidator,
        cache: CacheStore,
        converter: Arc<dyn DocumentConverter>,
        classifier: Arc<dyn Classifier>,
        inference_workers: usize,
    ) -> Self {
        Self {
            scanner,
            validator,
            cache,
            converter,
            classifier,
            inference_permits: Arc::new(Semaphore::new(inference_workers.max(1))),
        }
    }

    /// Error for an upload cut off by the request body limit. The body never
    /// arrives in full, so it is reported as a size violation without a scan.
    pub fn oversized_upload(&self) -> AppError {
        AppError::validation(vec![self.validator.size_limit_violation()])
    }

    /// Runs the full pipeline for one uploaded document. On a cache miss the
    /// outcome carries a [`DeferredCacheWrite`]; the caller decides how long
    /// to hold it, and never waits on the write itself.
    pub async fn predict(
        &self,
        version: ApiVersion,
        document: UploadedDocument,
    ) -> AppResult<PredictionOutcome> {
        let start = Instant::now();

        self.scanner.scan(document.content.clone()).await?;
        debug!(version = %version, "Document scanned");

        self.validator.validate(&document.content).into_result()?;
        debug!(version = %version, "Document validated");

        let key = CacheKey::new(version, &calculate_hash(&document.content));

        if let Some(prediction) = self.cache.read(&key).await? {
            info!(
                version = %version,
                key = %key,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Serving cached prediction"
            );
            return Ok(PredictionOutcome {
                key,
                prediction,
                from_cache: true,
                cache_write: None,
            });
        }

        let prediction = self.infer(version, document.content).await?;
        let cache_write = DeferredCacheWrite::new(self.cache.clone(), key.clone(), prediction.clone());

        info!(
            version = %version,
            key = %key,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Computed prediction"
        );
        Ok(PredictionOutcome {
            key,
            prediction,
            from_cache: false,
            cache_write: Some(cache_write),
        })
    }

    /// Conversion and inference on the blocking pool, at most
    /// `inference_workers` at a time.
    async fn infer(&self, version: ApiVersion, content: Bytes) -> AppResult<Prediction> {
        let permit = self
            .inference_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::internal(format!("Inference pool closed: {}", e)))?;

        let converter = Arc::clone(&self.converter);
        let classifier = Arc::clone(&self.classifier);
        let span = tracing::Span::current();

        tokio::task::spawn_blocking(move || -> AppResult<Prediction> {
            let _permit = permit;
            let _entered = span.enter();
            let start = Instant::now();

            let input = converter.to_model_input(&content)?;
            debug!(pages = input.length, "Document converted");

            let prediction = match version {
                ApiVersion::V1 => classifier.classify(&input).map(Prediction::Label),
                ApiVersion::V2 => classifier.classify_proba(&input).map(Prediction::Distribution),
            }?;

            debug!(
                inference_ms = start.elapsed().as_millis() as u64,
                "Inference completed"
            );
            Ok(prediction)
        })
        .await?
    }
}
