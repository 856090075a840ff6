//! Process-wide application context, built once at startup and handed to
//! every request through axum's `State`.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::services::{
    AntivirusScanner, CacheConnector, CacheStore, ClamavConnector, Classifier, ClassifierConfig,
    DocumentClassifier, DocumentConverter, InputValidator, PageTransform, PdfiumConverter,
    PredictionService, ScanConnector, ValkeyConnector,
};

#[derive(Clone)]
pub struct AppContext {
    pub scan_connector: Arc<dyn ScanConnector>,
    pub cache_connector: Arc<dyn CacheConnector>,
    pub predictor: Arc<PredictionService>,
    pub app_host: String,
}

/// Everything the pipeline needs, with connectors already established.
pub struct AppComponents {
    pub scan_connector: Arc<dyn ScanConnector>,
    pub cache_connector: Arc<dyn CacheConnector>,
    pub converter: Arc<dyn DocumentConverter>,
    pub classifier: Arc<dyn Classifier>,
    pub max_file_size: usize,
    pub inference_workers: usize,
    pub app_host: String,
}

impl AppContext {
    /// Connects to ClamAV and Valkey (each verified with a ping) and loads
    /// the classifier. Any failure aborts startup.
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        let scan_connector =
            ClamavConnector::connect(&config.clamav_host, config.clamav_port, config.scan_timeout())
                .await?;
        let cache_connector = ValkeyConnector::connect(&config.valkey_host, config.valkey_port).await?;

        let model_path = config.model_path.clone();
        let classifier_config = ClassifierConfig::new(config.num_classes);
        let classifier = tokio::task::spawn_blocking(move || {
            DocumentClassifier::from_path(model_path, classifier_config)
        })
        .await??;

        let mut converter = PdfiumConverter::new(PageTransform::with_image_size(config.image_size));
        if let Some(path) = &config.pdfium_library_path {
            converter = converter.with_library_path(path);
        }

        Ok(Self::from_components(AppComponents {
            scan_connector: Arc::new(scan_connector),
            cache_connector: Arc::new(cache_connector),
            converter: Arc::new(converter),
            classifier: Arc::new(classifier),
            max_file_size: config.max_file_size_bytes,
            inference_workers: config.inference_workers,
            app_host: config.app_host.clone(),
        }))
    }

    pub fn from_components(components: AppComponents) -> Self {
        let predictor = PredictionService::new(
            AntivirusScanner::new(Arc::clone(&components.scan_connector)),
            InputValidator::new(components.max_file_size),
            CacheStore::new(Arc::clone(&components.cache_connector)),
            components.converter,
            components.classifier,
            components.inference_workers,
        );

        Self {
            scan_connector: components.scan_connector,
            cache_connector: components.cache_connector,
            predictor: Arc::new(predictor),
            app_host: components.app_host,
        }
    }

    /// Checks that both external dependencies answer.
    pub async fn check_readiness(&self) -> AppResult<()> {
        self.cache_connector.is_alive().await?;
        self.scan_connector.is_alive().await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Shutting down application context");
        self.cache_connector.close().await;
    }
}
