//! In-memory stand-ins for ClamAV, Valkey, the converter and the model,
//! plus request and PDF builders shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use bytes::Bytes;
use candle_core::{Device, Tensor};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use document_gateway::error::{AppError, AppResult};
use document_gateway::models::{ClassConfidence, LabelPrediction, ModelInput};
use document_gateway::services::{CacheConnector, Classifier, DocumentConverter, ScanConnector, ScanVerdict};
use document_gateway::state::{AppComponents, AppContext};

pub const BOUNDARY: &str = "gateway-test-boundary";
pub const TEST_IMAGE_SIZE: usize = 16;

#[derive(Default)]
pub struct FakeScanConnector {
    pub infected_with: Mutex<Option<String>>,
    pub down: AtomicBool,
    pub scanned: AtomicUsize,
}

impl FakeScanConnector {
    pub fn infected(signature: &str) -> Self {
        let connector = Self::default();
        *connector.infected_with.lock().unwrap() = Some(signature.to_string());
        connector
    }
}

#[async_trait]
impl ScanConnector for FakeScanConnector {
    async fn is_alive(&self) -> AppResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::ScanConnectionNotAlive {
                host: "fake-clamav".to_string(),
                port: 3310,
                reason: "stopped".to_string(),
            });
        }
        Ok(())
    }

    async fn instream(&self, _data: Bytes) -> AppResult<ScanVerdict> {
        self.scanned.fetch_add(1, Ordering::SeqCst);
        Ok(match self.infected_with.lock().unwrap().clone() {
            Some(signature) => ScanVerdict::Infected(signature),
            None => ScanVerdict::Clean,
        })
    }
}

#[derive(Default)]
pub struct FakeCacheConnector {
    pub entries: Mutex<HashMap<String, String>>,
    pub down: AtomicBool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub write_attempts: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl FakeCacheConnector {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Waits until `expected` writes have been attempted, successful or not.
    pub async fn wait_for_write_attempts(&self, expected: usize) {
        for _ in 0..200 {
            if self.write_attempts.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} cache write attempts, saw {}",
            expected,
            self.write_attempts.load(Ordering::SeqCst)
        );
    }

    /// Waits until the detached cache writes have landed.
    pub async fn wait_for_writes(&self, expected: usize) {
        for _ in 0..200 {
            if self.writes.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} cache writes, saw {}",
            expected,
            self.writes.load(Ordering::SeqCst)
        );
    }
}

#[async_trait]
impl CacheConnector for FakeCacheConnector {
    async fn is_alive(&self) -> AppResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::CacheConnectionNotAlive {
                host: "fake-valkey".to_string(),
                port: 6379,
                reason: "stopped".to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::internal("Valkey command failed: READONLY"));
        }
        self.entries.lock().unwrap().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.down.store(true, Ordering::SeqCst);
    }
}

/// One zero tensor per PDF page, counted with lopdf so no native PDF
/// library is needed.
pub struct PageCountingConverter;

impl DocumentConverter for PageCountingConverter {
    fn to_model_input(&self, document: &[u8]) -> AppResult<ModelInput> {
        let pdf = Document::load_mem(document)
            .map_err(|e| AppError::conversion(format!("Failed to load PDF: {}", e)))?;
        let pages = (0..pdf.get_pages().len())
            .map(|_| Tensor::zeros((3, TEST_IMAGE_SIZE, TEST_IMAGE_SIZE), candle_core::DType::F32, &Device::Cpu))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ModelInput::new(pages))
    }
}

/// Always answers label 2, or a fixed four-class distribution.
#[derive(Default)]
pub struct CountingClassifier {
    pub calls: AtomicUsize,
    pub rendezvous: Option<Arc<Barrier>>,
}

impl CountingClassifier {
    /// Every call blocks until `parties` calls are in flight.
    pub fn with_rendezvous(parties: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            rendezvous: Some(Arc::new(Barrier::new(parties))),
        }
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.rendezvous {
            barrier.wait();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for CountingClassifier {
    fn classify(&self, _input: &ModelInput) -> AppResult<LabelPrediction> {
        self.record();
        Ok(LabelPrediction { label: 2 })
    }

    fn classify_proba(&self, _input: &ModelInput) -> AppResult<Vec<ClassConfidence>> {
        self.record();
        Ok(vec![
            ClassConfidence { label: 2, confidence: 0.7 },
            ClassConfidence { label: 0, confidence: 0.2 },
            ClassConfidence { label: 1, confidence: 0.06 },
            ClassConfidence { label: 3, confidence: 0.04 },
        ])
    }
}

pub struct TestGateway {
    pub ctx: AppContext,
    pub scan: Arc<FakeScanConnector>,
    pub cache: Arc<FakeCacheConnector>,
}

impl TestGateway {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self::with_scanner(Arc::new(FakeScanConnector::default()), classifier, 2 * 1024 * 1024)
    }

    pub fn with_scanner(
        scan: Arc<FakeScanConnector>,
        classifier: Arc<dyn Classifier>,
        max_file_size: usize,
    ) -> Self {
        let cache = Arc::new(FakeCacheConnector::default());
        let ctx = AppContext::from_components(AppComponents {
            scan_connector: scan.clone(),
            cache_connector: cache.clone(),
            converter: Arc::new(PageCountingConverter),
            classifier,
            max_file_size,
            inference_workers: 4,
            app_host: "http://localhost:8080".to_string(),
        });
        Self { ctx, scan, cache }
    }

    pub fn router(&self) -> axum::Router {
        self.router_with_body_limit(16 * 1024 * 1024)
    }

    pub fn router_with_body_limit(&self, max_body_size: usize) -> axum::Router {
        document_gateway::handlers::create_router(self.ctx.clone(), max_body_size)
    }
}

/// A minimal PDF with `pages` text pages.
pub fn pdf_fixture(pages: usize, text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("{} page {}", text, page + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn predict_request(path: &str, content: &[u8]) -> Request<Body> {
    upload_request(path, "document", content)
}

pub fn upload_request(path: &str, field: &str, content: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, "upload.pdf", content)))
        .unwrap()
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
