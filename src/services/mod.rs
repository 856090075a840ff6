pub mod cache_writer;
pub mod clamav;
pub mod classifier;
pub mod converter;
pub mod hashing;
pub mod prediction;
pub mod validator;
pub mod valkey;

pub use cache_writer::DeferredCacheWrite;
pub use clamav::{AntivirusScanner, ClamavConnector, ScanConnector, ScanVerdict};
pub use classifier::{Classifier, ClassifierConfig, DocumentClassifier};
pub use converter::{DocumentConverter, PageTransform, PdfiumConverter};
pub use hashing::{calculate_hash, CacheKey, ContentHash};
pub use prediction::{PredictionOutcome, PredictionService};
pub use validator::{InputValidator, ValidationResult};
pub use valkey::{CacheConnector, CacheStore, ValkeyConnector};
