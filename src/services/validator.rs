use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// Number of leading bytes inspected when sniffing the content type.
const SNIFF_SAMPLE_SIZE: usize = 2048;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const EMPTY_CONTENT_TYPE: &str = "application/x-empty";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
const TEXT_CONTENT_TYPE: &str = "text/plain";

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", PDF_CONTENT_TYPE),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B", "application/gzip"),
    (b"\x7FELF", "application/x-executable"),
    (b"MZ", "application/x-dosexec"),
];

/// Outcome of validating an upload. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    violations: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AppError::validation(self.violations))
        }
    }

    fn push(&mut self, violation: String) {
        self.violations.push(violation);
    }
}

#[derive(Debug, Clone)]
pub struct InputValidator {
    supported_content_types: Vec<String>,
    max_file_size: usize,
}

impl InputValidator {
    pub fn new(max_file_size: usize) -> Self {
        Self {
            supported_content_types: vec![PDF_CONTENT_TYPE.to_string()],
            max_file_size,
        }
    }

    pub fn with_supported_content_types(mut self, content_types: Vec<String>) -> Self {
        self.supported_content_types = content_types;
        self
    }

    /// Violation reported for an upload larger than the configured maximum.
    pub fn size_limit_violation(&self) -> String {
        format!(
            "File size exceeds the maximum limit of {} bytes",
            self.max_file_size
        )
    }

    /// Runs every check and collects all violations.
    pub fn validate(&self, content: &[u8]) -> ValidationResult {
        let mut result = ValidationResult::default();
        self.validate_content_type(content, &mut result);
        self.validate_size(content, &mut result);

        if result.is_valid() {
            info!("Upload file validation completed successfully.");
        } else {
            debug!(violations = ?result.violations(), "Upload file validation failed");
        }
        result
    }

    fn validate_content_type(&self, content: &[u8], result: &mut ValidationResult) {
        let content_type = sniff_content_type(content);
        if !self.supported_content_types.iter().any(|ct| ct == content_type) {
            result.push(format!("Unsupported content type: {}", content_type));
        }
    }

    fn validate_size(&self, content: &[u8], result: &mut ValidationResult) {
        let size = content.len();
        if size == 0 {
            result.push("File size must be greater than 0".to_string());
        } else if size > self.max_file_size {
            result.push(self.size_limit_violation());
        }
    }
}

/// Determines the content type from the leading bytes of the buffer.
pub fn sniff_content_type(content: &[u8]) -> &'static str {
    if content.is_empty() {
        return EMPTY_CONTENT_TYPE;
    }

    let sample = &content[..content.len().min(SNIFF_SAMPLE_SIZE)];
    if let Some(&(_, content_type)) = SIGNATURES
        .iter()
        .find(|(magic, _)| sample.starts_with(magic))
    {
        return content_type;
    }

    if looks_like_text(sample) {
        TEXT_CONTENT_TYPE
    } else {
        BINARY_CONTENT_TYPE
    }
}

fn looks_like_text(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(text) => text
            .chars()
            .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t' | '\x0C')),
        // A multi-byte sequence cut at the sample boundary is still text.
        Err(e) => e.error_len().is_none() && looks_like_text(&sample[..e.valid_up_to()]),
    }
}
