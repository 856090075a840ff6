use bytes::Bytes;

/// A document received on a predict endpoint, owned by the handling request.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub size: usize,
    pub content: Bytes,
    pub declared_content_type: Option<String>,
}

impl UploadedDocument {
    pub fn new(name: String, content: Bytes) -> Self {
        let size = content.len();
        Self {
            name,
            size,
            content,
            declared_content_type: None,
        }
    }

    /// Records the content type sent by the client. Informational only:
    /// validation sniffs the bytes themselves.
    pub fn with_declared_content_type(mut self, content_type: String) -> Self {
        self.declared_content_type = Some(content_type);
        self
    }
}
