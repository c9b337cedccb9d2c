//! Pre-submission checks for uploaded documents.

use crate::error::CoreError;

/// Largest document the analysis service accepts (10 MiB).
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Accepted extensions and their content types.
pub const ACCEPTED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("txt", "text/plain"),
];

/// A document ready to hand to the submission service.
#[derive(Debug, Clone)]
pub struct Document {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl Document {
    /// Build a document, inferring the content type from the file
    /// extension.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CoreError> {
        let filename = filename.into();
        let content_type = content_type_for(&filename)
            .ok_or_else(|| CoreError::UnsupportedType(filename.clone()))?;
        Self::with_content_type(filename, content_type, bytes)
    }

    /// Build a document with an explicit content type.
    pub fn with_content_type(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, CoreError> {
        let filename = filename.into();
        let content_type = content_type.into();

        if filename.trim().is_empty() {
            return Err(CoreError::Validation("Document has no file name".into()));
        }
        if !ACCEPTED_TYPES.iter().any(|(_, ct)| *ct == content_type) {
            return Err(CoreError::UnsupportedType(content_type));
        }
        let size = bytes.len() as u64;
        if size > MAX_DOCUMENT_BYTES {
            return Err(CoreError::DocumentTooLarge {
                size,
                limit: MAX_DOCUMENT_BYTES,
            });
        }
        if size == 0 {
            return Err(CoreError::Validation("Document is empty".into()));
        }

        Ok(Self {
            filename,
            content_type,
            bytes,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Content type for a file name, if its extension is accepted.
pub fn content_type_for(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ACCEPTED_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, ct)| *ct)
}
