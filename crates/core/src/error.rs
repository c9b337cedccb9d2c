#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Document is {size} bytes, limit is {limit}")]
    DocumentTooLarge { size: u64, limit: u64 },

    #[error("Unsupported document type: {0}")]
    UnsupportedType(String),
}

impl CoreError {
    /// Short message suitable for showing to the person who picked the file.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(msg) => msg.clone(),
            CoreError::DocumentTooLarge { limit, .. } => {
                format!("File size exceeds {}MB limit", limit / (1024 * 1024))
            }
            CoreError::UnsupportedType(_) => {
                "Unsupported file type. Please upload PDF, DOCX, or TXT files.".to_string()
            }
        }
    }
}
