use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinancialHealthError {
    #[error("Document '{document}' could not be read: {reason}")]
    UnreadableDocument { document: String, reason: String },

    #[error("Document '{document}' contains no financial line items")]
    EmptyDocument { document: String },

    #[error("Mapping produced no usable periods")]
    NoPeriodsFound,

    #[error("No usable financial data was extracted from {documents} submitted document(s)")]
    InsufficientData { documents: usize },

    #[error("Narrative rejected: {0}")]
    NarrativeRejected(String),

    #[error("Narrative service unavailable: {0}")]
    NarrativeUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid period identifier '{0}': expected forms like 2023, FY2023 or 2023-Q1")]
    InvalidPeriod(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "openai")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl FinancialHealthError {
    pub(crate) fn unreadable(document: &str, reason: impl Into<String>) -> Self {
        Self::UnreadableDocument {
            document: document.to_string(),
            reason: reason.into(),
        }
    }

    /// Extraction failures only abort the affected document.
    pub fn is_document_level(&self) -> bool {
        matches!(
            self,
            Self::UnreadableDocument { .. } | Self::EmptyDocument { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FinancialHealthError>;
