use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl ReportError {
    /// Errors that end the whole run rather than a single recipient.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReportError::Load(_) | ReportError::SchemaMismatch(_) | ReportError::Config(_)
        )
    }
}

impl From<polars::error::PolarsError> for ReportError {
    fn from(err: polars::error::PolarsError) -> Self {
        ReportError::Polars(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for ReportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ReportError::Render(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
