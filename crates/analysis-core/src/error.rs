use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Look-ahead violation: {0}")]
    LookAhead(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Confidence error: {0}")]
    Confidence(String),
}
