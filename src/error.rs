use thiserror::Error;

/// Errors raised by the statistical decision pipeline.
///
/// Insufficient samples and gate refusals are NOT errors; they come back as
/// values. Anything here is a contract violation the caller has to fix.
#[derive(Error, Debug)]
pub enum EngineError {
    // Observation errors
    #[error("Negative observation {value} at index {index}")]
    NegativeObservation { index: usize, value: f64 },

    #[error("Non-finite observation at index {index}")]
    NonFiniteObservation { index: usize },

    // Contract errors between stages
    #[error("Invalid {role} sample: {reason}")]
    InvalidSample { role: String, reason: String },

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Numerical errors
    #[error("Distribution error: {0}")]
    Distribution(#[from] statrs::StatsError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;
