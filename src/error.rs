use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("aggregation exceeded the limit of {limit} daily entries")]
    ResourceLimit { limit: usize },

    #[error("database unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    #[error("stored document could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T, E = AnalyticsError> = std::result::Result<T, E>;
