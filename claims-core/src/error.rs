use thiserror::Error;

/// Errors surfaced by the core data layer
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
