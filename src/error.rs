use thiserror::Error;

/// Failures of the persistence backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Malformed value under `{key}`: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors of the tracking core
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Malformed time window, reported back to the user
    #[error("Invalid time window `{0}`")]
    InvalidSpec(String),

    /// The platform has no such entity (or hides it from us)
    #[error("{0} not found")]
    EntityNotFound(String),

    /// Network failure, throttling or server error; retried on the next poll
    #[error("Fetch failed: {0}")]
    TransientFetch(String),

    #[error("Failed to persist state: {0}")]
    PersistenceWrite(#[source] StoreError),

    #[error("Failed to load state: {0}")]
    PersistenceRead(#[source] StoreError),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
