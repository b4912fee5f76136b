//! Error types shared by the catalog, the right-sizing optimizer and the
//! carbon advisor.

use thiserror::Error;

/// Errors that can occur while configuring or executing a plugin.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("instance not found in catalog: {0}")]
    InvalidInstance(String),

    #[error("invalid utilization: {0}")]
    InvalidUtilization(String),

    #[error("no family data for {0}")]
    UnknownFamily(String),

    #[error("no catalog available for cloud vendor: {0}")]
    UnknownVendor(String),

    #[error("input validation failed: {0}")]
    InputValidation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to load catalog: {0}")]
    CatalogLoad(String),

    #[error("emissions source error: {0}")]
    EmissionsSource(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    /// Returns true for errors caused by a single bad input record, which the
    /// right-sizing plugin tolerates by passing the record through.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            AdvisorError::InputValidation(_)
                | AdvisorError::InvalidInstance(_)
                | AdvisorError::InvalidUtilization(_)
                | AdvisorError::UnknownVendor(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
