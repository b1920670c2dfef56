use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Type alias for Results with AppError
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_includes_resource_name() {
        let err = AppError::NotFound("conversation 42".to_string());
        assert!(err.to_string().contains("conversation 42"), "NotFound message should include resource name");
    }

    #[test]
    fn test_validation_includes_message() {
        let err = AppError::Validation("--from is after --to".to_string());
        assert!(err.to_string().contains("--from is after --to"));
    }

    #[test]
    fn test_configuration_includes_detail() {
        let err = AppError::Configuration("missing API key".to_string());
        assert!(err.to_string().contains("missing API key"));
    }

    #[test]
    fn test_external_service_includes_detail() {
        let err = AppError::ExternalService("timeout".to_string());
        assert!(err.to_string().contains("timeout"));
    }
}
