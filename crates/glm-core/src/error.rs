//! Core error types for GitLab Migrate RS

use thiserror::Error;

use crate::config::ConfigError;

/// Core error type for migration operations
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source platform error: {message}")]
    Source { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn source_platform(message: impl Into<String>) -> Self {
        MigrationError::Source {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        MigrationError::Storage {
            message: message.into(),
        }
    }

    /// Stable identifier for log aggregation and exit reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            MigrationError::Config(_) => "configuration_error",
            MigrationError::Source { .. } => "source_platform_error",
            MigrationError::Storage { .. } => "storage_error",
            MigrationError::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MigrationError::source_platform("boom").error_code(),
            "source_platform_error"
        );
        assert_eq!(MigrationError::storage("boom").error_code(), "storage_error");
        assert_eq!(
            MigrationError::from(ConfigError::MissingEnvVar("GITLAB_URL".into())).error_code(),
            "configuration_error"
        );
    }

    #[test]
    fn test_error_display() {
        let err = MigrationError::storage("bucket unreachable");
        assert_eq!(err.to_string(), "Storage error: bucket unreachable");
    }
}
