//! Result type aliases

use crate::error::MigrationError;

/// Standard Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;
