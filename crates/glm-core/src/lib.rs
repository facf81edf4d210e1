//! # glm-core
//!
//! Core types and utilities for GitLab Migrate RS.
//!
//! This crate provides the building blocks shared by the other crates:
//! - Common error types
//! - Result type aliases
//! - Migration configuration (GitLab source, attachment destination, limits)
//! - Rate-limit helpers

pub mod config;
pub mod error;
pub mod result;
pub mod throttle;

pub use config::{
    AttachmentConfig, ConfigError, DestinationSettings, GitlabConfig, MigrationConfig, S3Config,
};
pub use error::*;
pub use result::*;
