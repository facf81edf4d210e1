//! # glm-attachments
//!
//! Attachment relocation for GitLab Migrate RS.
//!
//! ## Features
//!
//! - Scanning Markdown bodies for GitLab upload references
//! - Stable relocation keys (`sha256(path)/basename`)
//! - Rewriting references to S3, an override URL, or absolute GitLab URLs
//! - Storage backends (S3, local mirror, in-memory)
//! - GitLab upload client
//!
//! ## Example
//!
//! ```rust,ignore
//! use glm_attachments::{AttachmentRewriter, GitlabClient};
//!
//! let config = MigrationConfig::from_env()?;
//! let gitlab = GitlabClient::new(&config.gitlab)?;
//! let rewriter = AttachmentRewriter::from_config(&config)?;
//!
//! let body = rewriter
//!     .rewrite_attachments(&issue.description, None, &config.destination, &gitlab)
//!     .await;
//! rewriter.wait_for_side_effects().await;
//! ```

pub mod key;
pub mod reference;
pub mod rewriter;
pub mod s3;
pub mod source;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use key::{basename, guess_content_type, override_url, relocation_key, s3_url, source_url};
pub use reference::{scan, AttachmentReference, LinkKind};
pub use rewriter::{substitute, AttachmentRewriter, ReplacementMap, RewriteStats, RewriteSummary};
pub use s3::S3ObjectStore;
pub use source::{GitlabClient, MemorySource, SourceError, SourcePlatform, SourceResult};
pub use storage::{
    LocalMirror, MemoryObjectStore, ObjectStore, StorageError, StorageResult, StoredObject,
};
