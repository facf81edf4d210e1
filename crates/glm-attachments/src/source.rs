//! Source Platform
//!
//! Where attachments are fetched from before relocation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use glm_core::{GitlabConfig, MigrationError};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::key::source_url;

/// Source platform errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
}

pub type SourceResult<T> = Result<T, SourceError>;

impl From<SourceError> for MigrationError {
    fn from(err: SourceError) -> Self {
        MigrationError::source_platform(err.to_string())
    }
}

/// Platform the migrated issues come from
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    /// Raw bytes of an upload, `None` when the platform has nothing at `path`
    async fn fetch_attachment(&self, path: &str) -> SourceResult<Option<Bytes>>;

    /// Base URL of the instance
    fn host(&self) -> &str;

    /// Namespace and project, e.g. `group/project`
    fn project_path(&self) -> &str;
}

/// GitLab instance serving project uploads
pub struct GitlabClient {
    http: reqwest::Client,
    host: String,
    project_path: String,
    token: Option<String>,
}

impl GitlabClient {
    pub fn new(config: &GitlabConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("glm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            host: config.url.clone(),
            project_path: config.project_path.clone(),
            token: config.token.clone(),
        })
    }

    /// Absolute URL of an upload path on this instance
    pub fn attachment_url(&self, path: &str) -> String {
        source_url(&self.host, &self.project_path, path)
    }
}

#[async_trait]
impl SourcePlatform for GitlabClient {
    #[instrument(skip(self), fields(project = %self.project_path))]
    async fn fetch_attachment(&self, path: &str) -> SourceResult<Option<Bytes>> {
        let url = self.attachment_url(path);

        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Attachment not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let data = response.bytes().await?;
        if data.is_empty() {
            return Ok(None);
        }

        debug!(url = %url, size = data.len(), "Attachment fetched");
        Ok(Some(data))
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn project_path(&self) -> &str {
        &self.project_path
    }
}

/// In-memory source platform for testing
pub struct MemorySource {
    host: String,
    project_path: String,
    attachments: HashMap<String, Bytes>,
    failing: HashSet<String>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new(host: impl Into<String>, project_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            project_path: project_path.into(),
            attachments: HashMap::new(),
            failing: HashSet::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_attachment(mut self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.attachments.insert(path.into(), data.into());
        self
    }

    /// Make fetches of `path` fail with a server error
    pub fn with_failure(mut self, path: impl Into<String>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Number of fetches attempted so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourcePlatform for MemorySource {
    async fn fetch_attachment(&self, path: &str) -> SourceResult<Option<Bytes>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(path) {
            return Err(SourceError::Status {
                url: source_url(&self.host, &self.project_path, path),
                status: 500,
            });
        }
        Ok(self.attachments.get(path).cloned())
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn project_path(&self) -> &str {
        &self.project_path
    }
}
