//! Attachment Rewriter
//!
//! Rewrites GitLab upload references in a Markdown body so they keep working
//! once the body lives somewhere else. Each reference is either pointed back
//! at GitLab with an absolute URL or, when relocation is configured, fetched
//! once and handed to the object store and the local mirror.
//!
//! Uploads and mirror writes run as tracked background tasks. The returned
//! body already contains the final URLs, so callers must await
//! [`AttachmentRewriter::wait_for_side_effects`] before treating a run as
//! complete.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use glm_core::{AttachmentConfig, DestinationSettings, MigrationConfig, MigrationResult};
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::key::{guess_content_type, override_url, relocation_key, s3_url, source_url};
use crate::reference::{pattern, scan, AttachmentReference};
use crate::s3::S3ObjectStore;
use crate::source::SourcePlatform;
use crate::storage::{LocalMirror, ObjectStore};

/// Replacement text keyed by the byte offset of the match it replaces
#[derive(Debug, Default)]
pub struct ReplacementMap {
    entries: DashMap<usize, String>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, offset: usize, replacement: String) {
        self.entries.insert(offset, replacement);
    }

    pub fn get(&self, offset: usize) -> Option<String> {
        self.entries.get(&offset).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replace every reference in `body` with its entry in `replacements`.
///
/// Matches without an entry are copied through unchanged.
pub fn substitute(body: &str, replacements: &ReplacementMap) -> String {
    let mut rewritten = String::with_capacity(body.len());
    let mut last = 0;

    for found in pattern().find_iter(body) {
        rewritten.push_str(&body[last..found.start()]);
        match replacements.entries.get(&found.start()) {
            Some(replacement) => rewritten.push_str(replacement.value()),
            None => rewritten.push_str(found.as_str()),
        }
        last = found.end();
    }

    rewritten.push_str(&body[last..]);
    rewritten
}

/// Counters accumulated over the lifetime of a rewriter
#[derive(Debug, Default)]
pub struct RewriteStats {
    found: AtomicU64,
    relocated: AtomicU64,
    absolute: AtomicU64,
    skipped: AtomicU64,
    uploads_failed: AtomicU64,
    local_writes_failed: AtomicU64,
}

/// Point-in-time copy of [`RewriteStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    /// References found in all bodies
    pub found: u64,
    /// References rewritten to a relocated URL
    pub relocated: u64,
    /// References rewritten to an absolute GitLab URL
    pub absolute: u64,
    /// References left untouched because the fetch failed
    pub skipped: u64,
    pub uploads_failed: u64,
    pub local_writes_failed: u64,
}

impl RewriteStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RewriteSummary {
        RewriteSummary {
            found: self.found.load(Ordering::Relaxed),
            relocated: self.relocated.load(Ordering::Relaxed),
            absolute: self.absolute.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            local_writes_failed: self.local_writes_failed.load(Ordering::Relaxed),
        }
    }
}

/// Attachment rewriter
pub struct AttachmentRewriter {
    store: Option<Arc<dyn ObjectStore>>,
    mirror: LocalMirror,
    config: AttachmentConfig,
    tracker: TaskTracker,
    stats: Arc<RewriteStats>,
}

impl AttachmentRewriter {
    pub fn new(config: AttachmentConfig) -> Self {
        Self {
            store: None,
            mirror: LocalMirror::new(&config.local_root),
            config,
            tracker: TaskTracker::new(),
            stats: Arc::new(RewriteStats::default()),
        }
    }

    /// Build a rewriter with the backends a migration config asks for
    pub fn from_config(config: &MigrationConfig) -> MigrationResult<Self> {
        let mut rewriter = Self::new(config.attachments.clone());

        if config.destination.use_s3 {
            if let Some(bucket) = &config.destination.bucket {
                let store = S3ObjectStore::new(bucket.clone(), config.s3.clone())?;
                rewriter = rewriter.with_object_store(Arc::new(store));
            }
        }

        Ok(rewriter)
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_local_mirror(mut self, mirror: LocalMirror) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn stats(&self) -> RewriteSummary {
        self.stats.snapshot()
    }

    /// Uploads and mirror writes spawned but not yet finished
    pub fn pending_side_effects(&self) -> usize {
        self.tracker.len()
    }

    /// Rewrite every attachment reference in `body`.
    ///
    /// Always returns a body: references that cannot be fetched keep their
    /// original text.
    #[instrument(skip(self, body, settings, source), fields(size = body.len()))]
    pub async fn rewrite_attachments<S>(
        &self,
        body: &str,
        repo_id: Option<u64>,
        settings: &DestinationSettings,
        source: &S,
    ) -> String
    where
        S: SourcePlatform + ?Sized,
    {
        let references = scan(body);
        if references.is_empty() {
            return body.to_string();
        }
        self.stats
            .found
            .fetch_add(references.len() as u64, Ordering::Relaxed);

        let replacements = ReplacementMap::new();
        let map = &replacements;
        stream::iter(&references)
            .for_each_concurrent(self.config.max_concurrency, move |reference| async move {
                if let Some(fragment) = self.resolve(reference, settings, source).await {
                    map.insert(reference.offset, fragment);
                }
            })
            .await;

        debug!(
            found = references.len(),
            rewritten = replacements.len(),
            "Attachment references resolved"
        );

        substitute(body, &replacements)
    }

    /// Replacement fragment for one reference, `None` to keep the original text
    #[instrument(skip(self, reference, settings, source), fields(path = %reference.path, offset = reference.offset))]
    async fn resolve<S>(
        &self,
        reference: &AttachmentReference,
        settings: &DestinationSettings,
        source: &S,
    ) -> Option<String>
    where
        S: SourcePlatform + ?Sized,
    {
        if !settings.relocation_enabled() {
            let url = source_url(source.host(), source.project_path(), &reference.path);
            RewriteStats::bump(&self.stats.absolute);
            return Some(reference.render(&url));
        }

        let Some(data) = self.fetch(reference, source).await else {
            RewriteStats::bump(&self.stats.skipped);
            return None;
        };

        let key = relocation_key(&reference.path);
        let mut url = key.clone();

        if settings.use_s3 {
            if let Some(bucket) = settings.bucket.as_deref() {
                // Committed before the upload finishes
                url = s3_url(bucket, &key);
                self.spawn_upload(key.clone(), data.clone(), url.clone());
            }
        }

        if let Some(base) = settings.override_url.as_deref() {
            url = override_url(base, &key, settings.override_suffix());
        }

        if settings.keep_local {
            self.spawn_local_write(key, data);
        }

        RewriteStats::bump(&self.stats.relocated);
        Some(reference.render(&url))
    }

    async fn fetch<S>(&self, reference: &AttachmentReference, source: &S) -> Option<Bytes>
    where
        S: SourcePlatform + ?Sized,
    {
        let timeout = self.config.fetch_timeout();
        match tokio::time::timeout(timeout, source.fetch_attachment(&reference.path)).await {
            Ok(Ok(Some(data))) => Some(data),
            Ok(Ok(None)) => {
                warn!(path = %reference.path, "Attachment not found, keeping original link");
                None
            }
            Ok(Err(e)) => {
                warn!(path = %reference.path, error = %e, "Attachment fetch failed, keeping original link");
                None
            }
            Err(_) => {
                warn!(
                    path = %reference.path,
                    timeout_secs = timeout.as_secs(),
                    "Attachment fetch timed out, keeping original link"
                );
                None
            }
        }
    }

    fn spawn_upload(&self, key: String, data: Bytes, url: String) {
        let Some(store) = self.store.clone() else {
            warn!(key = %key, "No object store configured, skipping upload");
            RewriteStats::bump(&self.stats.uploads_failed);
            return;
        };
        let stats = Arc::clone(&self.stats);
        let timeout = self.config.upload_timeout();

        self.tracker.spawn(async move {
            let content_type = guess_content_type(&key);
            info!(key = %key, url = %url, storage = store.name(), "Uploading attachment");

            match tokio::time::timeout(timeout, store.put_object(&key, data, content_type.as_deref()))
                .await
            {
                Ok(Ok(())) => debug!(key = %key, "Upload complete"),
                Ok(Err(e)) => {
                    error!(key = %key, url = %url, error = %e, "Attachment upload failed");
                    RewriteStats::bump(&stats.uploads_failed);
                }
                Err(_) => {
                    error!(
                        key = %key,
                        url = %url,
                        timeout_secs = timeout.as_secs(),
                        "Attachment upload timed out"
                    );
                    RewriteStats::bump(&stats.uploads_failed);
                }
            }
        });
    }

    fn spawn_local_write(&self, key: String, data: Bytes) {
        let mirror = self.mirror.clone();
        let stats = Arc::clone(&self.stats);

        self.tracker.spawn(async move {
            if let Err(e) = mirror.write(&key, &data).await {
                error!(key = %key, root = ?mirror.root(), error = %e, "Local attachment copy failed");
                RewriteStats::bump(&stats.local_writes_failed);
            }
        });
    }

    /// Wait for every upload and mirror write spawned so far.
    ///
    /// The rewriter stays usable afterwards.
    pub async fn wait_for_side_effects(&self) {
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending = pending, "Waiting for attachment uploads to finish");
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Like [`wait_for_side_effects`](Self::wait_for_side_effects), giving up after `limit`.
    ///
    /// Returns `false` if tasks were still running when the limit was hit.
    pub async fn shutdown(&self, limit: Duration) -> bool {
        match tokio::time::timeout(limit, self.wait_for_side_effects()).await {
            Ok(()) => true,
            Err(_) => {
                self.tracker.reopen();
                warn!(
                    pending = self.tracker.len(),
                    "Gave up waiting for attachment uploads"
                );
                false
            }
        }
    }
}
