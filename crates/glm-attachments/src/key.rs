//! Relocation keys and destination URLs
//!
//! A relocated attachment is stored under `<sha256(path) hex>/<basename>`. The
//! key depends only on the GitLab upload path, so re-running a migration
//! targets the same object and mirror file.

use sha2::{Digest, Sha256};

/// Deterministic object key for an upload path
pub fn relocation_key(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    format!("{}/{}", hex::encode(digest), basename(path))
}

/// Last path segment, ignoring trailing slashes
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Content type guessed from the key's extension, if any
pub fn guess_content_type(key: &str) -> Option<String> {
    mime_guess::from_path(basename(key))
        .first()
        .map(|mime| mime.to_string())
}

/// Absolute GitLab URL for an upload path: `host/` + project path + path
pub fn source_url(host: &str, project_path: &str, path: &str) -> String {
    if host.ends_with('/') {
        format!("{}{}{}", host, project_path, path)
    } else {
        format!("{}/{}{}", host, project_path, path)
    }
}

/// Public virtual-hosted S3 URL of a relocated object
pub fn s3_url(bucket: &str, key: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", bucket, key)
}

/// URL under an operator-supplied base, e.g. a CDN in front of the store
pub fn override_url(base: &str, key: &str, suffix: &str) -> String {
    format!("{}/{}{}", base, key, suffix)
}
