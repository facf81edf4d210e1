//! S3 object store
//!
//! Uploads relocated attachments with a single signed `PUT` per object
//! (AWS Signature Version 4, unsigned query, signed payload hash).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use glm_core::S3Config;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::storage::{ObjectStore, StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// S3 (or S3-compatible) bucket accepting attachment uploads
pub struct S3ObjectStore {
    http: reqwest::Client,
    bucket: String,
    config: S3Config,
}

/// Headers produced by signing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedHeaders {
    pub amz_date: String,
    pub payload_hash: String,
    pub authorization: String,
}

impl S3ObjectStore {
    pub fn new(bucket: impl Into<String>, config: S3Config) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("glm/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let bucket = bucket.into();
        info!(bucket = %bucket, region = %config.region, "S3 storage initialized");
        Ok(Self {
            http,
            bucket,
            config,
        })
    }

    /// Host and canonical (already encoded) path for a key
    fn location(&self, key: &str) -> (String, String, String) {
        let encoded_key = uri_encode(key, true);
        match self.config.endpoint.as_deref() {
            Some(endpoint) => {
                let (scheme, host) = match endpoint.split_once("://") {
                    Some((scheme, host)) => (scheme.to_string(), host.trim_end_matches('/')),
                    None => ("https".to_string(), endpoint.trim_end_matches('/')),
                };
                if self.config.path_style {
                    (scheme, host.to_string(), format!("/{}/{}", self.bucket, encoded_key))
                } else {
                    (scheme, format!("{}.{}", self.bucket, host), format!("/{}", encoded_key))
                }
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", self.bucket, self.config.region),
                format!("/{}", encoded_key),
            ),
        }
    }

    fn signing_key(&self, date: &str) -> StorageResult<Vec<u8>> {
        let secret = format!("AWS4{}", self.config.secret_access_key);
        let key = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let key = hmac_sha256(&key, self.config.region.as_bytes())?;
        let key = hmac_sha256(&key, SERVICE.as_bytes())?;
        hmac_sha256(&key, b"aws4_request")
    }

    pub(crate) fn sign_put(
        &self,
        host: &str,
        canonical_uri: &str,
        data: &[u8],
        now: DateTime<Utc>,
    ) -> StorageResult<SignedHeaders> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(data));

        let mut headers = vec![
            ("host", host.to_string()),
            ("x-amz-content-sha256", payload_hash.clone()),
            ("x-amz-date", amz_date.clone()),
        ];
        if let Some(token) = &self.config.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let scope = format!("{}/{}/{}/aws4_request", date, self.config.region, SERVICE);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date)?,
            string_to_sign.as_bytes(),
        )?);

        Ok(SignedHeaders {
            amz_date,
            payload_hash,
            authorization: format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.config.access_key_id, scope, signed_headers, signature
            ),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data), fields(storage = "s3", bucket = %self.bucket, size = data.len()))]
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let (scheme, host, canonical_uri) = self.location(key);
        let signed = self.sign_put(&host, &canonical_uri, &data, Utc::now())?;
        let url = format!("{}://{}{}", scheme, host, canonical_uri);

        let mut request = self
            .http
            .put(&url)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization);
        if let Some(token) = &self.config.session_token {
            request = request.header("x-amz-security-token", token);
        }
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = request.body(data).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                key: key.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        debug!(url = %url, "Object uploaded");
        Ok(())
    }

    fn name(&self) -> &str {
        "s3"
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::BackendError(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Everything but the SigV4 unreserved characters
const SIGV4_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const SIGV4_ENCODE_PATH: &AsciiSet = &SIGV4_ENCODE.remove(b'/');

/// Percent-encode per the SigV4 rules, optionally keeping `/` as the path separator.
pub(crate) fn uri_encode(value: &str, keep_slash: bool) -> String {
    let set = if keep_slash { SIGV4_ENCODE_PATH } else { SIGV4_ENCODE };
    utf8_percent_encode(value, set).to_string()
}
