//! Configuration types and loading
//!
//! A migration run is described by one [`MigrationConfig`]: where attachments
//! come from (GitLab), where they land (S3, an override URL, a local mirror) and
//! the limits applied while moving them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main migration configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Source GitLab instance
    pub gitlab: GitlabConfig,

    /// Where relocated attachments land
    pub destination: DestinationSettings,

    /// Credentials and region for S3 uploads
    pub s3: S3Config,

    /// Attachment transfer limits
    pub attachments: AttachmentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitlabConfig {
    /// Base URL of the GitLab instance, e.g. `https://gitlab.example.com`
    pub url: String,
    /// Personal access token sent as `PRIVATE-TOKEN`
    pub token: Option<String>,
    /// Namespace and project, e.g. `group/project`
    pub project_path: String,
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            url: "https://gitlab.com".to_string(),
            token: None,
            project_path: String::new(),
        }
    }
}

/// Destination policy for attachments found in migrated text.
///
/// The toggles are independent and may combine. Relocation only happens when a
/// bucket is named and at least one of `use_s3`, `override_url` or
/// `keep_local` applies; otherwise references are rewritten to absolute GitLab
/// URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DestinationSettings {
    /// Upload relocated bytes to the S3 bucket
    pub use_s3: bool,
    /// Bucket identifier, also the namespace for relocation
    pub bucket: Option<String>,
    /// Base URL replacing the S3 URL in rewritten links
    pub override_url: Option<String>,
    /// Appended after the relocation key when `override_url` is set
    pub override_suffix: Option<String>,
    /// Mirror relocated bytes under the local attachments directory
    pub keep_local: bool,
}

impl DestinationSettings {
    /// Whether references are fetched and relocated rather than pointed back at GitLab
    pub fn relocation_enabled(&self) -> bool {
        let has_bucket = self.bucket.as_deref().is_some_and(|bucket| !bucket.is_empty());
        has_bucket && (self.use_s3 || self.override_url.is_some() || self.keep_local)
    }

    pub fn override_suffix(&self) -> &str {
        self.override_suffix.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    pub path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: None,
            endpoint: None,
            path_style: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AttachmentConfig {
    pub fetch_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    /// References resolved at once within one body
    pub max_concurrency: usize,
    /// Root directory of the local mirror
    pub local_root: String,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            upload_timeout_secs: 60,
            max_concurrency: 8,
            local_root: "attachments".to_string(),
        }
    }
}

impl AttachmentConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Config file error: {0}")]
    FileError(String),
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "true" | "1" | "yes")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("expected a number, got {:?}", value)))
}

impl MigrationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // GitLab
        config.gitlab.url =
            std::env::var("GITLAB_URL").map_err(|_| ConfigError::MissingEnvVar("GITLAB_URL".into()))?;
        config.gitlab.project_path = std::env::var("GITLAB_PROJECT_PATH")
            .map_err(|_| ConfigError::MissingEnvVar("GITLAB_PROJECT_PATH".into()))?;
        config.gitlab.token = std::env::var("GITLAB_TOKEN").ok();

        // Destination
        config.destination.bucket = std::env::var("S3_BUCKET").ok();
        config.destination.override_url = std::env::var("S3_OVERRIDE_URL").ok();
        config.destination.override_suffix = std::env::var("S3_OVERRIDE_SUFFIX").ok();
        if let Ok(v) = std::env::var("S3_USE_S3") {
            config.destination.use_s3 = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3_KEEP_LOCAL") {
            config.destination.keep_local = parse_bool(&v);
        }

        // S3 credentials, standard AWS names
        if let Ok(region) = std::env::var("AWS_REGION") {
            config.s3.region = region;
        }
        config.s3.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
        config.s3.secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
        config.s3.session_token = std::env::var("AWS_SESSION_TOKEN").ok();
        config.s3.endpoint = std::env::var("S3_ENDPOINT").ok();
        if let Ok(v) = std::env::var("S3_PATH_STYLE") {
            config.s3.path_style = parse_bool(&v);
        }

        // Attachment limits
        if let Ok(v) = std::env::var("ATTACHMENTS_FETCH_TIMEOUT_SECS") {
            config.attachments.fetch_timeout_secs = parse_number("ATTACHMENTS_FETCH_TIMEOUT_SECS", v)?;
        }
        if let Ok(v) = std::env::var("ATTACHMENTS_UPLOAD_TIMEOUT_SECS") {
            config.attachments.upload_timeout_secs =
                parse_number("ATTACHMENTS_UPLOAD_TIMEOUT_SECS", v)?;
        }
        if let Ok(v) = std::env::var("ATTACHMENTS_MAX_CONCURRENCY") {
            config.attachments.max_concurrency = parse_number("ATTACHMENTS_MAX_CONCURRENCY", v)?;
        }
        if let Ok(root) = std::env::var("ATTACHMENTS_LOCAL_ROOT") {
            config.attachments.local_root = root;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (TOML, YAML or JSON by extension),
    /// then apply `GLM_` environment overrides such as `GLM_DESTINATION__BUCKET`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("GLM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::FileError(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::FileError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gitlab.url.trim().is_empty() {
            return Err(ConfigError::invalid("gitlab.url", "must not be empty"));
        }
        if self.gitlab.project_path.trim().is_empty() {
            return Err(ConfigError::invalid("gitlab.project_path", "must not be empty"));
        }

        if self.destination.use_s3 {
            if self.destination.bucket.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::invalid(
                    "destination.bucket",
                    "required when use_s3 is enabled",
                ));
            }
            if self.s3.access_key_id.is_empty() || self.s3.secret_access_key.is_empty() {
                return Err(ConfigError::invalid(
                    "s3.access_key_id",
                    "credentials are required when use_s3 is enabled",
                ));
            }
        }

        if self.attachments.fetch_timeout_secs == 0 {
            return Err(ConfigError::invalid("attachments.fetch_timeout_secs", "must be positive"));
        }
        if self.attachments.upload_timeout_secs == 0 {
            return Err(ConfigError::invalid("attachments.upload_timeout_secs", "must be positive"));
        }
        if self.attachments.max_concurrency == 0 {
            return Err(ConfigError::invalid("attachments.max_concurrency", "must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> MigrationConfig {
        let mut config = MigrationConfig::default();
        config.gitlab.project_path = "group/proj".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert_eq!(config.gitlab.url, "https://gitlab.com");
        assert_eq!(config.s3.region, "us-east-1");
        assert_eq!(config.attachments.local_root, "attachments");
        assert_eq!(config.attachments.fetch_timeout(), Duration::from_secs(30));
        assert!(!config.destination.relocation_enabled());
    }

    #[test]
    fn test_relocation_enabled() {
        let mut destination = DestinationSettings {
            bucket: Some("bucket".to_string()),
            ..Default::default()
        };
        // Bucket alone does not relocate anything
        assert!(!destination.relocation_enabled());

        destination.keep_local = true;
        assert!(destination.relocation_enabled());

        destination.keep_local = false;
        destination.override_url = Some("https://cdn.example.com".to_string());
        assert!(destination.relocation_enabled());

        destination.bucket = None;
        assert!(!destination.relocation_enabled());

        // An empty bucket name counts as unset
        destination.bucket = Some(String::new());
        destination.keep_local = true;
        assert!(!destination.relocation_enabled());
    }

    #[test]
    fn test_override_suffix_defaults_to_empty() {
        let mut destination = DestinationSettings::default();
        assert_eq!(destination.override_suffix(), "");
        destination.override_suffix = Some("?v=1".to_string());
        assert_eq!(destination.override_suffix(), "?v=1");
    }

    #[test]
    fn test_validate_requires_project_path() {
        let config = MigrationConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "gitlab.project_path"
        ));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_use_s3_requires_bucket_and_credentials() {
        let mut config = valid_config();
        config.destination.use_s3 = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "destination.bucket"
        ));

        config.destination.bucket = Some("attachments-bucket".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "s3.access_key_id"
        ));

        config.s3.access_key_id = "AKID".to_string();
        config.s3.secret_access_key = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = valid_config();
        config.attachments.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_parse_number_reports_key() {
        let err = parse_number::<u64>("ATTACHMENTS_FETCH_TIMEOUT_SECS", "soon".to_string())
            .unwrap_err();
        assert!(err.to_string().contains("ATTACHMENTS_FETCH_TIMEOUT_SECS"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[gitlab]
url = "https://gitlab.example.com"
project_path = "group/proj"

[destination]
bucket = "migrated"
override_url = "https://cdn.example.com/files"
override_suffix = "?v=1"
keep_local = true

[attachments]
max_concurrency = 4
"#
        )
        .unwrap();

        let config = MigrationConfig::load(file.path()).unwrap();
        assert_eq!(config.gitlab.url, "https://gitlab.example.com");
        assert_eq!(config.destination.bucket.as_deref(), Some("migrated"));
        assert_eq!(config.destination.override_suffix(), "?v=1");
        assert!(config.destination.keep_local);
        assert!(!config.destination.use_s3);
        assert_eq!(config.attachments.max_concurrency, 4);
        // Unspecified sections fall back to defaults
        assert_eq!(config.attachments.fetch_timeout_secs, 30);
        assert_eq!(config.s3.region, "us-east-1");
    }

    #[test]
    fn test_load_missing_file() {
        let result = MigrationConfig::load("/nonexistent/glm-config.toml");
        assert!(matches!(result, Err(ConfigError::FileError(_))));
    }
}
