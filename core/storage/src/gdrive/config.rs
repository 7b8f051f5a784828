//! Drive settings and the operator-supplied application identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use drivetool_common::{Error, Result};

use crate::retry::RetryConfig;

/// Google OAuth2 authorization endpoint, used when the secrets file omits it.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google OAuth2 token endpoint, used when the secrets file omits it.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Access to files created or opened by this application.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Directory name under the user's config directory.
const APP_DIR: &str = "drivetool";
const TOKEN_FILE: &str = "token.json";
const SECRETS_FILE: &str = "credentials.json";

/// Largest page the provider accepts for a file listing.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Runtime settings for the Drive integration.
///
/// Missing fields in a serialized form take their [`Default`] values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    /// Operator-supplied client secrets file.
    pub client_secrets_path: PathBuf,
    /// Well-known location of the persisted grant.
    pub token_path: PathBuf,
    /// Scopes the grant must cover.
    pub scopes: Vec<String>,
    /// Drive metadata API base URL.
    pub api_base: String,
    /// Drive upload API base URL.
    pub upload_base: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Upper bound applied to requested page sizes.
    pub max_page_size: u32,
    /// Backoff for transient provider failures.
    pub retry: RetryConfig,
}

impl Default for DriveSettings {
    /// Same as [`DriveSettings::new`], falling back to a relative
    /// `drivetool` directory when no user config directory exists.
    fn default() -> Self {
        Self::in_dir(default_dir().unwrap_or_else(|_| PathBuf::from(APP_DIR)))
    }
}

impl DriveSettings {
    /// Settings rooted in the user's config directory.
    ///
    /// # Errors
    /// - No per-user config directory can be determined
    pub fn new() -> Result<Self> {
        Ok(Self::in_dir(default_dir()?))
    }

    /// Settings with both files placed in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            client_secrets_path: dir.join(SECRETS_FILE),
            token_path: dir.join(TOKEN_FILE),
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            timeout_secs: 60,
            max_page_size: MAX_PAGE_SIZE,
            retry: RetryConfig::default(),
        }
    }

    /// Override the client secrets location.
    pub fn with_client_secrets(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_secrets_path = path.into();
        self
    }

    /// Override the token location.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Point both API bases at another host (used against mock servers).
    pub fn with_api_root(mut self, root: &str) -> Self {
        let root = root.trim_end_matches('/');
        self.api_base = format!("{}/drive/v3", root);
        self.upload_base = format!("{}/upload/drive/v3", root);
        self
    }

    /// HTTP timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-user directory holding drivetool state.
pub fn default_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| {
            Error::Configuration("Could not determine the user config directory".to_string())
        })
}

/// Registered application identity and provider endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// The provider's client secrets layout: one of `installed` or `web`.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientIdentity>,
    web: Option<ClientIdentity>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl ClientIdentity {
    /// Read and validate a client secrets file.
    ///
    /// # Errors
    /// - `Configuration` if the file is missing, unreadable, or malformed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Cannot read client secrets at {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse a client secrets document.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(content)
            .map_err(|e| Error::Configuration(format!("Malformed client secrets: {}", e)))?;

        let identity = file.installed.or(file.web).ok_or_else(|| {
            Error::Configuration(
                "Client secrets must contain an \"installed\" or \"web\" section".to_string(),
            )
        })?;

        identity.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Configuration("client_id is empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::Configuration("client_secret is empty".to_string()));
        }
        for (field, value) in [("auth_uri", &self.auth_uri), ("token_uri", &self.token_uri)] {
            Url::parse(value)
                .map_err(|e| Error::Configuration(format!("Invalid {}: {}", field, e)))?;
        }
        Ok(self)
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
