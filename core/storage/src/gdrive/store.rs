//! Persisted authorization grant at a well-known path.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use drivetool_common::{Error, Result};

/// Access tokens expiring within this window are treated as expired.
const EXPIRY_SKEW_MINUTES: i64 = 5;

/// OAuth2 grant delegating access to the user's Drive.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// Short-lived bearer credential.
    pub access_token: String,
    /// Long-lived credential for minting new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When `access_token` stops being valid.
    pub expiry: DateTime<Utc>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// Client id of the application that minted the grant.
    pub client_id: String,
}

impl AuthorizationGrant {
    /// Check if the access token is present and not about to expire.
    pub fn is_fresh(&self) -> bool {
        !self.access_token.is_empty()
            && self.expiry > Utc::now() + Duration::minutes(EXPIRY_SKEW_MINUTES)
    }

    /// Check if a refresh token is available.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Fresh, or at least refreshable without the user.
    pub fn is_usable(&self) -> bool {
        self.is_fresh() || self.is_refreshable()
    }

    /// Whether every required scope was granted.
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Whether the grant was minted for the given application.
    pub fn belongs_to(&self, client_id: &str) -> bool {
        self.client_id == client_id
    }

    fn is_well_formed(&self) -> bool {
        !self.client_id.is_empty() && (!self.access_token.is_empty() || self.is_refreshable())
    }
}

impl fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGrant")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// File-backed store for the single active grant.
///
/// Saves are atomic: the grant is written to a sibling temp file, synced,
/// and renamed over the target, so readers see either the old or the new
/// grant and never a partial one.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the persisted grant.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted grant.
    ///
    /// Returns `Ok(None)` when the file does not exist or does not hold a
    /// well-formed grant.
    ///
    /// # Errors
    /// - `Io` for read failures other than a missing file
    pub async fn load(&self) -> Result<Option<AuthorizationGrant>> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored grant at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        match serde_json::from_slice::<AuthorizationGrant>(&content) {
            Ok(grant) if grant.is_well_formed() => Ok(Some(grant)),
            Ok(_) => {
                warn!(
                    "Stored grant at {} is incomplete; ignoring it",
                    self.path.display()
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    "Stored grant at {} is unreadable ({}); ignoring it",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Persist `grant`, replacing any existing one.
    ///
    /// # Errors
    /// - `Io` if the directory cannot be created or the file written
    pub async fn save(&self, grant: &AuthorizationGrant) -> Result<()> {
        let json = serde_json::to_vec_pretty(grant)
            .map_err(|e| Error::Serialization(format!("Failed to serialize grant: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.temp_path();
        if let Err(e) = write_synced(&tmp_path, &json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        info!("Saved grant to {}", self.path.display());
        Ok(())
    }

    /// Delete the persisted grant. Returns whether a file was removed.
    ///
    /// Only invoked on explicit operator request.
    pub async fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed stored grant at {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "grant".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()))
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}
