//! Lazily connected Google Drive backend.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use drivetool_common::{Error, Result};
use drivetool_storage::gdrive::{
    Authorizer, ClientIdentity, CredentialStore, DriveClient, DriveSettings, GoogleOAuth,
};
use drivetool_storage::RemoteStorage;
use drivetool_tools::StorageSource;

/// Builds the process-wide authorizer and Drive client on first use.
pub struct DriveSource {
    settings: DriveSettings,
    authorizer: OnceCell<Arc<Authorizer>>,
    client: OnceCell<Arc<DriveClient>>,
}

impl DriveSource {
    pub fn new(settings: DriveSettings) -> Self {
        Self {
            settings,
            authorizer: OnceCell::new(),
            client: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &DriveSettings {
        &self.settings
    }

    /// The shared authorizer.
    ///
    /// # Errors
    /// - `Configuration` if the client secrets are missing or malformed
    pub async fn authorizer(&self) -> Result<Arc<Authorizer>> {
        self.authorizer
            .get_or_try_init(|| async {
                let identity = ClientIdentity::load(&self.settings.client_secrets_path)?;
                let oauth = GoogleOAuth::new(&identity)?;
                let store = CredentialStore::new(self.settings.token_path.clone());
                debug!("Using token file {}", store.path().display());
                Ok::<_, Error>(Arc::new(Authorizer::new(
                    store,
                    Arc::new(oauth),
                    self.settings.scopes.clone(),
                )))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl StorageSource for DriveSource {
    async fn storage(&self) -> Result<Arc<dyn RemoteStorage>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let authorizer = self.authorizer().await?;
                let client = DriveClient::connect(authorizer, &self.settings).await?;
                Ok::<_, Error>(Arc::new(client))
            })
            .await?;
        let storage: Arc<dyn RemoteStorage> = client.clone();
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use drivetool_storage::gdrive::{AuthorizationGrant, DRIVE_FILE_SCOPE};
    use tempfile::TempDir;

    const SECRETS: &str = r#"{"installed": {
        "client_id": "cli-test.apps.googleusercontent.com",
        "client_secret": "s3cret",
        "redirect_uris": ["http://localhost"]
    }}"#;

    #[tokio::test]
    async fn test_missing_secrets_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let source = DriveSource::new(DriveSettings::in_dir(temp.path()));

        let err = source.storage().await.err().unwrap();

        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_connects_with_stored_grant_and_shares_authorizer() {
        let temp = TempDir::new().unwrap();
        let settings = DriveSettings::in_dir(temp.path());
        std::fs::write(&settings.client_secrets_path, SECRETS).unwrap();
        let grant = AuthorizationGrant {
            access_token: "stored".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry: Utc::now() + Duration::hours(1),
            scopes: [DRIVE_FILE_SCOPE.to_string()].into_iter().collect(),
            client_id: "cli-test.apps.googleusercontent.com".to_string(),
        };
        CredentialStore::new(settings.token_path.clone())
            .save(&grant)
            .await
            .unwrap();
        let source = DriveSource::new(settings);

        let first = source.storage().await.unwrap();
        let second = source.storage().await.unwrap();

        assert_eq!(first.name(), "gdrive");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(
            &source.authorizer().await.unwrap(),
            &source.authorizer().await.unwrap()
        ));
    }
}
