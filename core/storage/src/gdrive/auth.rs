//! OAuth2 authorization and grant lifecycle for Google Drive.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use drivetool_common::{Error, Result};

use super::config::ClientIdentity;
use super::consent::LoopbackReceiver;
use super::store::{AuthorizationGrant, CredentialStore};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

type OAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Hook that surfaces the authorization URL to the operator.
pub type ConsentPrompt = Box<dyn Fn(&str) + Send + Sync>;

/// Token material returned by the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<std::time::Duration>,
    pub scopes: Option<Vec<String>>,
}

impl MintedToken {
    fn expiry(&self) -> chrono::DateTime<Utc> {
        let lifetime = self
            .expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        Utc::now() + lifetime
    }
}

impl From<BasicTokenResponse> for MintedToken {
    fn from(response: BasicTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in(),
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// Provider-side token operations driven by the [`Authorizer`].
///
/// `refresh` must report a rejected refresh token as `Error::Authentication`
/// and connectivity problems as `Error::Network`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Client id of the registered application.
    fn client_id(&self) -> &str;

    /// Mint a new access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<MintedToken>;

    /// Run the interactive consent flow for `scopes`.
    async fn authorize(&self, scopes: &[String]) -> Result<MintedToken>;
}

/// Google OAuth2 client using the authorization code flow with PKCE and a
/// loopback redirect.
pub struct GoogleOAuth {
    client: OAuthClient,
    client_id: String,
    http: oauth2::reqwest::Client,
    prompt: ConsentPrompt,
}

impl GoogleOAuth {
    /// Create a client for the given application identity.
    ///
    /// # Errors
    /// - `Configuration` if an endpoint URL is invalid
    pub fn new(identity: &ClientIdentity) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(identity.client_id.clone()))
            .set_client_secret(ClientSecret::new(identity.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(identity.auth_uri.clone())
                    .map_err(|e| Error::Configuration(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(identity.token_uri.clone())
                    .map_err(|e| Error::Configuration(format!("Invalid token URL: {}", e)))?,
            );

        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            client_id: identity.client_id.clone(),
            http,
            prompt: Box::new(default_prompt),
        })
    }

    /// Replace how the authorization URL is shown to the operator.
    pub fn with_prompt(mut self, prompt: ConsentPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    /// Build the authorization URL for `scopes` redirecting to `redirect_uri`.
    ///
    /// Returns the URL, the CSRF state and the PKCE verifier secret.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<(String, String, String)> {
        let redirect = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| Error::Configuration(format!("Invalid redirect URL: {}", e)))?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(challenge)
            .set_redirect_uri(Cow::Owned(redirect))
            .url();

        Ok((
            auth_url.to_string(),
            csrf_token.secret().clone(),
            verifier.secret().clone(),
        ))
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
        redirect_uri: &str,
    ) -> Result<MintedToken> {
        let redirect = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| Error::Configuration(format!("Invalid redirect URL: {}", e)))?;

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(oauth2::PkceCodeVerifier::new(pkce_verifier.to_string()))
            .set_redirect_uri(Cow::Owned(redirect))
            .request_async(&self.http)
            .await
            .map_err(|e| token_error("Token exchange", e))?;

        Ok(response.into())
    }
}

#[async_trait]
impl TokenProvider for GoogleOAuth {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn refresh(&self, refresh_token: &str) -> Result<MintedToken> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| token_error("Token refresh", e))?;

        Ok(response.into())
    }

    async fn authorize(&self, scopes: &[String]) -> Result<MintedToken> {
        let receiver = LoopbackReceiver::bind().await?;
        let redirect_uri = receiver.redirect_uri().to_string();
        let (auth_url, state, verifier) = self.authorization_url(&redirect_uri, scopes)?;

        (self.prompt)(&auth_url);

        let code = receiver.wait_for_code(&state).await?;
        self.exchange_code(&code, &verifier, &redirect_uri).await
    }
}

/// Print the URL to stderr and try to open a browser.
fn default_prompt(url: &str) {
    eprintln!("Authorize drivetool by visiting this URL:\n\n  {}\n", url);
    if let Err(e) = open::that(url) {
        warn!("Could not open a browser: {}", e);
    }
}

fn token_error<RE>(action: &str, err: RequestTokenError<RE, BasicErrorResponse>) -> Error
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            Error::Authentication(format!("{} rejected: {}", action, response))
        }
        RequestTokenError::Request(e) => Error::Network(format!("{} failed: {}", action, e)),
        RequestTokenError::Parse(e, _) => {
            Error::Authentication(format!("{} returned a malformed response: {}", action, e))
        }
        RequestTokenError::Other(message) => {
            Error::Authentication(format!("{} failed: {}", action, message))
        }
    }
}

/// Owner of the process-wide active grant.
///
/// The grant is loaded lazily by the first [`obtain`](Self::obtain) call and
/// kept for the life of the process. Refresh and re-authorization run under
/// the write lock, so concurrent callers that observe an expired grant wait
/// for the single in-flight attempt and reuse its result.
pub struct Authorizer {
    store: CredentialStore,
    provider: Arc<dyn TokenProvider>,
    scopes: Vec<String>,
    active: RwLock<Option<AuthorizationGrant>>,
}

impl Authorizer {
    /// Create an authorizer. No I/O happens until the first call.
    pub fn new(
        store: CredentialStore,
        provider: Arc<dyn TokenProvider>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            store,
            provider,
            scopes,
            active: RwLock::new(None),
        }
    }

    /// Get a grant with a fresh access token.
    ///
    /// With a fresh grant already active this is a pure read: no network
    /// call and no store write.
    ///
    /// # Errors
    /// - `Authentication` if the interactive flow fails
    /// - `Network` if the token endpoint is unreachable
    /// - `Io` if the renewed grant cannot be persisted
    pub async fn obtain(&self) -> Result<AuthorizationGrant> {
        {
            let active = self.active.read().await;
            if let Some(grant) = active.as_ref().filter(|g| self.is_current(g)) {
                return Ok(grant.clone());
            }
        }

        let mut active = self.active.write().await;

        // Double-check after acquiring write lock
        if let Some(grant) = active.as_ref().filter(|g| self.is_current(g)) {
            return Ok(grant.clone());
        }

        let grant = self.renew(active.clone(), None).await?;
        *active = Some(grant.clone());
        Ok(grant)
    }

    /// Replace an access token the provider rejected.
    ///
    /// If another caller already swapped in a different fresh token, that
    /// grant is returned without contacting the provider.
    pub async fn force_refresh(&self, rejected_token: &str) -> Result<AuthorizationGrant> {
        let mut active = self.active.write().await;

        if let Some(grant) = active
            .as_ref()
            .filter(|g| g.access_token != rejected_token && self.is_current(g))
        {
            return Ok(grant.clone());
        }

        let grant = self.renew(active.clone(), Some(rejected_token)).await?;
        *active = Some(grant.clone());
        Ok(grant)
    }

    /// Forget the active grant and delete the persisted one.
    pub async fn reset(&self) -> Result<bool> {
        let mut active = self.active.write().await;
        *active = None;
        self.store.clear().await
    }

    /// Scopes every grant must cover.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Location of the persisted grant.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    fn is_current(&self, grant: &AuthorizationGrant) -> bool {
        grant.is_fresh() && self.is_compatible(grant)
    }

    fn is_compatible(&self, grant: &AuthorizationGrant) -> bool {
        grant.belongs_to(self.provider.client_id()) && grant.covers(&self.scopes)
    }

    async fn renew(
        &self,
        cached: Option<AuthorizationGrant>,
        rejected: Option<&str>,
    ) -> Result<AuthorizationGrant> {
        let candidate = match self.store.load().await? {
            Some(stored) => Some(stored),
            None => cached,
        };

        let candidate = candidate.filter(|grant| {
            let compatible = self.is_compatible(grant);
            if !compatible {
                info!("Stored grant does not match the configured client or scopes");
            }
            compatible
        });

        if let Some(grant) = candidate {
            if grant.is_fresh() && rejected != Some(grant.access_token.as_str()) {
                return Ok(grant);
            }

            match grant.refresh_token.clone().filter(|t| !t.is_empty()) {
                Some(refresh_token) => match self.provider.refresh(&refresh_token).await {
                    Ok(minted) => return self.commit_refresh(grant, minted).await,
                    Err(Error::Authentication(reason)) => {
                        warn!("Refresh rejected, re-authorization required: {}", reason);
                    }
                    Err(e) => return Err(e),
                },
                None => info!("Access token expired and no refresh token is available"),
            }
        }

        self.authorize_interactively().await
    }

    async fn commit_refresh(
        &self,
        mut grant: AuthorizationGrant,
        minted: MintedToken,
    ) -> Result<AuthorizationGrant> {
        info!("Refreshed access token");

        grant.expiry = minted.expiry();
        grant.access_token = minted.access_token;
        if let Some(refresh_token) = minted.refresh_token {
            grant.refresh_token = Some(refresh_token);
        }
        if let Some(scopes) = minted.scopes {
            grant.scopes = scopes.into_iter().collect();
        }

        self.store.save(&grant).await?;
        Ok(grant)
    }

    async fn authorize_interactively(&self) -> Result<AuthorizationGrant> {
        info!("Starting interactive authorization");

        let minted = self.provider.authorize(&self.scopes).await?;
        let expiry = minted.expiry();
        let scopes: BTreeSet<String> = match minted.scopes {
            Some(scopes) => scopes.into_iter().collect(),
            None => self.scopes.iter().cloned().collect(),
        };

        let grant = AuthorizationGrant {
            access_token: minted.access_token,
            refresh_token: minted.refresh_token,
            expiry,
            scopes,
            client_id: self.provider.client_id().to_string(),
        };

        if !grant.covers(&self.scopes) {
            return Err(Error::Authentication(
                "Granted scopes do not include the required permissions".to_string(),
            ));
        }

        self.store.save(&grant).await?;
        Ok(grant)
    }
}
