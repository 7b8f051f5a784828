//! Google Drive backend.
//!
//! - OAuth2 authorization with a persisted, refreshable grant
//! - Loopback consent flow for first-time authorization
//! - Multipart and resumable uploads
//! - `RemoteStorage` implementation over the Drive v3 API

pub mod auth;
pub mod client;
pub mod config;
pub mod consent;
pub mod store;

pub use auth::{Authorizer, GoogleOAuth, MintedToken, TokenProvider};
pub use client::{DriveClient, DriveFile};
pub use config::{ClientIdentity, DriveSettings, DRIVE_FILE_SCOPE, MAX_PAGE_SIZE};
pub use store::{AuthorizationGrant, CredentialStore};
