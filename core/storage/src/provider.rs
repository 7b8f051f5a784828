//! Remote storage trait definition.

use async_trait::async_trait;
use std::path::Path;

use drivetool_common::{Descriptor, FolderId, Result};

/// Remote storage backend behind the tool surface.
///
/// Implementations handle their own authentication and retries. `None` as a
/// parent means the account root.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Get the backend name (e.g., "gdrive", "memory").
    fn name(&self) -> &str;

    /// List up to `page_size` objects visible to the caller.
    ///
    /// Only the first page is returned; no continuation is followed.
    async fn list(&self, page_size: u32) -> Result<Vec<Descriptor>>;

    /// Upload a local file, keeping its file name.
    ///
    /// # Preconditions
    /// - `local_path` exists and is readable
    /// - `parent`, if given, is an existing folder
    ///
    /// # Errors
    /// - `NotFound` for a missing local file or unknown parent
    /// - Network/authentication errors
    async fn upload(&self, local_path: &Path, parent: Option<&FolderId>) -> Result<Descriptor>;

    /// Create a folder.
    ///
    /// Names are not deduplicated; creating the same name twice yields two
    /// distinct folders.
    async fn create_folder(&self, name: &str, parent: Option<&FolderId>) -> Result<Descriptor>;
}
