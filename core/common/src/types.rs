//! Common types used throughout drivetool.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(String);

impl FolderId {
    /// Create a new FolderId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Folder id cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Parse an optional id where an empty string means "the root folder".
    pub fn optional(id: &str) -> Option<Self> {
        Self::new(id).ok()
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimal identifying record of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Provider-assigned object id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Shareable link, when the provider returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// MIME type reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Descriptor {
    /// Whether the provider reports this object as a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

/// MIME type the provider uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_id_creation() {
        let id = FolderId::new("abc123").unwrap();
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn test_folder_id_empty_fails() {
        assert!(FolderId::new("").is_err());
        assert!(FolderId::new("   ").is_err());
    }

    #[test]
    fn test_folder_id_optional() {
        assert!(FolderId::optional("").is_none());
        assert_eq!(FolderId::optional(" xyz ").unwrap().as_str(), "xyz");
    }

    #[test]
    fn test_descriptor_is_folder() {
        let folder = Descriptor {
            id: "1".to_string(),
            name: "Backups".to_string(),
            link: None,
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
        };
        assert!(folder.is_folder());

        let file = Descriptor {
            mime_type: Some("application/pdf".to_string()),
            ..folder
        };
        assert!(!file.is_folder());
    }

    #[test]
    fn test_descriptor_omits_missing_link() {
        let descriptor = Descriptor {
            id: "1".to_string(),
            name: "a.txt".to_string(),
            link: None,
            mime_type: None,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert!(json.get("link").is_none());
    }
}
