//! The three Drive tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use drivetool_common::{Descriptor, Error, Result};

use crate::args;
use crate::handler::{StorageSource, ToolHandler};
use crate::outcome::ToolOutcome;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

fn report<T>(
    tool: &str,
    action: &str,
    result: Result<T>,
    ok: impl FnOnce(T) -> ToolOutcome,
) -> ToolOutcome {
    match result {
        Ok(value) => ok(value),
        Err(err) => {
            warn!(tool, kind = %err.kind(), "{}", err);
            ToolOutcome::failure(action, &err)
        }
    }
}

/// `list_drive_files(page_size = 10)`
pub struct ListFilesTool {
    source: Arc<dyn StorageSource>,
    max_page_size: u32,
}

impl ListFilesTool {
    pub fn new(source: Arc<dyn StorageSource>, max_page_size: u32) -> Self {
        Self {
            source,
            max_page_size,
        }
    }

    /// Validate and clamp the requested page size.
    fn page_size(&self, args: &Value) -> Result<u32> {
        let requested = args::optional_int(args, "page_size", DEFAULT_PAGE_SIZE)?;
        if requested <= 0 {
            return Err(Error::InvalidInput(format!(
                "'page_size' must be positive, got {}",
                requested
            )));
        }
        Ok(requested.min(i64::from(self.max_page_size)) as u32)
    }

    async fn run(&self, args: &Value) -> Result<Vec<Descriptor>> {
        let page_size = self.page_size(args)?;
        let storage = self.source.storage().await?;
        storage.list(page_size).await
    }
}

fn render_listing(files: &[Descriptor]) -> String {
    if files.is_empty() {
        return "No files found in Google Drive.".to_string();
    }

    let mut out = format!("Found {} files:\n\n", files.len());
    for (idx, file) in files.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", idx + 1, file.name);
        let _ = writeln!(out, "   ID: {}", file.id);
        if let Some(link) = &file.link {
            let _ = writeln!(out, "   Link: {}", link);
        }
        out.push('\n');
    }
    out
}

#[async_trait]
impl ToolHandler for ListFilesTool {
    fn name(&self) -> &str {
        "list_drive_files"
    }

    fn description(&self) -> &str {
        "List recent files in Google Drive with their IDs and links."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_size": {
                    "type": "integer",
                    "description": format!("Number of files to return (max {}).", self.max_page_size),
                    "minimum": 1,
                    "default": DEFAULT_PAGE_SIZE
                }
            }
        })
    }

    async fn call(&self, args: &Value) -> ToolOutcome {
        let result = self.run(args).await;
        report(self.name(), "listing files", result, |files| {
            info!(count = files.len(), "Listed files");
            ToolOutcome::success(render_listing(&files), files)
        })
    }
}

/// `upload_to_drive(file_path, folder_id = "")`
pub struct UploadTool {
    source: Arc<dyn StorageSource>,
    base_dir: Option<PathBuf>,
}

impl UploadTool {
    pub fn new(source: Arc<dyn StorageSource>) -> Self {
        Self {
            source,
            base_dir: None,
        }
    }

    /// Resolve relative paths against `dir` instead of the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve(&self, file_path: &str) -> Result<PathBuf> {
        let path = PathBuf::from(file_path);
        if path.is_absolute() {
            return Ok(path);
        }
        let base = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(base.join(path))
    }

    async fn run(&self, args: &Value) -> Result<Descriptor> {
        let path = self.resolve(args::required_str(args, "file_path")?)?;
        let parent = args::optional_folder(args, "folder_id")?;

        // Checked here so a missing file never triggers authorization.
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::NotFound(format!("File not found: {}", path.display())));
        }

        let storage = self.source.storage().await?;
        storage.upload(&path, parent.as_ref()).await
    }
}

#[async_trait]
impl ToolHandler for UploadTool {
    fn name(&self) -> &str {
        "upload_to_drive"
    }

    fn description(&self) -> &str {
        "Upload a local file to Google Drive, optionally into a folder."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to upload."
                },
                "folder_id": {
                    "type": "string",
                    "description": "Optional folder ID to upload into.",
                    "default": ""
                }
            },
            "required": ["file_path"]
        })
    }

    async fn call(&self, args: &Value) -> ToolOutcome {
        let result = self.run(args).await;
        report(self.name(), "uploading file", result, |file| {
            info!(id = %file.id, "Uploaded {}", file.name);
            let summary = format!(
                "✓ File uploaded!\nName: {}\nLink: {}",
                file.name,
                file.link.as_deref().unwrap_or("N/A")
            );
            ToolOutcome::success(summary, vec![file])
        })
    }
}

/// `create_drive_folder(folder_name, parent_id = "")`
pub struct CreateFolderTool {
    source: Arc<dyn StorageSource>,
}

impl CreateFolderTool {
    pub fn new(source: Arc<dyn StorageSource>) -> Self {
        Self { source }
    }

    async fn run(&self, args: &Value) -> Result<Descriptor> {
        let name = args::required_str(args, "folder_name")?;
        let parent = args::optional_folder(args, "parent_id")?;
        let storage = self.source.storage().await?;
        storage.create_folder(name, parent.as_ref()).await
    }
}

#[async_trait]
impl ToolHandler for CreateFolderTool {
    fn name(&self) -> &str {
        "create_drive_folder"
    }

    fn description(&self) -> &str {
        "Create a folder in Google Drive, optionally inside another folder."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "folder_name": {
                    "type": "string",
                    "description": "Name of the folder to create."
                },
                "parent_id": {
                    "type": "string",
                    "description": "Optional parent folder ID to nest inside.",
                    "default": ""
                }
            },
            "required": ["folder_name"]
        })
    }

    async fn call(&self, args: &Value) -> ToolOutcome {
        let result = self.run(args).await;
        report(self.name(), "creating folder", result, |folder| {
            info!(id = %folder.id, "Created folder {}", folder.name);
            let summary = format!("✓ Folder created!\nName: {}\nID: {}", folder.name, folder.id);
            ToolOutcome::success(summary, vec![folder])
        })
    }
}
