//! Tool registry for name-based dispatch.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use drivetool_common::{Error, Result};

use crate::drive::{CreateFolderTool, ListFilesTool, UploadTool};
use crate::handler::{StorageSource, ToolDescriptor, ToolHandler};
use crate::outcome::ToolOutcome;

/// Registry mapping tool names to handlers.
pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a handler under its own name.
    ///
    /// # Errors
    /// - Returns error if the name is already registered
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Resolve a handler by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolHandler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("Unknown tool '{}'", name)))
    }

    /// Dispatch a call by tool name.
    pub async fn call(&self, name: &str, args: &Value) -> ToolOutcome {
        match self.resolve(name) {
            Ok(handler) => {
                debug!(tool = name, "Dispatching tool call");
                handler.call(args).await
            }
            Err(err) => {
                warn!(tool = name, "{}", err);
                ToolOutcome::failure("dispatching tool", &err)
            }
        }
    }

    /// Descriptors of all registered tools, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.handlers.values().map(|h| h.descriptor()).collect()
    }

    /// Get list of registered tool names.
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the three Drive tools.
pub fn drive_tools(source: Arc<dyn StorageSource>, max_page_size: u32) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ListFilesTool::new(source.clone(), max_page_size)))?;
    registry.register(Arc::new(UploadTool::new(source.clone())))?;
    registry.register(Arc::new(CreateFolderTool::new(source)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivetool_common::ErrorKind;
    use drivetool_storage::{MemoryStorage, RemoteStorage};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let storage: Arc<dyn RemoteStorage> = Arc::new(MemoryStorage::new());
        drive_tools(Arc::new(storage), 100).unwrap()
    }

    #[test]
    fn test_drive_tools_registered() {
        let registry = registry();

        assert_eq!(
            registry.names(),
            vec!["create_drive_folder", "list_drive_files", "upload_to_drive"]
        );
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = registry();
        let storage: Arc<dyn RemoteStorage> = Arc::new(MemoryStorage::new());

        let result = registry.register(Arc::new(ListFilesTool::new(Arc::new(storage), 100)));

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_schemas_are_objects() {
        for descriptor in registry().descriptors() {
            assert_eq!(descriptor.input_schema["type"], "object");
            assert!(!descriptor.description.is_empty());
        }
    }

    #[tokio::test]
    async fn test_call_by_name() {
        let registry = registry();

        let created = registry
            .call("create_drive_folder", &json!({"folder_name": "A"}))
            .await;
        let listed = registry.call("list_drive_files", &json!({})).await;

        assert!(created.is_success());
        assert!(listed.render().contains("1. A"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let outcome = registry().call("delete_everything", &json!({})).await;

        assert_eq!(outcome.kind(), Some(ErrorKind::InvalidArgument));
        assert!(outcome.render().contains("delete_everything"));
    }
}
