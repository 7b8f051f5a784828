//! Tool handler trait.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use drivetool_common::Result;
use drivetool_storage::RemoteStorage;

use crate::outcome::ToolOutcome;

/// Published description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A named operation callable by an agent.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// One-line description shown to the agent.
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn input_schema(&self) -> Value;

    /// Run the tool. Never fails outright; errors become
    /// [`ToolOutcome::Failure`].
    async fn call(&self, args: &Value) -> ToolOutcome;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Where tools get their storage backend from.
///
/// Lets a backend be built on first use, so listing tools never forces
/// authorization.
#[async_trait]
pub trait StorageSource: Send + Sync {
    async fn storage(&self) -> Result<Arc<dyn RemoteStorage>>;
}

#[async_trait]
impl StorageSource for Arc<dyn RemoteStorage> {
    async fn storage(&self) -> Result<Arc<dyn RemoteStorage>> {
        Ok(Arc::clone(self))
    }
}
