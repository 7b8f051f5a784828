//! Agent-callable tool surface for drivetool.
//!
//! Each tool validates its JSON arguments, calls a [`RemoteStorage`]
//! backend and reports a [`ToolOutcome`]. Failures are always classified
//! into an [`ErrorKind`] before they reach the caller.
//!
//! [`RemoteStorage`]: drivetool_storage::RemoteStorage
//! [`ErrorKind`]: drivetool_common::ErrorKind

pub mod args;
pub mod drive;
pub mod handler;
pub mod outcome;
pub mod registry;

pub use drive::{CreateFolderTool, ListFilesTool, UploadTool};
pub use handler::{StorageSource, ToolDescriptor, ToolHandler};
pub use outcome::ToolOutcome;
pub use registry::{drive_tools, ToolRegistry};
