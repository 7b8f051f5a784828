//! Remote storage for drivetool.
//!
//! This crate holds the storage abstraction the tools talk to, the Google
//! Drive backend with its credential lifecycle, and an in-memory backend
//! for tests.
//!
//! # Design Principles
//! - One grant per process: every caller goes through the same `Authorizer`
//! - Unified error semantics: backends report through `drivetool_common::Error`
//! - Transient failures are retried with bounded backoff

pub mod gdrive;
pub mod memory;
pub mod provider;
pub mod retry;

pub use memory::MemoryStorage;
pub use provider::RemoteStorage;
pub use retry::{RetryConfig, RetryExecutor};
