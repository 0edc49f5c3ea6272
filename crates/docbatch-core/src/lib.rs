//! # docbatch core
//!
//! Repository-independent logic for docbatch: the descriptor format,
//! keyword schemas and value coercion, the schema catalog, the
//! [`Repository`](repository::Repository) port, and the batch executor.
//!
//! This crate contains no tokio runtime, sqlx, or CLI concerns. Adapters
//! implement the repository port; the `docbatch` binary wires one up.

pub mod catalog;
pub mod coerce;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod models;
pub mod repository;

pub use catalog::SchemaCatalog;
pub use descriptor::{parse_batch, ContentDescriptor, DescriptorBatch};
pub use error::{BatchError, LookupKind};
pub use executor::{BatchExecutor, BatchReport, ExecutorOptions, ItemResult, ItemStatus, Operation};
pub use repository::Repository;
