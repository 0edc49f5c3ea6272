//! # docbatch
//!
//! Batch keyword interchange for document repositories.
//!
//! docbatch reads JSON batch descriptors from one directory and runs
//! them against a repository in one of three modes: Query (find
//! documents by typed keyword filters), Archive (store new documents with
//! their keywords), and Reindex (replace keyword values on existing
//! documents under an exclusive lock).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ query.json  │──▶│   Executor   │──▶│  Repository  │
//! │ archive.json│   │ catalog +    │   │  (SQLite)    │
//! │ reindex.json│   │ coercion     │   └──────────────┘
//! └─────────────┘   └──────┬───────┘
//!                          ▼
//!                   report on stdout
//! ```
//!
//! The repository-independent pieces live in `docbatch-core`; this crate
//! adds configuration, logging, the SQLite adapter and the CLI commands.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_repository`] | SQLite repository adapter |
//! | [`catalog_cmd`] | Schema import and `config.json` export |
//! | [`batch_cmd`] | Query, archive and reindex commands |

pub mod batch_cmd;
pub mod catalog_cmd;
pub mod config;
pub mod db;
pub mod logging;
pub mod migrate;
pub mod sqlite_repository;
