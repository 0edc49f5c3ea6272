//! Document repository port.
//!
//! The [`Repository`] trait is the only way the executor and the schema
//! catalog reach the external document repository. Adapters decide how
//! the repository is reached; this crate ships [`memory::InMemoryRepository`]
//! for tests, and the `docbatch` binary ships a SQLite adapter.
//!
//! Implementations must be `Send + Sync`. Every method is a suspension
//! point for the caller; its result is fully observed before the next
//! step of the same descriptor.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`find_document_type_group`](Repository::find_document_type_group) | Group lookup by name |
//! | [`find_group_document_type`](Repository::find_group_document_type) | Document type lookup inside a group |
//! | [`find_document_type`](Repository::find_document_type) | Document type lookup across all groups |
//! | [`find_file_type`](Repository::find_file_type) | File type lookup by name |
//! | [`list_document_type_groups`](Repository::list_document_type_groups) | Full schema listing |
//! | [`execute_query`](Repository::execute_query) | Keyword-filtered document query |
//! | [`get_document`](Repository::get_document) | Document retrieval by id |
//! | [`lock_document`](Repository::lock_document) / [`release_lock`](Repository::release_lock) | Exclusive document lock |
//! | [`store_new_document`](Repository::store_new_document) | Archive a new document |
//! | [`apply_keyword_modifications`](Repository::apply_keyword_modifications) | Atomic keyword replacement |

pub mod memory;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::{
    DocumentTypeGroupSchema, DocumentTypeSchema, FileTypeHandle, KeywordValue, TypedKeyword,
};

/// Per-hit attribute a query asks the repository to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayColumn {
    DocumentDate,
    DateStored,
    DocumentTypeName,
}

/// A keyword-filtered query against one document type.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub document_type: DocumentTypeSchema,
    pub display_columns: Vec<DisplayColumn>,
    /// Each filter is an equality predicate on one keyword.
    pub keyword_filters: Vec<TypedKeyword>,
    /// `None` requests every match.
    pub max_results: Option<u64>,
}

/// One document matched by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub document_id: i64,
    /// One value per requested display column, in request order.
    pub display_values: Vec<String>,
    pub keywords: Vec<TypedKeyword>,
}

/// A retrieved document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHandle {
    pub id: i64,
    pub document_type: String,
    /// Keywords of the document's first keyword record; empty unless
    /// requested at retrieval.
    pub keywords: Vec<TypedKeyword>,
}

/// Proof of an exclusive lock on one document.
///
/// Not `Clone`: [`Repository::release_lock`] consumes it, so each granted
/// lock is released at most once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a granted lock must be passed to Repository::release_lock"]
pub struct LockHandle {
    document_id: i64,
    token: String,
}

impl LockHandle {
    pub fn new(document_id: i64, token: impl Into<String>) -> Self {
        Self {
            document_id,
            token: token.into(),
        }
    }

    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Everything needed to archive one new document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequest {
    pub file_paths: Vec<PathBuf>,
    pub document_type: DocumentTypeSchema,
    pub file_type: FileTypeHandle,
    pub keywords: Vec<TypedKeyword>,
    pub document_date: NaiveDateTime,
    pub comment: String,
    /// Bypass any workflow routing on arrival.
    pub skip_workflow: bool,
}

/// Replace one existing keyword value on a document.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordModification {
    pub existing: TypedKeyword,
    pub replacement: KeywordValue,
}

/// Abstract interface to the external document repository.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_document_type_group(&self, name: &str)
        -> Result<Option<DocumentTypeGroupSchema>>;

    /// Group-scoped document type lookup.
    ///
    /// The default searches the group's own document type list.
    async fn find_group_document_type(
        &self,
        group: &DocumentTypeGroupSchema,
        name: &str,
    ) -> Result<Option<DocumentTypeSchema>> {
        Ok(group.document_type(name).cloned())
    }

    /// Document type lookup across every group.
    async fn find_document_type(&self, name: &str) -> Result<Option<DocumentTypeSchema>>;

    async fn find_file_type(&self, name: &str) -> Result<Option<FileTypeHandle>>;

    /// Every group with its document types, in repository order.
    async fn list_document_type_groups(&self) -> Result<Vec<DocumentTypeGroupSchema>>;

    async fn execute_query(&self, query: &DocumentQuery) -> Result<Vec<QueryHit>>;

    async fn get_document(&self, id: i64, load_keywords: bool) -> Result<Option<DocumentHandle>>;

    /// Try to take the exclusive lock. `Ok(None)` means the repository
    /// refused it (typically because another session holds it).
    async fn lock_document(&self, document: &DocumentHandle) -> Result<Option<LockHandle>>;

    async fn release_lock(&self, lock: LockHandle) -> Result<()>;

    /// Store a new document and return its repository identifier.
    async fn store_new_document(&self, request: &StoreRequest) -> Result<i64>;

    /// Apply every modification or none of them.
    async fn apply_keyword_modifications(
        &self,
        document: &DocumentHandle,
        modifications: &[KeywordModification],
    ) -> Result<()>;
}
