//! Error taxonomy for batch runs.
//!
//! Every failure the executor observes is expressed as a [`BatchError`].
//! Variants are scoped to a single descriptor and recorded in the batch
//! report, except `MalformedBatch` and a failed shared group lookup in
//! Archive mode, which end the whole run.

use thiserror::Error;

use crate::models::KeywordDataType;

/// Kind of repository object a lookup was searching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    DocumentTypeGroup,
    DocumentType,
    FileType,
    Document,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LookupKind::DocumentTypeGroup => "document type group",
            LookupKind::DocumentType => "document type",
            LookupKind::FileType => "file type",
            LookupKind::Document => "document",
        };
        f.write_str(label)
    }
}

/// Errors raised while resolving schemas, coercing values, or driving
/// repository operations.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A group, document type, file type, or document has no match.
    #[error("{kind} not found: {name}")]
    NotFound { kind: LookupKind, name: String },

    /// The batch file is missing, is not JSON, or has no usable `contents`.
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    /// A raw keyword value does not parse under its declared data type.
    #[error("keyword '{keyword}': cannot read '{raw}' as {data_type}: {reason}")]
    Coercion {
        keyword: String,
        raw: String,
        data_type: KeywordDataType,
        reason: String,
    },

    /// The document lock was refused or the lock call itself failed.
    #[error("could not lock document {document_id}: {reason}")]
    Lock { document_id: i64, reason: String },

    /// The repository rejected a new document.
    #[error("store failed: {0}")]
    Store(String),

    /// The repository rejected a keyword modification batch.
    #[error("keyword modification failed for document {document_id}: {reason}")]
    Modify { document_id: i64, reason: String },

    /// A field the current operation needs is absent from the descriptor.
    #[error("descriptor is missing '{0}'")]
    MissingField(&'static str),

    /// `documentID` is not an integer identifier.
    #[error("invalid document id '{0}'")]
    InvalidDocumentId(String),

    /// A descriptor names a different group than the one shared by the run.
    #[error("descriptor group '{descriptor}' does not match batch group '{batch}'")]
    GroupMismatch { descriptor: String, batch: String },

    /// Any other repository failure (query execution, retrieval, lookup I/O).
    #[error("repository error: {0}")]
    Repository(String),
}

impl BatchError {
    /// Lifts a repository port failure into [`BatchError::Repository`],
    /// keeping the full cause chain in the message.
    pub fn repository(err: anyhow::Error) -> Self {
        BatchError::Repository(format!("{err:#}"))
    }
}
