//! Batch operation executor.
//!
//! Runs one of Query, Archive, or Reindex over a [`DescriptorBatch`].
//! Every mode follows the same shape per descriptor:
//!
//! ```text
//! resolve schema → coerce keywords → repository call → record → next
//! ```
//!
//! Descriptors are processed strictly in file order by a single worker.
//! A descriptor's failure is recorded against its index and never stops
//! the descriptors after it. Only two failures end a run: a malformed
//! batch (raised before the executor sees it) and, in Archive mode, a
//! failed lookup of the group shared by every descriptor.
//!
//! Reindex takes at most one document lock at a time and releases it on
//! every path once granted, whether coercion, modification, or the
//! commit failed.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::catalog::SchemaCatalog;
use crate::descriptor::{ContentDescriptor, DescriptorBatch};
use crate::error::{BatchError, LookupKind};
use crate::models::{DocumentTypeGroupSchema, DocumentTypeSchema, TypedKeyword};
use crate::repository::{
    DisplayColumn, DocumentHandle, DocumentQuery, KeywordModification, QueryHit, Repository,
    StoreRequest,
};

/// Provenance comment used when none is configured.
pub const DEFAULT_ARCHIVE_COMMENT: &str = "docbatch archive import";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Archive,
    Reindex,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Archive => "archive",
            Operation::Reindex => "reindex",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings that stay fixed for a whole run.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Directory holding the batch file; Archive source paths are relative to it.
    pub batch_directory: PathBuf,
    /// Shared group for Archive mode. Falls back to the first descriptor
    /// that names a group.
    pub document_type_group: Option<String>,
    pub archive_comment: String,
    pub display_columns: Vec<DisplayColumn>,
}

impl ExecutorOptions {
    pub fn new(batch_directory: impl Into<PathBuf>) -> Self {
        Self {
            batch_directory: batch_directory.into(),
            document_type_group: None,
            archive_comment: DEFAULT_ARCHIVE_COMMENT.to_string(),
            display_columns: vec![DisplayColumn::DocumentDate],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Success,
    /// Nothing was sent to the repository (e.g. the source file is absent).
    Skipped,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Success => "ok",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed => "failed",
        }
    }
}

/// Outcome of one descriptor.
#[derive(Debug)]
pub struct ItemResult {
    /// Position of the descriptor in the batch file.
    pub index: usize,
    pub status: ItemStatus,
    /// Matched (Query), stored (Archive), or updated (Reindex) documents.
    pub document_ids: Vec<i64>,
    /// Query hits with their display values; empty for other modes.
    pub hits: Vec<QueryHit>,
    pub detail: Option<String>,
    pub error: Option<BatchError>,
}

/// Per-descriptor outcomes of one run, in file order.
#[derive(Debug)]
pub struct BatchReport {
    pub operation: Operation,
    pub items: Vec<ItemResult>,
}

impl BatchReport {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            items: Vec::new(),
        }
    }

    fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(ItemStatus::Success)
    }

    pub fn skipped(&self) -> usize {
        self.count(ItemStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(ItemStatus::Failed)
    }

    /// Every document identifier the run produced, in file order.
    pub fn document_ids(&self) -> Vec<i64> {
        self.items
            .iter()
            .flat_map(|i| i.document_ids.iter().copied())
            .collect()
    }

    fn record(&mut self, index: usize, result: Result<Outcome, BatchError>) {
        let op = self.operation.as_str();
        let item = match result {
            Ok(outcome) => {
                match outcome.status {
                    ItemStatus::Skipped => warn!(
                        index,
                        operation = op,
                        detail = outcome.detail.as_deref().unwrap_or(""),
                        "descriptor skipped"
                    ),
                    _ => info!(
                        index,
                        operation = op,
                        document_ids = ?outcome.document_ids,
                        "descriptor succeeded"
                    ),
                }
                ItemResult {
                    index,
                    status: outcome.status,
                    document_ids: outcome.document_ids,
                    hits: outcome.hits,
                    detail: outcome.detail,
                    error: None,
                }
            }
            Err(e) => {
                warn!(index, operation = op, error = %e, "descriptor failed");
                ItemResult {
                    index,
                    status: ItemStatus::Failed,
                    document_ids: Vec::new(),
                    hits: Vec::new(),
                    detail: None,
                    error: Some(e),
                }
            }
        };
        self.items.push(item);
    }
}

struct Outcome {
    status: ItemStatus,
    document_ids: Vec<i64>,
    hits: Vec<QueryHit>,
    detail: Option<String>,
}

impl Outcome {
    fn success(document_ids: Vec<i64>) -> Self {
        Self {
            status: ItemStatus::Success,
            document_ids,
            hits: Vec::new(),
            detail: None,
        }
    }

    fn skipped(detail: String) -> Self {
        Self {
            status: ItemStatus::Skipped,
            document_ids: Vec::new(),
            hits: Vec::new(),
            detail: Some(detail),
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Coerce the descriptor keywords the schema recognizes, in schema order.
/// Names the schema does not know are ignored.
pub fn coerce_recognized(
    schema: &DocumentTypeSchema,
    raw: &BTreeMap<String, String>,
) -> Result<Vec<TypedKeyword>, BatchError> {
    let ignored: Vec<&str> = raw
        .keys()
        .filter(|name| schema.keyword_types.get(name).is_none())
        .map(String::as_str)
        .collect();
    if !ignored.is_empty() {
        debug!(document_type = %schema.name, ?ignored, "ignoring keywords not in schema");
    }

    schema
        .keyword_types
        .keyword_types()
        .iter()
        .filter_map(|kt| raw.get(&kt.name).map(|value| kt.coerce(value)))
        .collect()
}

/// Drives batch runs against one repository and one schema catalog.
pub struct BatchExecutor<'a> {
    repo: &'a dyn Repository,
    catalog: &'a SchemaCatalog<'a>,
    options: ExecutorOptions,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        repo: &'a dyn Repository,
        catalog: &'a SchemaCatalog<'a>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            repo,
            catalog,
            options,
        }
    }

    pub async fn run(
        &self,
        operation: Operation,
        batch: DescriptorBatch,
    ) -> Result<BatchReport, BatchError> {
        info!(operation = operation.as_str(), descriptors = batch.len(), "starting batch run");
        match operation {
            Operation::Query => Ok(self.run_query(batch).await),
            Operation::Archive => self.run_archive(batch).await,
            Operation::Reindex => Ok(self.run_reindex(batch).await),
        }
    }

    // ── Query ────────────────────────────────────────────────────────

    pub async fn run_query(&self, batch: DescriptorBatch) -> BatchReport {
        let mut report = BatchReport::new(Operation::Query);
        for (index, descriptor) in batch.into_iter().enumerate() {
            let result = self.query_one(&descriptor).await;
            report.record(index, result);
        }
        report
    }

    async fn query_one(&self, d: &ContentDescriptor) -> Result<Outcome, BatchError> {
        let doc_type = match &d.document_type_group {
            Some(group) => {
                self.catalog
                    .resolve_group_document_type(group, &d.document_type)
                    .await?
            }
            None => self.catalog.resolve_document_type(&d.document_type).await?,
        };

        let query = DocumentQuery {
            document_type: (*doc_type).clone(),
            display_columns: self.options.display_columns.clone(),
            keyword_filters: coerce_recognized(&doc_type, &d.keywords)?,
            max_results: None,
        };
        let hits = self
            .repo
            .execute_query(&query)
            .await
            .map_err(BatchError::repository)?;

        for hit in &hits {
            info!(
                document_id = hit.document_id,
                display_columns = hit.display_values.len(),
                display = ?hit.display_values,
                "query hit"
            );
        }
        let ids = hits.iter().map(|h| h.document_id).collect();
        let mut outcome = Outcome::success(ids);
        outcome.hits = hits;
        Ok(outcome)
    }

    // ── Archive ──────────────────────────────────────────────────────

    /// Fails as a whole only when the shared group cannot be resolved; no
    /// store call happens in that case.
    pub async fn run_archive(&self, batch: DescriptorBatch) -> Result<BatchReport, BatchError> {
        let group_name = self
            .options
            .document_type_group
            .clone()
            .or_else(|| batch.iter().find_map(|d| d.document_type_group.clone()))
            .ok_or_else(|| BatchError::NotFound {
                kind: LookupKind::DocumentTypeGroup,
                name: "(no group configured or named by any descriptor)".to_string(),
            })?;
        let group = self.catalog.resolve_group(&group_name).await?;
        info!(group = %group.name, "resolved shared document type group");

        let mut report = BatchReport::new(Operation::Archive);
        for (index, descriptor) in batch.into_iter().enumerate() {
            let result = self.archive_one(&group, &descriptor).await;
            report.record(index, result);
        }
        Ok(report)
    }

    async fn archive_one(
        &self,
        group: &DocumentTypeGroupSchema,
        d: &ContentDescriptor,
    ) -> Result<Outcome, BatchError> {
        if let Some(named) = &d.document_type_group {
            if named != &group.name {
                return Err(BatchError::GroupMismatch {
                    descriptor: named.clone(),
                    batch: group.name.clone(),
                });
            }
        }

        let doc_type = self
            .catalog
            .resolve_document_type_in(group, &d.document_type)
            .await?;
        let file_type_name = d
            .file_types
            .first()
            .ok_or(BatchError::MissingField("fileTypes"))?;
        let file_type = self.catalog.resolve_file_type(file_type_name).await?;

        let file = d.file.as_deref().ok_or(BatchError::MissingField("file"))?;
        let source = self.options.batch_directory.join(file);
        if !source.is_file() {
            return Ok(Outcome::skipped(format!(
                "source file not found: {}",
                source.display()
            )));
        }
        debug!(path = %source.display(), "archive source found");

        let request = StoreRequest {
            file_paths: vec![source],
            document_type: (*doc_type).clone(),
            file_type: (*file_type).clone(),
            keywords: coerce_recognized(&doc_type, &d.keywords)?,
            document_date: Local::now().naive_local(),
            comment: self.options.archive_comment.clone(),
            skip_workflow: true,
        };
        let new_id = self
            .repo
            .store_new_document(&request)
            .await
            .map_err(|e| BatchError::Store(format!("{e:#}")))?;
        Ok(Outcome::success(vec![new_id]))
    }

    // ── Reindex ──────────────────────────────────────────────────────

    pub async fn run_reindex(&self, batch: DescriptorBatch) -> BatchReport {
        let mut report = BatchReport::new(Operation::Reindex);
        for (index, descriptor) in batch.into_iter().enumerate() {
            let result = self.reindex_one(&descriptor).await;
            report.record(index, result);
        }
        report
    }

    async fn reindex_one(&self, d: &ContentDescriptor) -> Result<Outcome, BatchError> {
        let raw_id = d
            .document_id
            .as_deref()
            .ok_or(BatchError::MissingField("documentID"))?;
        let id: i64 = raw_id
            .trim()
            .parse()
            .map_err(|_| BatchError::InvalidDocumentId(raw_id.to_string()))?;

        let document = self
            .repo
            .get_document(id, true)
            .await
            .map_err(BatchError::repository)?
            .ok_or_else(|| BatchError::NotFound {
                kind: LookupKind::Document,
                name: raw_id.to_string(),
            })?;

        // Only keywords already on the document are eligible.
        let targets: Vec<&TypedKeyword> = document
            .keywords
            .iter()
            .filter(|kw| d.keywords.contains_key(kw.name()))
            .collect();
        if targets.is_empty() {
            return Ok(Outcome::success(vec![id]).with_detail("no matching keywords on document"));
        }

        let updated = self
            .with_document_lock(&document, || {
                self.modify_keywords(&document, &targets, &d.keywords)
            })
            .await?;
        Ok(Outcome::success(vec![id]).with_detail(format!("{} keyword(s) updated", updated)))
    }

    /// Coerce each replacement with the data type of the keyword it
    /// replaces, then commit them as one batch.
    async fn modify_keywords(
        &self,
        document: &DocumentHandle,
        targets: &[&TypedKeyword],
        raw: &BTreeMap<String, String>,
    ) -> Result<usize, BatchError> {
        let mut modifications = Vec::with_capacity(targets.len());
        for existing in targets {
            let Some(raw_value) = raw.get(existing.name()) else {
                continue;
            };
            let replacement = existing.keyword_type.coerce(raw_value)?.value;
            modifications.push(KeywordModification {
                existing: (*existing).clone(),
                replacement,
            });
        }

        self.repo
            .apply_keyword_modifications(document, &modifications)
            .await
            .map_err(|e| BatchError::Modify {
                document_id: document.id,
                reason: format!("{e:#}"),
            })?;
        Ok(modifications.len())
    }

    /// Run `work` while holding the document's exclusive lock. Once the
    /// lock is granted it is released on every path out of this function.
    async fn with_document_lock<T, F, Fut>(
        &self,
        document: &DocumentHandle,
        work: F,
    ) -> Result<T, BatchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BatchError>>,
    {
        let lock = match self.repo.lock_document(document).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                return Err(BatchError::Lock {
                    document_id: document.id,
                    reason: "lock not granted".to_string(),
                })
            }
            Err(e) => {
                return Err(BatchError::Lock {
                    document_id: document.id,
                    reason: format!("{e:#}"),
                })
            }
        };
        debug!(document_id = document.id, "document locked");

        let result = work().await;

        match self.repo.release_lock(lock).await {
            Ok(()) => {
                debug!(document_id = document.id, "document lock released");
                result
            }
            Err(e) => {
                error!(document_id = document.id, error = %format!("{e:#}"), "failed to release document lock");
                // A failure from the work itself takes precedence.
                result.and_then(|_| {
                    Err(BatchError::Lock {
                        document_id: document.id,
                        reason: format!("changes committed but release failed: {e:#}"),
                    })
                })
            }
        }
    }
}
