//! In-memory [`Repository`] for tests and dry runs.
//!
//! Holds schemas and documents behind a `std::sync::Mutex`, records every
//! call the executor makes, and can be told to fail specific operations.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};

use crate::models::{DocumentTypeGroupSchema, DocumentTypeSchema, FileTypeHandle, TypedKeyword};

use super::{
    DisplayColumn, DocumentHandle, DocumentQuery, KeywordModification, LockHandle, QueryHit,
    Repository, StoreRequest,
};

/// A document held by the in-memory repository.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: i64,
    pub document_type: String,
    pub file_type: Option<String>,
    pub file_paths: Vec<PathBuf>,
    pub keywords: Vec<TypedKeyword>,
    pub document_date: NaiveDateTime,
    pub date_stored: NaiveDateTime,
    pub comment: String,
    pub skip_workflow: bool,
}

#[derive(Default)]
struct Faults {
    group_lookup: bool,
    deny_lock: HashSet<i64>,
    modify: HashSet<i64>,
    store_document_types: HashSet<String>,
}

#[derive(Default)]
struct CallLog {
    group_lookups: usize,
    queries: Vec<DocumentQuery>,
    stores: Vec<StoreRequest>,
    modifications: Vec<(i64, Vec<KeywordModification>)>,
    lock_requests: usize,
    locks_granted: usize,
    releases: usize,
}

#[derive(Default)]
struct State {
    groups: Vec<DocumentTypeGroupSchema>,
    file_types: Vec<FileTypeHandle>,
    documents: BTreeMap<i64, StoredDocument>,
    held_locks: BTreeMap<i64, String>,
    next_document_id: i64,
    next_lock_token: u64,
    faults: Faults,
    calls: CallLog,
}

/// In-memory repository for tests.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding ──────────────────────────────────────────────────────

    pub fn add_group(&self, group: DocumentTypeGroupSchema) {
        self.state().groups.push(group);
    }

    pub fn add_file_type(&self, id: i64, name: &str) -> FileTypeHandle {
        let handle = FileTypeHandle {
            id,
            name: name.to_string(),
        };
        self.state().file_types.push(handle.clone());
        handle
    }

    /// Insert an existing document and return its identifier.
    pub fn insert_document(&self, document_type: &str, keywords: Vec<TypedKeyword>) -> i64 {
        let mut state = self.state();
        state.next_document_id += 1;
        let id = state.next_document_id;
        let now = Local::now().naive_local();
        state.documents.insert(
            id,
            StoredDocument {
                id,
                document_type: document_type.to_string(),
                file_type: None,
                file_paths: Vec::new(),
                keywords,
                document_date: now,
                date_stored: now,
                comment: String::new(),
                skip_workflow: false,
            },
        );
        id
    }

    // ── Fault injection ─────────────────────────────────────────────

    pub fn fail_group_lookups(&self) {
        self.state().faults.group_lookup = true;
    }

    pub fn deny_lock(&self, document_id: i64) {
        self.state().faults.deny_lock.insert(document_id);
    }

    pub fn fail_modifications(&self, document_id: i64) {
        self.state().faults.modify.insert(document_id);
    }

    pub fn fail_stores_for(&self, document_type: &str) {
        self.state()
            .faults
            .store_document_types
            .insert(document_type.to_string());
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn document(&self, id: i64) -> Option<StoredDocument> {
        self.state().documents.get(&id).cloned()
    }

    pub fn group_lookups(&self) -> usize {
        self.state().calls.group_lookups
    }

    pub fn queries(&self) -> Vec<DocumentQuery> {
        self.state().calls.queries.clone()
    }

    pub fn store_requests(&self) -> Vec<StoreRequest> {
        self.state().calls.stores.clone()
    }

    pub fn modification_batches(&self) -> Vec<(i64, Vec<KeywordModification>)> {
        self.state().calls.modifications.clone()
    }

    pub fn lock_requests(&self) -> usize {
        self.state().calls.lock_requests
    }

    pub fn locks_granted(&self) -> usize {
        self.state().calls.locks_granted
    }

    pub fn releases(&self) -> usize {
        self.state().calls.releases
    }

    pub fn held_locks(&self) -> Vec<i64> {
        self.state().held_locks.keys().copied().collect()
    }
}

fn display_value(doc: &StoredDocument, column: DisplayColumn) -> String {
    match column {
        DisplayColumn::DocumentDate => doc.document_date.format("%Y-%m-%d").to_string(),
        DisplayColumn::DateStored => doc.date_stored.format("%Y-%m-%d %H:%M:%S").to_string(),
        DisplayColumn::DocumentTypeName => doc.document_type.clone(),
    }
}

fn matches_filters(doc: &StoredDocument, filters: &[TypedKeyword]) -> bool {
    filters.iter().all(|filter| {
        doc.keywords
            .iter()
            .any(|kw| kw.name() == filter.name() && kw.value == filter.value)
    })
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_document_type_group(
        &self,
        name: &str,
    ) -> Result<Option<DocumentTypeGroupSchema>> {
        let mut state = self.state();
        state.calls.group_lookups += 1;
        if state.faults.group_lookup {
            bail!("repository unavailable");
        }
        Ok(state.groups.iter().find(|g| g.name == name).cloned())
    }

    async fn find_document_type(&self, name: &str) -> Result<Option<DocumentTypeSchema>> {
        let state = self.state();
        Ok(state
            .groups
            .iter()
            .find_map(|g| g.document_type(name))
            .cloned())
    }

    async fn find_file_type(&self, name: &str) -> Result<Option<FileTypeHandle>> {
        Ok(self
            .state()
            .file_types
            .iter()
            .find(|ft| ft.name == name)
            .cloned())
    }

    async fn list_document_type_groups(&self) -> Result<Vec<DocumentTypeGroupSchema>> {
        Ok(self.state().groups.clone())
    }

    async fn execute_query(&self, query: &DocumentQuery) -> Result<Vec<QueryHit>> {
        let mut state = self.state();
        state.calls.queries.push(query.clone());

        let limit = query
            .max_results
            .map(|n| n as usize)
            .unwrap_or(usize::MAX);
        let hits = state
            .documents
            .values()
            .filter(|doc| doc.document_type == query.document_type.name)
            .filter(|doc| matches_filters(doc, &query.keyword_filters))
            .take(limit)
            .map(|doc| QueryHit {
                document_id: doc.id,
                display_values: query
                    .display_columns
                    .iter()
                    .map(|c| display_value(doc, *c))
                    .collect(),
                keywords: doc.keywords.clone(),
            })
            .collect();
        Ok(hits)
    }

    async fn get_document(&self, id: i64, load_keywords: bool) -> Result<Option<DocumentHandle>> {
        Ok(self.state().documents.get(&id).map(|doc| DocumentHandle {
            id: doc.id,
            document_type: doc.document_type.clone(),
            keywords: if load_keywords {
                doc.keywords.clone()
            } else {
                Vec::new()
            },
        }))
    }

    async fn lock_document(&self, document: &DocumentHandle) -> Result<Option<LockHandle>> {
        let mut state = self.state();
        state.calls.lock_requests += 1;
        if state.faults.deny_lock.contains(&document.id)
            || state.held_locks.contains_key(&document.id)
        {
            return Ok(None);
        }
        state.next_lock_token += 1;
        let token = format!("lock-{}", state.next_lock_token);
        state.held_locks.insert(document.id, token.clone());
        state.calls.locks_granted += 1;
        Ok(Some(LockHandle::new(document.id, token)))
    }

    async fn release_lock(&self, lock: LockHandle) -> Result<()> {
        let mut state = self.state();
        state.calls.releases += 1;
        let owned = state
            .held_locks
            .get(&lock.document_id())
            .is_some_and(|token| token == lock.token());
        if !owned {
            bail!(
                "document {} is not locked by {}",
                lock.document_id(),
                lock.token()
            );
        }
        state.held_locks.remove(&lock.document_id());
        Ok(())
    }

    async fn store_new_document(&self, request: &StoreRequest) -> Result<i64> {
        let mut state = self.state();
        state.calls.stores.push(request.clone());

        if state
            .faults
            .store_document_types
            .contains(&request.document_type.name)
        {
            bail!("storage rejected document type {}", request.document_type.name);
        }
        for kt in request.document_type.keyword_types.keyword_types() {
            if kt.required && !request.keywords.iter().any(|k| k.name() == kt.name) {
                bail!("required keyword '{}' is missing", kt.name);
            }
        }

        state.next_document_id += 1;
        let id = state.next_document_id;
        state.documents.insert(
            id,
            StoredDocument {
                id,
                document_type: request.document_type.name.clone(),
                file_type: Some(request.file_type.name.clone()),
                file_paths: request.file_paths.clone(),
                keywords: request.keywords.clone(),
                document_date: request.document_date,
                date_stored: Local::now().naive_local(),
                comment: request.comment.clone(),
                skip_workflow: request.skip_workflow,
            },
        );
        Ok(id)
    }

    async fn apply_keyword_modifications(
        &self,
        document: &DocumentHandle,
        modifications: &[KeywordModification],
    ) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .modifications
            .push((document.id, modifications.to_vec()));

        if state.faults.modify.contains(&document.id) {
            bail!("keyword modifier rejected changes");
        }
        let doc = state
            .documents
            .get_mut(&document.id)
            .ok_or_else(|| anyhow!("document {} not found", document.id))?;

        let mut positions = Vec::with_capacity(modifications.len());
        for m in modifications {
            let pos = doc
                .keywords
                .iter()
                .position(|kw| kw.name() == m.existing.name() && kw.value == m.existing.value)
                .ok_or_else(|| {
                    anyhow!(
                        "keyword '{}' with value '{}' is not on document {}",
                        m.existing.name(),
                        m.existing.value,
                        document.id
                    )
                })?;
            positions.push(pos);
        }
        for (pos, m) in positions.into_iter().zip(modifications) {
            doc.keywords[pos].value = m.replacement.clone();
        }
        Ok(())
    }
}
