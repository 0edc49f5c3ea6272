//! Keyword schema catalog.
//!
//! Resolves group, document type, and file type names through the
//! [`Repository`] and caches every hit for the lifetime of the catalog.
//! Schemas are read-only inputs and are not expected to change during a
//! run, so a catalog is built once per run and shared by reference.
//! Misses are never cached and always surface as [`BatchError::NotFound`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::{BatchError, LookupKind};
use crate::models::{DocumentTypeGroupSchema, DocumentTypeSchema, FileTypeHandle};
use crate::repository::Repository;

struct Cache<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
}

impl<K: Eq + Hash, V> Cache<K, V> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&value));
        value
    }
}

/// Read-through schema cache over a [`Repository`].
pub struct SchemaCatalog<'a> {
    repo: &'a dyn Repository,
    groups: Cache<String, DocumentTypeGroupSchema>,
    group_types: Cache<(String, String), DocumentTypeSchema>,
    types: Cache<String, DocumentTypeSchema>,
    file_types: Cache<String, FileTypeHandle>,
}

impl<'a> SchemaCatalog<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self {
            repo,
            groups: Cache::new(),
            group_types: Cache::new(),
            types: Cache::new(),
            file_types: Cache::new(),
        }
    }

    pub async fn resolve_group(
        &self,
        name: &str,
    ) -> Result<Arc<DocumentTypeGroupSchema>, BatchError> {
        if let Some(hit) = self.groups.get(&name.to_string()) {
            return Ok(hit);
        }
        debug!(group = name, "resolving document type group");
        let group = self
            .repo
            .find_document_type_group(name)
            .await
            .map_err(BatchError::repository)?
            .ok_or_else(|| not_found(LookupKind::DocumentTypeGroup, name))?;
        Ok(self.groups.insert(name.to_string(), group))
    }

    /// Resolve a document type inside an already resolved group.
    pub async fn resolve_document_type_in(
        &self,
        group: &DocumentTypeGroupSchema,
        type_name: &str,
    ) -> Result<Arc<DocumentTypeSchema>, BatchError> {
        let key = (group.name.clone(), type_name.to_string());
        if let Some(hit) = self.group_types.get(&key) {
            return Ok(hit);
        }
        debug!(group = %group.name, document_type = type_name, "resolving document type");
        let doc_type = self
            .repo
            .find_group_document_type(group, type_name)
            .await
            .map_err(BatchError::repository)?
            .ok_or_else(|| not_found(LookupKind::DocumentType, type_name))?;
        Ok(self.group_types.insert(key, doc_type))
    }

    /// Resolve a document type by group name and type name.
    pub async fn resolve_group_document_type(
        &self,
        group_name: &str,
        type_name: &str,
    ) -> Result<Arc<DocumentTypeSchema>, BatchError> {
        let group = self.resolve_group(group_name).await?;
        self.resolve_document_type_in(&group, type_name).await
    }

    /// Resolve a document type without naming its group.
    pub async fn resolve_document_type(
        &self,
        type_name: &str,
    ) -> Result<Arc<DocumentTypeSchema>, BatchError> {
        if let Some(hit) = self.types.get(&type_name.to_string()) {
            return Ok(hit);
        }
        debug!(document_type = type_name, "resolving document type");
        let doc_type = self
            .repo
            .find_document_type(type_name)
            .await
            .map_err(BatchError::repository)?
            .ok_or_else(|| not_found(LookupKind::DocumentType, type_name))?;
        Ok(self.types.insert(type_name.to_string(), doc_type))
    }

    pub async fn resolve_file_type(&self, name: &str) -> Result<Arc<FileTypeHandle>, BatchError> {
        if let Some(hit) = self.file_types.get(&name.to_string()) {
            return Ok(hit);
        }
        debug!(file_type = name, "resolving file type");
        let file_type = self
            .repo
            .find_file_type(name)
            .await
            .map_err(BatchError::repository)?
            .ok_or_else(|| not_found(LookupKind::FileType, name))?;
        Ok(self.file_types.insert(name.to_string(), file_type))
    }

    /// Every group with its document types and keyword schemas, in
    /// repository order. This is the `config.json` introspection dump.
    pub async fn export(&self) -> Result<Vec<DocumentTypeGroupSchema>, BatchError> {
        self.repo
            .list_document_type_groups()
            .await
            .map_err(BatchError::repository)
    }
}

fn not_found(kind: LookupKind, name: &str) -> BatchError {
    BatchError::NotFound {
        kind,
        name: name.to_string(),
    }
}
