//! SQLite-backed [`Repository`] adapter.
//!
//! A local stand-in for the external document repository. Keyword values
//! are stored in the canonical text form written by [`KeywordValue`]'s
//! `Display` impl, so equality filters compare canonical strings.
//!
//! Only the keyword record type at the lowest position of a document type
//! is read back as its schema.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use docbatch_core::coerce::coerce;
use docbatch_core::models::{
    DocumentTypeGroupSchema, DocumentTypeSchema, FileTypeHandle, KeywordDataType,
    KeywordRecordSchema, KeywordType, TypedKeyword,
};
use docbatch_core::repository::{
    DisplayColumn, DocumentHandle, DocumentQuery, KeywordModification, LockHandle, QueryHit,
    Repository, StoreRequest,
};

use crate::catalog_cmd::SchemaDefinition;
use crate::config::Config;
use crate::db;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Row counts written by [`SqliteRepository::import_schema`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub groups: u64,
    pub document_types: u64,
    pub keyword_types: u64,
    pub file_types: u64,
}

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Insert every named object of `def` that does not exist yet.
    /// Existing names are left untouched.
    pub async fn import_schema(&self, def: &SchemaDefinition) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut tx = self.pool.begin().await?;

        for name in &def.file_types {
            summary.file_types += sqlx::query(
                "INSERT INTO file_types (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            )
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for group in &def.document_type_groups {
            summary.groups += sqlx::query(
                "INSERT INTO document_type_groups (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            )
            .bind(&group.name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            let group_id: i64 =
                sqlx::query_scalar("SELECT id FROM document_type_groups WHERE name = ?")
                    .bind(&group.name)
                    .fetch_one(&mut *tx)
                    .await?;

            for doc_type in &group.document_types {
                summary.document_types += sqlx::query(
                    "INSERT INTO document_types (group_id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
                )
                .bind(group_id)
                .bind(&doc_type.name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
                let (type_id, owner): (i64, i64) =
                    sqlx::query_as("SELECT id, group_id FROM document_types WHERE name = ?")
                        .bind(&doc_type.name)
                        .fetch_one(&mut *tx)
                        .await?;
                if owner != group_id {
                    bail!(
                        "document type '{}' already belongs to another group",
                        doc_type.name
                    );
                }

                for (position, record) in doc_type.keyword_record_types.iter().enumerate() {
                    sqlx::query(
                        r#"
                        INSERT INTO keyword_record_types (document_type_id, position, name)
                        VALUES (?, ?, ?)
                        ON CONFLICT(document_type_id, position) DO NOTHING
                        "#,
                    )
                    .bind(type_id)
                    .bind(position as i64)
                    .bind(&record.name)
                    .execute(&mut *tx)
                    .await?;
                    let record_id: i64 = sqlx::query_scalar(
                        "SELECT id FROM keyword_record_types WHERE document_type_id = ? AND position = ?",
                    )
                    .bind(type_id)
                    .bind(position as i64)
                    .fetch_one(&mut *tx)
                    .await?;

                    for (kt_position, kt) in record.keyword_types.iter().enumerate() {
                        summary.keyword_types += sqlx::query(
                            r#"
                            INSERT INTO keyword_types (record_type_id, position, name, data_type, required)
                            VALUES (?, ?, ?, ?, ?)
                            ON CONFLICT(record_type_id, name) DO NOTHING
                            "#,
                        )
                        .bind(record_id)
                        .bind(kt_position as i64)
                        .bind(&kt.name)
                        .bind(kt.data_type.as_str())
                        .bind(kt.required)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn keyword_schema(&self, document_type_id: i64) -> Result<KeywordRecordSchema> {
        let rows = sqlx::query(
            r#"
            SELECT kt.id, kt.name, kt.data_type, kt.required
            FROM keyword_types kt
            JOIN keyword_record_types rt ON rt.id = kt.record_type_id
            WHERE rt.document_type_id = ?
              AND rt.position = (
                  SELECT MIN(position) FROM keyword_record_types WHERE document_type_id = ?
              )
            ORDER BY kt.position ASC, kt.id ASC
            "#,
        )
        .bind(document_type_id)
        .bind(document_type_id)
        .fetch_all(&self.pool)
        .await?;

        let keyword_types = rows
            .iter()
            .map(keyword_type_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(KeywordRecordSchema::new(keyword_types))
    }

    async fn document_type_from_row(&self, row: &SqliteRow) -> Result<DocumentTypeSchema> {
        let id: i64 = row.get("id");
        Ok(DocumentTypeSchema {
            id,
            name: row.get("name"),
            keyword_types: self.keyword_schema(id).await?,
        })
    }

    async fn group_from_row(&self, row: &SqliteRow) -> Result<DocumentTypeGroupSchema> {
        let id: i64 = row.get("id");
        let type_rows =
            sqlx::query("SELECT id, name FROM document_types WHERE group_id = ? ORDER BY id ASC")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        let mut document_types = Vec::with_capacity(type_rows.len());
        for type_row in &type_rows {
            document_types.push(self.document_type_from_row(type_row).await?);
        }
        Ok(DocumentTypeGroupSchema {
            id,
            name: row.get("name"),
            document_types,
        })
    }

    async fn document_keywords(&self, document_id: i64) -> Result<Vec<TypedKeyword>> {
        let rows = sqlx::query(
            r#"
            SELECT kt.id, kt.name, kt.data_type, kt.required, k.value
            FROM document_keywords k
            JOIN keyword_types kt ON kt.id = k.keyword_type_id
            WHERE k.document_id = ?
            ORDER BY k.id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let keyword_type = keyword_type_from_row(row)?;
                let raw: String = row.get("value");
                let value = coerce(&raw, keyword_type.data_type).with_context(|| {
                    format!(
                        "stored value of keyword '{}' on document {} is corrupt",
                        keyword_type.name, document_id
                    )
                })?;
                Ok(TypedKeyword {
                    keyword_type,
                    value,
                })
            })
            .collect()
    }
}

fn keyword_type_from_row(row: &SqliteRow) -> Result<KeywordType> {
    let data_type: String = row.get("data_type");
    Ok(KeywordType {
        id: row.get("id"),
        name: row.get("name"),
        data_type: data_type
            .parse::<KeywordDataType>()
            .map_err(|e| anyhow!(e))?,
        required: row.get("required"),
    })
}

fn display_expr(column: DisplayColumn) -> &'static str {
    match column {
        DisplayColumn::DocumentDate => "date(d.document_date)",
        DisplayColumn::DateStored => "d.date_stored",
        DisplayColumn::DocumentTypeName => "dt.name",
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn find_document_type_group(
        &self,
        name: &str,
    ) -> Result<Option<DocumentTypeGroupSchema>> {
        let row = sqlx::query("SELECT id, name FROM document_type_groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.group_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_document_type(&self, name: &str) -> Result<Option<DocumentTypeSchema>> {
        let row = sqlx::query("SELECT id, name FROM document_types WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.document_type_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_file_type(&self, name: &str) -> Result<Option<FileTypeHandle>> {
        let row = sqlx::query("SELECT id, name FROM file_types WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| FileTypeHandle {
            id: row.get("id"),
            name: row.get("name"),
        }))
    }

    async fn list_document_type_groups(&self) -> Result<Vec<DocumentTypeGroupSchema>> {
        let rows = sqlx::query("SELECT id, name FROM document_type_groups ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            groups.push(self.group_from_row(row).await?);
        }
        Ok(groups)
    }

    async fn execute_query(&self, query: &DocumentQuery) -> Result<Vec<QueryHit>> {
        let mut sql = String::from("SELECT d.id");
        for (i, column) in query.display_columns.iter().enumerate() {
            sql.push_str(&format!(", {} AS display_{}", display_expr(*column), i));
        }
        sql.push_str(
            " FROM documents d JOIN document_types dt ON dt.id = d.document_type_id \
             WHERE d.document_type_id = ?",
        );
        for _ in &query.keyword_filters {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM document_keywords k \
                 WHERE k.document_id = d.id AND k.keyword_type_id = ? AND k.value = ?)",
            );
        }
        sql.push_str(" ORDER BY d.id ASC");
        if query.max_results.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query(&sql).bind(query.document_type.id);
        for filter in &query.keyword_filters {
            q = q.bind(filter.keyword_type.id).bind(filter.value.to_string());
        }
        if let Some(max) = query.max_results {
            q = q.bind(i64::try_from(max).unwrap_or(i64::MAX));
        }
        let rows = q.fetch_all(&self.pool).await?;
        debug!(
            document_type = %query.document_type.name,
            filters = query.keyword_filters.len(),
            hits = rows.len(),
            "query executed"
        );

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let document_id: i64 = row.get("id");
            let display_values = (0..query.display_columns.len())
                .map(|i| row.get::<String, _>(format!("display_{}", i).as_str()))
                .collect();
            hits.push(QueryHit {
                document_id,
                display_values,
                keywords: self.document_keywords(document_id).await?,
            });
        }
        Ok(hits)
    }

    async fn get_document(&self, id: i64, load_keywords: bool) -> Result<Option<DocumentHandle>> {
        let row = sqlx::query(
            "SELECT d.id, dt.name FROM documents d JOIN document_types dt ON dt.id = d.document_type_id WHERE d.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let keywords = if load_keywords {
            self.document_keywords(id).await?
        } else {
            Vec::new()
        };
        Ok(Some(DocumentHandle {
            id: row.get("id"),
            document_type: row.get("name"),
            keywords,
        }))
    }

    async fn lock_document(&self, document: &DocumentHandle) -> Result<Option<LockHandle>> {
        let token = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            "INSERT INTO document_locks (document_id, token, acquired_at) VALUES (?, ?, ?) ON CONFLICT(document_id) DO NOTHING",
        )
        .bind(document.id)
        .bind(&token)
        .bind(Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok((inserted == 1).then(|| LockHandle::new(document.id, token)))
    }

    async fn release_lock(&self, lock: LockHandle) -> Result<()> {
        let removed = sqlx::query("DELETE FROM document_locks WHERE document_id = ? AND token = ?")
            .bind(lock.document_id())
            .bind(lock.token())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed == 0 {
            bail!(
                "document {} is not locked by {}",
                lock.document_id(),
                lock.token()
            );
        }
        Ok(())
    }

    async fn store_new_document(&self, request: &StoreRequest) -> Result<i64> {
        for kt in request.document_type.keyword_types.keyword_types() {
            if kt.required && !request.keywords.iter().any(|k| k.name() == kt.name) {
                bail!("required keyword '{}' is missing", kt.name);
            }
        }

        let mut tx = self.pool.begin().await?;

        let document_id = sqlx::query(
            r#"
            INSERT INTO documents (document_type_id, file_type_id, document_date, date_stored, comment, skip_workflow)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.document_type.id)
        .bind(request.file_type.id)
        .bind(request.document_date.format(TIMESTAMP_FORMAT).to_string())
        .bind(Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string())
        .bind(&request.comment)
        .bind(request.skip_workflow)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (position, path) in request.file_paths.iter().enumerate() {
            sqlx::query("INSERT INTO document_files (document_id, position, path) VALUES (?, ?, ?)")
                .bind(document_id)
                .bind(position as i64)
                .bind(path.to_string_lossy().into_owned())
                .execute(&mut *tx)
                .await?;
        }

        for keyword in &request.keywords {
            sqlx::query(
                "INSERT INTO document_keywords (document_id, keyword_type_id, value) VALUES (?, ?, ?)",
            )
            .bind(document_id)
            .bind(keyword.keyword_type.id)
            .bind(keyword.value.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(document_id)
    }

    async fn apply_keyword_modifications(
        &self,
        document: &DocumentHandle,
        modifications: &[KeywordModification],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for m in modifications {
            let updated = sqlx::query(
                r#"
                UPDATE document_keywords SET value = ?
                WHERE id = (
                    SELECT id FROM document_keywords
                    WHERE document_id = ? AND keyword_type_id = ? AND value = ?
                    ORDER BY id ASC LIMIT 1
                )
                "#,
            )
            .bind(m.replacement.to_string())
            .bind(document.id)
            .bind(m.existing.keyword_type.id)
            .bind(m.existing.value.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            // Dropping `tx` rolls back the earlier updates.
            if updated == 0 {
                bail!(
                    "keyword '{}' with value '{}' is not on document {}",
                    m.existing.name(),
                    m.existing.value,
                    document.id
                );
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_cmd::parse_schema_definition;
    use crate::config::parse_config;
    use crate::migrate;
    use docbatch_core::models::KeywordValue;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"{
        "fileTypes": ["PDF"],
        "documentTypeGroups": [
            { "name": "TAX", "documentTypes": [
                { "name": "RETURN", "keywordRecordTypes": [
                    { "name": "Standalone", "keywordTypes": [
                        { "name": "DLN", "dataType": "AlphaNumeric", "required": true },
                        { "name": "Amount", "dataType": "Currency" } ] },
                    { "name": "Secondary", "keywordTypes": [
                        { "name": "Ignored", "dataType": "Numeric9" } ] } ] } ] } ]
    }"#;

    async fn setup() -> (TempDir, SqliteRepository) {
        let tmp = TempDir::new().unwrap();
        let cfg = parse_config(&format!(
            "[repository]\npath = \"{}\"\n",
            tmp.path().join("repo.sqlite").display()
        ))
        .unwrap();
        let repo = SqliteRepository::open(&cfg).await.unwrap();
        migrate::apply(&repo.pool).await.unwrap();
        let def = parse_schema_definition(SCHEMA.as_bytes()).unwrap();
        repo.import_schema(&def).await.unwrap();
        (tmp, repo)
    }

    fn keyword(schema: &DocumentTypeSchema, name: &str, raw: &str) -> TypedKeyword {
        schema.keyword_types.get(name).unwrap().coerce(raw).unwrap()
    }

    async fn store(repo: &SqliteRepository, keywords: &[(&str, &str)]) -> i64 {
        let doc_type = repo.find_document_type("RETURN").await.unwrap().unwrap();
        let file_type = repo.find_file_type("PDF").await.unwrap().unwrap();
        let keywords = keywords
            .iter()
            .map(|(n, v)| keyword(&doc_type, n, v))
            .collect();
        repo.store_new_document(&StoreRequest {
            file_paths: vec![PathBuf::from("a.pdf")],
            document_type: doc_type,
            file_type,
            keywords,
            document_date: Local::now().naive_local(),
            comment: "test".to_string(),
            skip_workflow: true,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn only_first_record_type_is_the_schema() {
        let (_tmp, repo) = setup().await;
        let doc_type = repo.find_document_type("RETURN").await.unwrap().unwrap();
        let names: Vec<&str> = doc_type
            .keyword_types
            .keyword_types()
            .iter()
            .map(|k| k.name.as_str())
            .collect();
        assert_eq!(names, vec!["DLN", "Amount"]);
        assert!(doc_type.keyword_types.get("DLN").unwrap().required);
    }

    #[tokio::test]
    async fn import_is_idempotent() {
        let (_tmp, repo) = setup().await;
        let def = parse_schema_definition(SCHEMA.as_bytes()).unwrap();
        let again = repo.import_schema(&def).await.unwrap();
        assert_eq!(again, ImportSummary::default());
        assert_eq!(repo.list_document_type_groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_matches_canonical_decimal() {
        let (_tmp, repo) = setup().await;
        let hit = store(&repo, &[("DLN", "A1"), ("Amount", "10.50")]).await;
        store(&repo, &[("DLN", "A2"), ("Amount", "11")]).await;

        let doc_type = repo.find_document_type("RETURN").await.unwrap().unwrap();
        let hits = repo
            .execute_query(&DocumentQuery {
                keyword_filters: vec![keyword(&doc_type, "Amount", "10.5")],
                document_type: doc_type,
                display_columns: vec![DisplayColumn::DocumentDate],
                max_results: None,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, hit);
        assert_eq!(hits[0].display_values.len(), 1);
        assert_eq!(hits[0].keywords.len(), 2);
    }

    #[tokio::test]
    async fn store_rejects_missing_required_keyword() {
        let (_tmp, repo) = setup().await;
        let doc_type = repo.find_document_type("RETURN").await.unwrap().unwrap();
        let file_type = repo.find_file_type("PDF").await.unwrap().unwrap();
        let err = repo
            .store_new_document(&StoreRequest {
                file_paths: vec![PathBuf::from("a.pdf")],
                document_type: doc_type,
                file_type,
                keywords: Vec::new(),
                document_date: Local::now().naive_local(),
                comment: "test".to_string(),
                skip_workflow: true,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("DLN"));
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let (_tmp, repo) = setup().await;
        let id = store(&repo, &[("DLN", "A1")]).await;
        let doc = repo.get_document(id, false).await.unwrap().unwrap();

        let lock = repo.lock_document(&doc).await.unwrap().unwrap();
        assert!(repo.lock_document(&doc).await.unwrap().is_none());
        repo.release_lock(lock).await.unwrap();
        let again = repo.lock_document(&doc).await.unwrap().unwrap();
        repo.release_lock(again).await.unwrap();
    }

    #[tokio::test]
    async fn failed_modification_rolls_back() {
        let (_tmp, repo) = setup().await;
        let id = store(&repo, &[("DLN", "A1"), ("Amount", "5")]).await;
        let doc = repo.get_document(id, true).await.unwrap().unwrap();
        let dln = doc.keywords[0].clone();
        let mut stale = doc.keywords[1].clone();
        stale.value = KeywordValue::Text("nope".to_string());

        let result = repo
            .apply_keyword_modifications(
                &doc,
                &[
                    KeywordModification {
                        existing: dln,
                        replacement: KeywordValue::Text("B2".to_string()),
                    },
                    KeywordModification {
                        existing: stale,
                        replacement: KeywordValue::Text("7".to_string()),
                    },
                ],
            )
            .await;
        assert!(result.is_err());

        let doc = repo.get_document(id, true).await.unwrap().unwrap();
        assert_eq!(doc.keywords[0].value, KeywordValue::Text("A1".to_string()));
    }
}
