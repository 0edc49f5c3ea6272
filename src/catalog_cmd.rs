//! Schema import and `config.json` export.
//!
//! `docbatch load-schema` seeds the local SQLite repository from a schema
//! definition file; `docbatch export-config` writes the catalog dump.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use docbatch_core::models::KeywordDataType;
use docbatch_core::SchemaCatalog;

use crate::config::Config;
use crate::sqlite_repository::SqliteRepository;

/// Contents of a schema definition file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub document_type_groups: Vec<GroupDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDefinition {
    pub name: String,
    #[serde(default)]
    pub document_types: Vec<DocumentTypeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub keyword_record_types: Vec<KeywordRecordDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRecordDefinition {
    pub name: String,
    #[serde(default)]
    pub keyword_types: Vec<KeywordTypeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordTypeDefinition {
    pub name: String,
    pub data_type: KeywordDataType,
    #[serde(default)]
    pub required: bool,
}

pub fn parse_schema_definition(content: &[u8]) -> Result<SchemaDefinition> {
    serde_json::from_slice(content).context("Failed to parse schema definition")
}

pub async fn run_load_schema(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read schema definition: {}", path.display()))?;
    let def = parse_schema_definition(&content)?;

    let repo = SqliteRepository::open(config).await?;
    let summary = repo.import_schema(&def).await;
    repo.close().await;
    let summary = summary?;

    info!(path = %path.display(), ?summary, "schema imported");
    println!("Schema loaded from {}", path.display());
    println!("  groups added:         {}", summary.groups);
    println!("  document types added: {}", summary.document_types);
    println!("  keyword types added:  {}", summary.keyword_types);
    println!("  file types added:     {}", summary.file_types);
    println!("ok");
    Ok(())
}

pub async fn run_export_config(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config.batch.config_dump_path());

    let repo = SqliteRepository::open(config).await?;
    let groups = SchemaCatalog::new(&repo).export().await;
    repo.close().await;
    let groups = groups?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(&groups)?;
    std::fs::write(&output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    for group in &groups {
        println!("{}", group.name);
        for doc_type in &group.document_types {
            println!("  {} ({} keywords)", doc_type.name, doc_type.keyword_types.len());
            for kt in doc_type.keyword_types.keyword_types() {
                let marker = if kt.required { " *" } else { "" };
                println!("    {}: {}{}", kt.name, kt.data_type, marker);
            }
        }
    }
    println!("wrote {} group(s) to {}", groups.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_defaults_to_false() {
        let def = parse_schema_definition(
            br#"{ "documentTypeGroups": [ { "name": "TAX", "documentTypes": [
                { "name": "RETURN", "keywordRecordTypes": [ { "name": "R", "keywordTypes": [
                    { "name": "DLN", "dataType": "AlphaNumeric" } ] } ] } ] } ] }"#,
        )
        .unwrap();
        let kt = &def.document_type_groups[0].document_types[0].keyword_record_types[0]
            .keyword_types[0];
        assert!(!kt.required);
        assert!(def.file_types.is_empty());
    }

    #[test]
    fn unknown_data_type_is_rejected() {
        let err = parse_schema_definition(
            br#"{ "documentTypeGroups": [ { "name": "TAX", "documentTypes": [
                { "name": "RETURN", "keywordRecordTypes": [ { "name": "R", "keywordTypes": [
                    { "name": "DLN", "dataType": "alphanumeric" } ] } ] } ] } ] }"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("alphanumeric"));
    }
}
