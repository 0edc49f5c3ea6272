//! Batch commands: `query`, `archive`, `reindex` and `run <file>`.
//!
//! Reads the descriptor file, runs it through the executor against the
//! SQLite repository, and prints the per-descriptor report to stdout.
//! A run-level failure (unreadable or malformed batch, unresolved shared
//! group) is returned as an error and ends the process non-zero.

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use docbatch_core::executor::{BatchExecutor, BatchReport, ExecutorOptions, ItemResult, Operation};
use docbatch_core::{parse_batch, BatchError, SchemaCatalog};

use crate::config::Config;
use crate::sqlite_repository::SqliteRepository;

/// Output switches shared by every batch command.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub json: bool,
    /// Process only the first `limit` descriptors.
    pub limit: Option<usize>,
}

/// Run `operation` over its configured descriptor file.
pub async fn run_operation(config: &Config, operation: Operation, opts: RunOptions) -> Result<()> {
    let path = config.batch.descriptor_path(operation);
    run_batch_file(config, operation, &path, opts).await
}

/// Run the operation selected by the descriptor file's name.
pub async fn run_file(config: &Config, file: &Path, opts: RunOptions) -> Result<()> {
    let Some(file_name) = file.file_name().and_then(|n| n.to_str()) else {
        bail!("Not a descriptor file: {}", file.display());
    };
    let Some(operation) = config.batch.operation_for(file_name) else {
        bail!(
            "Cannot tell the operation from '{}'. Expected {}, {} or {}.",
            file_name,
            config.batch.query_file,
            config.batch.archive_file,
            config.batch.reindex_file
        );
    };

    // A bare file name lives in the configured batch directory.
    let path = if file.components().count() == 1 {
        config.batch.directory.join(file)
    } else {
        file.to_path_buf()
    };
    run_batch_file(config, operation, &path, opts).await
}

async fn run_batch_file(
    config: &Config,
    operation: Operation,
    path: &Path,
    opts: RunOptions,
) -> Result<()> {
    let content = std::fs::read(path).map_err(|e| {
        BatchError::MalformedBatch(format!("cannot read {}: {}", path.display(), e))
    })?;
    let mut batch = parse_batch(&content)?;
    if let Some(limit) = opts.limit {
        batch.truncate(limit);
    }

    let batch_directory = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut options = ExecutorOptions::new(batch_directory);
    options.document_type_group = config.batch.document_type_group.clone();
    options.archive_comment = config.batch.comment.clone();

    let repo = SqliteRepository::open(config).await?;
    let report = {
        let catalog = SchemaCatalog::new(&repo);
        let executor = BatchExecutor::new(&repo, &catalog, options);
        executor.run(operation, batch).await
    };
    repo.close().await;
    let report = report?;

    info!(
        operation = operation.as_str(),
        succeeded = report.succeeded(),
        skipped = report.skipped(),
        failed = report.failed(),
        "batch run finished"
    );

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&ReportView::from(&report))?);
    } else {
        print_report(path, &report);
    }
    Ok(())
}

fn print_report(path: &Path, report: &BatchReport) {
    println!("{} {}", report.operation, path.display());
    for item in &report.items {
        println!("{}", item_line(item));
        for hit in &item.hits {
            println!(
                "    document {} ({} display column(s)): {}",
                hit.document_id,
                hit.display_values.len(),
                hit.display_values.join(", ")
            );
        }
    }
    println!(
        "descriptors: {}  succeeded: {}  skipped: {}  failed: {}",
        report.items.len(),
        report.succeeded(),
        report.skipped(),
        report.failed()
    );
    let ids = report.document_ids();
    if !ids.is_empty() {
        let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
        println!("document ids: {}", ids.join(" "));
    }
    println!("ok");
}

fn item_line(item: &ItemResult) -> String {
    let mut line = format!("  [{}] {}", item.index, item.status.as_str());
    if !item.document_ids.is_empty() {
        let ids: Vec<String> = item.document_ids.iter().map(i64::to_string).collect();
        line.push_str(&format!(" documents={}", ids.join(",")));
    }
    if let Some(detail) = &item.detail {
        line.push_str(&format!(" ({})", detail));
    }
    if let Some(err) = &item.error {
        line.push_str(&format!(": {}", err));
    }
    line
}

#[derive(Serialize)]
struct ReportView<'a> {
    operation: &'a str,
    succeeded: usize,
    skipped: usize,
    failed: usize,
    document_ids: Vec<i64>,
    items: Vec<ItemView<'a>>,
}

#[derive(Serialize)]
struct ItemView<'a> {
    index: usize,
    status: &'a str,
    document_ids: &'a [i64],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hits: Vec<HitView<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct HitView<'a> {
    document_id: i64,
    display_values: &'a [String],
}

impl<'a> From<&'a BatchReport> for ReportView<'a> {
    fn from(report: &'a BatchReport) -> Self {
        Self {
            operation: report.operation.as_str(),
            succeeded: report.succeeded(),
            skipped: report.skipped(),
            failed: report.failed(),
            document_ids: report.document_ids(),
            items: report
                .items
                .iter()
                .map(|item| ItemView {
                    index: item.index,
                    status: item.status.as_str(),
                    document_ids: &item.document_ids,
                    hits: item
                        .hits
                        .iter()
                        .map(|h| HitView {
                            document_id: h.document_id,
                            display_values: &h.display_values,
                        })
                        .collect(),
                    detail: item.detail.as_deref(),
                    error: item.error.as_ref().map(ToString::to_string),
                })
                .collect(),
        }
    }
}
