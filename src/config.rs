//! TOML configuration.
//!
//! Loaded once at start-up by [`load_config`]. Every section except
//! `[repository]` is optional and falls back to defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docbatch_core::executor::{Operation, DEFAULT_ARCHIVE_COMMENT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_busy_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub document_type_group: Option<String>,
    #[serde(default = "default_query_file")]
    pub query_file: String,
    #[serde(default = "default_archive_file")]
    pub archive_file: String,
    #[serde(default = "default_reindex_file")]
    pub reindex_file: String,
    #[serde(default = "default_config_file")]
    pub config_file: String,
    #[serde(default = "default_comment")]
    pub comment: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            document_type_group: None,
            query_file: default_query_file(),
            archive_file: default_archive_file(),
            reindex_file: default_reindex_file(),
            config_file: default_config_file(),
            comment: default_comment(),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("./batch")
}
fn default_query_file() -> String {
    "query.json".to_string()
}
fn default_archive_file() -> String {
    "archive.json".to_string()
}
fn default_reindex_file() -> String {
    "reindex.json".to_string()
}
fn default_config_file() -> String {
    "config.json".to_string()
}
fn default_comment() -> String {
    DEFAULT_ARCHIVE_COMMENT.to_string()
}

impl BatchConfig {
    /// Descriptor file name for an operation.
    pub fn file_for(&self, operation: Operation) -> &str {
        match operation {
            Operation::Query => &self.query_file,
            Operation::Archive => &self.archive_file,
            Operation::Reindex => &self.reindex_file,
        }
    }

    /// Operation whose configured descriptor file name is `file_name`.
    pub fn operation_for(&self, file_name: &str) -> Option<Operation> {
        [Operation::Query, Operation::Archive, Operation::Reindex]
            .into_iter()
            .find(|op| self.file_for(*op) == file_name)
    }

    pub fn descriptor_path(&self, operation: Operation) -> PathBuf {
        self.directory.join(self.file_for(operation))
    }

    pub fn config_dump_path(&self) -> PathBuf {
        self.directory.join(&self.config_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "text".to_string()
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.repository.busy_timeout_secs == 0 {
        bail!("repository.busy_timeout_secs must be > 0");
    }

    // Validate batch
    if config.batch.directory.as_os_str().is_empty() {
        bail!("batch.directory must not be empty");
    }
    if config.batch.comment.trim().is_empty() {
        bail!("batch.comment must not be empty");
    }
    let names = [
        &config.batch.query_file,
        &config.batch.archive_file,
        &config.batch.reindex_file,
    ];
    if names.iter().any(|n| n.trim().is_empty()) {
        bail!("batch descriptor file names must not be empty");
    }
    if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
        bail!(
            "batch.query_file, batch.archive_file and batch.reindex_file must be distinct (got '{}', '{}', '{}')",
            names[0],
            names[1],
            names[2]
        );
    }

    match config.logging.format.as_str() {
        "text" | "json" => {}
        other => bail!(
            "Unknown logging format: '{}'. Must be text or json.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[repository]
path = "./data/repository.sqlite"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.repository.busy_timeout_secs, 5);
        assert_eq!(cfg.batch.directory, PathBuf::from("./batch"));
        assert_eq!(cfg.batch.query_file, "query.json");
        assert_eq!(cfg.batch.comment, "docbatch archive import");
        assert!(cfg.batch.document_type_group.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.is_json());
    }

    #[test]
    fn operation_is_selected_by_file_name() {
        let cfg = parse_config(&format!(
            "{MINIMAL}\n[batch]\ndirectory = \"/tmp/b\"\narchive_file = \"import.json\"\n"
        ))
        .unwrap();
        assert_eq!(cfg.batch.operation_for("import.json"), Some(Operation::Archive));
        assert_eq!(cfg.batch.operation_for("query.json"), Some(Operation::Query));
        assert_eq!(cfg.batch.operation_for("archive.json"), None);
        assert_eq!(
            cfg.batch.descriptor_path(Operation::Reindex),
            PathBuf::from("/tmp/b/reindex.json")
        );
    }

    #[test]
    fn duplicate_descriptor_names_rejected() {
        let err = parse_config(&format!(
            "{MINIMAL}\n[batch]\nquery_file = \"a.json\"\nreindex_file = \"a.json\"\n"
        ))
        .unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = parse_config(
            "[repository]\npath = \"r.sqlite\"\nbusy_timeout_secs = 0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("busy_timeout_secs"));
    }

    #[test]
    fn unknown_log_format_rejected() {
        let err =
            parse_config(&format!("{MINIMAL}\n[logging]\nformat = \"xml\"\n")).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn missing_repository_section_fails_to_parse() {
        assert!(parse_config("[batch]\ndirectory = \"b\"\n").is_err());
    }
}
