use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every repository table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Schema tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_type_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL,
            name TEXT NOT NULL UNIQUE,
            FOREIGN KEY (group_id) REFERENCES document_type_groups(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keyword_record_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_type_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(document_type_id, position),
            FOREIGN KEY (document_type_id) REFERENCES document_types(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keyword_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_type_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            data_type TEXT NOT NULL,
            required INTEGER NOT NULL DEFAULT 0,
            UNIQUE(record_type_id, name),
            FOREIGN KEY (record_type_id) REFERENCES keyword_record_types(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Document tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_type_id INTEGER NOT NULL,
            file_type_id INTEGER,
            document_date TEXT NOT NULL,
            date_stored TEXT NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            skip_workflow INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (document_type_id) REFERENCES document_types(id),
            FOREIGN KEY (file_type_id) REFERENCES file_types(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_files (
            document_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            path TEXT NOT NULL,
            PRIMARY KEY (document_id, position),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_keywords (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            keyword_type_id INTEGER NOT NULL,
            value TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id),
            FOREIGN KEY (keyword_type_id) REFERENCES keyword_types(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_locks (
            document_id INTEGER PRIMARY KEY,
            token TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_keywords_document ON document_keywords(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_keywords_lookup ON document_keywords(keyword_type_id, value)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(document_type_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
