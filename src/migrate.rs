use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use scanbook_core::models::{format_timestamp, normalize_section_name, same_key};

use crate::config::Config;
use crate::db;
use crate::snapshot::SnapshotFile;

/// Connects, creates the schema and seeds the first sections.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool, config).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool, config: &Config) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // No foreign key to sections: records are a log and outlive the section
    // row they were filed under. Uniqueness per (section_id, code) is
    // enforced by the store.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS barcodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            section_id INTEGER,
            section TEXT NOT NULL,
            code TEXT NOT NULL,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_barcodes_section_id ON barcodes(section_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_barcodes_timestamp ON barcodes(timestamp DESC)")
        .execute(pool)
        .await?;

    seed_sections(pool, config).await
}

/// Fills an empty `sections` table, importing the snapshot file when one
/// exists and falling back to `scan.default_sections` otherwise.
async fn seed_sections(pool: &SqlitePool, config: &Config) -> Result<()> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    let seed: Vec<(String, Vec<String>)> =
        match SnapshotFile::new(&config.storage.snapshot_path).load()? {
            Some(snapshot) => {
                info!(
                    path = %config.storage.snapshot_path.display(),
                    sections = snapshot.len(),
                    "Importing sections from snapshot file"
                );
                snapshot.into_entries()
            }
            None => config
                .scan
                .default_sections
                .iter()
                .map(|name| (name.clone(), Vec::new()))
                .collect(),
        };

    let now = format_timestamp(&Utc::now().naive_utc());
    let mut tx = pool.begin().await?;
    let mut names: Vec<String> = Vec::new();
    for (raw_name, codes) in seed {
        let Ok(name) = normalize_section_name(&raw_name) else {
            warn!(name = %raw_name, "Skipping seed section with an empty name");
            continue;
        };
        if names.iter().any(|n| same_key(n, &name)) {
            continue;
        }
        let section_id = sqlx::query("INSERT INTO sections (name) VALUES (?)")
            .bind(&name)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let mut kept: Vec<String> = Vec::new();
        for code in codes {
            if kept.iter().any(|c| same_key(c, &code)) {
                continue;
            }
            sqlx::query(
                "INSERT INTO barcodes (section_id, section, code, timestamp) VALUES (?, ?, ?, ?)",
            )
            .bind(section_id)
            .bind(&name)
            .bind(&code)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            kept.push(code);
        }
        names.push(name);
    }
    tx.commit().await?;

    info!(sections = names.len(), "Seeded sections");
    Ok(())
}
