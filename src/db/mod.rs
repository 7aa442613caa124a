mod models;

pub use models::*;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

const MIGRATIONS: &[(&str, &str)] = &[
    ("001_initial", include_str!("../../migrations/001_initial.sql")),
    ("002_tickets", include_str!("../../migrations/002_tickets.sql")),
];

/// Open the SQLite database under `data_dir`, apply pragmas and migrations.
pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("ticketr.db");
    info!("Opening database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite:{}?mode=rwc", db_path.display()))
        .await?;

    // WAL for concurrent readers; FK enforcement is off by default in SQLite
    for pragma in [
        "PRAGMA journal_mode = WAL",
        "PRAGMA synchronous = NORMAL",
        "PRAGMA foreign_keys = ON",
    ] {
        sqlx::query(pragma).execute(&pool).await?;
    }

    apply_migrations(&pool).await?;
    Ok(pool)
}

async fn apply_migrations(pool: &SqlitePool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        info!("Applying migration {}", name);
        run_batch(pool, sql).await?;
    }
    Ok(())
}

/// Run a multi-statement SQL batch, skipping comment lines.
async fn run_batch(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        let stripped: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        if !stripped.trim().is_empty() {
            sqlx::query(stripped.trim()).execute(pool).await?;
        }
    }
    Ok(())
}

/// In-memory pool with the full schema, for data-layer and handler tests
#[cfg(test)]
pub async fn test_pool() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("enable foreign keys");
    apply_migrations(&pool).await.expect("migrations");
    pool
}
