use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // One shared connection; SQLite serializes writers anyway, and a single
    // connection keeps in-memory databases coherent across the pool.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;

    tracing::info!("Database connection pool created");

    Ok(pool)
}

// Idempotent: safe to run on every startup.
async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS reports (\
         id INTEGER PRIMARY KEY AUTOINCREMENT, \
         company TEXT, \
         pdf_path TEXT, \
         created_at TEXT)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
