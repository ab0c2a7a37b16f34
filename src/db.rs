//! SQLite connection pool and schema management.
//!
//! Migrations under `./migrations` are embedded at compile time and applied
//! on every connect, so a fresh database file is usable immediately.

use log::info;
use sqlx::sqlite::{ SqliteConnectOptions, SqlitePoolOptions };
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;

/// Errors returned by the relational stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated; the payload names the field.
    #[error("{0} already exists")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Maps a unique-constraint failure to [`StoreError::Conflict`] using the
    /// column name SQLite reports (`UNIQUE constraint failed: users.email`).
    pub fn from_insert(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let message = db_err.message();
                let field = message
                    .rsplit('.')
                    .next()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .unwrap_or("record");
                return StoreError::Conflict(field.to_string());
            }
        }
        StoreError::Database(err)
    }
}

pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", url);
    Ok(pool)
}

/// Single-connection in-memory database. Every pooled connection to
/// `sqlite::memory:` is a separate database, so the pool never opens a second
/// one and never recycles the first.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Drops every application table and re-applies the migrations.
pub async fn reset(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for table in ["chat_turns", "sessions", "users", "_sqlx_migrations"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table)).execute(pool).await?;
    }
    info!("Dropped all tables");

    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Recreated all tables");
    Ok(())
}
