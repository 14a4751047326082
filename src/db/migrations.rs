//! Database lifecycle and schema migrations.

use crate::error::StoreError;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> crate::Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                ))
            })?;
        }

        // Connect to database with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to parse database path: {}", e))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to connect to database: {}", e))
        })?;

        let db = Self { pool };

        // Run migrations
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to acquire connection: {}", e))
        })?;

        // Create schema version table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::MigrationFailed(format!("Failed to create schema_version table: {}", e))
        })?;

        // Check current version
        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::QueryFailed(format!("Failed to query schema version: {}", e))
                })?;

        let current_version = current_version.unwrap_or(0);

        // Apply migrations
        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create initial schema
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<(), StoreError> {
        tracing::info!("Applying database migration v1");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN").execute(&mut *conn).await.map_err(|e| {
            StoreError::MigrationFailed(format!("Failed to begin transaction: {}", e))
        })?;

        let result = async {
            Self::create_processed_listings_table(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), StoreError>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await.map_err(|e| {
                    StoreError::MigrationFailed(format!("Failed to commit migration v1: {}", e))
                })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    /// Create the processed_listings table
    async fn create_processed_listings_table(conn: &mut SqliteConnection) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE processed_listings (
                url TEXT PRIMARY KEY,
                songs INTEGER NOT NULL,
                units_published INTEGER NOT NULL,
                processed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::MigrationFailed(format!(
                "Failed to create processed_listings table: {}",
                e
            ))
        })?;

        Ok(())
    }

    /// Record an applied migration in schema_version
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                StoreError::MigrationFailed(format!("Failed to record migration: {}", e))
            })?;

        Ok(())
    }

    /// Close the database connection pool
    ///
    /// Waits for in-flight queries to finish. Call during graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
