//! The SQLite-backed local package store (spec §4.2): media, packages,
//! files, holds, peers, history, config — exposed as a typed API, never raw
//! SQL, to the rest of the engine.

mod migrations;

pub mod config_kv;
pub mod files;
pub mod history;
pub mod holds;
pub mod media;
pub mod packages;
pub mod peers;

use std::path::Path;
use std::str::FromStr;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};

use crate::errors::Result;

/// A connection pool plus the migration/bulk-mode bookkeeping every typed
/// submodule shares. All writes funnel through this one pool — §4.2's
/// "single writer thread" discipline is enforced by the caller serializing
/// write calls, not by locking here (SQLite itself serializes writers).
#[derive(Clone, Debug)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open (creating if absent) the catalog database and bring its schema
    /// up to date.
    #[tracing::instrument]
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;
        let catalog = Self { pool };
        catalog.run_migrations().await?;
        Ok(catalog)
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        let catalog = Self { pool };
        catalog.run_migrations().await?;
        Ok(catalog)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply every migration whose version isn't yet recorded, each inside
    /// its own transaction.
    #[tracing::instrument(skip(self))]
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let applied: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;

        for (version, statements) in migrations::MIGRATIONS {
            if *version <= applied {
                continue;
            }
            let mut tx = self.pool.begin().await?;
            for stmt in *statements {
                sqlx::query(stmt).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!(version, "applied catalog migration");
        }

        Ok(())
    }

    /// Check out a single connection for an import, relaxing durability on
    /// it first when `bulk` is true (spec §4.2: "reduced durability, larger
    /// cache, memory-mapped I/O" for a first-ever ingestion). SQLite
    /// pragmas bind to the connection they're issued on, not to the pool —
    /// a transaction later checked out from the pool independently could
    /// land on a different physical connection and never see these
    /// settings, so the caller must run its bulk-import transaction on
    /// this exact connection.
    pub async fn acquire_for_import(&self, bulk: bool) -> Result<PoolConnection<Sqlite>> {
        let mut conn = self.pool.acquire().await?;
        if bulk {
            sqlx::query("PRAGMA synchronous = OFF").execute(&mut *conn).await?;
            sqlx::query("PRAGMA journal_mode = MEMORY").execute(&mut *conn).await?;
            sqlx::query("PRAGMA cache_size = -131072").execute(&mut *conn).await?; // 128 MiB
            sqlx::query("PRAGMA mmap_size = 268435456").execute(&mut *conn).await?; // 256 MiB
        }
        Ok(conn)
    }

    /// Restore normal-durability pragmas on `conn` before it goes back to
    /// the pool for non-bulk use. Counterpart to [`Catalog::acquire_for_import`].
    pub async fn release_from_import(&self, mut conn: PoolConnection<Sqlite>, bulk: bool) -> Result<()> {
        if bulk {
            sqlx::query("PRAGMA synchronous = FULL").execute(&mut *conn).await?;
            sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
            sqlx::query("PRAGMA cache_size = -2000").execute(&mut *conn).await?; // sqlite default, 2 MiB
            sqlx::query("PRAGMA mmap_size = 0").execute(&mut *conn).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.run_migrations().await.unwrap();
        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(catalog.pool())
            .await
            .unwrap();
        assert_eq!(version, migrations::MIGRATIONS.last().unwrap().0);
    }

    #[tokio::test]
    async fn bulk_mode_toggles_without_error() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let conn = catalog.acquire_for_import(true).await.unwrap();
        catalog.release_from_import(conn, true).await.unwrap();
    }
}
