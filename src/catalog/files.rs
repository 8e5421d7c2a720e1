//! Package-file rows and their FTS5 external-content search index (spec §4.2).

use sqlx::Row;

use super::Catalog;
use crate::errors::Result;
use crate::model::{FileIndexState, Nevra, PackageFile};

impl Catalog {
    /// All distinct NEVRAs currently carrying file rows for one media — the
    /// `A` side of the file-index differential import's NEVRA diff.
    pub async fn nevras_with_files(&self, media: &str) -> Result<Vec<Nevra>> {
        let rows = sqlx::query(
            "SELECT DISTINCT name, epoch, version, release, arch FROM package_files WHERE media = ?",
        )
        .bind(media)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                Nevra::new(
                    r.get::<String, _>("name"),
                    r.get::<i64, _>("epoch") as u32,
                    r.get::<String, _>("version"),
                    r.get::<String, _>("release"),
                    r.get::<String, _>("arch"),
                )
            })
            .collect())
    }

    /// Insert one file row and its FTS shadow row inside an open transaction.
    /// Both mutations share the transaction so the index can never drift
    /// from `package_files` (spec §4.2's crash-consistency requirement).
    pub async fn insert_file_on(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, file: &PackageFile) -> Result<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO package_files (media, name, epoch, version, release, arch, directory, basename)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.media)
        .bind(&file.nevra.name)
        .bind(file.nevra.epoch as i64)
        .bind(&file.nevra.version)
        .bind(&file.nevra.release)
        .bind(&file.nevra.arch)
        .bind(&file.directory)
        .bind(&file.basename)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() > 0 {
            let rowid = result.last_insert_rowid();
            sqlx::query("INSERT INTO package_files_fts (rowid, directory, basename) VALUES (?, ?, ?)")
                .bind(rowid)
                .bind(&file.directory)
                .bind(&file.basename)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    /// Delete every file row (and its FTS shadow) for one NEVRA, inside an
    /// open transaction.
    pub async fn delete_files_for_nevra_on(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        media: &str,
        nevra: &Nevra,
    ) -> Result<()> {
        let rowids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM package_files
             WHERE media = ? AND name = ? AND epoch = ? AND version = ? AND release = ? AND arch = ?",
        )
        .bind(media)
        .bind(&nevra.name)
        .bind(nevra.epoch as i64)
        .bind(&nevra.version)
        .bind(&nevra.release)
        .bind(&nevra.arch)
        .fetch_all(&mut **tx)
        .await?;

        for rowid in rowids {
            sqlx::query("DELETE FROM package_files_fts WHERE rowid = ?").bind(rowid).execute(&mut **tx).await?;
        }

        sqlx::query(
            "DELETE FROM package_files
             WHERE media = ? AND name = ? AND epoch = ? AND version = ? AND release = ? AND arch = ?",
        )
        .bind(media)
        .bind(&nevra.name)
        .bind(nevra.epoch as i64)
        .bind(&nevra.version)
        .bind(&nevra.release)
        .bind(&nevra.arch)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Sub-second wildcard search over (directory, basename) via the FTS5
    /// index, joined back to `package_files` for the NEVRA it belongs to.
    pub async fn search_files(&self, pattern: &str, limit: i64) -> Result<Vec<PackageFile>> {
        let rows = sqlx::query(
            "SELECT pf.media, pf.name, pf.epoch, pf.version, pf.release, pf.arch, pf.directory, pf.basename
             FROM package_files_fts fts
             JOIN package_files pf ON pf.id = fts.rowid
             WHERE package_files_fts MATCH ?
             LIMIT ?",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PackageFile {
                media: r.get("media"),
                nevra: Nevra::new(
                    r.get::<String, _>("name"),
                    r.get::<i64, _>("epoch") as u32,
                    r.get::<String, _>("version"),
                    r.get::<String, _>("release"),
                    r.get::<String, _>("arch"),
                ),
                directory: r.get("directory"),
                basename: r.get("basename"),
            })
            .collect())
    }

    pub async fn set_file_index_state(&self, state: &FileIndexState) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO file_index_state (media, raw_md5, file_count, package_count, compressed_size, last_sync)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&state.media)
        .bind(&state.raw_md5)
        .bind(state.file_count as i64)
        .bind(state.package_count as i64)
        .bind(state.compressed_size as i64)
        .bind(state.last_sync.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn file_index_state(&self, media: &str) -> Result<Option<FileIndexState>> {
        let row = sqlx::query("SELECT * FROM file_index_state WHERE media = ?")
            .bind(media)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| FileIndexState {
            media: r.get("media"),
            raw_md5: r.get("raw_md5"),
            file_count: r.get::<i64, _>("file_count") as u64,
            package_count: r.get::<i64, _>("package_count") as u64,
            compressed_size: r.get::<i64, _>("compressed_size") as u64,
            last_sync: r
                .get::<Option<String>, _>("last_sync")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
        }))
    }
}
