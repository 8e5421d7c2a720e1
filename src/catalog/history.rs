//! Transaction history: append-only log of install/upgrade/erase runs, used
//! by `--undo` and by the daemon's `/history` endpoint (spec §4.4, §6).

use sqlx::Row;

use super::Catalog;
use crate::errors::Result;
use crate::model::{AffectedPackage, Direction, HistoryAction, HistoryEntry, HistoryStatus, Nevra};

impl Catalog {
    /// Record a new in-progress history entry and return its assigned id.
    pub async fn begin_history_entry(&self, action: HistoryAction, command_line: &str, user: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO history (timestamp, action, status, affected_json, command_line, user)
             VALUES (datetime('now'), ?, ?, '[]', ?, ?)",
        )
        .bind(action.as_str())
        .bind(HistoryStatus::InProgress.as_str())
        .bind(command_line)
        .bind(user)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Move a history entry to a terminal status, recording what it affected.
    pub async fn finish_history_entry(
        &self,
        id: i64,
        status: HistoryStatus,
        affected: &[AffectedPackage],
        return_code: Option<i32>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE history SET status = ?, affected_json = ?, return_code = ?, error = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(serde_json::to_string(affected).unwrap_or_default())
            .bind(return_code)
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn history_entry(&self, id: i64) -> Result<Option<HistoryEntry>> {
        let row = sqlx::query("SELECT * FROM history WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(history_from_row).transpose()
    }

    /// Most recent entries first, capped at `limit`.
    pub async fn recent_history(&self, limit: i64) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query("SELECT * FROM history ORDER BY id DESC LIMIT ?").bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(history_from_row).collect()
    }
}

fn history_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryEntry> {
    let action = match row.get::<String, _>("action").as_str() {
        "install" => HistoryAction::Install,
        "upgrade" => HistoryAction::Upgrade,
        "erase" => HistoryAction::Erase,
        "autoremove" => HistoryAction::Autoremove,
        _ => HistoryAction::Undo,
    };
    let status = match row.get::<String, _>("status").as_str() {
        "complete" => HistoryStatus::Complete,
        "failed" => HistoryStatus::Failed,
        "rolled-back" => HistoryStatus::RolledBack,
        _ => HistoryStatus::InProgress,
    };
    let affected: Vec<AffectedPackage> =
        serde_json::from_str(&row.get::<String, _>("affected_json")).unwrap_or_default();
    let timestamp = chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("timestamp"))
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());
    Ok(HistoryEntry {
        id: row.get("id"),
        timestamp,
        action,
        status,
        affected,
        command_line: row.get("command_line"),
        user: row.get("user"),
        return_code: row.get("return_code"),
        error: row.get("error"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_then_finish_round_trips() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let id = catalog.begin_history_entry(HistoryAction::Install, "urpmi bash", "root").await.unwrap();

        let affected = vec![AffectedPackage { nevra: Nevra::new("bash", 0, "5.2", "1", "x86_64"), direction: Direction::Added }];
        catalog.finish_history_entry(id, HistoryStatus::Complete, &affected, Some(0), None).await.unwrap();

        let entry = catalog.history_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, HistoryStatus::Complete);
        assert_eq!(entry.affected.len(), 1);
        assert_eq!(entry.affected[0].nevra.name, "bash");
    }

    #[tokio::test]
    async fn recent_history_orders_newest_first() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let first = catalog.begin_history_entry(HistoryAction::Install, "a", "root").await.unwrap();
        let second = catalog.begin_history_entry(HistoryAction::Erase, "b", "root").await.unwrap();

        let recent = catalog.recent_history(10).await.unwrap();
        assert_eq!(recent[0].id, second);
        assert_eq!(recent[1].id, first);
    }
}
