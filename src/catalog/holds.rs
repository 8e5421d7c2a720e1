//! Package holds and the blacklist/redlist package-name lists (spec §3, §4.4).

use sqlx::Row;

use super::Catalog;
use crate::errors::Result;
use crate::model::{Hold, ListKind};

impl Catalog {
    pub async fn add_hold(&self, hold: &Hold) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO holds (name, reason) VALUES (?, ?)")
            .bind(&hold.name)
            .bind(&hold.reason)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_hold(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM holds WHERE name = ?").bind(name).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn is_held(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM holds WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list_holds(&self) -> Result<Vec<Hold>> {
        let rows = sqlx::query("SELECT name, reason FROM holds ORDER BY name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| Hold { name: r.get("name"), reason: r.get("reason") }).collect())
    }

    pub async fn add_to_list(&self, kind: ListKind, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO lists (kind, name) VALUES (?, ?)")
            .bind(list_kind_str(kind))
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_from_list(&self, kind: ListKind, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM lists WHERE kind = ? AND name = ?")
            .bind(list_kind_str(kind))
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_members(&self, kind: ListKind) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM lists WHERE kind = ? ORDER BY name")
            .bind(list_kind_str(kind))
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }
}

fn list_kind_str(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Blacklist => "blacklist",
        ListKind::Redlist => "redlist",
    }
}
