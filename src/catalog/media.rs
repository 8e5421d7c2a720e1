//! Media and server rows (spec §3, §4.2): the logical-repository / mirror
//! configuration that drives every sync and resolve operation.

use sqlx::Row;

use super::Catalog;
use crate::errors::{Error, Result};
use crate::model::{IpMode, Media, ReplicationPolicy, Server};

impl Catalog {
    pub async fn upsert_media(&self, media: &Media) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO media
                (name, shortid, enabled, update_eligible, priority, replication,
                 seed_sections, quota_bytes, retention_days, sync_files, shared_with_peers)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&media.name)
        .bind(&media.shortid)
        .bind(media.enabled)
        .bind(media.update)
        .bind(media.priority)
        .bind(replication_str(media.replication))
        .bind(serde_json::to_string(&media.seed_sections).unwrap_or_default())
        .bind(media.quota_bytes.map(|v| v as i64))
        .bind(media.retention_days.map(|v| v as i64))
        .bind(media.sync_files)
        .bind(media.shared_with_peers)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM media_servers WHERE media = ?").bind(&media.name).execute(&mut *tx).await?;
        for server in &media.servers {
            sqlx::query("INSERT OR IGNORE INTO media_servers (media, server) VALUES (?, ?)")
                .bind(&media.name)
                .bind(server)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_media(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM media WHERE name = ?").bind(name).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn media(&self, name: &str) -> Result<Option<Media>> {
        let row = sqlx::query("SELECT * FROM media WHERE name = ?").bind(name).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(self.media_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_media(&self) -> Result<Vec<Media>> {
        let rows = sqlx::query("SELECT * FROM media ORDER BY priority DESC, name").fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.media_from_row(row).await?);
        }
        Ok(out)
    }

    async fn media_from_row(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Media> {
        let name: String = row.get("name");
        let servers: Vec<String> = sqlx::query_scalar("SELECT server FROM media_servers WHERE media = ?")
            .bind(&name)
            .fetch_all(&self.pool)
            .await?;
        Ok(Media {
            name,
            shortid: row.get("shortid"),
            enabled: row.get("enabled"),
            update: row.get("update_eligible"),
            priority: row.get("priority"),
            replication: replication_from_str(row.get("replication")),
            seed_sections: row
                .get::<Option<String>, _>("seed_sections")
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            quota_bytes: row.get::<Option<i64>, _>("quota_bytes").map(|v| v as u64),
            retention_days: row.get::<Option<i64>, _>("retention_days").map(|v| v as u32),
            sync_files: row.get("sync_files"),
            shared_with_peers: row.get("shared_with_peers"),
            servers,
        })
    }

    pub async fn upsert_server(&self, server: &Server) -> Result<()> {
        url::Url::parse(&server.base_url)
            .map_err(|e| Error::User(format!("server {} has an invalid base_url: {e}", server.name)))?;
        sqlx::query(
            "INSERT OR REPLACE INTO servers (name, base_url, enabled, priority, ip_mode, last_test_status)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&server.name)
        .bind(&server.base_url)
        .bind(server.enabled)
        .bind(server.priority)
        .bind(server.ip_mode.to_string())
        .bind(&server.last_test_status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn servers_for_media(&self, media: &str) -> Result<Vec<Server>> {
        let rows = sqlx::query(
            "SELECT s.* FROM servers s
             JOIN media_servers ms ON ms.server = s.name
             WHERE ms.media = ?
             ORDER BY s.priority DESC",
        )
        .bind(media)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| server_from_row(&r)).collect())
    }
}

fn replication_str(policy: ReplicationPolicy) -> &'static str {
    match policy {
        ReplicationPolicy::None => "none",
        ReplicationPolicy::OnDemand => "on-demand",
        ReplicationPolicy::Seed => "seed",
        ReplicationPolicy::Full => "full",
    }
}

fn replication_from_str(s: String) -> ReplicationPolicy {
    match s.as_str() {
        "seed" => ReplicationPolicy::Seed,
        "full" => ReplicationPolicy::Full,
        "none" => ReplicationPolicy::None,
        _ => ReplicationPolicy::OnDemand,
    }
}

fn server_from_row(row: &sqlx::sqlite::SqliteRow) -> Server {
    let ip_mode = match row.get::<String, _>("ip_mode").as_str() {
        "v4" => IpMode::V4,
        "v6" => IpMode::V6,
        "dual" => IpMode::Dual,
        _ => IpMode::Auto,
    };
    Server {
        name: row.get("name"),
        base_url: row.get("base_url"),
        enabled: row.get("enabled"),
        priority: row.get("priority"),
        ip_mode,
        last_test_status: row.get("last_test_status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_list_round_trips() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let mut m = Media::new("Core Release", "core");
        m.servers.push("mirror1".into());
        catalog.upsert_server(&Server::new("mirror1", "https://mirror.example/core")).await.unwrap();
        catalog.upsert_media(&m).await.unwrap();

        let loaded = catalog.media("Core Release").await.unwrap().unwrap();
        assert_eq!(loaded.shortid, "core");
        assert_eq!(loaded.servers, vec!["mirror1".to_string()]);

        let servers = catalog.servers_for_media("Core Release").await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].base_url, "https://mirror.example/core");
    }

    #[tokio::test]
    async fn upsert_server_rejects_invalid_base_url() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let result = catalog.upsert_server(&Server::new("broken", "not a url")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn remove_media_drops_it_from_listing() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.upsert_media(&Media::new("Core Release", "core")).await.unwrap();
        catalog.remove_media("Core Release").await.unwrap();
        assert!(catalog.media("Core Release").await.unwrap().is_none());
    }
}
