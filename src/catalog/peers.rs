//! LAN peer bookkeeping (spec §5): who's discovered, what they serve, and
//! stale-eviction for peers that stopped announcing themselves.

use sqlx::Row;

use super::Catalog;
use crate::errors::Result;
use crate::model::{Peer, PeerMode};

impl Catalog {
    pub async fn upsert_peer(&self, peer: &Peer) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO peers
                (machine_id, host, port, distro_release, arch, served_media, mode, last_seen, blacklisted)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&peer.machine_id)
        .bind(peer.host.to_string())
        .bind(peer.port as i64)
        .bind(&peer.distro_release)
        .bind(&peer.arch)
        .bind(serde_json::to_string(&peer.served_media).unwrap_or_default())
        .bind(mode_str(peer.mode))
        .bind(peer.last_seen.to_rfc3339())
        .bind(peer.blacklisted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_peers(&self) -> Result<Vec<Peer>> {
        let rows = sqlx::query("SELECT * FROM peers ORDER BY machine_id").fetch_all(&self.pool).await?;
        rows.iter().map(peer_from_row).collect()
    }

    /// Evict every peer whose `last_seen` is older than `stale_after`,
    /// returning the machine ids removed.
    pub async fn evict_stale_peers(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        stale_after: chrono::Duration,
    ) -> Result<Vec<String>> {
        let cutoff = (now - stale_after).to_rfc3339();
        let removed: Vec<String> = sqlx::query_scalar("SELECT machine_id FROM peers WHERE last_seen < ?")
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await?;
        sqlx::query("DELETE FROM peers WHERE last_seen < ?").bind(&cutoff).execute(&self.pool).await?;
        Ok(removed)
    }

    pub async fn set_peer_blacklisted(&self, machine_id: &str, blacklisted: bool) -> Result<()> {
        sqlx::query("UPDATE peers SET blacklisted = ? WHERE machine_id = ?")
            .bind(blacklisted)
            .bind(machine_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn mode_str(mode: PeerMode) -> &'static str {
    match mode {
        PeerMode::Production => "production",
        PeerMode::Development => "development",
    }
}

fn peer_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Peer> {
    let mode = match row.get::<String, _>("mode").as_str() {
        "development" => PeerMode::Development,
        _ => PeerMode::Production,
    };
    let host = row
        .get::<String, _>("host")
        .parse()
        .map_err(|e| crate::errors::Error::Internal(format!("bad peer host address: {e}")))?;
    let last_seen = chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("last_seen"))
        .map_err(|e| crate::errors::Error::Internal(format!("bad peer last_seen timestamp: {e}")))?
        .with_timezone(&chrono::Utc);
    Ok(Peer {
        machine_id: row.get("machine_id"),
        host,
        port: row.get::<i64, _>("port") as u16,
        distro_release: row.get("distro_release"),
        arch: row.get("arch"),
        served_media: row.get::<Option<String>, _>("served_media").and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
        mode,
        last_seen,
        blacklisted: row.get("blacklisted"),
    })
}
