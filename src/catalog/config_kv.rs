//! Misc persisted settings that don't warrant their own table (spec §3):
//! last peer-discovery timestamp, machine id, and similar singletons.

use super::Catalog;
use crate::errors::Result;

impl Catalog {
    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO config_kv (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM config_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.set_config("machine_id", "01ARZ3NDEKTSV4RRFFQ69G5FAV").await.unwrap();
        assert_eq!(catalog.get_config("machine_id").await.unwrap().as_deref(), Some("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
        assert_eq!(catalog.get_config("missing").await.unwrap(), None);
    }
}
