//! The daemon: a small local HTTP API, LAN peer discovery, and a
//! cooperative maintenance scheduler (spec §4.5).

pub mod api;
pub mod discovery;
pub mod peer_client;
pub mod refresh;
pub mod scheduler;

use std::sync::Arc;

use crate::cache::PackageCache;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::errors::Result;

/// Shared state handed to every request handler. Cheap to clone (an sqlx
/// pool handle plus a small id string).
#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub machine_id: Arc<str>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Loads the persisted machine id, minting and storing a fresh one on
    /// first run (spec §6: "machine id (stable UUID)" — we use a ULID, the
    /// same id style the teacher already depends on).
    pub async fn new(catalog: Catalog) -> Result<Self> {
        let machine_id = match catalog.get_config("machine_id").await? {
            Some(id) => id,
            None => {
                let id = ulid::Ulid::new().to_string();
                catalog.set_config("machine_id", &id).await?;
                id
            }
        };
        Ok(Self { catalog, machine_id: machine_id.into(), started_at: chrono::Utc::now() })
    }

    pub fn cache_for(&self, media_shortid: &str) -> PackageCache {
        PackageCache::new(Config::global().package_cache_dir(media_shortid))
    }
}
