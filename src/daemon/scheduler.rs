//! The maintenance scheduler (spec §4.5): a cooperative loop running fixed
//! tasks at their configured intervals on one task, handing network I/O and
//! catalog writes to `await` points rather than spawning a thread per task.
//! A task that fails logs and retries at its next tick; it never blocks the
//! HTTP API, which runs on its own task.

use std::collections::HashSet;

use tokio::time::{interval, Duration};

use crate::cache::{CacheEntry, PackageCache};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::errors::Result;
use crate::model::Nevra;

use super::refresh;

const CACHE_CHECK_INTERVAL: Duration = Duration::from_secs(600);

pub struct Scheduler {
    catalog: Catalog,
    config: &'static Config,
}

impl Scheduler {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog, config: Config::global() }
    }

    /// Run forever, interleaving the fixed tasks. Never returns under normal
    /// operation; a panic inside one task is caught by the `select!` branch
    /// returning control to the loop rather than unwinding it.
    pub async fn run(self) {
        let mut refresh_tick = interval(self.config.refresh_interval);
        let mut peer_stale_tick = interval(self.config.peer_stale_after);
        let mut cache_tick = interval(CACHE_CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = refresh_tick.tick() => self.refresh_all_media().await,
                _ = peer_stale_tick.tick() => self.evict_stale_peers().await,
                _ = cache_tick.tick() => self.enforce_cache_quotas().await,
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn refresh_all_media(&self) {
        let media = match self.catalog.list_media().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list media for scheduled refresh");
                return;
            }
        };

        let refreshes = media.iter().filter(|m| m.enabled && m.update).map(|m| async move {
            let result = refresh::refresh_media(&self.catalog, &m.name).await;
            (m.name.clone(), result)
        });
        for (name, result) in futures::future::join_all(refreshes).await {
            if let Err(e) = result {
                tracing::warn!(media = %name, error = %e, "scheduled metadata refresh failed, retrying next interval");
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn evict_stale_peers(&self) {
        let stale_after = chrono::Duration::from_std(self.config.peer_stale_after).unwrap_or(chrono::Duration::minutes(5));
        match self.catalog.evict_stale_peers(chrono::Utc::now(), stale_after).await {
            Ok(removed) if !removed.is_empty() => tracing::info!(?removed, "evicted stale peers"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "stale-peer eviction failed"),
        }
    }

    /// Two-phase cache eviction (spec §4.4, §4.5): NEVRAs no longer offered
    /// by the media go first, then oldest-accessed among the rest. Held
    /// package names are never evicted in either phase.
    #[tracing::instrument(skip(self))]
    async fn enforce_cache_quotas(&self) {
        let media = match self.catalog.list_media().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list media for cache eviction");
                return;
            }
        };
        let held: HashSet<String> = match self.catalog.list_holds().await {
            Ok(h) => h.into_iter().map(|hold| hold.name).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list holds for cache eviction");
                return;
            }
        };

        for m in &media {
            let Some(quota) = m.quota_bytes else { continue };
            let cache = PackageCache::new(self.config.package_cache_dir(&m.shortid));
            if let Err(e) = self.evict_media_cache(&cache, &m.name, quota, &held).await {
                tracing::warn!(media = %m.name, error = %e, "cache eviction failed for media");
            }
        }
    }

    async fn evict_media_cache(&self, cache: &PackageCache, media: &str, quota: u64, held: &HashSet<String>) -> Result<()> {
        let mut usage = cache.usage_bytes().await?;
        if usage <= quota {
            return Ok(());
        }

        let catalogued: HashSet<Nevra> = self.catalog.nevras_for_media(media).await?.into_iter().collect();
        let mut entries = cache.entries().await?;
        entries.sort_by_key(|e| e.accessed);

        for entry in entries.iter().filter(|e| !stem_is_catalogued(&e.nevra_stem, &catalogued)) {
            if usage <= quota {
                break;
            }
            if is_held(&entry.nevra_stem, &catalogued, held) {
                continue;
            }
            usage = usage.saturating_sub(entry.size);
            self.remove_cache_entry(cache, entry).await;
        }

        for entry in entries.iter().filter(|e| stem_is_catalogued(&e.nevra_stem, &catalogued)) {
            if usage <= quota {
                break;
            }
            if is_held(&entry.nevra_stem, &catalogued, held) {
                continue;
            }
            usage = usage.saturating_sub(entry.size);
            self.remove_cache_entry(cache, entry).await;
        }

        Ok(())
    }

    async fn remove_cache_entry(&self, cache: &PackageCache, entry: &CacheEntry) {
        let path = cache.dir().join(format!("{}.rpm", entry.nevra_stem));
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = ?path, error = %e, "failed to evict cache entry");
        }
    }
}

fn stem_is_catalogued(stem: &str, catalogued: &HashSet<Nevra>) -> bool {
    catalogued.iter().any(|n| n.to_string() == stem)
}

fn is_held(stem: &str, catalogued: &HashSet<Nevra>, held: &HashSet<String>) -> bool {
    catalogued.iter().any(|n| n.to_string() == stem && held.contains(&n.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_matching_is_exact_not_prefix() {
        let mut set = HashSet::new();
        set.insert(Nevra::new("bash", 0, "5.2", "1", "x86_64"));
        assert!(stem_is_catalogued(&Nevra::new("bash", 0, "5.2", "1", "x86_64").to_string(), &set));
        assert!(!stem_is_catalogued(&Nevra::new("bash-completion", 0, "5.2", "1", "noarch").to_string(), &set));
    }
}
