//! On-disk package artifact cache: `<base>/cache/packages/<media-shortid>/<NEVRA>.rpm`.
//!
//! This is the local half of §4.4's artifact acquisition order — step 1,
//! "local cache hit (verified by stored digest)". Adapted from the teacher's
//! `Cache` (which fronted an S3 object store); there is no remote backing
//! store here, artifacts arrive via the downloader in `transaction::download`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::model::Nevra;

/// The local package cache for one media.
#[derive(Debug, Clone)]
pub struct PackageCache {
    dir: PathBuf,
}

impl PackageCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, nevra: &Nevra) -> PathBuf {
        self.dir.join(format!("{nevra}.rpm"))
    }

    /// Cache hit verified against a stored digest, per §4.4 step 1.
    pub async fn verified_hit(&self, nevra: &Nevra, expected_sha256: Option<&str>) -> Option<PathBuf> {
        let path = self.path_for(nevra);
        if !tokio::fs::metadata(&path).await.is_ok() {
            return None;
        }
        match expected_sha256 {
            Some(expected) => {
                let actual = Self::sha256_of(&path).await.ok()?;
                (actual == expected).then_some(path)
            }
            None => Some(path),
        }
    }

    pub async fn sha256_of(path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    pub async fn store(&self, nevra: &Nevra, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.path_for(nevra);
        tokio::fs::write(&dest, bytes).await?;
        Ok(dest)
    }

    pub async fn remove(&self, nevra: &Nevra) -> Result<()> {
        let path = self.path_for(nevra);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Total bytes currently occupied by this media's cache directory.
    pub async fn usage_bytes(&self) -> Result<u64> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            walkdir::WalkDir::new(&dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum()
        })
        .await
        .map_err(|e| crate::errors::Error::Internal(e.to_string()))
    }

    /// List every `<NEVRA>.rpm` currently cached, with its last-access time
    /// (used by the eviction task's "oldest-first among installed-already
    /// files" phase).
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            walkdir::WalkDir::new(&dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let meta = e.metadata().ok()?;
                    let accessed = meta.accessed().ok()?;
                    let stem = e.path().file_stem()?.to_str()?.to_string();
                    Some(CacheEntry { nevra_stem: stem, size: meta.len(), accessed: accessed.into() })
                })
                .collect()
        })
        .await
        .map_err(|e| crate::errors::Error::Internal(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub nevra_stem: String,
    pub size: u64,
    pub accessed: std::time::SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nevra() -> Nevra {
        Nevra::new("bash", 0, "5.2", "1.fc41", "x86_64")
    }

    #[tokio::test]
    async fn store_then_verified_hit_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let n = nevra();
        cache.store(&n, b"rpm-bytes").await.unwrap();

        let digest = PackageCache::sha256_of(&cache.path_for(&n)).await.unwrap();
        let hit = cache.verified_hit(&n, Some(&digest)).await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn digest_mismatch_is_not_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let n = nevra();
        cache.store(&n, b"rpm-bytes").await.unwrap();

        let hit = cache.verified_hit(&n, Some("deadbeef")).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn missing_entry_is_not_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        assert!(cache.verified_hit(&nevra(), None).await.is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let n = nevra();
        cache.store(&n, b"x").await.unwrap();
        cache.remove(&n).await.unwrap();
        cache.remove(&n).await.unwrap();
    }
}
