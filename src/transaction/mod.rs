//! Transaction engine (spec §4.4): resolver output in, RPM database handoff
//! out. Ties artifact acquisition, the RPM handoff contract, and history
//! recording together; each of those stays independently testable behind
//! its own trait or pure function.

pub mod download;
pub mod history;
pub mod rpm_handoff;
pub mod undo;

pub use download::{DownloadOutcome, DownloadRequest, DownloadSource, Downloader, PartialFetch, PeerSource};
pub use rpm_handoff::{NullExecutor, ProgressEvent, RecordingExecutor, RpmPlan, RpmTransactionExecutor, TransactionPhase};
pub use undo::{rollback_n_plan, rollback_to_plan, undo_jobs, RollbackStep};

use crate::cache::PackageCache;
use crate::catalog::Catalog;
use crate::errors::{Error, Result};
use crate::model::{HistoryAction, Server};
use crate::resolver;

/// Bundles everything one call to `run` needs to take a solved resolver
/// transaction all the way to a recorded history entry.
pub struct TransactionEngine<E: RpmTransactionExecutor> {
    catalog: Catalog,
    cache: PackageCache,
    downloader: Downloader,
    executor: E,
}

impl<E: RpmTransactionExecutor> TransactionEngine<E> {
    pub fn new(catalog: Catalog, cache: PackageCache, downloader: Downloader, executor: E) -> Self {
        Self { catalog, cache, downloader, executor }
    }

    /// Acquire artifacts, hand off to RPM, record history. A failure at
    /// either the acquisition or handoff stage marks the history entry
    /// `failed` rather than leaving it `in-progress` forever.
    #[tracing::instrument(skip(self, plan, requests, servers, progress))]
    pub async fn run(
        &self,
        plan: &resolver::Transaction,
        requests: &[DownloadRequest],
        servers: &[Server],
        action: HistoryAction,
        command_line: &str,
        user: &str,
        progress: tokio::sync::mpsc::Sender<ProgressEvent>,
    ) -> Result<i64> {
        let affected = history::affected_from_transaction(plan);
        let history_id = history::begin(&self.catalog, action, command_line, user).await?;

        let downloads = self.downloader.fetch_all(requests, servers).await;
        if let Some(Err(e)) = downloads.iter().find(|r| r.is_err()) {
            let message = format!("artifact acquisition failed: {e}");
            history::fail(&self.catalog, history_id, &affected, &message).await?;
            return Err(Error::Transaction(message));
        }

        let rpm_plan = self.build_rpm_plan(plan);
        if let Err(e) = self.executor.execute(&rpm_plan, progress).await {
            history::fail(&self.catalog, history_id, &affected, &e.to_string()).await?;
            return Err(e);
        }

        history::complete(&self.catalog, history_id, &affected).await?;
        Ok(history_id)
    }

    fn build_rpm_plan(&self, tx: &resolver::Transaction) -> RpmPlan {
        RpmPlan {
            to_install: tx.to_install.iter().map(|n| (n.clone(), self.cache.path_for(n))).collect(),
            to_upgrade: tx.to_upgrade.iter().map(|n| (n.clone(), self.cache.path_for(n))).collect(),
            to_erase: tx.to_erase.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Nevra;

    #[tokio::test]
    async fn run_records_history_on_success_with_no_downloads() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let downloader = Downloader::new(cache.clone(), vec![], 1);
        let engine = TransactionEngine::new(catalog.clone(), cache, downloader, RecordingExecutor::default());

        let plan = resolver::Transaction {
            to_install: vec![Nevra::new("vim", 0, "9.0", "1", "x86_64")],
            to_upgrade: vec![],
            to_erase: vec![],
            skipped: vec![],
        };
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let id = engine.run(&plan, &[], &[], HistoryAction::Install, "urpmi vim", "root", tx).await.unwrap();

        let entry = catalog.history_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, crate::model::HistoryStatus::Complete);
        assert_eq!(entry.affected.len(), 1);
    }

    #[tokio::test]
    async fn run_fails_history_entry_when_artifact_acquisition_fails() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let downloader = Downloader::new(cache.clone(), vec![], 1);
        let engine = TransactionEngine::new(catalog.clone(), cache, downloader, RecordingExecutor::default());

        let plan = resolver::Transaction {
            to_install: vec![Nevra::new("vim", 0, "9.0", "1", "x86_64")],
            to_upgrade: vec![],
            to_erase: vec![],
            skipped: vec![],
        };
        let requests = vec![DownloadRequest {
            nevra: Nevra::new("vim", 0, "9.0", "1", "x86_64"),
            media: "core".into(),
            file_name: "vim-9.0-1.x86_64.rpm".into(),
            expected_sha256: None,
        }];
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let result = engine.run(&plan, &requests, &[], HistoryAction::Install, "urpmi vim", "root", tx).await;
        assert!(result.is_err());

        let recent = catalog.recent_history(1).await.unwrap();
        assert_eq!(recent[0].status, crate::model::HistoryStatus::Failed);
    }
}
