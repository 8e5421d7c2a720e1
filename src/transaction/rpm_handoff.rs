//! Handoff to the RPM transaction engine (spec §4.4). The RPM library
//! itself is out of scope (spec §1) — this module models the contract as a
//! trait so the engine and its tests don't depend on a concrete executor.

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::Nevra;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransactionPhase {
    Prepare,
    Install,
    Remove,
    Cleanup,
}

/// One progress tick streamed during handoff.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ProgressEvent {
    pub nevra: Option<Nevra>,
    pub phase: TransactionPhase,
    pub percent: f32,
    pub message: String,
}

/// What to do to the RPM database, in the order `transaction_build`
/// produced (install/upgrade dependency-first, erase dependent-first).
#[derive(Clone, Debug, Default)]
pub struct RpmPlan {
    pub to_install: Vec<(Nevra, std::path::PathBuf)>,
    pub to_upgrade: Vec<(Nevra, std::path::PathBuf)>,
    pub to_erase: Vec<Nevra>,
}

/// The RPM database handoff contract. A real implementation wraps the RPM
/// library's transaction set; it is the engine's only non-catalog side
/// effect, so every other unit can be tested against a double.
#[async_trait]
pub trait RpmTransactionExecutor: Send + Sync {
    async fn execute(
        &self,
        plan: &RpmPlan,
        progress: tokio::sync::mpsc::Sender<ProgressEvent>,
    ) -> Result<()>;
}

/// Default executor: verifies each staged artifact's RPM header matches the
/// NEVRA the resolver planned for it, then stops — the real transaction
/// (file placement, scriptlets, RPM database commit) is the RPM library's
/// job and out of scope here. "Shells out to nothing on its own."
#[derive(Default)]
pub struct NullExecutor;

#[async_trait]
impl RpmTransactionExecutor for NullExecutor {
    async fn execute(&self, plan: &RpmPlan, progress: tokio::sync::mpsc::Sender<ProgressEvent>) -> Result<()> {
        let _ = progress
            .send(ProgressEvent { nevra: None, phase: TransactionPhase::Prepare, percent: 0.0, message: "verifying staged artifacts".into() })
            .await;

        for (nevra, path) in plan.to_install.iter().chain(plan.to_upgrade.iter()) {
            verify_header_matches(nevra, path)?;
        }

        let _ = progress
            .send(ProgressEvent { nevra: None, phase: TransactionPhase::Cleanup, percent: 100.0, message: "verified, no-op commit".into() })
            .await;
        Ok(())
    }
}

fn verify_header_matches(nevra: &Nevra, path: &std::path::Path) -> Result<()> {
    let package = rpm::Package::open(path)
        .map_err(|e| crate::errors::Error::Transaction(format!("failed to read RPM header for {nevra}: {e}")))?;
    let meta = &package.metadata;
    let header_name = meta
        .get_name()
        .map_err(|e| crate::errors::Error::Transaction(format!("missing name tag in {path:?}: {e}")))?;
    if header_name != nevra.name.as_str() {
        return Err(crate::errors::Error::Transaction(format!(
            "staged artifact {path:?} has header name {header_name}, expected {}",
            nevra.name
        )));
    }
    Ok(())
}

/// Test double used by the property tests in spec §8: records what it was
/// asked to do and always succeeds.
#[derive(Default)]
pub struct RecordingExecutor {
    pub executed: std::sync::Mutex<Vec<RpmPlan>>,
}

#[async_trait]
impl RpmTransactionExecutor for RecordingExecutor {
    async fn execute(&self, plan: &RpmPlan, progress: tokio::sync::mpsc::Sender<ProgressEvent>) -> Result<()> {
        let _ = progress
            .send(ProgressEvent {
                nevra: None,
                phase: TransactionPhase::Prepare,
                percent: 0.0,
                message: "preparing transaction set".into(),
            })
            .await;

        for (nevra, _path) in &plan.to_install {
            let _ = progress
                .send(ProgressEvent {
                    nevra: Some(nevra.clone()),
                    phase: TransactionPhase::Install,
                    percent: 50.0,
                    message: format!("installing {nevra}"),
                })
                .await;
        }
        for (nevra, _path) in &plan.to_upgrade {
            let _ = progress
                .send(ProgressEvent {
                    nevra: Some(nevra.clone()),
                    phase: TransactionPhase::Install,
                    percent: 50.0,
                    message: format!("upgrading {nevra}"),
                })
                .await;
        }
        for nevra in &plan.to_erase {
            let _ = progress
                .send(ProgressEvent {
                    nevra: Some(nevra.clone()),
                    phase: TransactionPhase::Remove,
                    percent: 75.0,
                    message: format!("removing {nevra}"),
                })
                .await;
        }

        let _ = progress
            .send(ProgressEvent { nevra: None, phase: TransactionPhase::Cleanup, percent: 100.0, message: "done".into() })
            .await;

        self.executed.lock().expect("executor mutex poisoned").push(plan.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_executor_streams_every_phase() {
        let executor = RecordingExecutor::default();
        let plan = RpmPlan {
            to_install: vec![(Nevra::new("vim", 0, "9.0", "1", "x86_64"), "/tmp/vim.rpm".into())],
            to_upgrade: vec![],
            to_erase: vec![Nevra::new("vim-tiny", 0, "1.0", "1", "x86_64")],
        };
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        executor.execute(&plan, tx).await.unwrap();

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            phases.push(event.phase);
        }
        assert_eq!(
            phases,
            vec![
                TransactionPhase::Prepare,
                TransactionPhase::Install,
                TransactionPhase::Remove,
                TransactionPhase::Cleanup,
            ]
        );
        assert_eq!(executor.executed.lock().unwrap().len(), 1);
    }
}
