//! History recording around a handoff (spec §4.4): an `in-progress` entry
//! written before the RPM handoff starts, moved to a terminal status after —
//! always in its own transaction, never batched with other catalog writes.

use crate::catalog::Catalog;
use crate::errors::Result;
use crate::model::{AffectedPackage, Direction, HistoryAction, HistoryStatus};
use crate::resolver::Transaction;

/// Derive the affected-package list a history entry records from a solved
/// transaction: installs/upgrades are `Added`, erases are `Removed`.
pub fn affected_from_transaction(tx: &Transaction) -> Vec<AffectedPackage> {
    tx.to_install
        .iter()
        .chain(tx.to_upgrade.iter())
        .map(|n| AffectedPackage { nevra: n.clone(), direction: Direction::Added })
        .chain(tx.to_erase.iter().map(|n| AffectedPackage { nevra: n.clone(), direction: Direction::Removed }))
        .collect()
}

/// Open an `in-progress` history row for a transaction about to be handed
/// off to RPM.
pub async fn begin(catalog: &Catalog, action: HistoryAction, command_line: &str, user: &str) -> Result<i64> {
    catalog.begin_history_entry(action, command_line, user).await
}

/// Mark a history entry `complete`, recording the final affected-package
/// list (spec §8 invariant 1: this set must equal what the RPM database
/// actually ended up with).
pub async fn complete(catalog: &Catalog, id: i64, affected: &[AffectedPackage]) -> Result<()> {
    catalog.finish_history_entry(id, HistoryStatus::Complete, affected, Some(0), None).await
}

pub async fn fail(catalog: &Catalog, id: i64, affected: &[AffectedPackage], error: &str) -> Result<()> {
    catalog.finish_history_entry(id, HistoryStatus::Failed, affected, Some(1), Some(error)).await
}
