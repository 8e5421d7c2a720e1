//! Undo and rollback (spec §4.4): inverting a past transaction into a fresh
//! job list the resolver re-solves, so dependency drift since that entry is
//! caught rather than blindly replayed.

use crate::model::{CapOp, Capability, Direction, HistoryEntry};
use crate::resolver::{Job, Selector};

/// One step of a multi-entry rollback: which history entry it inverts, and
/// the job list to hand the resolver for it.
#[derive(Clone, Debug)]
pub struct RollbackStep {
    pub history_id: i64,
    pub jobs: Vec<Job>,
}

/// Invert one history entry: packages it added become erase jobs; packages
/// it removed become install jobs pinned to the exact NEVRA recorded, so
/// the resolver reinstalls precisely what was there before, not just
/// whatever the media currently offers under that name.
pub fn undo_jobs(entry: &HistoryEntry) -> Vec<Job> {
    entry
        .affected
        .iter()
        .map(|affected| match affected.direction {
            Direction::Added => Job::Erase(affected.nevra.name.clone()),
            Direction::Removed => Job::Install(Selector::Capability(Capability::versioned(
                affected.nevra.name.clone(),
                CapOp::Eq,
                affected.nevra.evr().to_string(),
            ))),
        })
        .collect()
}

/// `rollback n`: sequential undo of the last `n` entries, newest first.
/// `history` must already be ordered newest-first (as
/// [`crate::catalog::Catalog::recent_history`] returns it).
pub fn rollback_n_plan(history: &[HistoryEntry], n: usize) -> Vec<RollbackStep> {
    history.iter().take(n).map(|entry| RollbackStep { history_id: entry.id, jobs: undo_jobs(entry) }).collect()
}

/// `rollback to T`: undo every entry newer than `target`, newest first, so
/// replaying them in order reaches the state recorded at `target`.
pub fn rollback_to_plan(history: &[HistoryEntry], target: chrono::DateTime<chrono::Utc>) -> Vec<RollbackStep> {
    history
        .iter()
        .filter(|entry| entry.timestamp > target)
        .map(|entry| RollbackStep { history_id: entry.id, jobs: undo_jobs(entry) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AffectedPackage, HistoryAction, HistoryStatus, Nevra};
    use chrono::TimeZone;

    fn entry(id: i64, minute: u32, affected: Vec<AffectedPackage>) -> HistoryEntry {
        HistoryEntry {
            id,
            timestamp: chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap(),
            action: HistoryAction::Install,
            status: HistoryStatus::Complete,
            affected,
            command_line: "urpmi vim".into(),
            user: "root".into(),
            return_code: Some(0),
            error: None,
        }
    }

    #[test]
    fn undo_install_produces_erase_jobs() {
        let e = entry(
            42,
            0,
            vec![
                AffectedPackage { nevra: Nevra::new("vim", 0, "9.0", "1", "x86_64"), direction: Direction::Added },
                AffectedPackage {
                    nevra: Nevra::new("vim-common", 0, "9.0", "1", "x86_64"),
                    direction: Direction::Added,
                },
            ],
        );
        let jobs = undo_jobs(&e);
        assert_eq!(jobs, vec![Job::Erase("vim".to_string()), Job::Erase("vim-common".to_string())]);
    }

    #[test]
    fn undo_erase_produces_exact_version_install_job() {
        let e = entry(
            7,
            0,
            vec![AffectedPackage {
                nevra: Nevra::new("dhcp-client", 0, "4.4", "1", "x86_64"),
                direction: Direction::Removed,
            }],
        );
        let jobs = undo_jobs(&e);
        match &jobs[0] {
            Job::Install(Selector::Capability(cap)) => {
                assert_eq!(cap.name, "dhcp-client");
                assert_eq!(cap.op, CapOp::Eq);
                assert_eq!(cap.evr.as_deref(), Some("0:4.4-1"));
            }
            other => panic!("expected a pinned install job, got {other:?}"),
        }
    }

    #[test]
    fn rollback_n_plan_is_newest_first_and_capped() {
        let history = vec![entry(3, 2, vec![]), entry(2, 1, vec![]), entry(1, 0, vec![])];
        let plan = rollback_n_plan(&history, 2);
        assert_eq!(plan.iter().map(|s| s.history_id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn rollback_to_plan_stops_at_target_timestamp() {
        let history = vec![entry(3, 2, vec![]), entry(2, 1, vec![]), entry(1, 0, vec![])];
        let target = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        let plan = rollback_to_plan(&history, target);
        assert_eq!(plan.iter().map(|s| s.history_id).collect::<Vec<_>>(), vec![3]);
    }
}
