//! Transaction history entries, holds, and blacklists.

use super::nevra::Nevra;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HistoryAction {
    Install,
    Upgrade,
    Erase,
    Autoremove,
    Undo,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Erase => "erase",
            Self::Autoremove => "autoremove",
            Self::Undo => "undo",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HistoryStatus {
    InProgress,
    Complete,
    Failed,
    RolledBack,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::RolledBack => "rolled-back",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Added,
    Removed,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AffectedPackage {
    pub nevra: Nevra,
    pub direction: Direction,
}

/// A row in the transaction history. `id` is a strictly increasing sequence
/// assigned by the catalog store.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub action: HistoryAction,
    pub status: HistoryStatus,
    pub affected: Vec<AffectedPackage>,
    pub command_line: String,
    pub user: String,
    pub return_code: Option<i32>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Hold {
    pub name: String,
    pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ListKind {
    Blacklist,
    Redlist,
}
