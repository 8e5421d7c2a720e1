//! Resolver input: the job list a front-end translates user verbs into
//! (spec §4.3).

use crate::model::Capability;

/// What a job's target names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    Name(String),
    File(String),
    Capability(Capability),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpgradeTarget {
    Name(String),
    All,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    Install(Selector),
    Erase(String),
    Upgrade(UpgradeTarget),
    DistUpgrade,
}

impl Job {
    /// Human-readable job description for error reporting
    /// (`unsatisfiable(job, ...)` in spec §4.3's failure modes).
    pub fn describe(&self) -> String {
        match self {
            Job::Install(Selector::Name(n)) => format!("install {n}"),
            Job::Install(Selector::File(f)) => format!("install {f}"),
            Job::Install(Selector::Capability(c)) => format!("install {c}"),
            Job::Erase(n) => format!("erase {n}"),
            Job::Upgrade(UpgradeTarget::Name(n)) => format!("upgrade {n}"),
            Job::Upgrade(UpgradeTarget::All) => "upgrade".to_string(),
            Job::DistUpgrade => "distupgrade".to_string(),
        }
    }
}
