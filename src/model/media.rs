//! Media (logical repository) and Server (mirror endpoint) entities.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IpMode {
    Auto,
    V4,
    V6,
    Dual,
}

impl fmt::Display for IpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::V4 => "v4",
            Self::V6 => "v6",
            Self::Dual => "dual",
        };
        write!(f, "{s}")
    }
}

/// A reachable mirror endpoint. `name` is unique; a server may serve many media.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Server {
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub priority: i32,
    pub ip_mode: IpMode,
    pub last_test_status: Option<String>,
}

impl Server {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            enabled: true,
            priority: 0,
            ip_mode: IpMode::Auto,
            last_test_status: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReplicationPolicy {
    None,
    OnDemand,
    Seed,
    Full,
}

/// A logical repository the user subscribes to, e.g. "Core Release".
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Media {
    pub name: String,
    pub shortid: String,
    pub enabled: bool,
    pub update: bool,
    pub priority: i32,
    pub replication: ReplicationPolicy,
    pub seed_sections: Vec<String>,
    pub quota_bytes: Option<u64>,
    pub retention_days: Option<u32>,
    pub sync_files: bool,
    pub shared_with_peers: bool,
    pub servers: Vec<String>,
}

impl Media {
    pub fn new(name: impl Into<String>, shortid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shortid: shortid.into(),
            enabled: true,
            update: true,
            priority: 0,
            replication: ReplicationPolicy::OnDemand,
            seed_sections: Vec::new(),
            quota_bytes: None,
            retention_days: None,
            sync_files: false,
            shared_with_peers: true,
            servers: Vec::new(),
        }
    }
}

/// Per-media bookkeeping for deciding full-rebuild vs. differential import.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileIndexState {
    pub media: String,
    pub raw_md5: Option<String>,
    pub file_count: u64,
    pub package_count: u64,
    pub compressed_size: u64,
    pub last_sync: Option<chrono::DateTime<chrono::Utc>>,
}
