//! Process-wide configuration, parsed once at startup and handed through a
//! context record — never read back from ambient globals except for the
//! one `OnceLock`, which mirrors the teacher's `config.rs`.

use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;

pub static CONFIG: OnceLock<Config> = OnceLock::new();

fn default_catalog_path() -> PathBuf {
    if Config::development_mode() {
        PathBuf::from("/var/lib/urpm-dev/packages.db")
    } else {
        PathBuf::from("/var/lib/urpm/packages.db")
    }
}

fn default_pid_path() -> PathBuf {
    if Config::development_mode() {
        std::env::temp_dir().join("urpmd-dev.pid")
    } else {
        PathBuf::from("/run/urpmd.pid")
    }
}

/// Daemon + engine configuration. Every field is overridable by flag or env
/// var (`clap`'s `env` attribute), matching the teacher's convention.
#[derive(Parser, Debug, Clone)]
#[command(name = "urpmd", about = "RPM media package manager daemon")]
pub struct Config {
    /// Run in development mode: alternate ports, paths, and pid file.
    #[clap(long, env = "URPM_DEV_MODE")]
    pub dev_mode: bool,

    /// Address the HTTP control API listens on.
    #[clap(long, env = "URPM_LISTEN_ADDR", default_value = "127.0.0.1:9876")]
    pub listen_addr: String,

    /// UDP discovery port (9878 production / 9879 development by convention).
    #[clap(long, env = "URPM_DISCOVERY_PORT")]
    pub discovery_port: Option<u16>,

    /// Path to the SQLite catalog database.
    #[clap(long, env = "URPM_CATALOG_PATH")]
    pub catalog_path: Option<PathBuf>,

    /// Root of the on-disk package cache (`<root>/packages/<media-shortid>/`).
    #[clap(long, env = "URPM_CACHE_DIR", default_value = "/var/cache/urpm")]
    pub cache_dir: PathBuf,

    /// Pid file path.
    #[clap(long, env = "URPM_PID_FILE")]
    pub pid_file: Option<PathBuf>,

    /// Legacy `urpmi.cfg`-style media configuration, imported on demand.
    #[clap(long, env = "URPM_LEGACY_CONFIG", default_value = "/etc/urpmi/urpmi.cfg")]
    pub legacy_config_path: PathBuf,

    /// Bounded download worker pool size.
    #[clap(long, env = "URPM_DOWNLOAD_WORKERS", default_value_t = 4)]
    pub download_workers: usize,

    /// Peer query timeout.
    #[clap(long, env = "URPM_PEER_TIMEOUT", default_value = "2s", value_parser = humantime::parse_duration)]
    pub peer_timeout: std::time::Duration,

    /// Interval between stale-peer sweeps.
    #[clap(long, env = "URPM_PEER_STALE_AFTER", default_value = "5min", value_parser = humantime::parse_duration)]
    pub peer_stale_after: std::time::Duration,

    /// Metadata refresh interval for the scheduler.
    #[clap(long, env = "URPM_REFRESH_INTERVAL", default_value = "6h", value_parser = humantime::parse_duration)]
    pub refresh_interval: std::time::Duration,
}

impl Config {
    /// Whether the process was started in development mode. Read directly
    /// from the environment so path defaults (computed before `CONFIG` is
    /// populated) can depend on it.
    pub fn development_mode() -> bool {
        std::env::var("URPM_DEV_MODE").map(|v| v == "1" || v == "true").unwrap_or(false)
    }

    pub fn init() -> Self {
        dotenvy::dotenv().ok();
        let cfg = Self::parse();
        CONFIG.set(cfg.clone()).expect("config already initialized");
        cfg
    }

    pub fn global() -> &'static Config {
        CONFIG.get().expect("config not initialized")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path.clone().unwrap_or_else(default_catalog_path)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.pid_file.clone().unwrap_or_else(default_pid_path)
    }

    pub fn discovery_port(&self) -> u16 {
        self.discovery_port.unwrap_or(if self.dev_mode { 9879 } else { 9878 })
    }

    pub fn package_cache_dir(&self, media_shortid: &str) -> PathBuf {
        self.cache_dir.join("packages").join(media_shortid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_port_follows_dev_mode() {
        let mut cfg = Config::parse_from(["urpmd"]);
        assert_eq!(cfg.discovery_port(), 9878);
        cfg.dev_mode = true;
        assert_eq!(cfg.discovery_port(), 9879);
    }

    #[test]
    fn package_cache_dir_is_scoped_per_media() {
        let cfg = Config::parse_from(["urpmd", "--cache-dir", "/tmp/urpm-test"]);
        assert_eq!(
            cfg.package_cache_dir("core"),
            PathBuf::from("/tmp/urpm-test/packages/core")
        );
    }
}
