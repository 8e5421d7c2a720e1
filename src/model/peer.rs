//! LAN peer: another machine cooperating via discovery and the share API.

use std::net::IpAddr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PeerMode {
    Production,
    Development,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Peer {
    pub machine_id: String,
    pub host: IpAddr,
    pub port: u16,
    pub distro_release: String,
    pub arch: String,
    pub served_media: Vec<String>,
    pub mode: PeerMode,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub blacklisted: bool,
}

impl Peer {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn is_stale(&self, now: chrono::DateTime<chrono::Utc>, stale_after: chrono::Duration) -> bool {
        now - self.last_seen > stale_after
    }

    /// A peer in development mode discovers only other development peers.
    pub fn compatible_with(&self, other: &Peer) -> bool {
        self.mode == other.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn peer_at(minute: u32, mode: PeerMode) -> Peer {
        Peer {
            machine_id: "m1".into(),
            host: "127.0.0.1".parse().unwrap(),
            port: 9876,
            distro_release: "42".into(),
            arch: "x86_64".into(),
            served_media: vec![],
            mode,
            last_seen: chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap(),
            blacklisted: false,
        }
    }

    #[test]
    fn staleness_threshold() {
        let p = peer_at(0, PeerMode::Production);
        let now = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 10, 0).unwrap();
        assert!(p.is_stale(now, chrono::Duration::minutes(5)));
        assert!(!p.is_stale(now, chrono::Duration::minutes(20)));
    }

    #[test]
    fn development_peers_only_see_development_peers() {
        let dev = peer_at(0, PeerMode::Development);
        let prod = peer_at(0, PeerMode::Production);
        assert!(!dev.compatible_with(&prod));
        assert!(dev.compatible_with(&peer_at(1, PeerMode::Development)));
    }
}
