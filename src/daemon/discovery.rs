//! UDP peer discovery (spec §4.5, §6): broadcast an announcement on the
//! discovery port, and separately listen for other machines' announcements
//! to populate the peer table.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use crate::catalog::Catalog;
use crate::errors::Result;
use crate::model::{Peer, PeerMode};

/// What each machine broadcasts on the discovery port (spec §6: "machine
/// id, port, distro release, arch, supported media, served-packages
/// digest"). The digest itself is carried as a count rather than a hash —
/// peers probe `/api/have` for the packages they actually want, so a full
/// content digest here would just be bytes nobody reads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Announcement {
    pub machine_id: String,
    pub port: u16,
    pub distro_release: String,
    pub arch: String,
    pub served_media: Vec<String>,
    pub served_package_count: u64,
    pub development_mode: bool,
}

/// Bind a broadcast-enabled UDP socket on the discovery port.
pub async fn bind(port: u16) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

/// Broadcast one announcement. Best-effort: a send failure is logged and
/// left for the next scheduled tick, never propagated as fatal.
pub async fn announce_once(socket: &UdpSocket, announcement: &Announcement, port: u16) {
    let Ok(payload) = serde_json::to_vec(announcement) else { return };
    let target: SocketAddr = ([255, 255, 255, 255], port).into();
    if let Err(e) = socket.send_to(&payload, target).await {
        tracing::warn!(error = %e, "discovery broadcast failed");
    }
}

/// Listen forever, upserting every announcement from a compatible peer
/// (spec: "a development peer discovers only other development peers").
/// Malformed or incompatible packets are dropped silently; a catalog write
/// failure is logged but does not stop the loop.
#[tracing::instrument(skip(socket, catalog))]
pub async fn receive_loop(socket: std::sync::Arc<UdpSocket>, catalog: Catalog, self_mode: PeerMode) -> Result<()> {
    let mut buf = vec![0u8; 4096];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        let Ok(announcement) = serde_json::from_slice::<Announcement>(&buf[..len]) else {
            tracing::debug!(from = %from, "dropped malformed discovery announcement");
            continue;
        };

        let peer_mode = if announcement.development_mode { PeerMode::Development } else { PeerMode::Production };
        if peer_mode != self_mode {
            continue;
        }

        let peer = Peer {
            machine_id: announcement.machine_id,
            host: from.ip(),
            port: announcement.port,
            distro_release: announcement.distro_release,
            arch: announcement.arch,
            served_media: announcement.served_media,
            mode: peer_mode,
            last_seen: chrono::Utc::now(),
            blacklisted: false,
        };
        if let Err(e) = catalog.upsert_peer(&peer).await {
            tracing::warn!(error = %e, "failed to record discovered peer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_round_trips_through_json() {
        let a = Announcement {
            machine_id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".into(),
            port: 9876,
            distro_release: "42".into(),
            arch: "x86_64".into(),
            served_media: vec!["core-release".into()],
            served_package_count: 1200,
            development_mode: false,
        };
        let bytes = serde_json::to_vec(&a).unwrap();
        let back: Announcement = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.machine_id, a.machine_id);
        assert_eq!(back.served_media, a.served_media);
    }
}
