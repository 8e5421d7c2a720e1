use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use urpm_core::catalog::Catalog;
use urpm_core::config::Config;
use urpm_core::daemon::{self, AppState};
use urpm_core::model::PeerMode;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    color_eyre::install().ok();

    let cfg = Config::init();
    let catalog = Catalog::connect(&cfg.catalog_path()).await.expect("failed to open catalog");
    let state = AppState::new(catalog.clone()).await.expect("failed to initialize daemon state");

    let self_mode = if cfg.dev_mode { PeerMode::Development } else { PeerMode::Production };
    let discovery_port = cfg.discovery_port();

    let socket = match daemon::discovery::bind(discovery_port).await {
        Ok(s) => Some(Arc::new(s)),
        Err(e) => {
            tracing::warn!(port = discovery_port, error = %e, "failed to bind discovery socket, peer discovery disabled");
            None
        }
    };

    if let Some(socket) = socket.clone() {
        let recv_catalog = catalog.clone();
        tokio::spawn(async move {
            if let Err(e) = daemon::discovery::receive_loop(socket, recv_catalog, self_mode).await {
                tracing::error!(error = %e, "discovery receive loop exited");
            }
        });
    }

    if let Some(socket) = socket {
        let machine_id = state.machine_id.to_string();
        let listen_port = listen_port(&cfg.listen_addr);
        let announce_catalog = catalog.clone();
        tokio::spawn(async move {
            // Jitter the first tick so peers that started at the same time
            // (a freshly-imaged fleet booting together) don't all announce
            // in lockstep.
            let startup_jitter = rand::thread_rng().gen_range(0..5_000);
            tokio::time::sleep(std::time::Duration::from_millis(startup_jitter)).await;

            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tick.tick().await;
                let served_media = announce_catalog
                    .list_media()
                    .await
                    .map(|media| media.into_iter().filter(|m| m.shared_with_peers).map(|m| m.name).collect())
                    .unwrap_or_default();
                let announcement = daemon::discovery::Announcement {
                    machine_id: machine_id.clone(),
                    port: listen_port,
                    distro_release: distro_release(),
                    arch: std::env::consts::ARCH.to_string(),
                    served_media,
                    served_package_count: announce_catalog.load_all_packages().await.map(|p| p.len() as u64).unwrap_or(0),
                    development_mode: cfg.dev_mode,
                };
                daemon::discovery::announce_once(&socket, &announcement, discovery_port).await;
            }
        });
    }

    tokio::spawn(daemon::scheduler::Scheduler::new(catalog.clone()).run());

    let app = daemon::api::router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await.expect("failed to bind listen address");
    tracing::info!(addr = %cfg.listen_addr, "urpmd listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server error");
}

fn listen_port(listen_addr: &str) -> u16 {
    listen_addr.rsplit_once(':').and_then(|(_, port)| port.parse().ok()).unwrap_or(9876)
}

/// Best-effort distro release string for the discovery announcement; a real
/// deployment would read this from the RPM database, which is out of scope
/// here (spec §1).
fn distro_release() -> String {
    std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|contents| {
            contents.lines().find_map(|line| line.strip_prefix("VERSION_ID=").map(|v| v.trim_matches('"').to_string()))
        })
        .unwrap_or_else(|| "unknown".to_string())
}
