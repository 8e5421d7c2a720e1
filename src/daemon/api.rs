//! The daemon's local HTTP API (spec §6). No auth on the read endpoints;
//! the write endpoints trust whoever can reach the listen address (loopback
//! by default) — matching the teacher's "local trust, no bearer tokens on
//! the control plane" posture.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::discovery::Announcement;
use super::AppState;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::model::{Media, Nevra, Package, Peer, PeerMode};
use crate::resolver::{self, Job, Options, Selector};
use crate::transaction::{self, DownloadRequest, Downloader, NullExecutor, TransactionEngine};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/ping", get(ping))
        .route("/api/status", get(status))
        .route("/api/media", get(media_list))
        .route("/api/available", get(available).post(available))
        .route("/api/updates", get(updates).post(updates))
        .route("/api/peers", get(peers))
        .route("/api/refresh", post(refresh))
        .route("/api/announce", post(announce))
        .route("/api/have", post(have))
        .route("/api/request-download", post(request_download))
        .route("/api/transact", post(transact))
        .route("/api/rollback", post(rollback))
        .route("/cache/{media}/{file_name}", get(serve_cached_file))
        .with_state(state)
}

async fn root() -> &'static str {
    "urpmd: RPM media package manager daemon"
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Serialize)]
struct StatusResponse {
    machine_id: String,
    uptime_seconds: i64,
    dev_mode: bool,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let uptime = chrono::Utc::now() - state.started_at;
    Json(StatusResponse {
        machine_id: state.machine_id.to_string(),
        uptime_seconds: uptime.num_seconds().max(0),
        dev_mode: Config::global().dev_mode,
    })
}

async fn media_list(State(state): State<AppState>) -> Result<Json<Vec<Media>>> {
    Ok(Json(state.catalog.list_media().await?))
}

#[derive(Deserialize, Default)]
struct AvailableQuery {
    #[serde(default)]
    name_prefix: Option<String>,
}

/// Registered on both GET and POST: a JSON body is the natural way to pass
/// a filter on a local-trust JSON API, GET-with-body included.
async fn available(State(state): State<AppState>, body: Option<Json<AvailableQuery>>) -> Result<Json<Vec<Package>>> {
    let query = body.map(|Json(q)| q).unwrap_or_default();
    let all = state.catalog.load_all_packages().await?;
    let filtered = match query.name_prefix {
        Some(prefix) => all.into_iter().filter(|p| p.nevra.name.starts_with(prefix.as_str())).collect(),
        None => all,
    };
    Ok(Json(filtered))
}

#[derive(Deserialize, Default)]
struct UpdatesQuery {
    /// The caller's installed set — the real RPM database is out of scope
    /// here, so whoever asks "what's new" has to say what it already has.
    #[serde(default)]
    installed: Vec<Nevra>,
}

#[derive(Serialize)]
struct UpdateCandidate {
    installed: Nevra,
    candidate: Nevra,
}

async fn updates(State(state): State<AppState>, body: Option<Json<UpdatesQuery>>) -> Result<Json<Vec<UpdateCandidate>>> {
    let query = body.map(|Json(q)| q).unwrap_or_default();
    let catalogued = state.catalog.load_all_packages().await?;

    let mut out = Vec::new();
    for nevra in &query.installed {
        let newest = catalogued
            .iter()
            .filter(|p| p.nevra.name == nevra.name && p.nevra.evr() > nevra.evr())
            .max_by(|a, b| a.nevra.evr().cmp(&b.nevra.evr()));
        if let Some(newest) = newest {
            out.push(UpdateCandidate { installed: nevra.clone(), candidate: newest.nevra.clone() });
        }
    }
    Ok(Json(out))
}

async fn peers(State(state): State<AppState>) -> Result<Json<Vec<Peer>>> {
    Ok(Json(state.catalog.list_peers().await?))
}

#[derive(Deserialize)]
struct RefreshRequest {
    media: String,
}

#[derive(Serialize)]
struct RefreshResponse {
    inserted: usize,
    deleted: usize,
    bulk: bool,
}

async fn refresh(State(state): State<AppState>, Json(req): Json<RefreshRequest>) -> Result<Json<RefreshResponse>> {
    let outcome = super::refresh::refresh_media(&state.catalog, &req.media).await?;
    Ok(Json(RefreshResponse { inserted: outcome.inserted, deleted: outcome.deleted, bulk: outcome.bulk }))
}

/// Peer announcement receiver, for machines that can't reach us over UDP
/// broadcast (different subnet, discovery disabled) but still want to be
/// known. Mirrors what `discovery::receive_loop` does for broadcast
/// packets.
async fn announce(
    State(state): State<AppState>,
    ConnectInfo(from): ConnectInfo<SocketAddr>,
    Json(announcement): Json<Announcement>,
) -> Result<&'static str> {
    let self_mode = if Config::global().dev_mode { PeerMode::Development } else { PeerMode::Production };
    let peer_mode = if announcement.development_mode { PeerMode::Development } else { PeerMode::Production };
    if peer_mode != self_mode {
        return Err(Error::User("peer mode mismatch".to_string()));
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
    state.catalog.upsert_peer(&peer).await?;
    Ok("ok")
}

#[derive(Deserialize)]
struct HaveRequest {
    media: String,
    file_names: Vec<String>,
}

#[derive(Serialize)]
struct HaveResponse {
    available: Vec<String>,
}

/// Cooperative-download existence probe (spec §4.5): checked against the
/// requesting media's cache directory by the file's stored name, which is
/// always `<NEVRA>.rpm` (see [`crate::cache::PackageCache::path_for`]).
async fn have(State(state): State<AppState>, Json(req): Json<HaveRequest>) -> Json<HaveResponse> {
    let cache = state.cache_for(&req.media);
    let mut available = Vec::new();
    for name in req.file_names {
        if tokio::fs::try_exists(cache.dir().join(&name)).await.unwrap_or(false) {
            available.push(name);
        }
    }
    Json(HaveResponse { available })
}

/// Serves a cached artifact's raw bytes to a cooperating peer. `file_name`
/// must be exactly the stored `<NEVRA>.rpm` name; no directory traversal is
/// possible since the path is joined against the media's own cache root and
/// the name is taken verbatim (no `..`-escaping component is ever written
/// there by [`crate::cache::PackageCache::store`]).
async fn serve_cached_file(State(state): State<AppState>, Path((media, file_name)): Path<(String, String)>) -> Result<Vec<u8>> {
    if file_name.contains('/') || file_name.contains("..") {
        return Err(Error::User("invalid cache file name".to_string()));
    }
    let cache = state.cache_for(&media);
    tokio::fs::read(cache.dir().join(&file_name)).await.map_err(|_| Error::NotFound)
}

#[derive(Deserialize)]
struct RequestDownloadRequest {
    media: String,
    nevras: Vec<Nevra>,
}

#[derive(Serialize)]
struct RequestDownloadResponse {
    accepted: usize,
}

/// Predictive pre-download (spec §4.5): schedules background fetches into
/// this daemon's own cache for the given media, so a future `/api/have`
/// probe from the asking peer turns into a hit. Returns immediately; the
/// fetch itself runs detached.
async fn request_download(
    State(state): State<AppState>,
    Json(req): Json<RequestDownloadRequest>,
) -> Result<Json<RequestDownloadResponse>> {
    let cache = state.cache_for(&req.media);
    let servers = state.catalog.servers_for_media(&req.media).await?;
    let mut accepted = 0;

    for nevra in req.nevras {
        if cache.verified_hit(&nevra, None).await.is_some() {
            continue;
        }
        let downloader = Downloader::new(cache.clone(), vec![], 1);
        let servers = servers.clone();
        let file_name = format!("{nevra}.rpm");
        tokio::spawn(async move {
            let request = DownloadRequest { nevra, media: req.media.clone(), file_name, expected_sha256: None };
            let results = downloader.fetch_all(&[request], &servers).await;
            if let Some(Err(e)) = results.into_iter().next() {
                tracing::debug!(error = %e, "predictive pre-download failed");
            }
        });
        accepted += 1;
    }

    Ok(Json(RequestDownloadResponse { accepted }))
}

#[derive(Deserialize)]
struct TransactRequest {
    jobs: Vec<TransactJob>,
    /// Stand-in for the real RPM database (out of scope, spec §1): the
    /// caller supplies what it already has installed, by NEVRA. The
    /// resolver only needs identity and version from these, never their
    /// provides/conflicts graph — that's why a bare NEVRA is enough here
    /// even though `Pool::build` wants full `Package` records.
    #[serde(default)]
    installed: Vec<Nevra>,
    #[serde(default)]
    options: TransactOptions,
    command_line: String,
    user: String,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TransactJob {
    Install { name: String },
    Erase { name: String },
    Upgrade { name: String },
    UpgradeAll,
    DistUpgrade,
}

#[derive(Deserialize, Default)]
struct TransactOptions {
    #[serde(default)]
    auto: bool,
    #[serde(default)]
    nodeps: bool,
    #[serde(default)]
    allow_downgrade: bool,
}

#[derive(Serialize)]
struct TransactResponse {
    history_id: i64,
    to_install: Vec<Nevra>,
    to_upgrade: Vec<Nevra>,
    to_erase: Vec<Nevra>,
}

/// Install/remove/upgrade orchestration (spec §4.5): resolve, then run the
/// solved transaction through the engine with a no-op RPM executor (the RPM
/// library itself is out of scope, spec §1 — a real deployment swaps in an
/// executor that actually invokes it).
async fn transact(State(state): State<AppState>, Json(req): Json<TransactRequest>) -> Result<Json<TransactResponse>> {
    let catalogued = state.catalog.load_all_packages().await?;
    let installed: Vec<Package> = req
        .installed
        .iter()
        .map(|n| crate::model::PackageBuilder { nevra: Some(n.clone()), media: "installed".into(), ..Default::default() }.build().expect("nevra is set"))
        .collect();
    let pool = resolver::Pool::build(catalogued, installed);

    let jobs: Vec<Job> = req
        .jobs
        .into_iter()
        .map(|j| match j {
            TransactJob::Install { name } => Job::Install(resolver::Selector::Name(name)),
            TransactJob::Erase { name } => Job::Erase(name),
            TransactJob::Upgrade { name } => Job::Upgrade(resolver::UpgradeTarget::Name(name)),
            TransactJob::UpgradeAll => Job::Upgrade(resolver::UpgradeTarget::All),
            TransactJob::DistUpgrade => Job::DistUpgrade,
        })
        .collect();

    let opts = Options {
        auto: req.options.auto,
        nodeps: req.options.nodeps,
        allow_downgrade: req.options.allow_downgrade,
        ..Options::default()
    };
    let plan = resolver::solve(&pool, &jobs, &opts)?;

    let history_action = infer_history_action(&jobs);
    // Single-cache assumption: every artifact this transaction needs is
    // fetched against one media's cache and server list. Multi-media
    // transactions would need a per-package media tag threaded through the
    // resolver's `Transaction`, which spec §4.3 does not carry.
    let media = primary_media(&pool, &plan);
    let cache = state.cache_for(&media);
    let servers = state.catalog.servers_for_media(&media).await?;
    let downloader = Downloader::new(cache.clone(), vec![], Config::global().download_workers);
    let engine = TransactionEngine::new(state.catalog.clone(), cache, downloader, NullExecutor);

    let requests = build_download_requests(&plan, &media);
    let (tx, _rx) = tokio::sync::mpsc::channel(16);
    let history_id =
        engine.run(&plan, &requests, &servers, history_action, &req.command_line, &req.user, tx).await?;

    Ok(Json(TransactResponse {
        history_id,
        to_install: plan.to_install,
        to_upgrade: plan.to_upgrade,
        to_erase: plan.to_erase,
    }))
}

fn primary_media(pool: &resolver::Pool, plan: &resolver::Transaction) -> String {
    plan.to_install
        .iter()
        .chain(plan.to_upgrade.iter())
        .find_map(|n| pool.by_name(&n.name).iter().map(|&id| pool.get(id)).find(|p| p.nevra == *n).map(|p| p.media.clone()))
        .unwrap_or_else(|| "core".to_string())
}

fn infer_history_action(jobs: &[Job]) -> crate::model::HistoryAction {
    use crate::model::HistoryAction;
    match jobs.first() {
        Some(Job::Erase(_)) => HistoryAction::Erase,
        Some(Job::Upgrade(_)) | Some(Job::DistUpgrade) => HistoryAction::Upgrade,
        _ => HistoryAction::Install,
    }
}

#[derive(Deserialize)]
struct RollbackRequest {
    /// Undo the last `n` history entries, newest first.
    #[serde(default)]
    n: Option<usize>,
    /// Undo every history entry newer than this timestamp.
    #[serde(default)]
    to: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    installed: Vec<Nevra>,
    command_line: String,
    user: String,
}

#[derive(Serialize)]
struct RollbackResponse {
    history_ids: Vec<i64>,
}

/// `rollback n` / `rollback to T` (spec §4.4): each inverted history entry
/// is re-solved and run through the engine as its own transaction, newest
/// first, so dependency drift since that entry is caught rather than
/// blindly replayed. A step that would reinstall an exact NEVRA no longer
/// offered by any media aborts the whole rollback instead of silently
/// installing whatever the media currently has under that name.
async fn rollback(State(state): State<AppState>, Json(req): Json<RollbackRequest>) -> Result<Json<RollbackResponse>> {
    let history = state.catalog.recent_history(200).await?;
    let steps = match (req.n, req.to) {
        (Some(n), _) => transaction::rollback_n_plan(&history, n),
        (None, Some(target)) => transaction::rollback_to_plan(&history, target),
        (None, None) => return Err(Error::User("rollback requires either n or to".into())),
    };

    let catalogued = state.catalog.load_all_packages().await?;
    let mut installed: Vec<Package> = req
        .installed
        .iter()
        .map(|n| crate::model::PackageBuilder { nevra: Some(n.clone()), media: "installed".into(), ..Default::default() }.build().expect("nevra is set"))
        .collect();

    let mut history_ids = Vec::with_capacity(steps.len());
    for step in &steps {
        for job in &step.jobs {
            if let Job::Install(Selector::Capability(cap)) = job {
                ensure_nevra_available(&catalogued, cap)?;
            }
        }

        let pool = resolver::Pool::build(catalogued.clone(), installed.clone());
        let plan = resolver::solve(&pool, &step.jobs, &Options::default())?;

        let media = primary_media(&pool, &plan);
        let cache = state.cache_for(&media);
        let servers = state.catalog.servers_for_media(&media).await?;
        let downloader = Downloader::new(cache.clone(), vec![], Config::global().download_workers);
        let engine = TransactionEngine::new(state.catalog.clone(), cache, downloader, NullExecutor);
        let requests = build_download_requests(&plan, &media);
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let history_id = engine
            .run(&plan, &requests, &servers, crate::model::HistoryAction::Undo, &req.command_line, &req.user, tx)
            .await?;
        history_ids.push(history_id);

        // Carry this step's result forward so the next step (if any)
        // resolves against the state it just produced, not the snapshot
        // from before any rollback step ran.
        installed.retain(|p| !plan.to_erase.contains(&p.nevra));
        for nevra in plan.to_install.iter().chain(plan.to_upgrade.iter()) {
            if let Some(pkg) = catalogued.iter().find(|p| p.nevra == *nevra) {
                installed.push(pkg.clone());
            }
        }
    }

    Ok(Json(RollbackResponse { history_ids }))
}

/// A rollback step that pins an exact NEVRA but finds it offered by no
/// media aborts here with [`Error::NotFound`] rather than falling through
/// to the resolver, which would only report it as unsatisfiable.
fn ensure_nevra_available(catalogued: &[Package], cap: &crate::model::Capability) -> Result<()> {
    let available = catalogued
        .iter()
        .any(|p| p.nevra.name == cap.name && cap.evr.as_deref() == Some(p.nevra.evr().to_string()).as_deref());
    if available {
        Ok(())
    } else {
        Err(Error::NotFound)
    }
}

fn build_download_requests(plan: &resolver::Transaction, media: &str) -> Vec<DownloadRequest> {
    plan.to_install
        .iter()
        .chain(plan.to_upgrade.iter())
        .map(|nevra| DownloadRequest {
            nevra: nevra.clone(),
            media: media.to_string(),
            file_name: format!("{nevra}.rpm"),
            expected_sha256: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CapOp, Capability, Nevra, PackageBuilder};

    fn pkg(name: &str, version: &str, release: &str) -> Package {
        PackageBuilder { nevra: Some(Nevra::new(name, 0, version, release, "x86_64")), media: "core".into(), ..Default::default() }
            .build()
            .unwrap()
    }

    #[test]
    fn ensure_nevra_available_passes_when_exact_evr_present() {
        let catalogued = vec![pkg("dhcp-client", "4.4", "1")];
        let cap = Capability::versioned("dhcp-client", CapOp::Eq, "0:4.4-1");
        assert!(ensure_nevra_available(&catalogued, &cap).is_ok());
    }

    #[test]
    fn ensure_nevra_available_aborts_when_version_no_longer_offered() {
        let catalogued = vec![pkg("dhcp-client", "4.5", "1")];
        let cap = Capability::versioned("dhcp-client", CapOp::Eq, "0:4.4-1");
        assert!(matches!(ensure_nevra_available(&catalogued, &cap), Err(Error::NotFound)));
    }

    #[test]
    fn ensure_nevra_available_aborts_when_package_absent_entirely() {
        let catalogued = vec![pkg("vim", "9.0", "1")];
        let cap = Capability::versioned("dhcp-client", CapOp::Eq, "0:4.4-1");
        assert!(matches!(ensure_nevra_available(&catalogued, &cap), Err(Error::NotFound)));
    }
}
