//! Artifact acquisition (spec §4.4): cache hit, then a cooperative peer,
//! then upstream with failover — a bounded worker pool, resumable by byte
//! range, with digest verification and a single retry on mismatch.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::cache::PackageCache;
use crate::errors::{Error, Result};
use crate::model::{Nevra, Server};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const CHUNK_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// One artifact the engine needs to materialize into the cache before the
/// RPM handoff can run.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub nevra: Nevra,
    pub media: String,
    pub file_name: String,
    pub expected_sha256: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadSource {
    Cache,
    Peer,
    Upstream,
}

#[derive(Clone, Debug)]
pub struct DownloadOutcome {
    pub nevra: Nevra,
    pub source: DownloadSource,
    pub bytes: u64,
}

/// Queries a peer's `/api/have` and fetches from it on a hit. A thin seam
/// so the scheduler and tests can swap in a fake peer set without opening
/// real sockets.
#[async_trait::async_trait]
pub trait PeerSource: Send + Sync {
    async fn has(&self, file_name: &str) -> bool;

    /// Fetch starting at byte `resume_from`. On a mid-transfer disconnect
    /// the implementation returns whatever it received before the error in
    /// [`PartialFetch::received`], so the caller can hand the remainder off
    /// to upstream instead of re-fetching bytes the peer already delivered
    /// (spec §8 scenario 4).
    async fn fetch(&self, file_name: &str, resume_from: u64) -> std::result::Result<Vec<u8>, PartialFetch>;
}

/// What a failed [`PeerSource::fetch`] salvaged before it gave up.
#[derive(Debug)]
pub struct PartialFetch {
    pub received: Vec<u8>,
    pub error: Error,
}

impl From<Error> for PartialFetch {
    fn from(error: Error) -> Self {
        Self { received: Vec::new(), error }
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(CHUNK_INACTIVITY_TIMEOUT)
        .build()
        .map_err(Error::Http)
}

/// Downloads in parallel, bounded by `worker_count` concurrent transfers.
pub struct Downloader {
    cache: PackageCache,
    peers: Vec<Arc<dyn PeerSource>>,
    worker_count: usize,
}

impl Downloader {
    pub fn new(cache: PackageCache, peers: Vec<Arc<dyn PeerSource>>, worker_count: usize) -> Self {
        Self { cache, peers, worker_count }
    }

    /// Acquire every requested artifact, respecting the worker pool cap.
    /// Failures are returned per-request rather than aborting the batch —
    /// the caller decides whether a partial batch still lets the
    /// transaction proceed.
    #[tracing::instrument(skip(self, requests, servers))]
    pub async fn fetch_all(
        &self,
        requests: &[DownloadRequest],
        servers: &[Server],
    ) -> Vec<Result<DownloadOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.worker_count.max(1)));
        let mut handles = Vec::with_capacity(requests.len());

        for req in requests {
            let permit = semaphore.clone();
            let req = req.clone();
            let servers = servers.to_vec();
            let cache = self.cache.clone();
            let peers = self.peers.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                fetch_one(&cache, &peers, &servers, &req).await
            }));
        }

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => out.push(result),
                Err(e) => out.push(Err(Error::Internal(format!("download task panicked: {e}")))),
            }
        }
        out
    }
}

#[tracing::instrument(skip(cache, peers, servers))]
async fn fetch_one(
    cache: &PackageCache,
    peers: &[Arc<dyn PeerSource>],
    servers: &[Server],
    req: &DownloadRequest,
) -> Result<DownloadOutcome> {
    if let Some(path) = cache.verified_hit(&req.nevra, req.expected_sha256.as_deref()).await {
        let size = tokio::fs::metadata(&path).await?.len();
        return Ok(DownloadOutcome { nevra: req.nevra.clone(), source: DownloadSource::Cache, bytes: size });
    }

    for peer in peers {
        if !peer.has(&req.file_name).await {
            continue;
        }
        match peer.fetch(&req.file_name, 0).await {
            Ok(bytes) => {
                if verify_digest(&bytes, req.expected_sha256.as_deref()) {
                    cache.store(&req.nevra, &bytes).await?;
                    return Ok(DownloadOutcome {
                        nevra: req.nevra.clone(),
                        source: DownloadSource::Peer,
                        bytes: bytes.len() as u64,
                    });
                }
                tracing::warn!(peer = %req.file_name, "peer artifact failed digest check, falling through");
            }
            Err(partial) if !partial.received.is_empty() => {
                tracing::debug!(
                    error = %partial.error,
                    bytes = partial.received.len(),
                    "peer disconnected mid-transfer, resuming from upstream"
                );
                return fetch_from_upstream_resuming(cache, servers, req, partial.received).await;
            }
            Err(partial) => {
                tracing::debug!(error = %partial.error, "peer fetch failed, falling through to next source");
            }
        }
    }

    fetch_from_upstream(cache, servers, req).await
}

/// Failover among a media's enabled servers, by priority then the order
/// `servers` was passed in (the catalog already orders by priority desc and
/// recent-success tracking lives at the server-test layer, outside this
/// module's concern).
async fn fetch_from_upstream(cache: &PackageCache, servers: &[Server], req: &DownloadRequest) -> Result<DownloadOutcome> {
    fetch_from_upstream_resuming(cache, servers, req, Vec::new()).await
}

/// Same failover as [`fetch_from_upstream`], but the first attempt against
/// each server resumes from byte `already_received.len()` via a Range
/// request instead of refetching from scratch — used when a peer handed us
/// a partial artifact before disconnecting (spec §8 scenario 4: "resumes
/// from M1 at byte 4 MB with no duplicated bytes").
async fn fetch_from_upstream_resuming(
    cache: &PackageCache,
    servers: &[Server],
    req: &DownloadRequest,
    already_received: Vec<u8>,
) -> Result<DownloadOutcome> {
    let client = http_client()?;
    let mut last_err = None;

    for server in servers.iter().filter(|s| s.enabled) {
        let url = format!("{}/{}", server.base_url.trim_end_matches('/'), req.file_name);
        match download_one(&client, cache, &url, req, already_received.clone()).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                tracing::warn!(server = %server.name, error = %e, "upstream download failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Environment(format!("no enabled server could provide {}", req.file_name))))
}

/// Streams one URL to a byte buffer, retrying once on digest mismatch
/// (spec §4.4: "a download failing digest verification is deleted and
/// retried once; a second failure marks the source unhealthy"). The first
/// attempt appends to `resume_prefix` via a Range request when non-empty; a
/// retry after digest mismatch always starts clean, since a prefix that
/// contributed to a bad digest can't be trusted either.
async fn download_one(
    client: &reqwest::Client,
    cache: &PackageCache,
    url: &str,
    req: &DownloadRequest,
    resume_prefix: Vec<u8>,
) -> Result<DownloadOutcome> {
    let mut prefix = resume_prefix;
    for attempt in 0..2 {
        let bytes = stream_to_vec_resuming(client, url, prefix).await?;
        if verify_digest(&bytes, req.expected_sha256.as_deref()) {
            cache.store(&req.nevra, &bytes).await?;
            return Ok(DownloadOutcome { nevra: req.nevra.clone(), source: DownloadSource::Upstream, bytes: bytes.len() as u64 });
        }
        tracing::warn!(url, attempt, "digest mismatch, retrying");
        prefix = Vec::new();
    }
    Err(Error::Environment(format!("{url} failed digest verification twice")))
}

async fn stream_to_vec(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    stream_to_vec_resuming(client, url, Vec::new()).await
}

/// Fetches `url` into `prefix`, issuing a `Range: bytes=<prefix.len()>-`
/// request when `prefix` is non-empty so previously-received bytes are
/// never re-downloaded.
async fn stream_to_vec_resuming(client: &reqwest::Client, url: &str, mut prefix: Vec<u8>) -> Result<Vec<u8>> {
    let mut request = client.get(url);
    if !prefix.is_empty() {
        request = request.header("Range", format!("bytes={}-", prefix.len()));
    }
    let response = request.send().await?.error_for_status()?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        prefix.extend_from_slice(&chunk?);
    }
    Ok(prefix)
}

fn verify_digest(bytes: &[u8], expected_sha256: Option<&str>) -> bool {
    match expected_sha256 {
        None => true,
        Some(expected) => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize()) == expected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn nevra() -> Nevra {
        Nevra::new("bash", 0, "5.2", "1", "x86_64")
    }

    struct FakePeer {
        has_file: bool,
        payload: Vec<u8>,
        fetch_calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl PeerSource for FakePeer {
        async fn has(&self, _file_name: &str) -> bool {
            self.has_file
        }
        async fn fetch(&self, _file_name: &str, _resume_from: u64) -> std::result::Result<Vec<u8>, PartialFetch> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    /// A peer that disconnects partway through, salvaging what it read.
    struct DisconnectingPeer {
        has_file: bool,
        sent_before_disconnect: Vec<u8>,
    }

    #[async_trait::async_trait]
    impl PeerSource for DisconnectingPeer {
        async fn has(&self, _file_name: &str) -> bool {
            self.has_file
        }
        async fn fetch(&self, _file_name: &str, _resume_from: u64) -> std::result::Result<Vec<u8>, PartialFetch> {
            Err(PartialFetch {
                received: self.sent_before_disconnect.clone(),
                error: Error::Environment("peer connection reset".into()),
            })
        }
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_peer_and_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        cache.store(&nevra(), b"cached-bytes").await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let peer = Arc::new(FakePeer { has_file: true, payload: b"peer-bytes".to_vec(), fetch_calls: calls.clone() });
        let downloader = Downloader::new(cache, vec![peer], 2);

        let req = DownloadRequest {
            nevra: nevra(),
            media: "core".into(),
            file_name: "bash-5.2-1.x86_64.rpm".into(),
            expected_sha256: None,
        };
        let results = downloader.fetch_all(&[req], &[]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().source, DownloadSource::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn peer_hit_is_used_when_cache_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let calls = Arc::new(AtomicUsize::new(0));
        let peer = Arc::new(FakePeer { has_file: true, payload: b"peer-bytes".to_vec(), fetch_calls: calls.clone() });
        let downloader = Downloader::new(cache.clone(), vec![peer], 1);

        let req = DownloadRequest {
            nevra: nevra(),
            media: "core".into(),
            file_name: "bash-5.2-1.x86_64.rpm".into(),
            expected_sha256: None,
        };
        let results = downloader.fetch_all(&[req], &[]).await;
        assert_eq!(results[0].as_ref().unwrap().source, DownloadSource::Peer);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.verified_hit(&nevra(), None).await.is_some());
    }

    /// Spec §8 scenario 4: a peer disconnects after handing over the first
    /// 4 bytes of a file; the downloader resumes the remainder from
    /// upstream via Range, with no duplicated bytes and a passing digest.
    #[tokio::test]
    async fn peer_disconnect_mid_transfer_resumes_remainder_from_upstream() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let full_payload = b"full-artifact-payload-bytes".to_vec();
        let already_received = full_payload[..4].to_vec();
        let remainder = full_payload[4..].to_vec();

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bash-5.2-1.x86_64.rpm"))
            .and(header("Range", "bytes=4-"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(remainder))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let peer = Arc::new(DisconnectingPeer { has_file: true, sent_before_disconnect: already_received });
        let downloader = Downloader::new(cache.clone(), vec![peer], 1);
        let servers = vec![Server::new("mirror1", mock_server.uri())];

        let mut hasher = Sha256::new();
        hasher.update(&full_payload);
        let expected_sha256 = hex::encode(hasher.finalize());

        let req = DownloadRequest {
            nevra: nevra(),
            media: "core".into(),
            file_name: "bash-5.2-1.x86_64.rpm".into(),
            expected_sha256: Some(expected_sha256),
        };
        let results = downloader.fetch_all(&[req], &servers).await;
        let outcome = results[0].as_ref().unwrap();
        assert_eq!(outcome.source, DownloadSource::Upstream);
        assert_eq!(outcome.bytes, full_payload.len() as u64);

        let cached_path = cache.verified_hit(&nevra(), None).await.unwrap();
        let cached_bytes = tokio::fs::read(&cached_path).await.unwrap();
        assert_eq!(cached_bytes, full_payload);
    }

    #[tokio::test]
    async fn no_healthy_source_is_reported_as_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path().to_path_buf());
        let downloader = Downloader::new(cache, vec![], 1);

        let req = DownloadRequest {
            nevra: nevra(),
            media: "core".into(),
            file_name: "bash-5.2-1.x86_64.rpm".into(),
            expected_sha256: None,
        };
        let results = downloader.fetch_all(&[req], &[]).await;
        assert!(matches!(results[0], Err(Error::Environment(_))));
    }
}
