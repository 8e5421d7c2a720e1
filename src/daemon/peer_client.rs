//! Concrete [`PeerSource`] wrapping the daemon's own HTTP surface on
//! another machine: `/api/have` to probe, `/cache/{media}/{file_name}` to
//! fetch. This is what turns the cooperative-download language in spec §4.5
//! into actual bytes.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::model::Peer;
use crate::transaction::{PartialFetch, PeerSource};

const PEER_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct HaveResponseShape {
    available: Vec<String>,
}

pub struct HttpPeerSource {
    client: reqwest::Client,
    peer: Peer,
    media: String,
}

impl HttpPeerSource {
    pub fn new(peer: Peer, media: impl Into<String>) -> Result<Self> {
        let client = reqwest::ClientBuilder::new().timeout(PEER_TIMEOUT).build().map_err(Error::Http)?;
        Ok(Self { client, peer, media: media.into() })
    }
}

#[async_trait::async_trait]
impl PeerSource for HttpPeerSource {
    async fn has(&self, file_name: &str) -> bool {
        let url = format!("{}/api/have", self.peer.base_url());
        let body = serde_json::json!({ "media": self.media, "file_names": [file_name] });
        let Ok(response) = self.client.post(&url).json(&body).send().await else { return false };
        let Ok(shape) = response.json::<HaveResponseShape>().await else { return false };
        shape.available.iter().any(|f| f == file_name)
    }

    async fn fetch(&self, file_name: &str, resume_from: u64) -> std::result::Result<Vec<u8>, PartialFetch> {
        let url = format!("{}/cache/{}/{}", self.peer.base_url(), self.media, file_name);
        let mut request = self.client.get(&url);
        if resume_from > 0 {
            request = request.header("Range", format!("bytes={resume_from}-"));
        }
        let response = request.send().await.map_err(Error::from)?.error_for_status().map_err(Error::from)?;

        let mut received = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => received.extend_from_slice(&bytes),
                Err(e) => return Err(PartialFetch { received, error: Error::from(e) }),
            }
        }
        Ok(received)
    }
}
