//! Metadata refresh (spec §4.1, §4.5): pull a media's synthesis blob from
//! its highest-priority enabled server and diff-import it. Shared by the
//! `/api/refresh` handler and the scheduler's periodic tick.

use std::time::Duration;

use crate::catalog::Catalog;
use crate::errors::{Error, Result};
use crate::metadata;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Refresh one media by name, trying its enabled servers in priority order
/// until one succeeds.
#[tracing::instrument(skip(catalog))]
pub async fn refresh_media(catalog: &Catalog, media_name: &str) -> Result<metadata::ImportOutcome> {
    let media = catalog.media(media_name).await?.ok_or(Error::NotFound)?;
    let servers = catalog.servers_for_media(media_name).await?;
    let client = reqwest::ClientBuilder::new().connect_timeout(CONNECT_TIMEOUT).build().map_err(Error::Http)?;

    let mut last_err = None;
    for server in servers.iter().filter(|s| s.enabled) {
        let url = format!("{}/media_info/synthesis.hdlist.cz", server.base_url.trim_end_matches('/'));
        match fetch_and_import(&client, catalog, &media.name, &url).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                tracing::warn!(server = %server.name, error = %e, "metadata refresh failed, trying next server");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Environment(format!("no enabled server for media {media_name}"))))
}

async fn fetch_and_import(client: &reqwest::Client, catalog: &Catalog, media: &str, url: &str) -> Result<metadata::ImportOutcome> {
    let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
    let decoded = metadata::decode_any(&bytes).await?;
    let text = String::from_utf8_lossy(&decoded);
    metadata::import_synthesis(catalog, media, &text).await
}
