//! Legacy `urpmi.cfg` media configuration (spec §6): read-only on import, a
//! flat brace-delimited stanza format predating the catalog's own schema.
//!
//! Format: an optional unnamed global stanza, then one `<name> <url> { ... }`
//! block per media. Statements inside a block are `;`-terminated and are
//! either `key value` pairs or bare flags (`ignore`, `noupdate`, ...).

use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::errors::{Error, Result};
use crate::model::{Media, Server};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyGlobal {
    pub options: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyMediaBlock {
    pub name: String,
    pub url: String,
    pub options: BTreeMap<String, String>,
    pub flags: Vec<String>,
}

/// Parse an entire `urpmi.cfg` text blob.
pub fn parse(text: &str) -> Result<(LegacyGlobal, Vec<LegacyMediaBlock>)> {
    let mut global = None;
    let mut media = Vec::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let Some(open) = rest.find('{') else { break };
        let Some(close) = rest[open..].find('}').map(|i| i + open) else {
            return Err(Error::User("unterminated block in urpmi.cfg".to_string()));
        };
        let header = rest[..open].trim();
        let body = &rest[open + 1..close];

        if header.is_empty() && global.is_none() {
            global = Some(LegacyGlobal { options: parse_options(body) });
        } else {
            let mut parts = header.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or_default().trim().to_string();
            let url = parts.next().unwrap_or_default().trim().to_string();
            if name.is_empty() || url.is_empty() {
                return Err(Error::User(format!("malformed urpmi.cfg media header: {header:?}")));
            }
            let (options, flags) = parse_options_and_flags(body);
            media.push(LegacyMediaBlock { name, url, options, flags });
        }
        rest = &rest[close + 1..];
    }

    Ok((global.unwrap_or_default(), media))
}

fn parse_options(body: &str) -> BTreeMap<String, String> {
    parse_options_and_flags(body).0
}

fn parse_options_and_flags(body: &str) -> (BTreeMap<String, String>, Vec<String>) {
    let mut options = BTreeMap::new();
    let mut flags = Vec::new();
    for stmt in body.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        match stmt.split_once(char::is_whitespace) {
            Some((key, value)) => {
                options.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => flags.push(stmt.to_string()),
        }
    }
    (options, flags)
}

/// Project one parsed block into catalog entities. Legacy config carries one
/// URL per media, unlike the modern many-servers-per-media model, so the
/// server is synthesized with a derived name.
pub fn into_catalog_entities(global: &LegacyGlobal, block: &LegacyMediaBlock) -> (Media, Server) {
    let server_name = format!("{}-legacy", block.name);
    let server = Server::new(server_name.clone(), block.url.clone());

    let mut media = Media::new(block.name.clone(), slugify(&block.name));
    media.servers.push(server_name);
    media.enabled = !block.flags.iter().any(|f| f == "ignore");
    media.update = !block.flags.iter().any(|f| f == "noupdate") && !global.options.contains_key("noupdate");

    (media, server)
}

fn slugify(name: &str) -> String {
    name.to_lowercase().chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }).collect()
}

/// Read and import an entire legacy config file into the catalog, returning
/// the number of media blocks imported.
pub async fn import_legacy_config(catalog: &Catalog, path: &std::path::Path) -> Result<usize> {
    let text = tokio::fs::read_to_string(path).await?;
    let (global, blocks) = parse(&text)?;
    for block in &blocks {
        let (media, server) = into_catalog_entities(&global, block);
        catalog.upsert_server(&server).await?;
        catalog.upsert_media(&media).await?;
    }
    Ok(blocks.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        { excludedocs; verbose 1 }
        Core Release https://mirror.example/core { priority 10 }
        Core Updates https://mirror.example/updates { noupdate; priority 5 }
    "#;

    #[test]
    fn parses_global_and_media_blocks() {
        let (global, blocks) = parse(SAMPLE).unwrap();
        assert_eq!(global.options.get("verbose").map(String::as_str), Some("1"));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "Core Release");
        assert_eq!(blocks[0].url, "https://mirror.example/core");
        assert_eq!(blocks[0].options.get("priority").map(String::as_str), Some("10"));
        assert!(blocks[1].flags.iter().any(|f| f == "noupdate"));
    }

    #[test]
    fn noupdate_flag_disables_media_update() {
        let (global, blocks) = parse(SAMPLE).unwrap();
        let (media, _server) = into_catalog_entities(&global, &blocks[1]);
        assert!(!media.update);
        assert!(media.enabled);
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let result = parse("Core Release https://mirror.example/core { priority 10");
        assert!(result.is_err());
    }

    #[test]
    fn malformed_header_is_an_error() {
        let result = parse("justonename { priority 10 }");
        assert!(result.is_err());
    }
}
