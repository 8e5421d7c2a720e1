//! Synthesis format parser (spec §4.1): a UTF-8 stream of `@`-delimited
//! lines, one staging record per package, closed by an `@info@...` line.

use crate::model::{Capability, Nevra, PackageBuilder};

/// One parsed synthesis record.
pub type SynthesisRecord = crate::model::Package;

/// Parse an entire decompressed synthesis blob into records. Malformed or
/// unknown tags are ignored, not fatal, per spec's boundary behavior.
pub fn parse(text: &str) -> Vec<SynthesisRecord> {
    let mut records = Vec::new();
    let mut staging = PackageBuilder::new(String::new());

    for line in text.lines() {
        let Some(rest) = line.strip_prefix('@') else { continue };
        let Some(tag_end) = rest.find('@') else { continue };
        let tag = &rest[..tag_end];
        let body = &rest[tag_end + 1..];

        match tag {
            "provides" => staging.provides.extend(parse_capability_list(body)),
            "requires" => staging.requires.extend(parse_capability_list(body)),
            "conflicts" => staging.conflicts.extend(parse_capability_list(body)),
            "obsoletes" => staging.obsoletes.extend(parse_capability_list(body)),
            "suggests" => staging.suggests.extend(parse_capability_list(body)),
            "recommends" => staging.recommends.extend(parse_capability_list(body)),
            "summary" => staging.summary = body.to_string(),
            "info" => {
                if let Some(record) = close_record(&mut staging, body) {
                    records.push(record);
                }
                staging = PackageBuilder::new(staging.media.clone());
            }
            _ => {} // unknown tag: ignored, not fatal
        }
    }

    records
}

fn parse_capability_list(body: &str) -> Vec<Capability> {
    body.split('@').filter(|t| !t.is_empty()).map(Capability::parse_token).collect()
}

/// `@info@NEVRA@epoch@size@group` (epoch/size/group optional, documented defaults apply).
fn close_record(staging: &mut PackageBuilder, body: &str) -> Option<SynthesisRecord> {
    let mut fields = body.split('@');
    let nevra_str = fields.next()?;
    let nevra = parse_nevra(nevra_str)?;

    let epoch_override = fields.next().and_then(|s| s.parse::<u32>().ok());
    let size = fields.next().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
    let group = fields.next().unwrap_or("").to_string();

    let mut nevra = nevra;
    if let Some(epoch) = epoch_override {
        nevra.epoch = epoch;
    }

    staging.nevra = Some(nevra);
    staging.size = size;
    staging.group = if group.is_empty() { staging.group.clone() } else { group };

    std::mem::replace(staging, PackageBuilder::new(staging.media.clone())).build()
}

/// Parse a `name-epoch:version-release.arch` NEVRA string, defaulting
/// epoch to 0 when absent (documented default per spec boundary behavior).
fn parse_nevra(s: &str) -> Option<Nevra> {
    let (rest, arch) = s.rsplit_once('.')?;
    let (name_version, release) = rest.rsplit_once('-')?;
    let (name, version_with_epoch) = name_version.rsplit_once('-')?;

    let (epoch, version) = match version_with_epoch.split_once(':') {
        Some((e, v)) => (e.parse().unwrap_or(0), v.to_string()),
        None => (0, version_with_epoch.to_string()),
    };

    Some(Nevra::new(name, epoch, version, release, arch))
}
