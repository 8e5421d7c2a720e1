//! Binary hdlist parser (spec §4.1): a concatenation of full RPM headers.
//!
//! Authoritative only for fields synthesis lacks (changelog, file lists) per
//! the synthesis-vs-hdlist priority decided in `DESIGN.md`.

use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::model::{Capability, Nevra, Package, PackageBuilder};

const MAGIC: [u8; 3] = [0x8E, 0xAD, 0xE8];
const HEADER_PREFIX_LEN: usize = 3 + 1 + 4 + 4 + 4; // magic, version, reserved, nindex, hsize

const TAG_NAME: u32 = 1000;
const TAG_VERSION: u32 = 1001;
const TAG_RELEASE: u32 = 1002;
const TAG_SUMMARY: u32 = 1004;
const TAG_DESCRIPTION: u32 = 1005;
const TAG_SIZE: u32 = 1009;
const TAG_LICENSE: u32 = 1014;
const TAG_GROUP: u32 = 1016;
const TAG_URL: u32 = 1020;
const TAG_ARCH: u32 = 1022;
const TAG_PROVIDENAME: u32 = 1047;
const TAG_REQUIREFLAGS: u32 = 1048;
const TAG_REQUIRENAME: u32 = 1049;
const TAG_REQUIREVERSION: u32 = 1050;
const TAG_CONFLICTNAME: u32 = 1054;
const TAG_CHANGELOGTEXT: u32 = 1103;
const TAG_PROVIDEVERSION: u32 = 1113;
const TAG_OBSOLETENAME: u32 = 1090;
const TAG_CONFLICTVERSION: u32 = 1055;
const TAG_OBSOLETEVERSION: u32 = 1115;
const TAG_BASENAMES: u32 = 1117;
const TAG_DIRNAMES: u32 = 1118;
const TAG_DIRINDEXES: u32 = 1116;

const TYPE_STRING: u32 = 6;
const TYPE_STRING_ARRAY: u32 = 8;

const RPMSENSE_LESS: u32 = 0x02;
const RPMSENSE_GREATER: u32 = 0x04;
const RPMSENSE_EQUAL: u32 = 0x08;

struct IndexEntry {
    tag: u32,
    ty: u32,
    offset: usize,
    count: u32,
}

/// A single RPM header's raw tag → bytes-in-store slices, decoded lazily by
/// the typed accessors below.
struct Header<'a> {
    entries: Vec<IndexEntry>,
    store: &'a [u8],
}

impl<'a> Header<'a> {
    fn string_array(&self, tag: u32) -> Vec<String> {
        let Some(entry) = self.entries.iter().find(|e| e.tag == tag) else { return Vec::new() };
        if entry.ty != TYPE_STRING_ARRAY && entry.ty != TYPE_STRING {
            return Vec::new();
        }
        split_nul_strings(&self.store[entry.offset..], entry.count as usize)
    }

    fn string(&self, tag: u32) -> Option<String> {
        self.string_array(tag).into_iter().next()
    }

    fn u32_array(&self, tag: u32) -> Vec<u32> {
        let Some(entry) = self.entries.iter().find(|e| e.tag == tag) else { return Vec::new() };
        let bytes = &self.store[entry.offset..];
        (0..entry.count as usize)
            .filter_map(|i| bytes.get(i * 4..i * 4 + 4))
            .map(|b| u32::from_be_bytes(b.try_into().unwrap()))
            .collect()
    }

    fn u32_scalar(&self, tag: u32) -> Option<u32> {
        self.u32_array(tag).into_iter().next()
    }
}

fn split_nul_strings(bytes: &[u8], count: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(count);
    let mut rest = bytes;
    for _ in 0..count {
        let Some(nul) = rest.iter().position(|&b| b == 0) else { break };
        out.push(String::from_utf8_lossy(&rest[..nul]).into_owned());
        rest = &rest[nul + 1..];
    }
    out
}

/// Parse every header in a concatenated hdlist blob into package records.
/// Resynchronizes past any region that doesn't start with the magic until a
/// valid header is found or the blob is exhausted.
pub fn parse(media: &str, blob: &[u8]) -> Result<Vec<Package>> {
    let mut out = Vec::new();
    let mut offset = 0usize;

    while offset < blob.len() {
        match find_next_magic(blob, offset) {
            Some(start) => {
                match parse_one_header(&blob[start..]) {
                    Ok((header, consumed)) => {
                        if let Some(pkg) = header_to_package(media, &header) {
                            out.push(pkg);
                        }
                        offset = start + consumed;
                    }
                    Err(_) => {
                        // Magic matched but the framing was malformed: skip past
                        // it and keep resynchronizing rather than aborting.
                        offset = start + MAGIC.len();
                    }
                }
            }
            None => break,
        }
    }

    Ok(out)
}

fn find_next_magic(blob: &[u8], from: usize) -> Option<usize> {
    blob[from..].windows(MAGIC.len()).position(|w| w == MAGIC).map(|p| from + p)
}

/// Parse one header starting at its magic byte. Returns the header and the
/// total number of bytes consumed (prefix + index + data store).
fn parse_one_header(bytes: &[u8]) -> Result<(Header<'_>, usize)> {
    if bytes.len() < HEADER_PREFIX_LEN {
        return Err(Error::metadata_corrupt("hdlist", 0, "truncated header prefix"));
    }
    if bytes[0..3] != MAGIC {
        return Err(Error::metadata_corrupt("hdlist", 0, "magic mismatch"));
    }
    // bytes[3] = version, bytes[4..8] = reserved, both ignored.
    let nindex = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let hsize = u32::from_be_bytes(bytes[12..16].try_into().unwrap()) as usize;

    let index_start = HEADER_PREFIX_LEN;
    let index_len = nindex * 16;
    let store_start = index_start + index_len;
    let store_end = store_start + hsize;

    if bytes.len() < store_end {
        return Err(Error::metadata_corrupt("hdlist", index_start as u64, "truncated index or store"));
    }

    let mut entries = Vec::with_capacity(nindex);
    for i in 0..nindex {
        let e = &bytes[index_start + i * 16..index_start + i * 16 + 16];
        entries.push(IndexEntry {
            tag: u32::from_be_bytes(e[0..4].try_into().unwrap()),
            ty: u32::from_be_bytes(e[4..8].try_into().unwrap()),
            offset: u32::from_be_bytes(e[8..12].try_into().unwrap()) as usize,
            count: u32::from_be_bytes(e[12..16].try_into().unwrap()),
        });
    }

    let store = &bytes[store_start..store_end];
    Ok((Header { entries, store }, store_end))
}

fn header_to_package(media: &str, h: &Header<'_>) -> Option<Package> {
    let name = h.string(TAG_NAME)?;
    let version = h.string(TAG_VERSION)?;
    let release = h.string(TAG_RELEASE)?;
    let arch = h.string(TAG_ARCH).unwrap_or_else(|| "noarch".to_string());
    let epoch = 0; // hdlist carries no dedicated epoch tag in this framing; synthesis is authoritative for epoch.

    let mut builder = PackageBuilder::new(media);
    builder.nevra = Some(Nevra::new(name, epoch, version, release, arch));
    builder.summary = h.string(TAG_SUMMARY).unwrap_or_default();
    builder.group = h.string(TAG_GROUP).unwrap_or_default();
    builder.size = h.u32_scalar(TAG_SIZE).unwrap_or(0) as u64;
    builder.description = h.string(TAG_DESCRIPTION);
    builder.license = h.string(TAG_LICENSE);
    builder.url = h.string(TAG_URL);
    builder.changelog = {
        let entries = h.string_array(TAG_CHANGELOGTEXT);
        (!entries.is_empty()).then(|| entries.join("\n"))
    };

    builder.provides = capabilities(h, TAG_PROVIDENAME, Some(TAG_PROVIDEVERSION), None);
    builder.requires = capabilities(h, TAG_REQUIRENAME, Some(TAG_REQUIREVERSION), Some(TAG_REQUIREFLAGS));
    builder.conflicts = capabilities(h, TAG_CONFLICTNAME, Some(TAG_CONFLICTVERSION), None);
    builder.obsoletes = capabilities(h, TAG_OBSOLETENAME, Some(TAG_OBSOLETEVERSION), None);

    builder.build()
}

/// Build capability triples from parallel name/version/flags arrays. The
/// flags bitmask (`RPMSENSE_LESS`/`GREATER`/`EQUAL`) decides the operator;
/// when flags are absent entirely, any version string present implies
/// equality, matching RPM's own fallback for provides/conflicts/obsoletes
/// tags that carry no flags array.
fn capabilities(h: &Header<'_>, name_tag: u32, version_tag: Option<u32>, flags_tag: Option<u32>) -> Vec<Capability> {
    let names = h.string_array(name_tag);
    let versions = version_tag.map(|t| h.string_array(t)).unwrap_or_default();
    let flags = flags_tag.map(|t| h.u32_array(t)).unwrap_or_default();

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| match versions.get(i) {
            Some(v) if !v.is_empty() => {
                let op = flags.get(i).copied().map(sense_flags_to_op).unwrap_or(crate::model::CapOp::Eq);
                Capability::versioned(name, op, v.clone())
            }
            _ => Capability::unversioned(name),
        })
        .collect()
}

/// Decode an RPM `RPMSENSE_*` comparison bitmask into the matching `CapOp`.
/// Only the `LESS`/`GREATER`/`EQUAL` bits matter here; the rest of the
/// bitmask (prereq, script sense, etc.) is irrelevant to capability matching.
fn sense_flags_to_op(flags: u32) -> crate::model::CapOp {
    use crate::model::CapOp;
    match (flags & RPMSENSE_LESS != 0, flags & RPMSENSE_GREATER != 0, flags & RPMSENSE_EQUAL != 0) {
        (true, false, false) => CapOp::Lt,
        (true, false, true) => CapOp::Le,
        (false, true, false) => CapOp::Gt,
        (false, true, true) => CapOp::Ge,
        (false, false, true) => CapOp::Eq,
        _ => CapOp::Eq,
    }
}

/// Extract `BASENAMES`/`DIRNAMES`/`DIRINDEXES` into full file paths, keyed by
/// the same NEVRA the header otherwise describes. Used by the file-list
/// fallback path when synthesis lacks file data (§9's priority rule).
pub fn file_list(h_blob: &[u8]) -> Result<HashMap<Nevra, Vec<String>>> {
    let mut out = HashMap::new();
    let mut offset = 0usize;

    while offset < h_blob.len() {
        let Some(start) = find_next_magic(h_blob, offset) else { break };
        let (header, consumed) = match parse_one_header(&h_blob[start..]) {
            Ok(v) => v,
            Err(_) => {
                offset = start + MAGIC.len();
                continue;
            }
        };
        offset = start + consumed;

        let Some(name) = header.string(TAG_NAME) else { continue };
        let Some(version) = header.string(TAG_VERSION) else { continue };
        let Some(release) = header.string(TAG_RELEASE) else { continue };
        let arch = header.string(TAG_ARCH).unwrap_or_else(|| "noarch".to_string());
        let nevra = Nevra::new(name, 0, version, release, arch);

        let basenames = header.string_array(TAG_BASENAMES);
        let dirnames = header.string_array(TAG_DIRNAMES);
        let dirindexes = header.u32_array(TAG_DIRINDEXES);

        let paths = basenames
            .iter()
            .zip(dirindexes.iter())
            .filter_map(|(base, idx)| dirnames.get(*idx as usize).map(|dir| format!("{dir}{base}")))
            .collect();

        out.insert(nevra, paths);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_tag(tag: u32, ty: u32, offset: usize, count: u32) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&tag.to_be_bytes());
        buf[4..8].copy_from_slice(&ty.to_be_bytes());
        buf[8..12].copy_from_slice(&(offset as u32).to_be_bytes());
        buf[12..16].copy_from_slice(&count.to_be_bytes());
        buf
    }

    /// Build one minimal synthetic header with just NAME/VERSION/RELEASE/ARCH.
    fn build_minimal_header(name: &str, version: &str, release: &str, arch: &str) -> Vec<u8> {
        let mut store = Vec::new();
        let name_off = store.len();
        store.extend_from_slice(name.as_bytes());
        store.push(0);
        let version_off = store.len();
        store.extend_from_slice(version.as_bytes());
        store.push(0);
        let release_off = store.len();
        store.extend_from_slice(release.as_bytes());
        store.push(0);
        let arch_off = store.len();
        store.extend_from_slice(arch.as_bytes());
        store.push(0);

        let entries = [
            string_tag(TAG_NAME, TYPE_STRING, name_off, 1),
            string_tag(TAG_VERSION, TYPE_STRING, version_off, 1),
            string_tag(TAG_RELEASE, TYPE_STRING, release_off, 1),
            string_tag(TAG_ARCH, TYPE_STRING, arch_off, 1),
        ];

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.push(1); // version
        out.extend_from_slice(&[0, 0, 0, 0]); // reserved
        out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(store.len() as u32).to_be_bytes());
        for e in &entries {
            out.extend_from_slice(e);
        }
        out.extend_from_slice(&store);
        out
    }

    #[test]
    fn parses_single_header() {
        let blob = build_minimal_header("bash", "5.2", "1.fc41", "x86_64");
        let packages = parse("core", &blob).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].nevra.name, "bash");
        assert_eq!(packages[0].nevra.version, "5.2");
    }

    #[test]
    fn resynchronizes_past_garbage_prefix() {
        let mut blob = vec![0xFF; 7];
        blob.extend_from_slice(&build_minimal_header("zlib", "1.3", "2.fc41", "x86_64"));
        let packages = parse("core", &blob).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].nevra.name, "zlib");
    }

    #[test]
    fn truncated_blob_yields_no_package_not_an_error() {
        let mut blob = build_minimal_header("bash", "5.2", "1.fc41", "x86_64");
        blob.truncate(blob.len() - 2);
        let packages = parse("core", &blob).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn concatenated_headers_both_parse() {
        let mut blob = build_minimal_header("a", "1.0", "1", "x86_64");
        blob.extend_from_slice(&build_minimal_header("b", "2.0", "1", "x86_64"));
        let packages = parse("core", &blob).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].nevra.name, "a");
        assert_eq!(packages[1].nevra.name, "b");
    }

    #[test]
    fn empty_blob_yields_empty_set() {
        assert!(parse("core", &[]).unwrap().is_empty());
    }

    #[test]
    fn sense_flags_decode_to_matching_cap_op() {
        use crate::model::CapOp;
        assert_eq!(sense_flags_to_op(RPMSENSE_GREATER | RPMSENSE_EQUAL), CapOp::Ge);
        assert_eq!(sense_flags_to_op(RPMSENSE_LESS | RPMSENSE_EQUAL), CapOp::Le);
        assert_eq!(sense_flags_to_op(RPMSENSE_GREATER), CapOp::Gt);
        assert_eq!(sense_flags_to_op(RPMSENSE_LESS), CapOp::Lt);
        assert_eq!(sense_flags_to_op(RPMSENSE_EQUAL), CapOp::Eq);
    }

    #[test]
    fn requires_with_greater_equal_flag_decodes_to_ge() {
        let mut store = Vec::new();
        let name_off = store.len();
        store.extend_from_slice(b"bash\0");
        let version_off = store.len();
        store.extend_from_slice(b"5.2\0");
        let req_name_off = store.len();
        store.extend_from_slice(b"libc.so.6\0");
        let req_version_off = store.len();
        store.extend_from_slice(b"2.34\0");
        let release_off = store.len();
        store.extend_from_slice(b"1\0");
        let arch_off = store.len();
        store.extend_from_slice(b"x86_64\0");

        let mut flags_bytes = Vec::new();
        flags_bytes.extend_from_slice(&(RPMSENSE_GREATER | RPMSENSE_EQUAL).to_be_bytes());
        let flags_off = store.len();
        store.extend_from_slice(&flags_bytes);

        let entries = [
            string_tag(TAG_NAME, TYPE_STRING, name_off, 1),
            string_tag(TAG_VERSION, TYPE_STRING, version_off, 1),
            string_tag(TAG_RELEASE, TYPE_STRING, release_off, 1),
            string_tag(TAG_ARCH, TYPE_STRING, arch_off, 1),
            string_tag(TAG_REQUIRENAME, TYPE_STRING_ARRAY, req_name_off, 1),
            string_tag(TAG_REQUIREVERSION, TYPE_STRING_ARRAY, req_version_off, 1),
            string_tag(TAG_REQUIREFLAGS, 4, flags_off, 1),
        ];

        let mut blob = Vec::new();
        blob.extend_from_slice(&MAGIC);
        blob.push(1);
        blob.extend_from_slice(&[0, 0, 0, 0]);
        blob.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        blob.extend_from_slice(&(store.len() as u32).to_be_bytes());
        for e in &entries {
            blob.extend_from_slice(e);
        }
        blob.extend_from_slice(&store);

        let packages = parse("core", &blob).unwrap();
        assert_eq!(packages.len(), 1);
        let require = &packages[0].requires[0];
        assert_eq!(require.name, "libc.so.6");
        assert_eq!(require.op, crate::model::CapOp::Ge);
        assert_eq!(require.evr.as_deref(), Some("2.34"));
    }
}
