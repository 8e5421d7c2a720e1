//! Streaming parser for the file-index XML: `<files fn="NEVRA">path\npath...</files>`.
//!
//! A `quick_xml::Reader` pull parser — never a DOM, per spec. Grounded on the
//! streaming-reader shape of `dralley-rpmrepo_metadata` kept in the retrieval
//! pack's reference material.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::errors::{Error, Result};
use crate::model::{Nevra, PackageFile};

/// Parse a decompressed files.xml blob into package-file rows. Each `<files>`
/// element's body is newline-separated absolute paths, split here into
/// (directory, basename) pairs matching the catalog's row shape.
pub fn parse(media: &str, xml: &str) -> Result<Vec<PackageFile>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut current_nevra: Option<Nevra> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"files" => {
                let fn_attr = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"fn")
                    .map(|a| a.decoder().decode(&a.value).unwrap_or_default().into_owned());
                current_nevra = fn_attr.as_deref().and_then(parse_nevra_attr);
            }
            Ok(Event::Text(e)) => {
                if let Some(nevra) = &current_nevra {
                    let text = e.unescape().map_err(|err| {
                        Error::metadata_corrupt(media, reader.buffer_position(), err.to_string())
                    })?;
                    for line in text.lines().filter(|l| !l.is_empty()) {
                        if let Some((directory, basename)) = split_path(line) {
                            out.push(PackageFile {
                                media: media.to_string(),
                                nevra: nevra.clone(),
                                directory,
                                basename,
                            });
                        }
                    }
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"files" => {
                current_nevra = None;
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(Error::metadata_corrupt(media, reader.buffer_position(), err.to_string()));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn split_path(path: &str) -> Option<(String, String)> {
    let (dir, base) = path.rsplit_once('/')?;
    if base.is_empty() {
        return None;
    }
    Some((format!("{dir}/"), base.to_string()))
}

/// `fn="name-epoch:version-release.arch"`, same NEVRA text form the
/// synthesis parser reads.
fn parse_nevra_attr(s: &str) -> Option<Nevra> {
    let (rest, arch) = s.rsplit_once('.')?;
    let (name_version, release) = rest.rsplit_once('-')?;
    let (name, version_with_epoch) = name_version.rsplit_once('-')?;
    let (epoch, version) = match version_with_epoch.split_once(':') {
        Some((e, v)) => (e.parse().unwrap_or(0), v.to_string()),
        None => (0, version_with_epoch.to_string()),
    };
    Some(Nevra::new(name, epoch, version, release, arch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_package_file_list() {
        let xml = r#"<files fn="bash-0:5.2-1.fc41.x86_64">/usr/bin/bash
/usr/share/doc/bash/README
</files>"#;
        let rows = parse("core", xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].directory, "/usr/bin/");
        assert_eq!(rows[0].basename, "bash");
        assert_eq!(rows[0].nevra.name, "bash");
    }

    #[test]
    fn multiple_files_elements_scope_independently() {
        let xml = r#"<filelists>
<files fn="a-0:1.0-1.x86_64">/a/one
</files>
<files fn="b-0:2.0-1.x86_64">/b/two
</files>
</filelists>"#;
        let rows = parse("core", xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].nevra.name, "a");
        assert_eq!(rows[1].nevra.name, "b");
    }

    #[test]
    fn empty_document_yields_empty_set() {
        assert!(parse("core", "<filelists></filelists>").unwrap().is_empty());
    }

    #[test]
    fn ignores_paths_without_a_directory_component() {
        let xml = r#"<files fn="a-0:1.0-1.x86_64">bareword
</files>"#;
        let rows = parse("core", xml).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn mismatched_end_tag_surfaces_metadata_corrupt() {
        let result = parse("core", "<files fn=\"a-0:1.0-1.x86_64\">/a/one\n</wrongtag>");
        assert!(matches!(result, Err(Error::MetadataCorrupt { .. })));
    }
}
