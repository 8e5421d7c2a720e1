//! The differential import algorithm (spec §4.1): turn a freshly fetched
//! metadata blob into the minimal set of catalog writes, inside one write
//! transaction, with bulk-mode pragmas on first-ever ingestion.

use std::collections::HashSet;

use crate::catalog::Catalog;
use crate::errors::Result;
use crate::model::{FileIndexState, Nevra, Package, PackageFile};

use super::{files_xml, hdlist, synthesis};

/// What one differential import actually changed, for logging and for the
/// "zero row changes on an unchanged remote" testable property (spec §8).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub inserted: usize,
    pub deleted: usize,
    pub bulk: bool,
}

/// Diff-import a media's synthesis blob. `A` is read from the catalog,
/// `B` from the freshly parsed text; `A \ B` is deleted and `B \ A` is
/// inserted inside one transaction (spec §4.1 steps 1-2).
#[tracing::instrument(skip(catalog, text))]
pub async fn import_synthesis(catalog: &Catalog, media: &str, text: &str) -> Result<ImportOutcome> {
    // The synthesis format carries no media identity of its own; stamp every
    // record with the media this blob was fetched for.
    let incoming = synthesis::parse(text)
        .into_iter()
        .map(|mut pkg| {
            pkg.media = media.to_string();
            pkg
        })
        .collect();
    import_packages(catalog, media, incoming).await
}

/// Same algorithm sourced from a media's hdlist blob instead of synthesis,
/// used when a media exposes no synthesis file (spec §9's format-priority
/// open question: synthesis wins when both are fresh, hdlist only fills in
/// what synthesis lacks).
#[tracing::instrument(skip(catalog, blob))]
pub async fn import_hdlist(catalog: &Catalog, media: &str, blob: &[u8]) -> Result<ImportOutcome> {
    let incoming = hdlist::parse(media, blob)?;
    import_packages(catalog, media, incoming).await
}

async fn import_packages(catalog: &Catalog, media: &str, incoming: Vec<Package>) -> Result<ImportOutcome> {
    let a: HashSet<Nevra> = catalog.nevras_for_media(media).await?.into_iter().collect();
    let b: HashSet<Nevra> = incoming.iter().map(|p| p.nevra.clone()).collect();
    let bulk = a.is_empty();

    let to_delete: Vec<&Nevra> = a.difference(&b).collect();
    let to_insert: Vec<&Package> = incoming.iter().filter(|p| !a.contains(&p.nevra)).collect();

    run_transaction(catalog, media, &to_delete, &to_insert, bulk).await
}

async fn run_transaction(
    catalog: &Catalog,
    media: &str,
    to_delete: &[&Nevra],
    to_insert: &[&Package],
    bulk: bool,
) -> Result<ImportOutcome> {
    let mut conn = catalog.acquire_for_import(bulk).await?;
    let mut tx = sqlx::Connection::begin(&mut *conn).await?;
    for nevra in to_delete {
        Catalog::delete_package_on(&mut tx, media, nevra).await?;
    }
    for pkg in to_insert {
        Catalog::insert_package_on(&mut tx, pkg).await?;
    }
    tx.commit().await?;
    catalog.release_from_import(conn, bulk).await?;

    Ok(ImportOutcome { inserted: to_insert.len(), deleted: to_delete.len(), bulk })
}

/// Diff-import a media's files.xml blob against the `package_files` table,
/// updating the per-media [`FileIndexState`] row only on success (spec
/// §4.1's failure semantics: a mid-stream decode failure must not touch
/// state, so the next sync retries from scratch).
#[tracing::instrument(skip(catalog, xml))]
pub async fn import_files(
    catalog: &Catalog,
    media: &str,
    xml: &str,
    raw_md5: impl Into<String>,
    compressed_size: u64,
) -> Result<ImportOutcome> {
    let incoming = files_xml::parse(media, xml)?;

    let incoming_nevras: HashSet<Nevra> = incoming.iter().map(|f| f.nevra.clone()).collect();
    let existing_nevras: HashSet<Nevra> = catalog.nevras_with_files(media).await?.into_iter().collect();
    let bulk = existing_nevras.is_empty();

    // A \ B: NEVRAs whose files are no longer in the new blob get their rows
    // (and FTS shadows) dropped. B \ A: only files for genuinely new NEVRAs
    // are inserted, so an unchanged remote touches zero rows (spec §8).
    let stale_nevras: Vec<&Nevra> = existing_nevras.difference(&incoming_nevras).collect();
    let fresh_files: Vec<&PackageFile> = incoming.iter().filter(|f| !existing_nevras.contains(&f.nevra)).collect();

    let mut conn = catalog.acquire_for_import(bulk).await?;
    let mut tx = sqlx::Connection::begin(&mut *conn).await?;
    for nevra in &stale_nevras {
        Catalog::delete_files_for_nevra_on(&mut tx, media, nevra).await?;
    }
    let mut inserted = 0usize;
    for file in &fresh_files {
        Catalog::insert_file_on(&mut tx, file).await?;
        inserted += 1;
    }
    tx.commit().await?;
    catalog.release_from_import(conn, bulk).await?;

    catalog
        .set_file_index_state(&FileIndexState {
            media: media.to_string(),
            raw_md5: Some(raw_md5.into()),
            file_count: incoming.len() as u64,
            package_count: incoming_nevras.len() as u64,
            compressed_size,
            last_sync: Some(chrono::Utc::now()),
        })
        .await?;

    Ok(ImportOutcome { inserted, deleted: stale_nevras.len(), bulk })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capability, Nevra, PackageBuilder};

    fn synth_block(name: &str, version: &str) -> String {
        format!(
            "@summary@a summary\n@provides@{name}\n@info@{name}-0:{version}-1.x86_64@0@1024@System/Base\n"
        )
    }

    #[tokio::test]
    async fn first_import_runs_in_bulk_mode_and_inserts_everything() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let text = format!("{}{}", synth_block("bash", "5.2"), synth_block("coreutils", "9.4"));

        let outcome = import_synthesis(&catalog, "core", &text).await.unwrap();
        assert!(outcome.bulk);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.deleted, 0);

        let all = catalog.load_all_packages().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn second_import_with_one_dropped_package_deletes_only_that_one() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let first = format!("{}{}", synth_block("bash", "5.2"), synth_block("coreutils", "9.4"));
        import_synthesis(&catalog, "core", &first).await.unwrap();

        let second = synth_block("bash", "5.2");
        let outcome = import_synthesis(&catalog, "core", &second).await.unwrap();
        assert!(!outcome.bulk);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.deleted, 1);

        let all = catalog.load_all_packages().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].nevra.name, "bash");
    }

    #[tokio::test]
    async fn unchanged_remote_is_a_no_op_at_the_row_level() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let text = synth_block("bash", "5.2");
        import_synthesis(&catalog, "core", &text).await.unwrap();

        let outcome = import_synthesis(&catalog, "core", &text).await.unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.deleted, 0);
    }

    #[tokio::test]
    async fn file_index_diff_drops_only_the_removed_package_files() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog
            .insert_package(
                &PackageBuilder {
                    nevra: Some(Nevra::new("a", 0, "1", "1", "x86_64")),
                    media: "core".into(),
                    provides: vec![Capability::unversioned("a")],
                    ..Default::default()
                }
                .build()
                .unwrap(),
            )
            .await
            .unwrap();
        catalog
            .insert_package(
                &PackageBuilder {
                    nevra: Some(Nevra::new("b", 0, "1", "1", "x86_64")),
                    media: "core".into(),
                    provides: vec![Capability::unversioned("b")],
                    ..Default::default()
                }
                .build()
                .unwrap(),
            )
            .await
            .unwrap();

        let first_xml = "<files fn=\"a-0:1-1.x86_64\">/usr/bin/a\n</files><files fn=\"b-0:1-1.x86_64\">/usr/bin/b\n</files>";
        import_files(&catalog, "core", first_xml, "md5-1", 100).await.unwrap();

        let second_xml = "<files fn=\"a-0:1-1.x86_64\">/usr/bin/a\n</files><files fn=\"c-0:1-1.x86_64\">/usr/bin/c\n</files>";
        // "c" isn't in the packages table in this test, but its files are
        // still indexable — the file index tracks whatever NEVRAs the blob
        // names, independent of whether a package row exists for them yet.
        let outcome = import_files(&catalog, "core", second_xml, "md5-2", 100).await.unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.inserted, 1);

        let hits = catalog.search_files("a", 10).await.unwrap();
        assert!(hits.iter().any(|f| f.basename == "a"));
        let hits = catalog.search_files("b", 10).await.unwrap();
        assert!(hits.is_empty());

        let state = catalog.file_index_state("core").await.unwrap().unwrap();
        assert_eq!(state.raw_md5.as_deref(), Some("md5-2"));
    }
}
