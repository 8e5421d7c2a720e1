//! Package and provides-index rows (spec §4.1, §4.2).

use sqlx::Row;

use super::Catalog;
use crate::errors::Result;
use crate::model::{CapOp, Capability, Nevra, Package};

impl Catalog {
    /// All NEVRAs currently catalogued for one media — the `A` side of the
    /// differential import's `A \ B` / `B \ A` computation.
    pub async fn nevras_for_media(&self, media: &str) -> Result<Vec<Nevra>> {
        let rows = sqlx::query("SELECT name, epoch, version, release, arch FROM packages WHERE media = ?")
            .bind(media)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| nevra_from_row(&r)).collect())
    }

    /// Insert or replace one package row and its provides-index rows inside
    /// an already-open transaction (the diff import batches many of these
    /// into one write, per §4.1).
    pub async fn insert_package_on(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, pkg: &Package) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO packages
                (media, name, epoch, version, release, arch, summary, group_name, size,
                 description, changelog, license, url, checksum,
                 requires_json, conflicts_json, obsoletes_json, recommends_json, suggests_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&pkg.media)
        .bind(&pkg.nevra.name)
        .bind(pkg.nevra.epoch as i64)
        .bind(&pkg.nevra.version)
        .bind(&pkg.nevra.release)
        .bind(&pkg.nevra.arch)
        .bind(&pkg.summary)
        .bind(&pkg.group)
        .bind(pkg.size as i64)
        .bind(&pkg.description)
        .bind(&pkg.changelog)
        .bind(&pkg.license)
        .bind(&pkg.url)
        .bind(&pkg.checksum)
        .bind(serde_json::to_string(&pkg.requires).unwrap_or_default())
        .bind(serde_json::to_string(&pkg.conflicts).unwrap_or_default())
        .bind(serde_json::to_string(&pkg.obsoletes).unwrap_or_default())
        .bind(serde_json::to_string(&pkg.recommends).unwrap_or_default())
        .bind(serde_json::to_string(&pkg.suggests).unwrap_or_default())
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "DELETE FROM provides WHERE media = ? AND name = ? AND epoch = ? AND version = ? AND release = ? AND arch = ?",
        )
        .bind(&pkg.media)
        .bind(&pkg.nevra.name)
        .bind(pkg.nevra.epoch as i64)
        .bind(&pkg.nevra.version)
        .bind(&pkg.nevra.release)
        .bind(&pkg.nevra.arch)
        .execute(&mut **tx)
        .await?;

        for cap in &pkg.provides {
            sqlx::query(
                "INSERT INTO provides (media, name, epoch, version, release, arch, cap_name, cap_op, cap_evr)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&pkg.media)
            .bind(&pkg.nevra.name)
            .bind(pkg.nevra.epoch as i64)
            .bind(&pkg.nevra.version)
            .bind(&pkg.nevra.release)
            .bind(&pkg.nevra.arch)
            .bind(&cap.name)
            .bind(cap.op.as_str())
            .bind(&cap.evr)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Delete one package and its provides-index rows inside an already-open
    /// transaction.
    pub async fn delete_package_on(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        media: &str,
        nevra: &Nevra,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM packages WHERE media = ? AND name = ? AND epoch = ? AND version = ? AND release = ? AND arch = ?",
        )
        .bind(media)
        .bind(&nevra.name)
        .bind(nevra.epoch as i64)
        .bind(&nevra.version)
        .bind(&nevra.release)
        .bind(&nevra.arch)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Convenience wrapper used outside a diff import (tests, one-off edits):
    /// opens its own transaction, inserts, commits.
    pub async fn insert_package(&self, pkg: &Package) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_package_on(&mut tx, pkg).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_package(&self, media: &str, nevra: &Nevra) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::delete_package_on(&mut tx, media, nevra).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Load every package currently catalogued, for the resolver's pool
    /// construction. The hand-rolled solver works over the whole in-memory
    /// set rather than issuing per-candidate queries.
    pub async fn load_all_packages(&self) -> Result<Vec<Package>> {
        let rows = sqlx::query("SELECT * FROM packages").fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut pkg = row_to_package(row)?;
            let provides = sqlx::query(
                "SELECT cap_name, cap_op, cap_evr FROM provides
                 WHERE media = ? AND name = ? AND epoch = ? AND version = ? AND release = ? AND arch = ?",
            )
            .bind(&pkg.media)
            .bind(&pkg.nevra.name)
            .bind(pkg.nevra.epoch as i64)
            .bind(&pkg.nevra.version)
            .bind(&pkg.nevra.release)
            .bind(&pkg.nevra.arch)
            .fetch_all(&self.pool)
            .await?;
            pkg.provides = provides.into_iter().map(|r| capability_from_row(&r)).collect();
            out.push(pkg);
        }
        Ok(out)
    }

    /// Package builds providing a capability named `cap_name`, for the
    /// resolver's alternative-set lookup.
    pub async fn find_providers(&self, cap_name: &str) -> Result<Vec<Nevra>> {
        let rows = sqlx::query("SELECT DISTINCT name, epoch, version, release, arch FROM provides WHERE cap_name = ?")
            .bind(cap_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| nevra_from_row(&r)).collect())
    }
}

fn nevra_from_row(row: &sqlx::sqlite::SqliteRow) -> Nevra {
    Nevra::new(
        row.get::<String, _>("name"),
        row.get::<i64, _>("epoch") as u32,
        row.get::<String, _>("version"),
        row.get::<String, _>("release"),
        row.get::<String, _>("arch"),
    )
}

fn capability_from_row(row: &sqlx::sqlite::SqliteRow) -> Capability {
    let op = CapOp::parse(row.get("cap_op")).unwrap_or(CapOp::None);
    let evr: Option<String> = row.get("cap_evr");
    let name: String = row.get("cap_name");
    match (op, evr) {
        (CapOp::None, _) | (_, None) => Capability::unversioned(name),
        (op, Some(evr)) => Capability::versioned(name, op, evr),
    }
}

fn row_to_package(row: &sqlx::sqlite::SqliteRow) -> Result<Package> {
    Ok(Package {
        nevra: nevra_from_row(row),
        media: row.get("media"),
        summary: row.get("summary"),
        group: row.get("group_name"),
        size: row.get::<i64, _>("size") as u64,
        description: row.get("description"),
        changelog: row.get("changelog"),
        license: row.get("license"),
        url: row.get("url"),
        checksum: row.get("checksum"),
        provides: Vec::new(), // filled in by the caller
        requires: serde_json::from_str(&row.get::<String, _>("requires_json")).unwrap_or_default(),
        conflicts: serde_json::from_str(&row.get::<String, _>("conflicts_json")).unwrap_or_default(),
        obsoletes: serde_json::from_str(&row.get::<String, _>("obsoletes_json")).unwrap_or_default(),
        recommends: serde_json::from_str(&row.get::<String, _>("recommends_json")).unwrap_or_default(),
        suggests: serde_json::from_str(&row.get::<String, _>("suggests_json")).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PackageBuilder;

    fn pkg(name: &str) -> Package {
        PackageBuilder {
            nevra: Some(Nevra::new(name, 0, "1.0", "1", "x86_64")),
            media: "core".into(),
            provides: vec![Capability::unversioned("mta")],
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn insert_then_load_round_trips() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.insert_package(&pkg("postfix")).await.unwrap();

        let all = catalog.load_all_packages().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].nevra.name, "postfix");
        assert!(all[0].provides.iter().any(|c| c.name == "mta"));
    }

    #[tokio::test]
    async fn find_providers_matches_capability_name() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        catalog.insert_package(&pkg("postfix")).await.unwrap();

        let providers = catalog.find_providers("mta").await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "postfix");
    }

    #[tokio::test]
    async fn delete_removes_package_and_provides() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        let p = pkg("postfix");
        catalog.insert_package(&p).await.unwrap();
        catalog.delete_package("core", &p.nevra).await.unwrap();

        assert!(catalog.load_all_packages().await.unwrap().is_empty());
        assert!(catalog.find_providers("mta").await.unwrap().is_empty());
    }
}
