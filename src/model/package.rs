//! Package record: the catalog's projection of one package build within one media.

use super::capability::Capability;
use super::nevra::Nevra;

/// A package record as ingested from a media's synthesis/hdlist metadata.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Package {
    pub nevra: Nevra,
    pub media: String,
    pub summary: String,
    pub group: String,
    pub size: u64,
    pub description: Option<String>,
    pub changelog: Option<String>,
    pub license: Option<String>,
    pub url: Option<String>,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
    pub conflicts: Vec<Capability>,
    pub obsoletes: Vec<Capability>,
    pub recommends: Vec<Capability>,
    pub suggests: Vec<Capability>,
    pub checksum: Option<String>,
}

impl Package {
    /// Every name-capability a package is addressable as a provider for:
    /// its own name (so plain `requires: foo` resolves to the package named
    /// `foo`) plus everything it explicitly provides.
    pub fn provided_capability_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.nevra.name.as_str()).chain(self.provides.iter().map(|c| c.name.as_str()))
    }

    pub fn provides_capability(&self, req: &Capability) -> bool {
        if req.name == self.nevra.name {
            if req.satisfied_by(Some(&self.nevra.evr().to_string())) {
                return true;
            }
        }
        self.provides
            .iter()
            .any(|p| p.name == req.name && req.satisfied_by(p.evr.as_deref()))
    }

    pub fn obsoletes_package(&self, other: &Package) -> bool {
        self.obsoletes.iter().any(|o| {
            o.name == other.nevra.name && o.satisfied_by(Some(&other.nevra.evr().to_string()))
        })
    }

    pub fn conflicts_with(&self, other: &Package) -> bool {
        self.conflicts.iter().any(|c| other.provides_capability(c))
            || other.conflicts.iter().any(|c| self.provides_capability(c))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackageBuilder {
    pub nevra: Option<Nevra>,
    pub media: String,
    pub summary: String,
    pub group: String,
    pub size: u64,
    pub description: Option<String>,
    pub changelog: Option<String>,
    pub license: Option<String>,
    pub url: Option<String>,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
    pub conflicts: Vec<Capability>,
    pub obsoletes: Vec<Capability>,
    pub recommends: Vec<Capability>,
    pub suggests: Vec<Capability>,
    pub checksum: Option<String>,
}

impl PackageBuilder {
    pub fn new(media: impl Into<String>) -> Self {
        Self { media: media.into(), ..Default::default() }
    }

    pub fn build(self) -> Option<Package> {
        let nevra = self.nevra?;
        Some(Package {
            nevra,
            media: self.media,
            summary: self.summary,
            group: self.group,
            size: self.size,
            description: self.description,
            changelog: self.changelog,
            license: self.license,
            url: self.url,
            provides: self.provides,
            requires: self.requires,
            conflicts: self.conflicts,
            obsoletes: self.obsoletes,
            recommends: self.recommends,
            suggests: self.suggests,
            checksum: self.checksum,
        })
    }
}

/// One row of the package-file index: (media, nevra, directory, basename).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PackageFile {
    pub media: String,
    pub nevra: Nevra,
    pub directory: String,
    pub basename: String,
}

impl PackageFile {
    pub fn full_path(&self) -> String {
        if self.directory.ends_with('/') {
            format!("{}{}", self.directory, self.basename)
        } else {
            format!("{}/{}", self.directory, self.basename)
        }
    }
}
