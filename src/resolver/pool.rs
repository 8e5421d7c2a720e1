//! The id-keyed arena of resolvable candidates (spec §9's "packages are
//! arena-allocated, keyed by NEVRA id, never by owning reference" design
//! note — package graphs contain cycles, esp. shared-library families).

use std::collections::HashMap;

use crate::model::{Capability, Nevra, Package};

/// An index into [`Pool::candidates`]. Cheap to copy, cheap to hash; the
/// solver only ever passes these around, never `&Package`.
pub type CandidateId = usize;

/// installed-set ∪ catalog, indexed for the lookups the solver needs:
/// by name, and by provided-capability name (for alternative-set queries).
#[derive(Debug, Default)]
pub struct Pool {
    candidates: Vec<Package>,
    installed: std::collections::HashSet<Nevra>,
    by_name: HashMap<String, Vec<CandidateId>>,
    by_provides: HashMap<String, Vec<CandidateId>>,
}

impl Pool {
    /// Build a pool from the catalog's packages plus the installed-set
    /// projection. A NEVRA present in both is only indexed once, flagged
    /// installed — the solver treats "already installed" as a ranking
    /// input, not a separate candidate.
    pub fn build(catalog_packages: Vec<Package>, installed: Vec<Package>) -> Self {
        let mut pool = Pool::default();
        let installed_nevras: std::collections::HashSet<Nevra> =
            installed.iter().map(|p| p.nevra.clone()).collect();

        let mut seen = std::collections::HashSet::new();
        for pkg in installed.into_iter().chain(catalog_packages) {
            if !seen.insert(pkg.nevra.clone()) {
                continue;
            }
            pool.insert(pkg);
        }
        pool.installed = installed_nevras;
        pool
    }

    fn insert(&mut self, pkg: Package) {
        let id = self.candidates.len();
        for name in pkg.provided_capability_names() {
            self.by_provides.entry(name.to_string()).or_default().push(id);
        }
        self.by_name.entry(pkg.nevra.name.clone()).or_default().push(id);
        self.candidates.push(pkg);
    }

    pub fn get(&self, id: CandidateId) -> &Package {
        &self.candidates[id]
    }

    pub fn is_installed(&self, id: CandidateId) -> bool {
        self.installed.contains(&self.candidates[id].nevra)
    }

    pub fn installed_nevras(&self) -> &std::collections::HashSet<Nevra> {
        &self.installed
    }

    pub fn by_name(&self, name: &str) -> &[CandidateId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All candidates providing a capability matching `cap` (name match;
    /// version satisfaction is checked by the caller against each hit since
    /// a name can be provided at several versions across candidates).
    pub fn providers_of(&self, cap: &Capability) -> Vec<CandidateId> {
        self.by_provides
            .get(&cap.name)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&id| {
                let pkg = &self.candidates[id];
                cap.name == pkg.nevra.name
                    && cap.satisfied_by(Some(&pkg.nevra.evr().to_string()))
                    || pkg.provides.iter().any(|p| p.name == cap.name && cap.satisfied_by(p.evr.as_deref()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
