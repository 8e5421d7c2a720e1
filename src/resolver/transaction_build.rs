//! Projects the solver's satisfying model to the three ordered lists a
//! transaction needs (spec §4.3's "transaction build"): dependency-first
//! installs/upgrades, dependent-first erases.

use std::collections::{HashMap, HashSet};

use crate::model::Nevra;

use super::pool::{CandidateId, Pool};

/// Topologically sort `ids` by their `requires` edges (deps before
/// dependents). Cycles are broken arbitrarily within the cycle — residual
/// cycles degrade to insertion order, per spec.
pub fn order_dependency_first(pool: &Pool, ids: &[CandidateId]) -> Vec<Nevra> {
    let wanted: HashSet<CandidateId> = ids.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());

    fn visit(
        id: CandidateId,
        pool: &Pool,
        wanted: &HashSet<CandidateId>,
        visited: &mut HashSet<CandidateId>,
        out: &mut Vec<Nevra>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let pkg = pool.get(id);
        for req in &pkg.requires {
            for provider in pool.providers_of(req) {
                if wanted.contains(&provider) {
                    visit(provider, pool, wanted, visited, out);
                }
            }
        }
        out.push(pkg.nevra.clone());
    }

    for &id in ids {
        visit(id, pool, &wanted, &mut visited, &mut out);
    }
    out
}

/// Reverse of [`order_dependency_first`]: dependents before the packages
/// they depend on, so erasing in this order never strands a requirement.
pub fn order_dependent_first(pool: &Pool, ids: &[CandidateId]) -> Vec<Nevra> {
    let mut forward = order_dependency_first(pool, ids);
    forward.reverse();
    forward
}

/// Splits a selected id into "fresh install" vs. "upgrade of an installed
/// NEVRA with the same name", based on pool installed-state.
pub fn classify_installs(pool: &Pool, ids: &[CandidateId]) -> (Vec<CandidateId>, Vec<CandidateId>) {
    let installed_by_name: HashMap<&str, &Nevra> =
        pool.installed_nevras().iter().map(|n| (n.name.as_str(), n)).collect();

    let mut fresh = Vec::new();
    let mut upgrades = Vec::new();
    for &id in ids {
        let pkg = pool.get(id);
        if pool.is_installed(id) {
            continue; // already at the target version, nothing to do
        }
        if installed_by_name.contains_key(pkg.nevra.name.as_str()) {
            upgrades.push(id);
        } else {
            fresh.push(id);
        }
    }
    (fresh, upgrades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capability, PackageBuilder};

    fn pkg(name: &str, requires: &[&str]) -> crate::model::Package {
        PackageBuilder {
            nevra: Some(Nevra::new(name, 0, "1.0", "1", "x86_64")),
            media: "core".into(),
            requires: requires.iter().map(|r| Capability::unversioned(*r)).collect(),
            provides: vec![Capability::unversioned(name)],
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn dependency_comes_before_dependent() {
        let pool = Pool::build(vec![pkg("pkg-a", &["mta"]), pkg("postfix", &[])], vec![]);
        let ordered = order_dependency_first(&pool, &[0, 1]);
        let postfix_pos = ordered.iter().position(|n| n.name == "postfix").unwrap();
        let pkg_a_pos = ordered.iter().position(|n| n.name == "pkg-a").unwrap();
        assert!(postfix_pos < pkg_a_pos);
    }

    #[test]
    fn erase_order_is_dependents_first() {
        let pool = Pool::build(vec![pkg("pkg-a", &["mta"]), pkg("postfix", &[])], vec![]);
        let ordered = order_dependent_first(&pool, &[0, 1]);
        let postfix_pos = ordered.iter().position(|n| n.name == "postfix").unwrap();
        let pkg_a_pos = ordered.iter().position(|n| n.name == "pkg-a").unwrap();
        assert!(pkg_a_pos < postfix_pos);
    }
}
