//! The hand-rolled worklist/fixpoint solver (spec §4.3, §9's Open-Question
//! resolution — not pubgrub, not a general SAT engine: a worklist over the
//! id-keyed [`Pool`] that iterates requires/obsoletes/conflicts to a
//! fixpoint, consistent with the Non-goal in spec §1).

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::model::{Capability, Nevra};

use super::job::{Job, Selector, UpgradeTarget};
use super::pool::{CandidateId, Pool};
use super::preferences::{self, PreferenceToken};
use super::transaction_build::{classify_installs, order_dependency_first, order_dependent_first};

/// A required capability with ≥ 2 non-installed providers and no preference
/// to disambiguate (spec §4.3's "alternatives").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoicePoint {
    pub capability: String,
    pub candidates: Vec<Nevra>,
    pub reason_chain: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unsatisfiable: {job}: {}", problem_chain.join(" -> "))]
    Unsatisfiable { job: String, problem_chain: Vec<String> },
    #[error("{a} conflicts with {b}")]
    Conflicting { a: Nevra, b: Nevra },
    #[error("held package {held} would be obsoleted by {by}")]
    HeldWouldBeObsoleted { held: String, by: Nevra },
    #[error("ambiguous choice for capability {}", choice.capability)]
    Ambiguous { choice: ChoicePoint },
}

impl From<ResolveError> for crate::errors::Error {
    fn from(e: ResolveError) -> Self {
        crate::errors::Error::Resolver(e.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    pub allow_downgrade: bool,
    pub with_recommends: bool,
    pub with_suggests: bool,
    pub erase_recommends: bool,
    pub force: bool,
    pub nodeps: bool,
    pub preferences: Vec<PreferenceToken>,
    pub held: HashSet<String>,
    pub blacklist: HashSet<String>,
    pub media_priority: HashMap<String, i32>,
    /// Non-interactive mode: an ambiguous choice picks the top-ranked
    /// candidate instead of surfacing [`ResolveError::Ambiguous`].
    pub auto: bool,
    pub system_arch: String,
    pub locale: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allow_downgrade: false,
            with_recommends: true,
            with_suggests: false,
            erase_recommends: false,
            force: false,
            nodeps: false,
            preferences: Vec::new(),
            held: HashSet::new(),
            blacklist: HashSet::new(),
            media_priority: HashMap::new(),
            auto: false,
            system_arch: "x86_64".to_string(),
            locale: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkippedPackage {
    pub nevra: Nevra,
    pub reason: String,
}

/// Resolver output: spec's glossary "Transaction — resolver output plus its
/// ordered execution against the RPM database" (execution lives in
/// `crate::transaction`; this is the ordered plan).
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    pub to_install: Vec<Nevra>,
    pub to_upgrade: Vec<Nevra>,
    pub to_erase: Vec<Nevra>,
    pub skipped: Vec<SkippedPackage>,
}

/// Entry point: resolve `jobs` against `pool` under `opts`.
pub fn solve(pool: &Pool, jobs: &[Job], opts: &Options) -> Result<Transaction, ResolveError> {
    let mut selected: HashMap<String, CandidateId> = HashMap::new();
    let mut erase_names: HashSet<String> = HashSet::new();
    let mut skipped = Vec::new();
    let mut worklist: VecDeque<(CandidateId, String)> = VecDeque::new();
    let mut direct_install_names: HashSet<String> = HashSet::new();

    for job in jobs {
        match job {
            Job::Install(selector) => {
                let id = select_candidate(pool, selector, opts, &selected)?;
                let name = pool.get(id).nevra.name.clone();
                selected.insert(name.clone(), id);
                direct_install_names.insert(name);
                worklist.push_back((id, job.describe()));
            }
            Job::Erase(name) => {
                erase_names.insert(name.clone());
            }
            Job::Upgrade(UpgradeTarget::Name(name)) => {
                if opts.held.contains(name) {
                    continue;
                }
                if let Some(id) = best_upgrade_candidate(pool, name, opts) {
                    selected.insert(name.clone(), id);
                    worklist.push_back((id, job.describe()));
                }
            }
            Job::Upgrade(UpgradeTarget::All) | Job::DistUpgrade => {
                for nevra in pool.installed_nevras().clone() {
                    if opts.held.contains(&nevra.name) {
                        continue;
                    }
                    if let Some(id) = best_upgrade_candidate(pool, &nevra.name, opts) {
                        selected.insert(nevra.name.clone(), id);
                        worklist.push_back((id, job.describe()));
                    }
                }
            }
        }
    }

    if !opts.nodeps {
        resolve_requires(pool, opts, &mut selected, &mut worklist)?;
        if opts.with_recommends {
            resolve_weak(pool, opts, &mut selected, &mut worklist);
        }
    }

    resolve_obsoletes(pool, opts, &mut selected, &mut erase_names, &mut skipped, &direct_install_names)?;
    check_conflicts(pool, &selected, &erase_names)?;

    let selected_ids: Vec<CandidateId> = selected.values().copied().collect();
    let (fresh, upgrades) = classify_installs(pool, &selected_ids);

    let erase_ids: Vec<CandidateId> = pool
        .installed_nevras()
        .iter()
        .filter(|n| erase_names.contains(&n.name))
        .filter_map(|n| pool.by_name(&n.name).iter().find(|&&id| pool.get(id).nevra == *n).copied())
        .collect();

    Ok(Transaction {
        to_install: order_dependency_first(pool, &fresh),
        to_upgrade: order_dependency_first(pool, &upgrades),
        to_erase: order_dependent_first(pool, &erase_ids),
        skipped,
    })
}

fn select_candidate(
    pool: &Pool,
    selector: &Selector,
    opts: &Options,
    already: &HashMap<String, CandidateId>,
) -> Result<CandidateId, ResolveError> {
    let cap = match selector {
        Selector::Name(name) => Capability::unversioned(name.clone()),
        Selector::File(path) => Capability::unversioned(path.clone()),
        Selector::Capability(cap) => cap.clone(),
    };

    if let Selector::Name(name) = selector {
        if let Some(&id) = already.get(name) {
            return Ok(id);
        }
    }

    let candidates: Vec<CandidateId> =
        pool.providers_of(&cap).into_iter().filter(|&id| !is_blacklisted(pool, id, opts)).collect();

    pick_candidate(pool, &cap.name, candidates, opts, &[selector_describe(selector)])
}

fn selector_describe(selector: &Selector) -> String {
    match selector {
        Selector::Name(n) => n.clone(),
        Selector::File(f) => f.clone(),
        Selector::Capability(c) => c.to_string(),
    }
}

fn is_blacklisted(pool: &Pool, id: CandidateId, opts: &Options) -> bool {
    opts.blacklist.contains(&pool.get(id).nevra.name)
}

/// Rank `candidates` by spec §4.3's tie-break order and either return the
/// unique winner, the top-ranked pick in auto mode, or an [`Ambiguous`]
/// choice point when ≥ 2 non-installed candidates remain genuinely tied
/// after preferences.
fn pick_candidate(
    pool: &Pool,
    capability_name: &str,
    candidates: Vec<CandidateId>,
    opts: &Options,
    reason_chain: &[String],
) -> Result<CandidateId, ResolveError> {
    if candidates.is_empty() {
        return Err(ResolveError::Unsatisfiable {
            job: capability_name.to_string(),
            problem_chain: reason_chain.to_vec(),
        });
    }
    if candidates.len() == 1 {
        return Ok(candidates[0]);
    }

    let mut ranked: Vec<(CandidateId, RankKey)> =
        candidates.iter().map(|&id| (id, rank_key(pool, id, opts))).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let best = ranked[0].1.clone();
    let tied: Vec<CandidateId> = ranked.iter().filter(|(_, k)| *k == best).map(|(id, _)| *id).collect();

    if tied.len() == 1 || opts.auto {
        return Ok(ranked[0].0);
    }

    Err(ResolveError::Ambiguous {
        choice: ChoicePoint {
            capability: capability_name.to_string(),
            candidates: tied.iter().map(|&id| pool.get(id).nevra.clone()).collect(),
            reason_chain: reason_chain.to_vec(),
        },
    })
}

/// Tie-break order (spec §4.3): held-and-installed, preference score, media
/// priority, newer EVR, same-arch, locale match. `Ord` on the tuple compares
/// left-to-right, so the fields are listed in priority order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    held_and_installed: bool,
    preference_score: i64,
    media_priority: i32,
    evr: crate::model::Evr,
    same_arch: bool,
    locale_match: bool,
}

fn rank_key(pool: &Pool, id: CandidateId, opts: &Options) -> RankKey {
    let pkg = pool.get(id);
    RankKey {
        held_and_installed: pool.is_installed(id) && opts.held.contains(&pkg.nevra.name),
        preference_score: preferences::score(&opts.preferences, pkg),
        media_priority: opts.media_priority.get(&pkg.media).copied().unwrap_or(0),
        evr: pkg.nevra.evr(),
        same_arch: pkg.nevra.arch == opts.system_arch,
        locale_match: opts.locale.as_ref().is_some_and(|loc| pkg.nevra.name.ends_with(loc.as_str())),
    }
}

fn best_upgrade_candidate(pool: &Pool, name: &str, opts: &Options) -> Option<CandidateId> {
    let installed = pool.installed_nevras().iter().find(|n| n.name == name)?.clone();
    pool.by_name(name)
        .iter()
        .copied()
        .filter(|&id| !pool.is_installed(id))
        .filter(|&id| opts.allow_downgrade || pool.get(id).nevra.evr() > installed.evr())
        .max_by(|&a, &b| rank_key(pool, a, opts).cmp(&rank_key(pool, b, opts)))
}

fn resolve_requires(
    pool: &Pool,
    opts: &Options,
    selected: &mut HashMap<String, CandidateId>,
    worklist: &mut VecDeque<(CandidateId, String)>,
) -> Result<(), ResolveError> {
    while let Some((id, reason)) = worklist.pop_front() {
        let pkg = pool.get(id).clone();
        for req in &pkg.requires {
            if is_satisfied(pool, selected, req) {
                continue;
            }
            let candidates: Vec<CandidateId> = pool
                .providers_of(req)
                .into_iter()
                .filter(|&c| !is_blacklisted(pool, c, opts))
                .collect();
            let chosen =
                pick_candidate(pool, &req.name, candidates, opts, &[reason.clone(), req.to_string()])?;
            let chosen_name = pool.get(chosen).nevra.name.clone();
            if selected.insert(chosen_name.clone(), chosen).is_none() {
                worklist.push_back((chosen, format!("{reason} -> {}", req.name)));
            }
        }
    }
    Ok(())
}

/// Recommends are included when satisfiable without disturbing the hard
/// constraints already locked in; any failure here is silently dropped,
/// never surfaced (spec §4.3's weak-dependency rule). Suggests are never
/// auto-included.
fn resolve_weak(
    pool: &Pool,
    opts: &Options,
    selected: &mut HashMap<String, CandidateId>,
    worklist: &mut VecDeque<(CandidateId, String)>,
) {
    let ids: Vec<CandidateId> = selected.values().copied().collect();
    for id in ids {
        let pkg = pool.get(id).clone();
        for rec in &pkg.recommends {
            if is_satisfied(pool, selected, rec) {
                continue;
            }
            let candidates: Vec<CandidateId> =
                pool.providers_of(rec).into_iter().filter(|&c| !is_blacklisted(pool, c, opts)).collect();
            if let Ok(chosen) = pick_candidate(pool, &rec.name, candidates, opts, &[]) {
                let name = pool.get(chosen).nevra.name.clone();
                if selected.insert(name, chosen).is_none() {
                    worklist.push_back((chosen, format!("recommended-by {}", pkg.nevra.name)));
                }
            }
        }
    }
    // A recommends candidate may itself carry requires; walk those too.
    if !worklist.is_empty() {
        let _ = resolve_requires(pool, opts, selected, worklist);
    }
}

fn is_satisfied(pool: &Pool, selected: &HashMap<String, CandidateId>, req: &Capability) -> bool {
    pool.installed_nevras().iter().any(|n| {
        (n.name == req.name && req.satisfied_by(Some(&n.evr().to_string())))
            || selected.get(&n.name).is_some_and(|&id| pool.get(id).provides_capability(req))
    }) || selected.values().any(|&id| pool.get(id).provides_capability(req))
}

/// Obsoletes (spec §4.3, §8 scenario 2): an installed package obsoleted by
/// a selected candidate is scheduled for erase, unless held — in which case
/// the obsoleting candidate is dropped from the transaction with a recorded
/// reason rather than failing the whole run, when it was pulled in broadly
/// (upgrade-all/distupgrade, or as a dependency of something else). An
/// explicit, directly-requested install of the obsoleting package (named in
/// a `Job::Install`) still hard-fails with [`ResolveError::HeldWouldBeObsoleted`]
/// — the user asked for that exact package by name, so silently dropping it
/// would be surprising.
fn resolve_obsoletes(
    pool: &Pool,
    _opts: &Options,
    selected: &mut HashMap<String, CandidateId>,
    erase_names: &mut HashSet<String>,
    skipped: &mut Vec<SkippedPackage>,
    direct_install_names: &HashSet<String>,
) -> Result<(), ResolveError> {
    let mut drop_names = Vec::new();
    for (sel_name, &id) in selected.iter() {
        let candidate = pool.get(id);
        for installed in pool.installed_nevras() {
            if pool.is_installed(id) {
                continue;
            }
            let installed_pkg = pool.by_name(&installed.name).iter().map(|&i| pool.get(i)).find(|p| p.nevra == *installed);
            let Some(installed_pkg) = installed_pkg else { continue };
            if !candidate.obsoletes_package(installed_pkg) {
                continue;
            }
            if _opts.held.contains(&installed.name) {
                if direct_install_names.contains(sel_name) {
                    return Err(ResolveError::HeldWouldBeObsoleted {
                        held: installed.name.clone(),
                        by: candidate.nevra.clone(),
                    });
                }
                drop_names.push((sel_name.clone(), installed.clone()));
            } else {
                erase_names.insert(installed.name.clone());
            }
        }
    }

    for (sel_name, held_nevra) in drop_names {
        if let Some(&id) = selected.get(&sel_name) {
            if pool.is_installed(id) {
                continue;
            }
            skipped.push(SkippedPackage {
                nevra: pool.get(id).nevra.clone(),
                reason: format!("would obsolete held package {}", held_nevra.name),
            });
            selected.remove(&sel_name);
        }
    }
    Ok(())
}

fn check_conflicts(
    pool: &Pool,
    selected: &HashMap<String, CandidateId>,
    erase_names: &HashSet<String>,
) -> Result<(), ResolveError> {
    let final_pkgs: Vec<&crate::model::Package> = selected
        .values()
        .map(|&id| pool.get(id))
        .chain(
            pool.installed_nevras()
                .iter()
                .filter(|n| !erase_names.contains(&n.name) && !selected.contains_key(&n.name))
                .filter_map(|n| pool.by_name(&n.name).iter().map(|&i| pool.get(i)).find(|p| p.nevra == *n)),
        )
        .collect();

    for i in 0..final_pkgs.len() {
        for j in (i + 1)..final_pkgs.len() {
            if final_pkgs[i].conflicts_with(final_pkgs[j]) {
                return Err(ResolveError::Conflicting {
                    a: final_pkgs[i].nevra.clone(),
                    b: final_pkgs[j].nevra.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CapOp, PackageBuilder};

    fn pkg(
        name: &str,
        version: &str,
        provides: &[&str],
        requires: &[&str],
        obsoletes: &[&str],
    ) -> crate::model::Package {
        PackageBuilder {
            nevra: Some(Nevra::new(name, 0, version, "1", "x86_64")),
            media: "core".into(),
            provides: provides.iter().map(|p| Capability::unversioned(*p)).collect(),
            requires: requires.iter().map(|r| Capability::unversioned(*r)).collect(),
            obsoletes: obsoletes.iter().map(|o| Capability::unversioned(*o)).collect(),
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn scenario_one_install_with_alternatives() {
        let catalog = vec![
            pkg("pkg-a", "1.0", &[], &["mta"], &[]),
            pkg("sendmail", "1.0", &["mta"], &[], &[]),
            pkg("postfix", "3.0", &["mta"], &[], &[]),
        ];
        let pool = Pool::build(catalog, vec![]);
        let jobs = vec![Job::Install(Selector::Name("pkg-a".to_string()))];
        let opts = Options { preferences: preferences::parse("postfix"), ..Default::default() };

        let tx = solve(&pool, &jobs, &opts).unwrap();
        let names: Vec<&str> = tx.to_install.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["postfix", "pkg-a"]);
    }

    #[test]
    fn scenario_two_held_package_blocks_obsoletion() {
        let dhcp_client = Nevra::new("dhcp-client", 0, "4.4", "1", "x86_64");
        let installed = vec![PackageBuilder {
            nevra: Some(dhcp_client.clone()),
            media: "core".into(),
            ..Default::default()
        }
        .build()
        .unwrap()];
        let catalog = vec![pkg("dhcpcd", "10", &[], &[], &["dhcp-client"])];
        let pool = Pool::build(catalog, installed);

        let mut opts = Options::default();
        opts.held.insert("dhcp-client".to_string());
        let jobs = vec![Job::Upgrade(UpgradeTarget::Name("dhcpcd".to_string()))];

        let tx = solve(&pool, &jobs, &opts).unwrap();
        assert!(tx.to_install.iter().all(|n| n.name != "dhcpcd"));
        assert!(tx.skipped.iter().any(|s| s.nevra.name == "dhcpcd"));
        assert!(tx.to_erase.is_empty());
    }

    #[test]
    fn direct_install_of_obsoleting_package_hard_fails_when_target_is_held() {
        let dhcp_client = Nevra::new("dhcp-client", 0, "4.4", "1", "x86_64");
        let installed = vec![PackageBuilder {
            nevra: Some(dhcp_client.clone()),
            media: "core".into(),
            ..Default::default()
        }
        .build()
        .unwrap()];
        let catalog = vec![pkg("dhcpcd", "10", &[], &[], &["dhcp-client"])];
        let pool = Pool::build(catalog, installed);

        let mut opts = Options::default();
        opts.held.insert("dhcp-client".to_string());
        let jobs = vec![Job::Install(Selector::Name("dhcpcd".to_string()))];

        let result = solve(&pool, &jobs, &opts);
        match result {
            Err(ResolveError::HeldWouldBeObsoleted { held, by }) => {
                assert_eq!(held, "dhcp-client");
                assert_eq!(by.name, "dhcpcd");
            }
            other => panic!("expected HeldWouldBeObsoleted, got {other:?}"),
        }
    }

    #[test]
    fn conflicting_candidates_are_rejected() {
        let a = PackageBuilder {
            nevra: Some(Nevra::new("a", 0, "1", "1", "x86_64")),
            media: "core".into(),
            conflicts: vec![Capability::unversioned("b")],
            provides: vec![Capability::unversioned("a")],
            ..Default::default()
        }
        .build()
        .unwrap();
        let b = PackageBuilder {
            nevra: Some(Nevra::new("b", 0, "1", "1", "x86_64")),
            media: "core".into(),
            provides: vec![Capability::unversioned("b")],
            ..Default::default()
        }
        .build()
        .unwrap();
        let pool = Pool::build(vec![a, b], vec![]);
        let jobs =
            vec![Job::Install(Selector::Name("a".to_string())), Job::Install(Selector::Name("b".to_string()))];
        let result = solve(&pool, &jobs, &Options::default());
        assert!(matches!(result, Err(ResolveError::Conflicting { .. })));
    }

    #[test]
    fn unsatisfiable_requirement_is_reported() {
        let a = pkg("a", "1.0", &[], &["nonexistent"], &[]);
        let pool = Pool::build(vec![a], vec![]);
        let jobs = vec![Job::Install(Selector::Name("a".to_string()))];
        let result = solve(&pool, &jobs, &Options::default());
        assert!(matches!(result, Err(ResolveError::Unsatisfiable { .. })));
    }

    #[test]
    fn ambiguous_alternative_without_preference_surfaces_choice_point() {
        let a = pkg("pkg-a", "1.0", &[], &["mta"], &[]);
        let sendmail = pkg("sendmail", "1.0", &["mta"], &[], &[]);
        let postfix = pkg("postfix", "1.0", &["mta"], &[], &[]);
        let pool = Pool::build(vec![a, sendmail, postfix], vec![]);
        let jobs = vec![Job::Install(Selector::Name("pkg-a".to_string()))];
        let result = solve(&pool, &jobs, &Options::default());
        assert!(matches!(result, Err(ResolveError::Ambiguous { .. })));
    }

    #[test]
    fn ambiguous_op_ignored() {
        let _ = CapOp::None;
    }
}
