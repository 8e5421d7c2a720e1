//! User-facing preference syntax (spec §4.3): guidance applied to the
//! capability layer, never a hard override of dependencies.

use crate::model::Package;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreferenceToken {
    /// `name:version` — require/prefer the matching versioned capability.
    VersionPin { name: String, version: String },
    /// `pattern` — upweight any candidate whose provides/requires contain a
    /// capability name matching this substring.
    Favor(String),
    /// `-pattern` — downweight/forbid matching candidates.
    Forbid(String),
}

/// Parse a comma-separated preference string, e.g.
/// `"php:8.4,apache,php-fpm,-apache-mod_php"`.
pub fn parse(spec: &str) -> Vec<PreferenceToken> {
    spec.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|token| {
            if let Some(pattern) = token.strip_prefix('-') {
                PreferenceToken::Forbid(pattern.to_string())
            } else if let Some((name, version)) = token.split_once(':') {
                PreferenceToken::VersionPin { name: name.to_string(), version: version.to_string() }
            } else {
                PreferenceToken::Favor(token.to_string())
            }
        })
        .collect()
}

/// A package's capability surface a preference pattern can match against:
/// its own name, everything it provides, everything it requires.
fn capability_names(pkg: &Package) -> impl Iterator<Item = &str> {
    pkg.provided_capability_names().chain(pkg.requires.iter().map(|c| c.name.as_str()))
}

/// Net preference score for a candidate: +1 per matching favor/version-pin,
/// -1000 per matching forbid (forbids are near-exclusionary, not just a
/// tie-break, but still not a hard constraint per §4.3 — a forbidden
/// candidate is only ever chosen if it is the sole provider).
pub fn score(tokens: &[PreferenceToken], pkg: &Package) -> i64 {
    let mut total = 0i64;
    for token in tokens {
        match token {
            PreferenceToken::Favor(pattern) => {
                if capability_names(pkg).any(|n| n.contains(pattern.as_str())) {
                    total += 1;
                }
            }
            PreferenceToken::VersionPin { name, version } => {
                if pkg.nevra.version == *version && capability_names(pkg).any(|n| n.starts_with(name.as_str())) {
                    total += 2;
                }
            }
            PreferenceToken::Forbid(pattern) => {
                if capability_names(pkg).any(|n| n.contains(pattern.as_str())) {
                    total -= 1000;
                }
            }
        }
    }
    total
}
