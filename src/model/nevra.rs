//! (Name, Epoch, Version, Release, Arch) — the identity of a concrete package build.

use std::cmp::Ordering;
use std::fmt;

/// Identity of a concrete package build. Globally unique within a media snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Nevra {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl Nevra {
    pub fn new(
        name: impl Into<String>,
        epoch: u32,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch,
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
        }
    }

    /// The EVR (epoch:version-release) triple, used in most version comparisons.
    pub fn evr(&self) -> Evr {
        Evr {
            epoch: self.epoch,
            version: self.version.clone(),
            release: self.release.clone(),
        }
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{}-{}.{}",
            self.name, self.epoch, self.version, self.release, self.arch
        )
    }
}

/// Epoch:Version-Release, orderable the RPM way (epoch first, then a
/// segment-wise alnum comparison of version and release).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Evr {
    pub epoch: u32,
    pub version: String,
    pub release: String,
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.epoch, self.version, self.release)
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpm_version_cmp(&self.version, &other.version))
            .then_with(|| rpm_version_cmp(&self.release, &other.release))
    }
}

/// RPM's "rpmvercmp": split each string into runs of digits / alpha /
/// everything-else, compare run-by-run, numeric runs compare numerically.
/// A dangling extra segment on either side wins for that side.
pub fn rpm_version_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a;
    let mut b = b;

    loop {
        a = a.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
        b = b.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());

        if a.is_empty() && b.is_empty() {
            return Ordering::Equal;
        }
        if a.is_empty() {
            return Ordering::Less;
        }
        if b.is_empty() {
            return Ordering::Greater;
        }

        let (a_seg, a_rest, a_numeric) = take_segment(a);
        let (b_seg, b_rest, b_numeric) = take_segment(b);
        a = a_rest;
        b = b_rest;

        let ord = if a_numeric && b_numeric {
            let a_trimmed = a_seg.trim_start_matches('0');
            let b_trimmed = b_seg.trim_start_matches('0');
            a_trimmed
                .len()
                .cmp(&b_trimmed.len())
                .then_with(|| a_trimmed.cmp(b_trimmed))
        } else if a_numeric {
            // numeric segments are always newer than alpha segments
            Ordering::Greater
        } else if b_numeric {
            Ordering::Less
        } else {
            a_seg.cmp(b_seg)
        };

        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn take_segment(s: &str) -> (&str, &str, bool) {
    let numeric = s.starts_with(|c: char| c.is_ascii_digit());
    let is_boundary =
        |c: char| if numeric { !c.is_ascii_digit() } else { !c.is_ascii_alphabetic() };
    let idx = s.find(is_boundary).unwrap_or(s.len());
    (&s[..idx], &s[idx..], numeric)
}
