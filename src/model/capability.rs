//! Capability expressions: provides / requires / conflicts / obsoletes entries.

use std::cmp::Ordering;
use std::fmt;

use super::nevra::rpm_version_cmp;

/// Version-comparison operator carried by a capability expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CapOp {
    None,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CapOp {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "==" | "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Test a candidate version ordering (candidate.cmp(required)) against this operator.
    fn satisfied_by(self, ordering: Ordering) -> bool {
        match self {
            Self::None => true,
            Self::Eq => ordering == Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// A named, optionally versioned capability. A file path is a capability
/// with `name` set to the path and `op = None`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Capability {
    pub name: String,
    pub op: CapOp,
    pub evr: Option<String>,
}

impl Capability {
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self { name: name.into(), op: CapOp::None, evr: None }
    }

    pub fn versioned(name: impl Into<String>, op: CapOp, evr: impl Into<String>) -> Self {
        Self { name: name.into(), op, evr: Some(evr.into()) }
    }

    pub fn is_file_path(&self) -> bool {
        self.name.starts_with('/')
    }

    /// Does a provided capability (with its own optional version) satisfy
    /// this required capability?
    pub fn satisfied_by(&self, provided_evr: Option<&str>) -> bool {
        if self.name.is_empty() {
            return false;
        }
        match (self.op, &self.evr, provided_evr) {
            (CapOp::None, _, _) => true,
            (_, None, _) => true,
            (_, Some(_), None) => false,
            (op, Some(required), Some(provided)) => {
                op.satisfied_by(rpm_version_cmp(provided, required))
            }
        }
    }

    /// Parse a synthesis-style token: `name`, or `name[op version]`.
    pub fn parse_token(token: &str) -> Self {
        if let Some(bracket) = token.find('[') {
            let name = token[..bracket].to_string();
            let inner = token[bracket + 1..].trim_end_matches(']');
            let mut parts = inner.splitn(2, ' ');
            let op = parts.next().and_then(CapOp::parse);
            let evr = parts.next().map(str::to_string);
            match op {
                Some(op) => Self { name, op, evr },
                None => Self::unversioned(token),
            }
        } else {
            Self::unversioned(token)
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.op, &self.evr) {
            (CapOp::None, _) | (_, None) => write!(f, "{}", self.name),
            (op, Some(evr)) => write!(f, "{}[{} {}]", self.name, op.as_str(), evr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versioned_token() {
        let cap = Capability::parse_token("libfoo.so.2[>= 1.2]");
        assert_eq!(cap.name, "libfoo.so.2");
        assert_eq!(cap.op, CapOp::Ge);
        assert_eq!(cap.evr.as_deref(), Some("1.2"));
    }

    #[test]
    fn unversioned_token_has_no_op() {
        let cap = Capability::parse_token("/usr/bin/foo");
        assert!(cap.is_file_path());
        assert_eq!(cap.op, CapOp::None);
    }

    #[test]
    fn satisfaction_respects_operator() {
        let req = Capability::versioned("mta", CapOp::Ge, "2.0");
        assert!(req.satisfied_by(Some("3.0")));
        assert!(!req.satisfied_by(Some("1.0")));
        assert!(!req.satisfied_by(None));
    }

    #[test]
    fn unversioned_requirement_matches_any_provider() {
        let req = Capability::unversioned("mta");
        assert!(req.satisfied_by(None));
        assert!(req.satisfied_by(Some("whatever")));
    }
}
