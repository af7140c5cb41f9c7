//! Semver requirement handling on top of PubGrub ranges.
//!
//! Requirements are mapped to version sets so that several constraints on
//! one package can be intersected and checked for emptiness. Pre-release
//! opt-in rules are not encoded here: picking a concrete candidate still
//! goes through [`VersionReq::matches`].

use pubgrub::Ranges;
use semver::{Comparator, Op, Version, VersionReq};

/// Convert a semver VersionReq to a PubGrub range.
pub fn version_req_to_range(req: &VersionReq) -> Ranges<Version> {
    req.comparators
        .iter()
        .fold(Ranges::full(), |range, comp| {
            range.intersection(&comparator_to_range(comp))
        })
}

/// Intersect several requirements.
pub fn intersect_all<'a>(reqs: impl IntoIterator<Item = &'a VersionReq>) -> Ranges<Version> {
    reqs.into_iter().fold(Ranges::full(), |range, req| {
        range.intersection(&version_req_to_range(req))
    })
}

/// Convert a single semver Comparator to a PubGrub range.
fn comparator_to_range(comp: &Comparator) -> Ranges<Version> {
    let major = comp.major;
    let minor = comp.minor.unwrap_or(0);
    let patch = comp.patch.unwrap_or(0);

    let mut version = Version::new(major, minor, patch);
    version.pre = comp.pre.clone();

    // First version past the partially specified one: `1` -> 2.0.0, `1.2` -> 1.3.0
    let past_partial = || match (comp.minor, comp.patch) {
        (None, _) => Version::new(major + 1, 0, 0),
        (Some(_), None) => Version::new(major, minor + 1, 0),
        (Some(_), Some(_)) => Version::new(major, minor, patch + 1),
    };

    match comp.op {
        Op::Exact | Op::Wildcard => {
            if comp.patch.is_some() {
                Ranges::singleton(version)
            } else {
                Ranges::between(version, past_partial())
            }
        }

        Op::Greater => {
            if comp.patch.is_some() {
                Ranges::strictly_higher_than(version)
            } else {
                Ranges::higher_than(past_partial())
            }
        }

        Op::GreaterEq => Ranges::higher_than(version),

        Op::Less => Ranges::strictly_lower_than(version),

        Op::LessEq => {
            if comp.patch.is_some() {
                Ranges::lower_than(version)
            } else {
                Ranges::strictly_lower_than(past_partial())
            }
        }

        Op::Tilde => {
            // ~1.2.3 means >=1.2.3 <1.3.0, ~1 means >=1.0.0 <2.0.0
            let upper = if comp.minor.is_some() {
                Version::new(major, minor + 1, 0)
            } else {
                Version::new(major + 1, 0, 0)
            };
            Ranges::between(version, upper)
        }

        Op::Caret => {
            // ^1.2.3 means >=1.2.3 <2.0.0
            // ^0.2.3 means >=0.2.3 <0.3.0
            // ^0.0.3 means >=0.0.3 <0.0.4
            // ^0.0 means >=0.0.0 <0.1.0, ^0 means >=0.0.0 <1.0.0
            let upper = match (comp.minor, comp.patch) {
                _ if major > 0 => Version::new(major + 1, 0, 0),
                (None, _) => Version::new(1, 0, 0),
                _ if minor > 0 => Version::new(0, minor + 1, 0),
                (Some(_), None) => Version::new(0, 1, 0),
                (Some(_), Some(_)) => Version::new(0, 0, patch + 1),
            };
            Ranges::between(version, upper)
        }

        _ => Ranges::full(),
    }
}

/// Parse a version string, allowing a `v` prefix and missing components.
pub fn parse_version_lenient(s: &str) -> Option<Version> {
    let s = s.trim();
    let s = s
        .strip_prefix('v')
        .or_else(|| s.strip_prefix('V'))
        .unwrap_or(s);

    if let Ok(v) = s.parse() {
        return Some(v);
    }

    let parts: Vec<&str> = s.split('.').collect();
    match parts.len() {
        1 => {
            let major: u64 = parts[0].parse().ok()?;
            Some(Version::new(major, 0, 0))
        }
        2 => {
            let major: u64 = parts[0].parse().ok()?;
            let minor: u64 = parts[1].parse().ok()?;
            Some(Version::new(major, minor, 0))
        }
        _ => None,
    }
}
