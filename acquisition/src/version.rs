//! Client binary versions and the version ranges packages target.
//!
//! Clients report loosely formatted binary versions ("1", "2.0", "2.0-beta").
//! Before matching, those are coerced into strict semantic versions. The
//! string the client actually sent is kept alongside, so responses can echo it
//! back unchanged.
//!
//! Packages target either an exact version or an npm-style range
//! (`^1.2.0`, `1.x`, `>=1.0.0 <2.0.0`, `1.0.0 - 2.0.0`, `1.0 || 2.0`).

use semver::{BuildMetadata, Comparator, Op, Version, VersionReq};
use std::fmt;

/// Which coercion, if any, was applied to a client version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Normalization {
    /// `"N"` became `"N.0.0"`.
    PlainInteger,
    /// `"MAJOR.MINOR[tag]"` became `"MAJOR.MINOR.0[tag]"`.
    MissingPatch,
}

/// A client version before validation: the raw string and its coerced form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedVersion {
    pub original: String,
    pub normalized: String,
    pub normalization: Option<Normalization>,
}

impl NormalizedVersion {
    pub fn was_normalized(&self) -> bool {
        self.normalization.is_some()
    }
}

/// Coerces a client supplied version string into semantic version form.
///
/// The first matching rule wins:
/// 1. a plain integer `"N"` becomes `"N.0.0"`,
/// 2. `"MAJOR.MINOR"`, optionally followed by a `+` or `-` tag, gets `.0`
///    inserted as its patch component right before the tag,
/// 3. anything else is passed through unchanged.
pub fn normalize_app_version(raw: &str) -> NormalizedVersion {
    if is_digits(raw) {
        return NormalizedVersion {
            original: raw.to_string(),
            normalized: format!("{raw}.0.0"),
            normalization: Some(Normalization::PlainInteger),
        };
    }

    let tag_index = raw.find(['+', '-']).unwrap_or(raw.len());
    let (core, tag) = raw.split_at(tag_index);
    if let Some((major, minor)) = core.split_once('.')
        && is_digits(major)
        && is_digits(minor)
    {
        return NormalizedVersion {
            original: raw.to_string(),
            normalized: format!("{core}.0{tag}"),
            normalization: Some(Normalization::MissingPatch),
        };
    }

    NormalizedVersion {
        original: raw.to_string(),
        normalized: raw.to_string(),
        normalization: None,
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// A validated client binary version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppVersion {
    version: Version,
    normalized: NormalizedVersion,
}

impl AppVersion {
    /// Normalizes `raw` and parses the result as a strict semantic version.
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        let normalized = normalize_app_version(raw);
        let version = Version::parse(&normalized.normalized)?;
        Ok(AppVersion {
            version,
            normalized,
        })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The strict form used for matching.
    pub fn normalized(&self) -> &str {
        &self.normalized.normalized
    }

    /// The string exactly as the client sent it.
    pub fn original(&self) -> &str {
        &self.normalized.original
    }

    pub fn was_normalized(&self) -> bool {
        self.normalized.was_normalized()
    }

    /// Maps a version about to be echoed to the client back to the client's
    /// own spelling when it is the normalized form of what the client sent.
    pub fn echo<'a>(&'a self, emitted: &'a str) -> &'a str {
        if self.was_normalized() && emitted == self.normalized() {
            self.original()
        } else {
            emitted
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.original())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("invalid version range {range:?}: {reason}")]
pub struct InvalidRange {
    pub range: String,
    pub reason: String,
}

/// The binary versions a package targets, as a union of comparator sets.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    pub fn parse(raw: &str) -> Result<Self, InvalidRange> {
        let alternatives = raw
            .split("||")
            .map(|alternative| parse_alternative(alternative.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| InvalidRange {
                range: raw.to_string(),
                reason,
            })?;

        Ok(VersionRange {
            raw: raw.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `version` is contained in the range.
    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Whether `version` is greater than every version the range contains.
    pub fn is_below(&self, version: &Version) -> bool {
        !self.satisfied_by(version)
            && self.alternatives.iter().all(|req| {
                req.comparators
                    .iter()
                    .filter_map(upper_bound)
                    .any(|bound| bound.is_exceeded_by(version))
            })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_alternative(alternative: &str) -> Result<VersionReq, String> {
    let comparators = match alternative.split_once(" - ") {
        Some((low, high)) => vec![
            format!(">={}", strip_build(low.trim())),
            format!("<={}", strip_build(high.trim())),
        ],
        None => comparator_tokens(alternative)?,
    };

    // A lone wildcard is only meaningful on its own.
    let comparators: Vec<String> = comparators.into_iter().filter(|c| c != "*").collect();
    if comparators.is_empty() {
        return Ok(VersionReq::STAR);
    }

    VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
}

/// Splits a whitespace separated comparator set, attaching operators written
/// apart from their version (`">= 1.0.0"`) and making bare versions exact.
fn comparator_tokens(alternative: &str) -> Result<Vec<String>, String> {
    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in alternative.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            if pending_op.replace(token).is_some() {
                return Err(format!("dangling operator before {token:?}"));
            }
            continue;
        }

        let (op, version) = match pending_op.take() {
            Some(op) => (op, token),
            None => {
                let split = token
                    .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
                    .unwrap_or(token.len());
                token.split_at(split)
            }
        };
        let version = strip_build(version.strip_prefix('v').unwrap_or(version));
        let version = normalize_wildcards(&version);

        let comparator = match op {
            "" if version == "*" || version.ends_with(".*") => version,
            "" => format!("={version}"),
            op => format!("{op}{version}"),
        };
        comparators.push(comparator);
    }

    if let Some(op) = pending_op {
        return Err(format!("operator {op:?} without a version"));
    }

    Ok(comparators)
}

fn strip_build(version: &str) -> String {
    match version.split_once('+') {
        Some((version, _build)) => version.to_string(),
        None => version.to_string(),
    }
}

/// Rewrites `x`/`X` components to `*` and drops everything after the first
/// wildcard, so `1.x.x` reads as `1.*`.
fn normalize_wildcards(version: &str) -> String {
    let mut parts = Vec::new();
    for part in version.split('.') {
        if matches!(part, "x" | "X" | "*") {
            parts.push("*");
            break;
        }
        parts.push(part);
    }
    parts.join(".")
}

struct UpperBound {
    version: Version,
    inclusive: bool,
}

impl UpperBound {
    fn is_exceeded_by(&self, version: &Version) -> bool {
        match self.inclusive {
            true => *version > self.version,
            false => *version >= self.version,
        }
    }
}

/// The version a comparator never reaches, or `None` when it is unbounded
/// above or its bound does not fit in a `u64`.
fn upper_bound(comparator: &Comparator) -> Option<UpperBound> {
    let exclusive = |major, minor, patch| {
        Some(UpperBound {
            version: Version::new(major, minor, patch),
            inclusive: false,
        })
    };
    let major = comparator.major;

    match comparator.op {
        Op::Exact | Op::Wildcard | Op::LessEq => match (comparator.minor, comparator.patch) {
            (Some(minor), Some(patch)) => Some(UpperBound {
                version: Version {
                    major,
                    minor,
                    patch,
                    pre: comparator.pre.clone(),
                    build: BuildMetadata::EMPTY,
                },
                inclusive: true,
            }),
            (Some(minor), None) => exclusive(major, minor.checked_add(1)?, 0),
            (None, _) => exclusive(major.checked_add(1)?, 0, 0),
        },
        Op::Less => Some(UpperBound {
            version: Version {
                major,
                minor: comparator.minor.unwrap_or(0),
                patch: comparator.patch.unwrap_or(0),
                pre: comparator.pre.clone(),
                build: BuildMetadata::EMPTY,
            },
            inclusive: false,
        }),
        Op::Tilde => match comparator.minor {
            Some(minor) => exclusive(major, minor.checked_add(1)?, 0),
            None => exclusive(major.checked_add(1)?, 0, 0),
        },
        Op::Caret => match (major, comparator.minor, comparator.patch) {
            (_, None, _) => exclusive(major.checked_add(1)?, 0, 0),
            (0, Some(0), None) => exclusive(0, 1, 0),
            (0, Some(0), Some(patch)) => exclusive(0, 0, patch.checked_add(1)?),
            (0, Some(minor), _) => exclusive(0, minor.checked_add(1)?, 0),
            (_, Some(_), _) => exclusive(major.checked_add(1)?, 0, 0),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn test_plain_integer() {
        for n in ["0", "1", "7", "42", "1000"] {
            let normalized = normalize_app_version(n);
            assert_eq!(normalized.normalized, format!("{n}.0.0"));
            assert_eq!(normalized.original, n);
            assert_eq!(normalized.normalization, Some(Normalization::PlainInteger));
        }
    }

    #[test]
    fn test_missing_patch() {
        let cases = [
            ("2.0", "2.0.0"),
            ("2.0-beta", "2.0.0-beta"),
            ("2.0+build.5", "2.0.0+build.5"),
            ("10.12-rc.1+sha.abc", "10.12.0-rc.1+sha.abc"),
        ];
        for (raw, expected) in cases {
            let normalized = normalize_app_version(raw);
            assert_eq!(normalized.normalized, expected, "normalizing {raw}");
            assert_eq!(normalized.normalization, Some(Normalization::MissingPatch));
        }
    }

    #[test]
    fn test_passthrough() {
        for raw in ["1.2.3", "1.2.3-beta", "", "abc", "1.", ".1", "1.2.3.4", "v1.2"] {
            let normalized = normalize_app_version(raw);
            assert_eq!(normalized.normalized, raw);
            assert!(!normalized.was_normalized());
        }
    }

    #[test]
    fn test_app_version_parse() {
        let version = AppVersion::parse("2.0-beta").unwrap();
        assert_eq!(version.version(), &v("2.0.0-beta"));
        assert_eq!(version.original(), "2.0-beta");
        assert_eq!(version.normalized(), "2.0.0-beta");

        assert!(AppVersion::parse("1.2.3").is_ok());
        assert!(AppVersion::parse("").is_err());
        assert!(AppVersion::parse("one").is_err());
        assert!(AppVersion::parse("1.2.3.4").is_err());
    }

    #[test]
    fn test_echo() {
        let version = AppVersion::parse("3").unwrap();
        assert_eq!(version.echo("3.0.0"), "3");
        assert_eq!(version.echo("3.1.0"), "3.1.0");

        let version = AppVersion::parse("3.0.0").unwrap();
        assert_eq!(version.echo("3.0.0"), "3.0.0");
    }

    #[test]
    fn test_exact_range() {
        let exact = range("1.0.0");
        assert!(exact.satisfied_by(&v("1.0.0")));
        assert!(!exact.satisfied_by(&v("1.0.1")));
        assert!(!exact.satisfied_by(&v("1.1.0")));

        let prerelease = range("1.0.0-beta");
        assert!(prerelease.satisfied_by(&v("1.0.0-beta")));
        assert!(!prerelease.satisfied_by(&v("1.0.0")));
    }

    #[test]
    fn test_npm_style_ranges() {
        assert!(range("*").satisfied_by(&v("9.9.9")));
        assert!(range("1.x").satisfied_by(&v("1.4.2")));
        assert!(!range("1.x").satisfied_by(&v("2.0.0")));
        assert!(range("1.2").satisfied_by(&v("1.2.9")));
        assert!(!range("1.2").satisfied_by(&v("1.3.0")));
        assert!(range("^1.2.0").satisfied_by(&v("1.9.0")));
        assert!(range("~1.2.0").satisfied_by(&v("1.2.5")));
        assert!(!range("~1.2.0").satisfied_by(&v("1.3.0")));
        assert!(range(">=1.0.0 <2.0.0").satisfied_by(&v("1.5.0")));
        assert!(!range(">=1.0.0 <2.0.0").satisfied_by(&v("2.0.0")));
        assert!(range(">= 1.0.0").satisfied_by(&v("3.0.0")));
        assert!(range("1.0.0 - 2.0.0").satisfied_by(&v("2.0.0")));
        assert!(!range("1.0.0 - 2.0.0").satisfied_by(&v("2.0.1")));
        assert!(range("1.0.0 || 3.0.0").satisfied_by(&v("3.0.0")));
        assert!(!range("1.0.0 || 3.0.0").satisfied_by(&v("2.0.0")));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(VersionRange::parse("not a version").is_err());
        assert!(VersionRange::parse(">=").is_err());
        assert!(VersionRange::parse("1.0.0 || abc").is_err());
    }

    #[test]
    fn test_is_below() {
        assert!(range("1.0.0").is_below(&v("1.0.1")));
        assert!(!range("1.0.0").is_below(&v("0.9.0")));
        assert!(!range("1.0.0").is_below(&v("1.0.0")));
        assert!(range("^1.2.0").is_below(&v("2.0.0")));
        assert!(!range("^1.2.0").is_below(&v("1.5.0")));
        assert!(range("1.x").is_below(&v("2.1.0")));
        assert!(range("<2.0.0").is_below(&v("2.0.0")));
        assert!(!range(">=1.0.0").is_below(&v("99.0.0")));
        assert!(!range("*").is_below(&v("1.0.0")));
        assert!(range("1.0.0 || 2.0.0").is_below(&v("3.0.0")));
        assert!(!range("1.0.0 || >=2.0.0").is_below(&v("1.5.0")));

        let max = u64::MAX;
        for unbounded in [
            format!("^{max}.0.0"),
            format!("~{max}"),
            format!("{max}.x"),
            format!("^0.{max}"),
            format!("^0.0.{max}"),
        ] {
            assert!(!range(&unbounded).is_below(&v("1.0.0")), "{unbounded}");
        }
        assert!(range(&format!("<={max}.0.0")).is_below(&v(&format!("{max}.0.1"))));
    }
}
