//! Package versions and the version constraints of dependency manifests.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A requirement that is either satisfied or not by a given version.
pub trait VersionRequirement<V> {
    fn satisfies(&self, version: &V) -> bool;
}

/// A package version.
///
/// Parsing is lenient about missing components: `2` and `2.5` are read as `2.0.0` and `2.5.0`.
/// Anything else must be a valid [semantic version](https://semver.org).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageVersion(semver::Version);

impl PackageVersion {
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// The first three release components: major, minor and patch.
    #[must_use]
    pub fn release(&self) -> [u64; 3] {
        [self.0.major, self.0.minor, self.0.patch]
    }

    #[must_use]
    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
#[error("Invalid version: {0}")]
pub struct PackageVersionError(String);

impl FromStr for PackageVersion {
    type Err = PackageVersionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(release) = parse_release(value) {
            match release.as_slice() {
                [major] => return Ok(Self::new(*major, 0, 0)),
                [major, minor] => return Ok(Self::new(*major, *minor, 0)),
                _ => {}
            }
        }

        semver::Version::parse(value)
            .map(PackageVersion)
            .map_err(|_| PackageVersionError(String::from(value)))
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    /// `==`, optionally with a trailing `.*` wildcard.
    Equal,
    /// `!=`, optionally with a trailing `.*` wildcard.
    NotEqual,
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
    /// `~=`, the compatible release operator.
    Compatible,
}

impl Operator {
    fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Compatible => "~=",
        }
    }
}

/// A single clause of a [`VersionConstraint`], e.g. `>=1.4`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comparator {
    pub operator: Operator,
    /// The release components as written, without padding.
    pub release: Vec<u64>,
    pub wildcard: bool,
}

impl Comparator {
    fn padded(&self) -> PackageVersion {
        let component = |index: usize| self.release.get(index).copied().unwrap_or(0);
        PackageVersion::new(component(0), component(1), component(2))
    }

    fn prefix_matches(&self, version: &PackageVersion, prefix_len: usize) -> bool {
        version
            .release()
            .iter()
            .zip(self.release.iter().take(prefix_len))
            .all(|(actual, expected)| actual == expected)
    }

    fn matches(&self, version: &PackageVersion) -> bool {
        let ordering = version.cmp(&self.padded());

        match self.operator {
            Operator::Equal if self.wildcard => self.prefix_matches(version, self.release.len()),
            Operator::Equal => ordering == Ordering::Equal,
            Operator::NotEqual if self.wildcard => {
                !self.prefix_matches(version, self.release.len())
            }
            Operator::NotEqual => ordering != Ordering::Equal,
            Operator::GreaterOrEqual => ordering != Ordering::Less,
            Operator::LessOrEqual => ordering != Ordering::Greater,
            Operator::Greater => ordering == Ordering::Greater,
            Operator::Less => ordering == Ordering::Less,
            Operator::Compatible => {
                let prefix_len = self.release.len().saturating_sub(1);
                ordering != Ordering::Less && self.prefix_matches(version, prefix_len)
            }
        }
    }
}

impl Display for Comparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let release = self
            .release
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");

        write!(f, "{}{release}", self.operator.symbol())?;

        if self.wildcard {
            write!(f, ".*")?;
        }

        Ok(())
    }
}

/// A comma separated list of comparators that must all be satisfied, e.g. `>=1.4,<2,!=1.5.1`.
///
/// # Examples
/// ```
/// use dockyard_data::version::{PackageVersion, VersionConstraint, VersionRequirement};
///
/// let constraint: VersionConstraint = ">=0.100, <1.0".parse().unwrap();
///
/// assert!(constraint.satisfies(&"0.110.0".parse::<PackageVersion>().unwrap()));
/// assert!(!constraint.satisfies(&"1.0.0".parse::<PackageVersion>().unwrap()));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionConstraint {
    comparators: Vec<Comparator>,
}

impl VersionConstraint {
    #[must_use]
    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    /// Combines two constraints into one that requires both.
    #[must_use]
    pub fn and(&self, other: &VersionConstraint) -> VersionConstraint {
        VersionConstraint {
            comparators: self
                .comparators
                .iter()
                .chain(&other.comparators)
                .cloned()
                .collect(),
        }
    }
}

impl VersionRequirement<PackageVersion> for VersionConstraint {
    fn satisfies(&self, version: &PackageVersion) -> bool {
        self.comparators
            .iter()
            .all(|comparator| comparator.matches(version))
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum VersionConstraintError {
    #[error("Empty version constraint")]
    Empty,
    #[error("Unknown operator in version constraint clause: {0}")]
    UnknownOperator(String),
    #[error("Invalid version in version constraint clause: {0}")]
    InvalidVersion(String),
    #[error("Wildcards are only allowed with == and !=: {0}")]
    MisplacedWildcard(String),
    #[error("The ~= operator requires at least two release components: {0}")]
    CompatibleReleaseTooShort(String),
}

impl FromStr for VersionConstraint {
    type Err = VersionConstraintError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let comparators = value
            .split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(parse_comparator)
            .collect::<Result<Vec<_>, _>>()?;

        if comparators.is_empty() {
            Err(VersionConstraintError::Empty)
        } else {
            Ok(VersionConstraint { comparators })
        }
    }
}

impl Display for VersionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let clauses = self
            .comparators
            .iter()
            .map(Comparator::to_string)
            .collect::<Vec<_>>();

        write!(f, "{}", clauses.join(","))
    }
}

fn parse_comparator(clause: &str) -> Result<Comparator, VersionConstraintError> {
    // Two-character operators have to be checked before their one-character prefixes.
    let operators = [
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        (">=", Operator::GreaterOrEqual),
        ("<=", Operator::LessOrEqual),
        ("~=", Operator::Compatible),
        (">", Operator::Greater),
        ("<", Operator::Less),
    ];

    let (operator, version) = operators
        .iter()
        .find_map(|(symbol, operator)| {
            clause
                .strip_prefix(symbol)
                .map(|rest| (*operator, rest.trim()))
        })
        .ok_or_else(|| VersionConstraintError::UnknownOperator(String::from(clause)))?;

    let (version, wildcard) = match version.strip_suffix(".*") {
        Some(prefix) => (prefix, true),
        None => (version, false),
    };

    if wildcard && !matches!(operator, Operator::Equal | Operator::NotEqual) {
        return Err(VersionConstraintError::MisplacedWildcard(String::from(
            clause,
        )));
    }

    let release = parse_release(version)
        .filter(|release| release.len() <= 3)
        .ok_or_else(|| VersionConstraintError::InvalidVersion(String::from(clause)))?;

    if operator == Operator::Compatible && release.len() < 2 {
        return Err(VersionConstraintError::CompatibleReleaseTooShort(
            String::from(clause),
        ));
    }

    Ok(Comparator {
        operator,
        release,
        wildcard,
    })
}

fn parse_release(value: &str) -> Option<Vec<u64>> {
    value
        .split('.')
        .map(|component| {
            if component.is_empty() || !component.bytes().all(|byte| byte.is_ascii_digit()) {
                None
            } else {
                component.parse::<u64>().ok()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(value: &str) -> PackageVersion {
        value.parse().unwrap()
    }

    fn satisfies(constraint: &str, value: &str) -> bool {
        constraint
            .parse::<VersionConstraint>()
            .unwrap()
            .satisfies(&version(value))
    }

    #[test]
    fn lenient_versions() {
        assert_eq!(version("2"), PackageVersion::new(2, 0, 0));
        assert_eq!(version("2.5"), PackageVersion::new(2, 5, 0));
        assert_eq!(version("0.110.0"), PackageVersion::new(0, 110, 0));
        assert!(version("1.0.0-rc.1") < version("1.0.0"));
        assert!("1.0rc1".parse::<PackageVersion>().is_err());
        assert!("latest".parse::<PackageVersion>().is_err());
    }

    #[test]
    fn exact_and_wildcard() {
        assert!(satisfies("==0.110.0", "0.110.0"));
        assert!(!satisfies("==0.110.0", "0.110.1"));
        assert!(satisfies("==0.110", "0.110.0"));
        assert!(satisfies("==0.110.*", "0.110.7"));
        assert!(!satisfies("==0.110.*", "0.111.0"));
        assert!(satisfies("!=1.*", "2.0.0"));
        assert!(!satisfies("!=1.*", "1.9.0"));
    }

    #[test]
    fn ranges() {
        assert!(satisfies(">=1.4,<2", "1.4.0"));
        assert!(satisfies(">=1.4, <2", "1.99.3"));
        assert!(!satisfies(">=1.4,<2", "2.0.0"));
        assert!(!satisfies(">1.4", "1.4.0"));
        assert!(satisfies("<=1.4", "1.4.0"));
        assert!(!satisfies(">=1.4,!=1.5.1", "1.5.1"));
    }

    #[test]
    fn compatible_release() {
        assert!(satisfies("~=2.2", "2.9.0"));
        assert!(!satisfies("~=2.2", "3.0.0"));
        assert!(!satisfies("~=2.2", "2.1.0"));
        assert!(satisfies("~=1.4.5", "1.4.9"));
        assert!(!satisfies("~=1.4.5", "1.5.0"));
    }

    #[test]
    fn invalid_constraints() {
        assert_eq!(
            "".parse::<VersionConstraint>(),
            Err(VersionConstraintError::Empty)
        );
        assert_eq!(
            "=1.0".parse::<VersionConstraint>(),
            Err(VersionConstraintError::UnknownOperator(String::from("=1.0")))
        );
        assert_eq!(
            ">=1.*".parse::<VersionConstraint>(),
            Err(VersionConstraintError::MisplacedWildcard(String::from(">=1.*")))
        );
        assert_eq!(
            "~=1".parse::<VersionConstraint>(),
            Err(VersionConstraintError::CompatibleReleaseTooShort(
                String::from("~=1")
            ))
        );
        assert!(matches!(
            "==one".parse::<VersionConstraint>(),
            Err(VersionConstraintError::InvalidVersion(_))
        ));
    }

    #[test]
    fn display_round_trips_normalized_form() {
        let constraint: VersionConstraint = ">= 1.4 , < 2, ==1.5.*".parse().unwrap();
        assert_eq!(constraint.to_string(), ">=1.4,<2,==1.5.*");
    }

    #[test]
    fn combined_constraints_require_both() {
        let lower: VersionConstraint = ">=1".parse().unwrap();
        let upper: VersionConstraint = "<2".parse().unwrap();
        let combined = lower.and(&upper);

        assert!(combined.satisfies(&version("1.5")));
        assert!(!combined.satisfies(&version("2.1")));
        assert!(!combined.satisfies(&version("0.9")));
    }
}
