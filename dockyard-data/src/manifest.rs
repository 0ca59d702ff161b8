//! The dependency manifest: an ordered list of package requirements, one per line.
//!
//! ```text
//! # Web framework
//! fastapi==0.110.0
//! uvicorn[standard]>=0.27,<1
//! pydantic-settings~=2.2
//! ```

use crate::newtypes::dockyard_newtype;
use crate::version::{
    PackageVersion, VersionConstraint, VersionConstraintError, VersionRequirement,
};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

dockyard_newtype!(
    /// The name of a package, as declared in a dependency manifest or a package index.
    ///
    /// It MUST start and end with a letter or digit and may only contain letters, digits,
    /// and the characters `.`, `_` and `-`.
    PackageName,
    /// An error that occurred when parsing an invalid [`PackageName`].
    PackageNameError,
    r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$"
);

impl PackageName {
    /// The normalized form of the name, used when comparing names.
    ///
    /// Names are compared case-insensitively, with runs of `.`, `_` and `-` treated as equal.
    #[must_use]
    pub fn normalized(&self) -> String {
        let mut normalized = String::with_capacity(self.0.len());
        let mut previous_was_separator = false;

        for character in self.0.chars() {
            if matches!(character, '.' | '_' | '-') {
                if !previous_was_separator {
                    normalized.push('-');
                }
                previous_was_separator = true;
            } else {
                normalized.push(character.to_ascii_lowercase());
                previous_was_separator = false;
            }
        }

        normalized
    }

    /// Returns `true` if both names refer to the same package.
    #[must_use]
    pub fn is_same_package(&self, other: &PackageName) -> bool {
        self.normalized() == other.normalized()
    }
}

/// A single package requirement: a name, optional extras and an optional version constraint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Requirement {
    pub name: PackageName,
    pub extras: Vec<String>,
    pub constraint: Option<VersionConstraint>,
}

impl Requirement {
    /// Returns `true` if the given version satisfies this requirement's constraint. A requirement
    /// without a constraint is satisfied by any version.
    #[must_use]
    pub fn allows(&self, version: &PackageVersion) -> bool {
        self.constraint
            .as_ref()
            .map_or(true, |constraint| constraint.satisfies(version))
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;

        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }

        if let Some(constraint) = &self.constraint {
            write!(f, "{constraint}")?;
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum RequirementError {
    #[error("{0}")]
    InvalidName(#[from] PackageNameError),
    #[error("Unterminated extras list")]
    UnterminatedExtras,
    #[error("{0}")]
    InvalidConstraint(#[from] VersionConstraintError),
    #[error("Environment markers are not supported: {0}")]
    UnsupportedMarker(String),
    #[error("Direct URL requirements are not supported: {0}")]
    UnsupportedUrl(String),
    #[error("Installer options are not supported: {0}")]
    UnsupportedOption(String),
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if value.starts_with('-') {
            return Err(RequirementError::UnsupportedOption(String::from(value)));
        }

        if let Some((_, marker)) = value.split_once(';') {
            return Err(RequirementError::UnsupportedMarker(String::from(
                marker.trim(),
            )));
        }

        if value.contains(" @ ") || value.contains("://") {
            return Err(RequirementError::UnsupportedUrl(String::from(value)));
        }

        let name_end = value
            .find(|character: char| {
                !(character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-'))
            })
            .unwrap_or(value.len());

        let name = value[..name_end].parse::<PackageName>()?;
        let mut rest = value[name_end..].trim_start();

        let mut extras = Vec::new();
        if let Some(after_bracket) = rest.strip_prefix('[') {
            let (extras_list, after_extras) = after_bracket
                .split_once(']')
                .ok_or(RequirementError::UnterminatedExtras)?;

            extras = extras_list
                .split(',')
                .map(str::trim)
                .filter(|extra| !extra.is_empty())
                .map(String::from)
                .collect();

            rest = after_extras.trim_start();
        }

        let constraint = if rest.is_empty() {
            None
        } else {
            Some(rest.parse::<VersionConstraint>()?)
        };

        Ok(Requirement {
            name,
            extras,
            constraint,
        })
    }
}

/// An ordered sequence of package requirements.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyManifest {
    pub requirements: Vec<Requirement>,
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
#[error("Line {line}: {source}")]
pub struct ManifestError {
    pub line: usize,
    #[source]
    pub source: RequirementError,
}

impl DependencyManifest {
    /// Requirements with duplicate declarations of the same package collapsed into one.
    ///
    /// The position of the first declaration is kept. Extras are merged and constraints are
    /// combined so that all declarations have to be satisfied.
    #[must_use]
    pub fn merged(&self) -> Vec<Requirement> {
        let mut merged: Vec<Requirement> = Vec::new();

        for requirement in &self.requirements {
            match merged
                .iter_mut()
                .find(|existing| existing.name.is_same_package(&requirement.name))
            {
                Some(existing) => {
                    for extra in &requirement.extras {
                        if !existing.extras.contains(extra) {
                            existing.extras.push(extra.clone());
                        }
                    }

                    existing.constraint = match (&existing.constraint, &requirement.constraint) {
                        (Some(left), Some(right)) => Some(left.and(right)),
                        (left, right) => left.clone().or_else(|| right.clone()),
                    };
                }
                None => merged.push(requirement.clone()),
            }
        }

        merged
    }
}

impl FromStr for DependencyManifest {
    type Err = ManifestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let requirements = value
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line = strip_comment(line).trim();
                (!line.is_empty()).then_some((index + 1, line))
            })
            .map(|(line_number, line)| {
                line.parse::<Requirement>().map_err(|source| ManifestError {
                    line: line_number,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DependencyManifest { requirements })
    }
}

// A `#` starts a comment at the beginning of a line or after whitespace.
fn strip_comment(line: &str) -> &str {
    let mut previous_is_whitespace = true;

    for (index, character) in line.char_indices() {
        if character == '#' && previous_is_whitespace {
            return &line[..index];
        }
        previous_is_whitespace = character.is_whitespace();
    }

    line
}
