//! The package index dependencies are resolved against.
//!
//! ```toml
//! [[packages]]
//! name = "fastapi"
//! version = "0.110.0"
//! url = "packages/fastapi-0.110.0.tar.gz"
//! checksum = "sha256:5f7e..."
//! ```

use crate::manifest::{PackageName, Requirement};
use crate::version::PackageVersion;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// An index of downloadable package artifacts.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageIndex {
    #[serde(default)]
    pub packages: Vec<PackageArtifact>,
}

/// A single version of a package, available for download as a gzipped tarball.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageArtifact {
    pub name: PackageName,
    pub version: PackageVersion,
    /// Where the artifact can be fetched from: a path (absolute, or relative to the index file),
    /// a `file://` URL or an `http(s)://` URL.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Sha256Checksum>,
}

/// Why a requirement could not be resolved against an index.
#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum IndexResolutionError {
    #[error("Package {0} is not available in the package index")]
    UnknownPackage(PackageName),
    #[error("No version of {name} satisfies {requirement} (available: {})", available_versions(.available))]
    Unsatisfiable {
        name: PackageName,
        requirement: String,
        available: Vec<PackageVersion>,
    },
}

fn available_versions(versions: &[PackageVersion]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl PackageIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, artifact: PackageArtifact) {
        self.packages.push(artifact);
    }

    /// Resolves a requirement to the highest version of the package that satisfies it.
    ///
    /// Dependencies of the resolved package are not considered.
    pub fn resolve(
        &self,
        requirement: &Requirement,
    ) -> Result<&PackageArtifact, IndexResolutionError> {
        let candidates = self
            .packages
            .iter()
            .filter(|artifact| artifact.name.is_same_package(&requirement.name))
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            return Err(IndexResolutionError::UnknownPackage(
                requirement.name.clone(),
            ));
        }

        candidates
            .iter()
            .copied()
            .filter(|artifact| requirement.allows(&artifact.version))
            .max_by(|left, right| left.version.cmp(&right.version))
            .ok_or_else(|| {
                let mut available = candidates
                    .iter()
                    .map(|artifact| artifact.version.clone())
                    .collect::<Vec<_>>();
                available.sort();

                IndexResolutionError::Unsatisfiable {
                    name: requirement.name.clone(),
                    requirement: requirement.to_string(),
                    available,
                }
            })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParsePackageIndexError {
    #[error("TOML parsing error: {0}")]
    TomlError(toml::de::Error),
}

impl FromStr for PackageIndex {
    type Err = ParsePackageIndexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        toml::from_str(value).map_err(ParsePackageIndexError::TomlError)
    }
}

/// A SHA-256 checksum, written as `sha256:<hex>`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Sha256Checksum {
    value: Vec<u8>,
}

const SHA256_PREFIX: &str = "sha256";
const SHA256_LENGTH: usize = 32;

impl Sha256Checksum {
    /// Creates a checksum from a raw 32 byte digest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChecksumParseError> {
        if bytes.len() == SHA256_LENGTH {
            Ok(Self {
                value: bytes.to_vec(),
            })
        } else {
            Err(ChecksumParseError::InvalidChecksumLength(bytes.len()))
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.value)
    }
}

impl From<[u8; SHA256_LENGTH]> for Sha256Checksum {
    fn from(bytes: [u8; SHA256_LENGTH]) -> Self {
        Self {
            value: bytes.to_vec(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ChecksumParseError {
    #[error("Checksum prefix is missing")]
    MissingPrefix,
    #[error("Checksum prefix \"{0}\" is incompatible")]
    IncompatiblePrefix(String),
    #[error("Checksum value cannot be parsed as hex string: {0}")]
    InvalidValue(hex::FromHexError),
    #[error("Checksum value length {0} is invalid")]
    InvalidChecksumLength(usize),
}

impl FromStr for Sha256Checksum {
    type Err = ChecksumParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (prefix, value) = value
            .split_once(':')
            .ok_or(ChecksumParseError::MissingPrefix)?;

        if prefix != SHA256_PREFIX {
            return Err(ChecksumParseError::IncompatiblePrefix(String::from(prefix)));
        }

        hex::decode(value)
            .map_err(ChecksumParseError::InvalidValue)
            .and_then(|bytes| Self::from_bytes(&bytes))
    }
}

impl Display for Sha256Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{SHA256_PREFIX}:{}", self.to_hex())
    }
}

impl Serialize for Sha256Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sha256Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)
            .and_then(|string| string.parse::<Self>().map_err(serde::de::Error::custom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
        [[packages]]
        name = "fastapi"
        version = "0.109.2"
        url = "packages/fastapi-0.109.2.tar.gz"

        [[packages]]
        name = "fastapi"
        version = "0.110.0"
        url = "packages/fastapi-0.110.0.tar.gz"
        checksum = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"

        [[packages]]
        name = "Pydantic_Settings"
        version = "2.2.1"
        url = "https://example.com/pydantic_settings-2.2.1.tar.gz"
    "#;

    fn requirement(value: &str) -> Requirement {
        value.parse().unwrap()
    }

    #[test]
    fn resolves_highest_matching_version() {
        let index: PackageIndex = INDEX.parse().unwrap();

        let artifact = index.resolve(&requirement("fastapi")).unwrap();
        assert_eq!(artifact.version.to_string(), "0.110.0");
        assert!(artifact.checksum.is_some());

        let artifact = index.resolve(&requirement("fastapi<0.110")).unwrap();
        assert_eq!(artifact.version.to_string(), "0.109.2");
    }

    #[test]
    fn resolves_normalized_names() {
        let index: PackageIndex = INDEX.parse().unwrap();

        let artifact = index.resolve(&requirement("pydantic-settings~=2.2")).unwrap();
        assert_eq!(artifact.name.as_str(), "Pydantic_Settings");
    }

    #[test]
    fn unknown_package() {
        let index: PackageIndex = INDEX.parse().unwrap();

        assert_eq!(
            index.resolve(&requirement("starlette")),
            Err(IndexResolutionError::UnknownPackage(
                "starlette".parse().unwrap()
            ))
        );
    }

    #[test]
    fn unsatisfiable_constraint() {
        let index: PackageIndex = INDEX.parse().unwrap();

        let error = index.resolve(&requirement("fastapi>=1")).unwrap_err();
        assert_eq!(
            error.to_string(),
            "No version of fastapi satisfies fastapi>=1 (available: 0.109.2, 0.110.0)"
        );
    }

    #[test]
    fn checksum_parsing() {
        let checksum: Sha256Checksum =
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                .parse()
                .unwrap();
        assert_eq!(checksum.as_bytes().len(), 32);

        assert_eq!(
            "e3b0c442".parse::<Sha256Checksum>(),
            Err(ChecksumParseError::MissingPrefix)
        );
        assert_eq!(
            "md5:e3b0c442".parse::<Sha256Checksum>(),
            Err(ChecksumParseError::IncompatiblePrefix(String::from("md5")))
        );
        assert_eq!(
            "sha256:e3b0c442".parse::<Sha256Checksum>(),
            Err(ChecksumParseError::InvalidChecksumLength(4))
        );
        assert!(matches!(
            "sha256:zz".parse::<Sha256Checksum>(),
            Err(ChecksumParseError::InvalidValue(_))
        ));
    }

    #[test]
    fn empty_index() {
        let index: PackageIndex = "".parse().unwrap();
        assert!(index.packages.is_empty());
    }
}
