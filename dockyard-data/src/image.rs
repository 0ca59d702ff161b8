use crate::newtypes::dockyard_newtype;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

dockyard_newtype!(
    /// The repository name of an image, e.g. `python` or `library/python`.
    ///
    /// It consists of one or more `/` separated components. Each component MUST only contain
    /// lowercase letters and digits, separated by single `.`, `_` or `-` characters.
    ImageName,
    /// An error that occurred when parsing an invalid [`ImageName`].
    ImageNameError,
    r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$"
);

dockyard_newtype!(
    /// The version tag of an image, e.g. `3.11-slim`.
    ///
    /// It MUST start with a letter, digit or `_`, may contain `.` and `-` after that, and is at
    /// most 128 characters long.
    ImageTag,
    /// An error that occurred when parsing an invalid [`ImageTag`].
    ImageTagError,
    r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$"
);

impl ImageName {
    /// The name's components as a relative path, e.g. `library/python`.
    #[must_use]
    pub fn to_relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

/// A reference to a versioned image: a name plus a tag.
///
/// The textual form is `<name>:<tag>`. A reference without a tag refers to the `latest` tag.
///
/// # Examples
/// ```
/// use dockyard_data::image::ImageRef;
///
/// let image_ref: ImageRef = "python:3.11-slim".parse().unwrap();
/// assert_eq!(image_ref.name.as_str(), "python");
/// assert_eq!(image_ref.tag.as_str(), "3.11-slim");
///
/// let latest: ImageRef = "python".parse().unwrap();
/// assert_eq!(latest.to_string(), "python:latest");
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ImageRef {
    pub name: ImageName,
    pub tag: ImageTag,
}

pub const DEFAULT_TAG: &str = "latest";

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum ImageRefError {
    #[error("{0}")]
    InvalidName(#[from] ImageNameError),
    #[error("{0}")]
    InvalidTag(#[from] ImageTagError),
}

impl FromStr for ImageRef {
    type Err = ImageRefError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // A colon before the last slash would belong to a registry host, which is not supported
        // and will fail name validation.
        let last_slash = value.rfind('/').unwrap_or(0);

        let (name, tag) = match value.rfind(':') {
            Some(colon) if colon > last_slash || last_slash == 0 => {
                (&value[..colon], &value[colon + 1..])
            }
            _ => (value, DEFAULT_TAG),
        };

        Ok(ImageRef {
            name: name.parse()?,
            tag: tag.parse()?,
        })
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_tag() {
        let image_ref: ImageRef = "library/python:3.11-slim".parse().unwrap();

        assert_eq!(image_ref.name.as_str(), "library/python");
        assert_eq!(image_ref.tag.as_str(), "3.11-slim");
        assert_eq!(
            image_ref.name.to_relative_path(),
            PathBuf::from("library").join("python")
        );
    }

    #[test]
    fn parse_without_tag() {
        let image_ref: ImageRef = "python".parse().unwrap();
        assert_eq!(image_ref.tag.as_str(), DEFAULT_TAG);
    }

    #[test]
    fn invalid_references() {
        assert!(matches!(
            "Python:3.11".parse::<ImageRef>(),
            Err(ImageRefError::InvalidName(_))
        ));
        assert!(matches!(
            "python:".parse::<ImageRef>(),
            Err(ImageRefError::InvalidTag(_))
        ));
        assert!(matches!(
            "python:-slim".parse::<ImageRef>(),
            Err(ImageRefError::InvalidTag(_))
        ));
        assert!("../python:3.11".parse::<ImageRef>().is_err());
        assert!("registry:5000/python".parse::<ImageRef>().is_err());
    }

    #[test]
    fn toml_round_trip() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            base: ImageRef,
        }

        let wrapper: Wrapper = toml::from_str("base = \"python:3.11-slim\"").unwrap();
        assert_eq!(wrapper.base.to_string(), "python:3.11-slim");
        assert_eq!(
            toml::to_string(&wrapper).unwrap(),
            "base = \"python:3.11-slim\"\n"
        );
    }
}
