use crate::data::base::BaseDescriptor;
use crate::data::image::ImageRef;
use crate::data::index::Sha256Checksum;
use crate::digest::sha256_bytes;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const BASE_DESCRIPTOR_FILE_NAME: &str = "base.toml";

/// A base environment that was found in a base store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedBase {
    pub image_ref: ImageRef,
    pub descriptor: BaseDescriptor,
    /// Identifies the exact base the image was built on.
    pub digest: Sha256Checksum,
}

#[derive(thiserror::Error, Debug)]
pub enum BaseStoreError {
    #[error("Base environment {0} does not exist")]
    NotFound(ImageRef),

    #[error("Cannot read base environment {0}: {1}")]
    IoError(ImageRef, #[source] std::io::Error),

    #[error("Invalid descriptor for base environment {0}: {1}")]
    InvalidDescriptor(ImageRef, #[source] toml::de::Error),
}

/// Resolves base environment references.
pub trait BaseStore {
    fn resolve(&self, image_ref: &ImageRef) -> Result<ResolvedBase, BaseStoreError>;
}

/// A base store in a local directory, with one `<name>/<tag>/base.toml` per base environment.
#[derive(Clone, Debug)]
pub struct LocalBaseStore {
    root: PathBuf,
}

impl LocalBaseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn descriptor_path(&self, image_ref: &ImageRef) -> PathBuf {
        self.root
            .join(image_ref.name.to_relative_path())
            .join(image_ref.tag.as_str())
            .join(BASE_DESCRIPTOR_FILE_NAME)
    }
}

impl BaseStore for LocalBaseStore {
    fn resolve(&self, image_ref: &ImageRef) -> Result<ResolvedBase, BaseStoreError> {
        let contents =
            fs::read_to_string(self.descriptor_path(image_ref)).map_err(|error| {
                match error.kind() {
                    ErrorKind::NotFound => BaseStoreError::NotFound(image_ref.clone()),
                    _ => BaseStoreError::IoError(image_ref.clone(), error),
                }
            })?;

        let descriptor = toml::from_str::<BaseDescriptor>(&contents)
            .map_err(|error| BaseStoreError::InvalidDescriptor(image_ref.clone(), error))?;

        Ok(ResolvedBase {
            image_ref: image_ref.clone(),
            descriptor,
            digest: sha256_bytes(&contents),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_existing_base() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalBaseStore::new(temp_dir.path());
        let image_ref: ImageRef = "library/python:3.11-slim".parse().unwrap();

        let descriptor_path = store.descriptor_path(&image_ref);
        assert_eq!(
            descriptor_path,
            temp_dir.path().join("library/python/3.11-slim/base.toml")
        );

        fs::create_dir_all(descriptor_path.parent().unwrap()).unwrap();
        fs::write(&descriptor_path, "[env]\nLANG = \"C.UTF-8\"\n").unwrap();

        let base = store.resolve(&image_ref).unwrap();
        assert_eq!(base.descriptor.env.get("LANG"), Some("C.UTF-8"));
        assert_eq!(base.digest, sha256_bytes("[env]\nLANG = \"C.UTF-8\"\n"));
    }

    #[test]
    fn resolve_missing_base() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalBaseStore::new(temp_dir.path());

        assert!(matches!(
            store.resolve(&"python:2.7".parse().unwrap()),
            Err(BaseStoreError::NotFound(_))
        ));
    }

    #[test]
    fn resolve_invalid_base() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalBaseStore::new(temp_dir.path());
        let image_ref: ImageRef = "python:3.11".parse().unwrap();

        let descriptor_path = store.descriptor_path(&image_ref);
        fs::create_dir_all(descriptor_path.parent().unwrap()).unwrap();
        fs::write(&descriptor_path, "layers = 3\n").unwrap();

        assert!(matches!(
            store.resolve(&image_ref),
            Err(BaseStoreError::InvalidDescriptor(_, _))
        ));
    }
}
