//! The image store: a directory with one finished image per tag.
//!
//! ```text
//! <store>/<tag>/image.toml
//! <store>/<tag>/rootfs/...
//! <store>/.<tag>.lock
//! <store>/.<tag>.work/...
//! ```
//!
//! The lock file carries an advisory lock while a build of the tag runs. The work directory holds
//! the staging directory of that build and the image it replaces, and is cleared whenever the lock
//! is taken, so leftovers of a cancelled build never accumulate.

use crate::data::image::ImageTag;
use crate::data::image_config::{ImageConfig, IMAGE_CONFIG_FILE_NAME, ROOTFS_DIR_NAME};
use crate::util::{default_on_not_found, path_in_rootfs};
use dockyard_common::toml_file::{read_toml_file, TomlFileError};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Image {0} does not exist in the image store")]
    ImageNotFound(ImageTag),

    #[error("Cannot read image configuration: {0}")]
    CannotReadImageConfig(#[source] TomlFileError),

    #[error("Another build of image {} is in progress (lock file {} is held)", .0, .1.display())]
    TagInUse(ImageTag, PathBuf),

    #[error("I/O error in image store at {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn image_dir(&self, tag: &ImageTag) -> PathBuf {
        self.root.join(tag.as_str())
    }

    #[must_use]
    pub fn lock_path(&self, tag: &ImageTag) -> PathBuf {
        self.root.join(format!(".{tag}.lock"))
    }

    fn work_dir(&self, tag: &ImageTag) -> PathBuf {
        self.root.join(format!(".{tag}.work"))
    }

    /// Opens a finished image.
    pub fn open(&self, tag: &ImageTag) -> Result<StoredImage, StoreError> {
        let dir = self.image_dir(tag);
        let config_path = dir.join(IMAGE_CONFIG_FILE_NAME);

        match read_toml_file::<ImageConfig>(&config_path) {
            Ok(config) => Ok(StoredImage { dir, config }),
            Err(error) if error.is_not_found() => Err(StoreError::ImageNotFound(tag.clone())),
            Err(error) => Err(StoreError::CannotReadImageConfig(error)),
        }
    }

    /// Takes the build lock for a tag and clears what a previous, interrupted build left behind.
    ///
    /// The lock is released when the returned guard is dropped or the process exits.
    pub fn lock(&self, tag: &ImageTag) -> Result<TagLock, StoreError> {
        fs::create_dir_all(&self.root)
            .map_err(|error| StoreError::IoError(self.root.clone(), error))?;

        let path = self.lock_path(tag);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|error| StoreError::IoError(path.clone(), error))?;

        let flock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => flock,
            Err((_, Errno::EWOULDBLOCK)) => return Err(StoreError::TagInUse(tag.clone(), path)),
            Err((_, errno)) => return Err(StoreError::IoError(path, errno.into())),
        };

        let work_dir = self.work_dir(tag);
        let had_leftovers = default_on_not_found(fs::remove_dir_all(&work_dir).map(|()| true))
            .map_err(|error| StoreError::IoError(work_dir.clone(), error))?;
        if had_leftovers {
            log::warn!("Removed leftovers of an interrupted build of image {tag}");
        }
        fs::create_dir_all(&work_dir)
            .map_err(|error| StoreError::IoError(work_dir.clone(), error))?;

        Ok(TagLock {
            _flock: flock,
            work_dir,
        })
    }

    /// Creates an empty staging directory for a new image of the locked tag.
    ///
    /// Staging inside the store keeps the final rename on one filesystem.
    pub fn staging_dir(&self, lock: &TagLock) -> Result<TempDir, StoreError> {
        tempfile::Builder::new()
            .prefix("staging-")
            .tempdir_in(&lock.work_dir)
            .map_err(|error| StoreError::IoError(lock.work_dir.clone(), error))
    }

    /// Moves a fully assembled staging directory into place as the image for `tag`, replacing an
    /// existing image of that tag.
    pub fn commit(
        &self,
        lock: &TagLock,
        staging: TempDir,
        tag: &ImageTag,
    ) -> Result<PathBuf, StoreError> {
        let destination = self.image_dir(tag);
        let io_error = |error| StoreError::IoError(destination.clone(), error);

        // The replaced image is moved aside first, so that it can be restored if the new one
        // cannot be moved into place.
        let replaced = tempfile::Builder::new()
            .prefix("replaced-")
            .tempdir_in(&lock.work_dir)
            .map_err(io_error)?;
        let replaced_image = replaced.path().join(tag.as_str());

        let had_previous = default_on_not_found(
            fs::rename(&destination, &replaced_image).map(|()| true),
        )
        .map_err(io_error)?;

        if had_previous {
            log::warn!("Replacing existing image {tag}");
        }

        if let Err(error) = fs::rename(staging.path(), &destination) {
            if had_previous {
                fs::rename(&replaced_image, &destination).map_err(io_error)?;
            }
            return Err(io_error(error));
        }

        Ok(destination)
    }
}

/// A finished image in an image store.
#[derive(Clone, Debug)]
pub struct StoredImage {
    dir: PathBuf,
    config: ImageConfig,
}

impl StoredImage {
    pub(crate) fn new(dir: PathBuf, config: ImageConfig) -> Self {
        Self { dir, config }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    #[must_use]
    pub fn rootfs(&self) -> PathBuf {
        self.dir.join(ROOTFS_DIR_NAME)
    }

    /// Maps an absolute path inside the image to the host path that holds it.
    #[must_use]
    pub fn host_path(&self, image_path: &Path) -> Option<PathBuf> {
        path_in_rootfs(&self.rootfs(), image_path)
    }
}

/// The build lock of a tag, held for the duration of one build.
#[derive(Debug)]
pub struct TagLock {
    _flock: Flock<File>,
    work_dir: PathBuf,
}

impl Drop for TagLock {
    fn drop(&mut self) {
        if let Err(error) = default_on_not_found(fs::remove_dir_all(&self.work_dir)) {
            log::warn!(
                "Could not remove work directory {}: {error}",
                self.work_dir.display()
            );
        }
    }
}
