use crate::build::base::BaseStoreError;
use crate::build::copy::CopyError;
use crate::build::install::{InstallError, ResolutionError};
use crate::build::plan::StepOutOfOrder;
use crate::env::InvalidProcessFlag;
use crate::exit_code;
use crate::launch::{EntryPointLoadError, LaunchConfigError};
use crate::lifecycle::InvalidTransition;
use crate::store::StoreError;
use dockyard_common::toml_file::TomlFileError;
use std::path::PathBuf;

/// An error that aborted a build. No image is produced for the build's tag.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("Cannot read image descriptor: {0}")]
    CannotReadDescriptor(#[source] TomlFileError),

    #[error("Invalid build plan: {0}")]
    StepOutOfOrder(#[from] StepOutOfOrder),

    #[error("Base environment unavailable: {0}")]
    BaseUnavailable(#[from] BaseStoreError),

    #[error("{0}")]
    InvalidProcessFlag(#[from] InvalidProcessFlag),

    #[error("Invalid path {}: {reason}", .path.display())]
    PathInvalid { path: PathBuf, reason: String },

    #[error("Dependency resolution failed: {0}")]
    DependencyResolutionError(#[from] ResolutionError),

    #[error("Dependency installation failed: {0}")]
    InstallError(#[from] InstallError),

    #[error("Copying source failed: {0}")]
    CopyError(#[from] CopyError),

    #[error("Invalid launch configuration: {0}")]
    InvalidLaunchConfig(#[from] LaunchConfigError),

    #[error("{0}")]
    TagInUse(#[source] StoreError),

    #[error("Cannot write image: {0}")]
    CannotWriteImage(#[source] StoreError),

    #[error("Cannot write image configuration: {0}")]
    CannotWriteImageConfig(#[source] TomlFileError),

    #[error("I/O error while assembling image at {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransition),
}

impl BuildError {
    /// The exit code the `dockyard` process ends with after this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::InvalidLaunchConfig(_) => exit_code::LAUNCH_INVALID_CONFIG,
            _ => exit_code::BUILD_FAILED,
        }
    }
}

/// An error that prevented an image's foreground process from starting or completing.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("Cannot read image: {0}")]
    CannotReadImage(#[from] StoreError),

    #[error("Invalid launch configuration: {0}")]
    InvalidLaunchConfig(#[from] LaunchConfigError),

    #[error("Cannot bind listener to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot load entry point: {0}")]
    EntryPointLoadError(#[from] EntryPointLoadError),

    #[error("Error while serving: {0}")]
    ServeError(#[source] std::io::Error),

    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransition),
}

impl LaunchError {
    /// The exit code the `dockyard` process ends with after this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::InvalidLaunchConfig(_) => exit_code::LAUNCH_INVALID_CONFIG,
            LaunchError::BindError { .. } => exit_code::LAUNCH_BIND_ERROR,
            LaunchError::EntryPointLoadError(_) => exit_code::LAUNCH_ENTRY_POINT_LOAD_ERROR,
            LaunchError::CannotReadImage(_)
            | LaunchError::ServeError(_)
            | LaunchError::InvalidTransition(_) => exit_code::GENERIC_UNSPECIFIED_ERROR,
        }
    }
}
