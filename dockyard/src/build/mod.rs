//! Build-time assembly of an image from an image descriptor.
//!
//! A [`BuildSequencer`] turns the descriptor into a [`BuildPlan`], validates it, and runs its steps
//! one after another on an [`ImageAssembly`] staged inside the image store. The image only
//! appears under its tag once every step succeeded.

mod assembly;
pub mod base;
pub mod copy;
pub mod install;
pub mod plan;

pub use assembly::ImageAssembly;
pub use plan::{BuildPlan, BuildStep, StepKind, StepOutOfOrder};

use crate::build::base::BaseStore;
use crate::data::descriptor::ImageDescriptor;
use crate::data::image::ImageTag;
use crate::data::image_config::{IMAGE_CONFIG_FILE_NAME, ROOTFS_DIR_NAME};
use crate::launch::compose;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::store::{ImageStore, StoreError, StoredImage};
use crate::BuildError;
use dockyard_common::toml_file::{read_toml_file, write_toml_file};
use std::path::{Path, PathBuf};

/// Runs the build steps of one image exactly once, failing on the first error.
#[derive(Debug)]
pub struct BuildSequencer<B> {
    store: ImageStore,
    bases: B,
    index_path: PathBuf,
    lifecycle: Lifecycle,
}

impl<B: BaseStore> BuildSequencer<B> {
    pub fn new(store: ImageStore, bases: B, index_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            bases,
            index_path: index_path.into(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// A handle to the lifecycle this sequencer drives.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    #[must_use]
    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Builds the image described by the descriptor file at `descriptor_path`, copying source
    /// files from `context_dir`, and stores it under `tag`.
    pub fn build(
        &self,
        context_dir: &Path,
        descriptor_path: &Path,
        tag: &ImageTag,
    ) -> Result<StoredImage, BuildError> {
        self.assembling(|| {
            let descriptor = read_toml_file::<ImageDescriptor>(descriptor_path)
                .map_err(BuildError::CannotReadDescriptor)?;

            self.assemble(context_dir, &descriptor, tag)
        })
    }

    /// Builds the image for an already parsed descriptor.
    pub fn build_descriptor(
        &self,
        context_dir: &Path,
        descriptor: &ImageDescriptor,
        tag: &ImageTag,
    ) -> Result<StoredImage, BuildError> {
        self.assembling(|| self.assemble(context_dir, descriptor, tag))
    }

    fn assembling(
        &self,
        build: impl FnOnce() -> Result<StoredImage, BuildError>,
    ) -> Result<StoredImage, BuildError> {
        self.lifecycle.transition(LifecycleState::Assembling)?;

        let result = build();

        self.lifecycle.transition(if result.is_ok() {
            LifecycleState::Built
        } else {
            LifecycleState::Crashed
        })?;

        result
    }

    fn assemble(
        &self,
        context_dir: &Path,
        descriptor: &ImageDescriptor,
        tag: &ImageTag,
    ) -> Result<StoredImage, BuildError> {
        let plan = BuildPlan::from_descriptor(descriptor);
        plan.validate()?;

        let launch = compose(
            &descriptor.launch.launcher,
            &descriptor.launch.entry_point,
            descriptor.launch.host.as_deref(),
            descriptor.launch.port,
        )?;

        let exposed_ports = if descriptor.expose.is_empty() {
            vec![launch.port]
        } else {
            descriptor.expose.clone()
        };

        let lock = self.store.lock(tag).map_err(|error| match error {
            StoreError::TagInUse(..) => BuildError::TagInUse(error),
            _ => BuildError::CannotWriteImage(error),
        })?;

        let staging = self
            .store
            .staging_dir(&lock)
            .map_err(BuildError::CannotWriteImage)?;

        let mut assembly = ImageAssembly::new(
            context_dir,
            staging.path().join(ROOTFS_DIR_NAME),
            &self.index_path,
        );

        let step_count = plan.steps().len();
        for (index, step) in plan.steps().iter().enumerate() {
            log::info!("Step {}/{step_count}: {step}", index + 1);
            assembly.run(&self.bases, step)?;
        }

        let config = assembly.image_config(tag.clone(), launch, exposed_ports)?;
        write_toml_file(&config, staging.path().join(IMAGE_CONFIG_FILE_NAME))
            .map_err(BuildError::CannotWriteImageConfig)?;

        let dir = self
            .store
            .commit(&lock, staging, tag)
            .map_err(BuildError::CannotWriteImage)?;

        log::info!("Successfully built image {tag}");
        Ok(StoredImage::new(dir, config))
    }
}
