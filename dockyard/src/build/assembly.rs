use crate::build::base::{BaseStore, ResolvedBase};
use crate::build::copy::{copy_source, BuildContextFiles};
use crate::build::install::install_dependencies;
use crate::build::plan::{check_step_order, BuildStep, StepKind, StepOutOfOrder};
use crate::data::env::EnvironmentSet;
use crate::data::image::{ImageRef, ImageTag};
use crate::data::image_config::{ImageConfig, InstalledPackage};
use crate::data::launch::LaunchDescriptor;
use crate::env::ProcessEnvironment;
use crate::util::path_in_rootfs;
use crate::BuildError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// An image that is being assembled in a root filesystem directory.
///
/// Every operation checks that the steps it depends on already ran, so an assembly can only
/// reach the state a valid build plan describes.
#[derive(Debug)]
pub struct ImageAssembly {
    context_dir: PathBuf,
    rootfs: PathBuf,
    index_path: PathBuf,
    completed: Vec<StepKind>,
    base: Option<ResolvedBase>,
    env: EnvironmentSet,
    process_env: ProcessEnvironment,
    working_dir: Option<PathBuf>,
    dependencies: Vec<InstalledPackage>,
    context_files: Option<BuildContextFiles>,
}

impl ImageAssembly {
    /// An empty assembly that copies from `context_dir` and resolves dependencies against the
    /// package index at `index_path`.
    pub fn new(
        context_dir: impl Into<PathBuf>,
        rootfs: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            context_dir: context_dir.into(),
            rootfs: rootfs.into(),
            index_path: index_path.into(),
            completed: Vec::new(),
            base: None,
            env: EnvironmentSet::new(),
            process_env: ProcessEnvironment::default(),
            working_dir: None,
            dependencies: Vec::new(),
            context_files: None,
        }
    }

    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    #[must_use]
    pub fn completed(&self) -> &[StepKind] {
        &self.completed
    }

    #[must_use]
    pub fn process_env(&self) -> &ProcessEnvironment {
        &self.process_env
    }

    #[must_use]
    pub fn dependencies(&self) -> &[InstalledPackage] {
        &self.dependencies
    }

    /// Runs a single step of a build plan.
    pub fn run(&mut self, bases: &impl BaseStore, step: &BuildStep) -> Result<(), BuildError> {
        match step {
            BuildStep::EstablishBase(image_ref) => self.establish_base(bases, image_ref),
            BuildStep::SetEnvironment(vars) => self.set_environment(vars),
            BuildStep::SetWorkingDirectory(path) => self.set_working_directory(path),
            BuildStep::InstallDependencies(manifest) => self.install_dependencies(manifest),
            BuildStep::CopySource {
                source,
                destination,
            } => self.copy_source(source, destination),
        }
    }

    /// Resolves the base environment and starts the image's environment with the base's
    /// variables.
    pub fn establish_base(
        &mut self,
        bases: &impl BaseStore,
        image_ref: &ImageRef,
    ) -> Result<(), BuildError> {
        check_step_order(&self.completed, StepKind::EstablishBase)?;

        let base = bases.resolve(image_ref)?;
        log::debug!("Resolved base {image_ref} ({})", base.digest);

        let process_env = ProcessEnvironment::new(base.descriptor.env.clone())?;

        fs::create_dir_all(&self.rootfs)
            .map_err(|error| BuildError::IoError(self.rootfs.clone(), error))?;

        self.env = base.descriptor.env.clone();
        self.process_env = process_env;
        self.base = Some(base);
        self.completed.push(StepKind::EstablishBase);
        Ok(())
    }

    /// Applies environment variables on top of the current environment. A later value for the
    /// same key replaces the earlier one.
    pub fn set_environment(&mut self, vars: &EnvironmentSet) -> Result<(), BuildError> {
        check_step_order(&self.completed, StepKind::SetEnvironment)?;

        let mut env = self.env.clone();
        env.extend(vars);
        self.process_env = ProcessEnvironment::new(env.clone())?;
        self.env = env;

        self.completed.push(StepKind::SetEnvironment);
        Ok(())
    }

    /// Creates the working directory inside the image.
    pub fn set_working_directory(&mut self, path: &Path) -> Result<(), BuildError> {
        check_step_order(&self.completed, StepKind::SetWorkingDirectory)?;

        if !path.is_absolute() {
            return Err(BuildError::PathInvalid {
                path: path.to_path_buf(),
                reason: String::from("path must be absolute"),
            });
        }

        let host_path = self.host_path(path)?;
        fs::create_dir_all(&host_path).map_err(|error| BuildError::IoError(host_path, error))?;

        self.working_dir = Some(path.to_path_buf());
        self.completed.push(StepKind::SetWorkingDirectory);
        Ok(())
    }

    /// Installs the dependencies declared in a manifest of the build context into the packages
    /// directory of the base environment.
    pub fn install_dependencies(&mut self, manifest: &Path) -> Result<(), BuildError> {
        check_step_order(&self.completed, StepKind::InstallDependencies)?;

        if manifest.has_root()
            || manifest
                .components()
                .any(|component| component == Component::ParentDir)
        {
            return Err(BuildError::PathInvalid {
                path: manifest.to_path_buf(),
                reason: String::from("manifest path must be relative to the build context"),
            });
        }

        let base = self.base(StepKind::InstallDependencies)?;
        let packages_dir = self.host_path(&base.descriptor.packages_dir)?;

        self.dependencies = install_dependencies(
            &self.context_dir.join(manifest),
            &self.index_path,
            &packages_dir,
            self.process_env.flags().dont_write_bytecode,
        )?;

        self.completed.push(StepKind::InstallDependencies);
        Ok(())
    }

    /// Copies build context files matching `source` to `destination`, relative to the working
    /// directory.
    pub fn copy_source(&mut self, source: &str, destination: &Path) -> Result<(), BuildError> {
        check_step_order(&self.completed, StepKind::CopySource)?;

        let destination = self
            .working_dir(StepKind::CopySource)?
            .join(destination);
        let host_destination = self.host_path(&destination)?;

        let context_files = match self.context_files.take() {
            Some(context_files) => context_files,
            None => BuildContextFiles::scan(&self.context_dir)?,
        };

        let copied = copy_source(
            &context_files,
            source,
            &host_destination,
            self.process_env.flags().dont_write_bytecode,
        );
        self.context_files = Some(context_files);
        log::debug!("Copied {} files to {}", copied?, destination.display());

        self.completed.push(StepKind::CopySource);
        Ok(())
    }

    /// The configuration of the finished image.
    pub fn image_config(
        &self,
        tag: ImageTag,
        launch: LaunchDescriptor,
        exposed_ports: Vec<u16>,
    ) -> Result<ImageConfig, BuildError> {
        check_step_order(&self.completed, StepKind::CopySource)?;

        let base = self.base(StepKind::CopySource)?;

        Ok(ImageConfig {
            tag,
            base: base.image_ref.clone(),
            base_digest: base.digest.clone(),
            env: self.env.clone(),
            working_dir: self.working_dir(StepKind::CopySource)?.to_path_buf(),
            packages_dir: base.descriptor.packages_dir.clone(),
            exposed_ports,
            dependencies: self.dependencies.clone(),
            launch,
        })
    }

    fn base(&self, step: StepKind) -> Result<&ResolvedBase, StepOutOfOrder> {
        self.base
            .as_ref()
            .ok_or(StepOutOfOrder::MissingPrerequisite {
                step,
                missing: StepKind::EstablishBase,
            })
    }

    fn working_dir(&self, step: StepKind) -> Result<&Path, StepOutOfOrder> {
        self.working_dir
            .as_deref()
            .ok_or(StepOutOfOrder::MissingPrerequisite {
                step,
                missing: StepKind::SetWorkingDirectory,
            })
    }

    fn host_path(&self, image_path: &Path) -> Result<PathBuf, BuildError> {
        path_in_rootfs(&self.rootfs, image_path).ok_or_else(|| BuildError::PathInvalid {
            path: image_path.to_path_buf(),
            reason: String::from("path must stay inside the image"),
        })
    }
}
