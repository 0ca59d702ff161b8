use crate::data::descriptor::ImageDescriptor;
use crate::data::env::EnvironmentSet;
use crate::data::image::ImageRef;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// A single build-time step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildStep {
    EstablishBase(ImageRef),
    SetEnvironment(EnvironmentSet),
    SetWorkingDirectory(PathBuf),
    InstallDependencies(PathBuf),
    CopySource { source: String, destination: PathBuf },
}

impl BuildStep {
    #[must_use]
    pub fn kind(&self) -> StepKind {
        match self {
            BuildStep::EstablishBase(_) => StepKind::EstablishBase,
            BuildStep::SetEnvironment(_) => StepKind::SetEnvironment,
            BuildStep::SetWorkingDirectory(_) => StepKind::SetWorkingDirectory,
            BuildStep::InstallDependencies(_) => StepKind::InstallDependencies,
            BuildStep::CopySource { .. } => StepKind::CopySource,
        }
    }
}

impl Display for BuildStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::EstablishBase(image_ref) => write!(f, "establish base {image_ref}"),
            BuildStep::SetEnvironment(env) => write!(f, "set {} environment variables", env.len()),
            BuildStep::SetWorkingDirectory(path) => {
                write!(f, "set working directory {}", path.display())
            }
            BuildStep::InstallDependencies(manifest) => {
                write!(f, "install dependencies from {}", manifest.display())
            }
            BuildStep::CopySource {
                source,
                destination,
            } => write!(f, "copy {source} to {}", destination.display()),
        }
    }
}

/// The kinds of build steps, in the only order they may run in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum StepKind {
    EstablishBase,
    SetEnvironment,
    SetWorkingDirectory,
    InstallDependencies,
    CopySource,
}

impl StepKind {
    /// Steps of these kinds may appear at most once.
    fn is_unique(self) -> bool {
        !matches!(self, StepKind::SetEnvironment | StepKind::CopySource)
    }

    /// The kinds of steps that must have run before a step of this kind.
    fn prerequisites(self) -> &'static [StepKind] {
        match self {
            StepKind::EstablishBase => &[],
            StepKind::SetEnvironment | StepKind::SetWorkingDirectory => {
                &[StepKind::EstablishBase]
            }
            StepKind::InstallDependencies => {
                &[StepKind::EstablishBase, StepKind::SetWorkingDirectory]
            }
            StepKind::CopySource => &[
                StepKind::EstablishBase,
                StepKind::SetWorkingDirectory,
                StepKind::InstallDependencies,
            ],
        }
    }
}

impl Display for StepKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::EstablishBase => "establish_base",
            StepKind::SetEnvironment => "set_environment",
            StepKind::SetWorkingDirectory => "set_working_directory",
            StepKind::InstallDependencies => "install_dependencies",
            StepKind::CopySource => "copy_source",
        };

        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum StepOutOfOrder {
    #[error("{step} requires {missing} to run first")]
    MissingPrerequisite {
        step: StepKind,
        missing: StepKind,
    },

    #[error("{step} cannot run after {previous}")]
    AfterLaterStep {
        step: StepKind,
        previous: StepKind,
    },

    #[error("{0} can only run once")]
    Repeated(StepKind),
}

/// The ordered list of build steps for one image.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildPlan {
    steps: Vec<BuildStep>,
}

impl BuildPlan {
    #[must_use]
    pub fn new(steps: Vec<BuildStep>) -> Self {
        Self { steps }
    }

    /// The plan for an image descriptor: base, environment, working directory, dependencies and
    /// one copy step per copy instruction.
    #[must_use]
    pub fn from_descriptor(descriptor: &ImageDescriptor) -> Self {
        let mut steps = vec![
            BuildStep::EstablishBase(descriptor.base.clone()),
            BuildStep::SetEnvironment(descriptor.env.clone()),
            BuildStep::SetWorkingDirectory(descriptor.working_dir.clone()),
            BuildStep::InstallDependencies(descriptor.manifest.clone()),
        ];

        steps.extend(descriptor.copy.iter().map(|instruction| BuildStep::CopySource {
            source: instruction.source.clone(),
            destination: instruction.destination.clone(),
        }));

        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Checks the step order without running any step.
    pub fn validate(&self) -> Result<(), StepOutOfOrder> {
        let mut completed: Vec<StepKind> = Vec::new();

        for step in &self.steps {
            let kind = step.kind();
            check_step_order(&completed, kind)?;
            completed.push(kind);
        }

        Ok(())
    }
}

/// Checks that a step of the given kind may run after the `completed` steps.
pub(crate) fn check_step_order(
    completed: &[StepKind],
    kind: StepKind,
) -> Result<(), StepOutOfOrder> {
    if kind.is_unique() && completed.contains(&kind) {
        return Err(StepOutOfOrder::Repeated(kind));
    }

    if let Some(missing) = kind
        .prerequisites()
        .iter()
        .find(|prerequisite| !completed.contains(prerequisite))
    {
        return Err(StepOutOfOrder::MissingPrerequisite {
            step: kind,
            missing: *missing,
        });
    }

    if let Some(previous) = completed.iter().find(|previous| **previous > kind) {
        return Err(StepOutOfOrder::AfterLaterStep {
            step: kind,
            previous: *previous,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BuildStep {
        BuildStep::EstablishBase("python:3.11-slim".parse().unwrap())
    }

    fn env() -> BuildStep {
        BuildStep::SetEnvironment([("PYTHONUNBUFFERED", "1")].into_iter().collect())
    }

    fn workdir() -> BuildStep {
        BuildStep::SetWorkingDirectory(PathBuf::from("/app"))
    }

    fn install() -> BuildStep {
        BuildStep::InstallDependencies(PathBuf::from("requirements.txt"))
    }

    fn copy() -> BuildStep {
        BuildStep::CopySource {
            source: String::from("."),
            destination: PathBuf::from("."),
        }
    }

    #[test]
    fn descriptor_plan_is_valid() {
        let descriptor = toml::from_str(
            r#"
            base = "python:3.11-slim"
            working-dir = "/app"

            [[copy]]
            source = "app"
            destination = "app"

            [[copy]]
            source = "requirements.txt"

            [launch]
            entry-point = "app.main:app"
            "#,
        )
        .unwrap();

        let plan = BuildPlan::from_descriptor(&descriptor);
        assert_eq!(plan.steps().len(), 6);
        assert_eq!(plan.validate(), Ok(()));
    }

    #[test]
    fn canonical_order() {
        assert_eq!(
            BuildPlan::new(vec![base(), env(), workdir(), install(), copy(), copy()]).validate(),
            Ok(())
        );
    }

    #[test]
    fn install_requires_working_directory() {
        assert_eq!(
            BuildPlan::new(vec![base(), env(), install(), workdir(), copy()]).validate(),
            Err(StepOutOfOrder::MissingPrerequisite {
                step: StepKind::InstallDependencies,
                missing: StepKind::SetWorkingDirectory
            })
        );
    }

    #[test]
    fn copy_requires_install() {
        assert_eq!(
            BuildPlan::new(vec![base(), workdir(), copy(), install()]).validate(),
            Err(StepOutOfOrder::MissingPrerequisite {
                step: StepKind::CopySource,
                missing: StepKind::InstallDependencies
            })
        );
    }

    #[test]
    fn base_comes_first() {
        assert_eq!(
            BuildPlan::new(vec![env(), base()]).validate(),
            Err(StepOutOfOrder::MissingPrerequisite {
                step: StepKind::SetEnvironment,
                missing: StepKind::EstablishBase
            })
        );
    }

    #[test]
    fn environment_after_install() {
        assert_eq!(
            BuildPlan::new(vec![base(), workdir(), install(), env(), copy()]).validate(),
            Err(StepOutOfOrder::AfterLaterStep {
                step: StepKind::SetEnvironment,
                previous: StepKind::SetWorkingDirectory
            })
        );
    }

    #[test]
    fn repeated_steps() {
        assert_eq!(
            BuildPlan::new(vec![base(), workdir(), install(), install()]).validate(),
            Err(StepOutOfOrder::Repeated(StepKind::InstallDependencies))
        );
    }
}
