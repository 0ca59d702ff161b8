//! Launching the single foreground process of an image.
//!
//! The [`LaunchComposer`] validates launch settings into a [`LaunchDescriptor`] and executes it
//! against a [`Runtime`]. The runtime binds the listener and loads the entry point, the loaded
//! [`Application`] serves until it exits. [`process::ProcessRuntime`] runs the launcher program as
//! a child process; tests substitute their own runtime.

pub mod process;

use crate::data::launch::{
    BindHost, BindHostError, EntryPoint, EntryPointError, LaunchDescriptor, DEFAULT_LAUNCHER,
    DEFAULT_PORT,
};
use crate::env::InvalidProcessFlag;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::LaunchError;
use std::path::PathBuf;

/// Binds listeners and loads entry points.
pub trait Runtime {
    type Listener;
    type Application: Application<Self::Listener>;

    /// Binds a listener to the given address. Failing here means the address is in use or not
    /// bindable.
    fn bind(&self, host: &BindHost, port: u16) -> std::io::Result<Self::Listener>;

    /// Finds the launcher program and the application object the descriptor refers to.
    fn load(&self, descriptor: &LaunchDescriptor)
        -> Result<Self::Application, EntryPointLoadError>;
}

/// A loaded application, ready to serve on a bound listener.
pub trait Application<L> {
    /// Serves until the application exits.
    fn serve(self, listener: L) -> std::io::Result<AppExit>;
}

/// How an application ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AppExit {
    pub code: i32,
    /// Set when the application ended because of a termination signal.
    pub terminated_by_signal: bool,
}

impl AppExit {
    /// Returns `true` for a clean exit: a zero exit code or a termination signal.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.code == 0 || self.terminated_by_signal
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum LaunchConfigError {
    #[error("Launcher program must not be empty")]
    EmptyLauncher,

    #[error("{0}")]
    InvalidEntryPoint(#[from] EntryPointError),

    #[error("{0}")]
    InvalidHost(#[from] BindHostError),

    #[error("Port {0} is outside of the valid range 1-65535")]
    PortOutOfRange(i64),

    #[error("{0}")]
    InvalidProcessFlag(#[from] InvalidProcessFlag),

    #[error("Image path {} must be absolute and stay inside the image", .0.display())]
    InvalidImagePath(PathBuf),

    #[error("Cannot build search path from {}", display_paths(.0))]
    InvalidSearchPath(Vec<PathBuf>),
}

#[derive(thiserror::Error, Debug)]
pub enum EntryPointLoadError {
    #[error("Launcher program {launcher} not found: {source}")]
    LauncherNotFound {
        launcher: String,
        #[source]
        source: which::Error,
    },

    #[error("Module {module} not found in {}", display_paths(.search_path))]
    ModuleNotFound {
        module: String,
        search_path: Vec<PathBuf>,
    },

    #[error("Module {module} ({}) does not define {attribute}", .path.display())]
    AttributeNotFound {
        module: String,
        attribute: String,
        path: PathBuf,
    },

    #[error("Cannot read module {module} ({}): {source}", .path.display())]
    CannotReadModule {
        module: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot scan module {module} for {attribute}: {source}")]
    CannotScanModule {
        module: String,
        attribute: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validates launch settings as written in an image descriptor or given on the command line.
///
/// A missing host defaults to `0.0.0.0`, a missing port to 8000.
pub fn compose(
    launcher: &str,
    entry_point: &str,
    host: Option<&str>,
    port: Option<i64>,
) -> Result<LaunchDescriptor, LaunchConfigError> {
    if launcher.trim().is_empty() {
        return Err(LaunchConfigError::EmptyLauncher);
    }

    let entry_point = entry_point.parse::<EntryPoint>()?;

    let host = host
        .map(str::parse::<BindHost>)
        .transpose()?
        .unwrap_or_default();

    let port = match port {
        None => DEFAULT_PORT,
        Some(port) => u16::try_from(port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or(LaunchConfigError::PortOutOfRange(port))?,
    };

    Ok(LaunchDescriptor {
        launcher: String::from(launcher),
        entry_point,
        host,
        port,
    })
}

/// Constructs and executes the launch descriptor of an image.
#[derive(Debug)]
pub struct LaunchComposer<R> {
    runtime: R,
    launcher: String,
    lifecycle: Lifecycle,
}

impl<R: Runtime> LaunchComposer<R> {
    /// A composer for an image that is already built.
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            launcher: String::from(DEFAULT_LAUNCHER),
            lifecycle: Lifecycle::built(),
        }
    }

    /// Sets the launcher program used by [`compose`](Self::compose).
    pub fn launcher(&mut self, launcher: impl Into<String>) -> &mut Self {
        self.launcher = launcher.into();
        self
    }

    /// A handle to the lifecycle this composer drives.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    #[must_use]
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Validates the launch settings. Nothing is bound or loaded.
    pub fn compose(
        &self,
        entry_point: &str,
        host: Option<&str>,
        port: Option<i64>,
    ) -> Result<LaunchDescriptor, LaunchError> {
        compose(&self.launcher, entry_point, host, port).map_err(LaunchError::from)
    }

    /// Binds the listener, loads the entry point and serves until the application exits.
    ///
    /// The application's exit is returned unchanged. Bind and load failures are fatal; there is
    /// no retry and no fallback entry point.
    pub fn execute(&self, descriptor: &LaunchDescriptor) -> Result<AppExit, LaunchError> {
        self.lifecycle.transition(LifecycleState::Starting)?;

        let result = self.start_and_serve(descriptor);

        let final_state = match &result {
            Ok(exit) if exit.is_clean() => LifecycleState::Exited,
            _ => LifecycleState::Crashed,
        };
        self.lifecycle.transition(final_state)?;

        result
    }

    fn start_and_serve(&self, descriptor: &LaunchDescriptor) -> Result<AppExit, LaunchError> {
        // Descriptors read from an image are validated again, they may have been edited.
        let descriptor = compose(
            &descriptor.launcher,
            &descriptor.entry_point,
            Some(descriptor.host.to_string().as_str()),
            Some(i64::from(descriptor.port)),
        )?;

        let listener = self
            .runtime
            .bind(&descriptor.host, descriptor.port)
            .map_err(|source| LaunchError::BindError {
                address: format!("{}:{}", descriptor.host, descriptor.port),
                source,
            })?;
        log::debug!("Bound listener to {}:{}", descriptor.host, descriptor.port);

        let application = self.runtime.load(&descriptor)?;

        self.lifecycle.transition(LifecycleState::Running)?;
        log::info!("Running {}", descriptor.command_line());

        let exit = application
            .serve(listener)
            .map_err(LaunchError::ServeError)?;

        log::info!(
            "Process exited with code {}{}",
            exit.code,
            if exit.terminated_by_signal {
                " after a termination signal"
            } else {
                ""
            }
        );

        Ok(exit)
    }
}
