use super::{AppExit, Application, EntryPointLoadError, LaunchConfigError, Runtime};
use crate::data::env::EnvironmentSet;
use crate::data::launch::{BindHost, EntryPoint, LaunchDescriptor};
use crate::env::ProcessEnvironment;
use crate::exit_code;
use crate::store::StoredImage;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};

const PATH: &str = "PATH";
const PYTHONPATH: &str = "PYTHONPATH";

/// Runs the launcher program of an image as a child process.
///
/// The bind address is probed with a real listener, which is released right before the child
/// starts so that the child can bind it. The child inherits stdin, stdout and stderr and gets the
/// image's environment, not the environment of the `dockyard` process.
#[derive(Clone, Debug)]
pub struct ProcessRuntime {
    working_dir: PathBuf,
    env: ProcessEnvironment,
    module_search_path: Vec<PathBuf>,
}

impl ProcessRuntime {
    /// A runtime that runs the launcher in `working_dir`, looking up entry point modules in the
    /// working directory first and in `module_search_path` afterwards.
    pub fn new(
        working_dir: impl Into<PathBuf>,
        env: ProcessEnvironment,
        module_search_path: Vec<PathBuf>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            env,
            module_search_path,
        }
    }

    /// A runtime for a finished image.
    ///
    /// Absolute `PATH` entries of the image are looked up in the image first and on the host
    /// afterwards. Installed packages are put on `PYTHONPATH`.
    pub fn for_image(image: &StoredImage) -> Result<Self, LaunchConfigError> {
        let config = image.config();

        let working_dir = image
            .host_path(&config.working_dir)
            .ok_or_else(|| LaunchConfigError::InvalidImagePath(config.working_dir.clone()))?;

        let packages_dir = image
            .host_path(&config.packages_dir)
            .ok_or_else(|| LaunchConfigError::InvalidImagePath(config.packages_dir.clone()))?;

        let package_dirs = config
            .dependencies
            .iter()
            .map(|package| packages_dir.join(package.name.normalized()))
            .collect::<Vec<_>>();

        let mut vars = EnvironmentSet::new();
        vars.extend(&config.env);

        let executable_path = match config.env.get(PATH) {
            Some(image_path) => std::env::split_paths(image_path)
                .flat_map(|entry| image.host_path(&entry).into_iter().chain([entry]))
                .collect::<Vec<_>>(),
            None => std::env::var_os(PATH)
                .map(|host_path| std::env::split_paths(&host_path).collect())
                .unwrap_or_default(),
        };
        vars.insert(PATH, join_paths(executable_path)?);

        let python_path = package_dirs
            .iter()
            .cloned()
            .chain(
                config
                    .env
                    .get(PYTHONPATH)
                    .map(|existing| std::env::split_paths(existing).collect::<Vec<_>>())
                    .unwrap_or_default(),
            )
            .collect::<Vec<_>>();
        if !python_path.is_empty() {
            vars.insert(PYTHONPATH, join_paths(python_path)?);
        }

        Ok(Self::new(
            working_dir,
            ProcessEnvironment::new(vars)?,
            package_dirs,
        ))
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn env(&self) -> &ProcessEnvironment {
        &self.env
    }

    fn find_launcher(&self, launcher: &str) -> Result<PathBuf, EntryPointLoadError> {
        which::which_in(
            launcher,
            self.env.get(PATH).map(OsString::from),
            &self.working_dir,
        )
        .map_err(|source| EntryPointLoadError::LauncherNotFound {
            launcher: String::from(launcher),
            source,
        })
    }

    fn check_entry_point(&self, entry_point: &EntryPoint) -> Result<(), EntryPointLoadError> {
        let search_path = std::iter::once(self.working_dir.clone())
            .chain(self.module_search_path.iter().cloned())
            .collect::<Vec<_>>();

        let module_path = entry_point
            .module()
            .split('.')
            .collect::<PathBuf>();

        let module_file = search_path
            .iter()
            .flat_map(|dir| {
                [
                    dir.join(&module_path).with_extension("py"),
                    dir.join(&module_path).join("__init__.py"),
                ]
            })
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| EntryPointLoadError::ModuleNotFound {
                module: String::from(entry_point.module()),
                search_path: search_path.clone(),
            })?;

        let source = std::fs::read_to_string(&module_file).map_err(|source| {
            EntryPointLoadError::CannotReadModule {
                module: String::from(entry_point.module()),
                path: module_file.clone(),
                source,
            }
        })?;

        let defined = defines_attribute(&source, entry_point.attribute()).map_err(|source| {
            EntryPointLoadError::CannotScanModule {
                module: String::from(entry_point.module()),
                attribute: String::from(entry_point.attribute()),
                source: Box::new(source),
            }
        })?;

        if defined {
            Ok(())
        } else {
            Err(EntryPointLoadError::AttributeNotFound {
                module: String::from(entry_point.module()),
                attribute: String::from(entry_point.attribute()),
                path: module_file,
            })
        }
    }
}

fn join_paths(paths: Vec<PathBuf>) -> Result<String, LaunchConfigError> {
    std::env::join_paths(&paths)
        .map(|joined| joined.to_string_lossy().into_owned())
        .map_err(|_| LaunchConfigError::InvalidSearchPath(paths))
}

/// Returns `true` if a module's source binds `attribute` at the top level: by assignment,
/// definition or import.
///
/// Only ASCII classes are used, the regex engine is built without Unicode tables.
fn defines_attribute(source: &str, attribute: &str) -> Result<bool, fancy_regex::Error> {
    let attribute = fancy_regex::escape(attribute);
    let word_start = r"(?<![A-Za-z0-9_])";
    let word_end = r"(?![A-Za-z0-9_])";
    let pattern = format!(
        r"(?m)^(?:{attribute}[ \t]*(?::[^=\n]*)?=(?!=)|(?:async[ \t]+)?def[ \t]+{attribute}[ \t]*\(|class[ \t]+{attribute}{word_end}|(?:from[ \t]+[^ \t\n]+[ \t]+)?import[ \t]+[^\n]*{word_start}{attribute}{word_end})"
    );

    fancy_regex::Regex::new(&pattern)?.is_match(source)
}

impl Runtime for ProcessRuntime {
    type Listener = TcpListener;
    type Application = ProcessApplication;

    fn bind(&self, host: &BindHost, port: u16) -> std::io::Result<TcpListener> {
        match host {
            BindHost::Ip(ip) => TcpListener::bind(SocketAddr::new(*ip, port)),
            BindHost::Name(name) => TcpListener::bind((name.as_str(), port)),
        }
    }

    fn load(&self, descriptor: &LaunchDescriptor) -> Result<ProcessApplication, EntryPointLoadError> {
        let launcher = self.find_launcher(&descriptor.launcher)?;
        log::debug!("Found launcher {}", launcher.display());

        self.check_entry_point(&descriptor.entry_point)?;

        Ok(ProcessApplication {
            launcher,
            args: descriptor.args(),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
        })
    }
}

/// The launcher program of an image, ready to be started.
#[derive(Clone, Debug)]
pub struct ProcessApplication {
    launcher: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
    env: ProcessEnvironment,
}

impl Application<TcpListener> for ProcessApplication {
    fn serve(self, listener: TcpListener) -> std::io::Result<AppExit> {
        // The child binds the address itself.
        drop(listener);

        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(self.run())
    }
}

impl ProcessApplication {
    async fn run(self) -> std::io::Result<AppExit> {
        // Handlers have to be in place before the child exists, otherwise an early signal
        // terminates this process and orphans the child.
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let child_vars = self.env.child_vars();
        let mut child = Command::new(&self.launcher)
            .args(&self.args)
            .env_clear()
            .envs(child_vars.iter())
            .current_dir(&self.working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        let mut forwarded = false;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = sigterm.recv() => {
                    forward_signal(&child, Signal::SIGTERM)?;
                    forwarded = true;
                }
                _ = sigint.recv() => {
                    forward_signal(&child, Signal::SIGINT)?;
                    forwarded = true;
                }
            }
        };

        let terminating_signal = status
            .signal()
            .and_then(|number| Signal::try_from(number).ok());

        Ok(AppExit {
            code: status
                .code()
                .or_else(|| status.signal().map(|number| 128 + number))
                .unwrap_or(exit_code::GENERIC_UNSPECIFIED_ERROR),
            terminated_by_signal: forwarded
                || matches!(terminating_signal, Some(Signal::SIGTERM | Signal::SIGINT)),
        })
    }
}

/// Sends a signal to a child process. A child that already exited is not an error.
fn forward_signal(child: &Child, signal: Signal) -> std::io::Result<()> {
    let Some(id) = child.id() else {
        return Ok(());
    };

    let pid = Pid::from_raw(i32::try_from(id).map_err(std::io::Error::other)?);
    log::info!("Forwarding {} to process {pid}", signal.as_str());

    match kill(pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(std::io::Error::from(errno)),
    }
}
