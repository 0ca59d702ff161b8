//! The image descriptor, `dockyard.toml`, found at the root of a build context.
//!
//! ```toml
//! base = "python:3.11-slim"
//! working-dir = "/app"
//! manifest = "requirements.txt"
//! expose = [8000]
//!
//! [env]
//! PYTHONDONTWRITEBYTECODE = "1"
//! PYTHONUNBUFFERED = "1"
//!
//! [[copy]]
//! source = "."
//! destination = "."
//!
//! [launch]
//! entry-point = "app.main:app"
//! host = "0.0.0.0"
//! port = 8000
//! ```

use crate::env::EnvironmentSet;
use crate::image::ImageRef;
use crate::launch::DEFAULT_LAUNCHER;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DESCRIPTOR_FILE_NAME: &str = "dockyard.toml";
pub const DEFAULT_MANIFEST_PATH: &str = "requirements.txt";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ImageDescriptor {
    pub base: ImageRef,
    #[serde(default, skip_serializing_if = "EnvironmentSet::is_empty")]
    pub env: EnvironmentSet,
    pub working_dir: PathBuf,
    /// Path of the dependency manifest, relative to the build context root.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    #[serde(default = "default_copy")]
    pub copy: Vec<CopyInstruction>,
    /// Ports the service is documented to listen on. Empty means the launch port.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<u16>,
    pub launch: LaunchSettings,
}

/// Copies the build context files matching `source` to `destination`, relative to the working
/// directory.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CopyInstruction {
    /// A glob pattern, relative to the build context root.
    pub source: String,
    #[serde(default = "default_destination")]
    pub destination: PathBuf,
}

impl Default for CopyInstruction {
    fn default() -> Self {
        Self {
            source: String::from("."),
            destination: default_destination(),
        }
    }
}

/// The launch settings as written in the descriptor.
///
/// Values are kept as written. They are validated when the launch descriptor is composed, so that
/// invalid settings are reported as a launch configuration problem.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct LaunchSettings {
    #[serde(default = "default_launcher")]
    pub launcher: String,
    pub entry_point: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
}

fn default_manifest() -> PathBuf {
    PathBuf::from(DEFAULT_MANIFEST_PATH)
}

fn default_copy() -> Vec<CopyInstruction> {
    vec![CopyInstruction::default()]
}

fn default_destination() -> PathBuf {
    PathBuf::from(".")
}

fn default_launcher() -> String {
    String::from(DEFAULT_LAUNCHER)
}
