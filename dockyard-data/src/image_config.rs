use crate::env::EnvironmentSet;
use crate::image::{ImageRef, ImageTag};
use crate::index::Sha256Checksum;
use crate::launch::LaunchDescriptor;
use crate::manifest::PackageName;
use crate::version::PackageVersion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const IMAGE_CONFIG_FILE_NAME: &str = "image.toml";
pub const ROOTFS_DIR_NAME: &str = "rootfs";

/// Data structure for the `image.toml` file of a finished image.
///
/// It records everything needed to launch the image without consulting the build context again.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ImageConfig {
    pub tag: ImageTag,
    pub base: ImageRef,
    pub base_digest: Sha256Checksum,
    /// The final process environment: the base's variables overlaid with the image's.
    #[serde(default, skip_serializing_if = "EnvironmentSet::is_empty")]
    pub env: EnvironmentSet,
    pub working_dir: PathBuf,
    pub packages_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exposed_ports: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<InstalledPackage>,
    pub launch: LaunchDescriptor,
}

/// A package that was installed into an image.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstalledPackage {
    pub name: PackageName,
    pub version: PackageVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Sha256Checksum>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let config: ImageConfig = toml::from_str(
            r#"
            tag = "service-1.0"
            base = "python:3.11-slim"
            base-digest = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            working-dir = "/app"
            packages-dir = "/usr/local/lib/site-packages"
            exposed-ports = [8000]

            [env]
            PYTHONUNBUFFERED = "1"

            [[dependencies]]
            name = "fastapi"
            version = "0.110.0"

            [launch]
            launcher = "uvicorn"
            entry-point = "app.main:app"
            host = "0.0.0.0"
            port = 8000
            "#,
        )
        .unwrap();

        assert_eq!(config.dependencies.len(), 1);
        assert_eq!(config.launch.port, 8000);

        let serialized = toml::to_string(&config).unwrap();
        assert_eq!(toml::from_str::<ImageConfig>(&serialized).unwrap(), config);
    }
}
