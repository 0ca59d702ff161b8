use crate::data::image_config::InstalledPackage;
use crate::data::index::{IndexResolutionError, PackageArtifact, PackageIndex, Sha256Checksum};
use crate::data::manifest::{DependencyManifest, ManifestError};
use crate::digest::sha256;
use crate::download::{fetch, ArtifactSource, DownloadError};
use crate::tar::decompress_tarball;
use crate::util::default_on_not_found;
use crate::BuildError;
use dockyard_common::toml_file::{read_optional_toml_file, write_toml_file, TomlFileError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Records which packages are installed in a packages directory.
pub const INSTALL_RECORD_FILE_NAME: &str = ".dockyard-packages.toml";

/// The declared dependencies cannot be resolved against the package index.
#[derive(thiserror::Error, Debug)]
pub enum ResolutionError {
    #[error("Malformed dependency manifest {}: {}", .0.display(), .1)]
    InvalidManifest(PathBuf, #[source] ManifestError),

    #[error(transparent)]
    Unresolvable(#[from] IndexResolutionError),
}

/// Resolved dependencies could not be installed.
#[derive(thiserror::Error, Debug)]
pub enum InstallError {
    #[error("Dependency manifest {} not found", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Cannot read dependency manifest {}: {}", .0.display(), .1)]
    CannotReadManifest(PathBuf, #[source] std::io::Error),

    #[error("Cannot read package index: {0}")]
    CannotReadIndex(#[source] TomlFileError),

    #[error("Cannot create download cache: {0}")]
    CannotCreateCache(#[source] std::io::Error),

    #[error("Cannot fetch {package} from {url}: {source}")]
    DownloadError {
        package: String,
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("Checksum mismatch for {package}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        package: String,
        expected: Sha256Checksum,
        actual: Sha256Checksum,
    },

    #[error("Cannot unpack {package}: {source}")]
    CannotUnpack {
        package: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read install record: {0}")]
    CannotReadInstallRecord(#[source] TomlFileError),

    #[error("Cannot write install record: {0}")]
    CannotWriteInstallRecord(#[source] TomlFileError),

    #[error("I/O error while installing dependencies at {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct InstallRecord {
    #[serde(default)]
    packages: Vec<InstalledPackage>,
}

/// Installs the dependencies declared in a manifest into a packages directory.
///
/// Every requirement is resolved before anything is fetched. Artifacts are fetched into a
/// temporary cache that is removed when this function returns. Packages that are already
/// installed in the same version are not fetched again, and packages that are no longer
/// required are removed, so installing the same manifest twice yields the same set.
///
/// Returns the installed packages, ordered by name.
pub(crate) fn install_dependencies(
    manifest_path: &Path,
    index_path: &Path,
    packages_dir: &Path,
    skip_bytecode: bool,
) -> Result<Vec<InstalledPackage>, BuildError> {
    let manifest_contents = fs::read_to_string(manifest_path).map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            InstallError::ManifestNotFound(manifest_path.to_path_buf())
        } else {
            InstallError::CannotReadManifest(manifest_path.to_path_buf(), error)
        }
    })?;

    let manifest = manifest_contents
        .parse::<DependencyManifest>()
        .map_err(|error| ResolutionError::InvalidManifest(manifest_path.to_path_buf(), error))?;

    let index = read_optional_toml_file::<PackageIndex>(index_path)
        .map_err(InstallError::CannotReadIndex)?
        .unwrap_or_default();

    let resolved = manifest
        .merged()
        .iter()
        .map(|requirement| {
            index.resolve(requirement).inspect(|artifact| {
                log::debug!(
                    "Resolved {requirement} to {} {}",
                    artifact.name,
                    artifact.version
                );
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(ResolutionError::from)?;

    fs::create_dir_all(packages_dir)
        .map_err(|error| InstallError::IoError(packages_dir.to_path_buf(), error))?;

    let record_path = packages_dir.join(INSTALL_RECORD_FILE_NAME);
    let previous = read_optional_toml_file::<InstallRecord>(&record_path)
        .map_err(InstallError::CannotReadInstallRecord)?
        .unwrap_or_default();

    let cache_dir = tempfile::tempdir().map_err(InstallError::CannotCreateCache)?;
    let index_dir = index_path.parent().unwrap_or(Path::new("."));

    let mut installed = Vec::with_capacity(resolved.len());
    for artifact in resolved {
        let package = InstalledPackage {
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            checksum: artifact.checksum.clone(),
        };

        let package_dir = packages_dir.join(artifact.name.normalized());

        if previous.packages.contains(&package) && package_dir.is_dir() {
            log::debug!("{} {} is already installed", package.name, package.version);
        } else {
            log::info!("Installing {} {}", artifact.name, artifact.version);
            install_artifact(artifact, index_dir, cache_dir.path(), &package_dir, skip_bytecode)?;
        }

        installed.push(package);
    }

    for stale in previous.packages.iter().filter(|previous_package| {
        !installed
            .iter()
            .any(|package| package.name.is_same_package(&previous_package.name))
    }) {
        log::debug!("Removing {} {}", stale.name, stale.version);
        let stale_dir = packages_dir.join(stale.name.normalized());
        default_on_not_found(fs::remove_dir_all(&stale_dir))
            .map_err(|error| InstallError::IoError(stale_dir, error))?;
    }

    installed.sort_by_key(|package| package.name.normalized());

    write_toml_file(
        &InstallRecord {
            packages: installed.clone(),
        },
        &record_path,
    )
    .map_err(InstallError::CannotWriteInstallRecord)?;

    Ok(installed)
}

fn install_artifact(
    artifact: &PackageArtifact,
    index_dir: &Path,
    cache_dir: &Path,
    package_dir: &Path,
    skip_bytecode: bool,
) -> Result<(), InstallError> {
    let package = format!("{} {}", artifact.name, artifact.version);
    let download_error = |source| InstallError::DownloadError {
        package: package.clone(),
        url: artifact.url.clone(),
        source,
    };

    let source = ArtifactSource::parse(&artifact.url, index_dir).map_err(download_error)?;
    let tarball_path = cache_dir.join(format!(
        "{}-{}.tar.gz",
        artifact.name.normalized(),
        artifact.version
    ));

    fetch(&source, &tarball_path).map_err(download_error)?;

    if let Some(expected) = &artifact.checksum {
        let actual = sha256(&tarball_path)
            .map_err(|error| InstallError::IoError(tarball_path.clone(), error))?;

        if &actual != expected {
            return Err(InstallError::ChecksumMismatch {
                package,
                expected: expected.clone(),
                actual,
            });
        }
    }

    default_on_not_found(fs::remove_dir_all(package_dir))
        .and_then(|()| fs::create_dir_all(package_dir))
        .map_err(|error| InstallError::IoError(package_dir.to_path_buf(), error))?;

    let unpack_error = |source| InstallError::CannotUnpack {
        package: package.clone(),
        source,
    };

    let mut tarball = File::open(&tarball_path).map_err(unpack_error)?;
    let entries =
        decompress_tarball(&mut tarball, package_dir, skip_bytecode).map_err(unpack_error)?;
    log::debug!("Unpacked {entries} entries of {package}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::sha256;
    use crate::tar::tests::write_tarball;
    use std::fmt::Write as _;

    struct Fixture {
        _temp_dir: tempfile::TempDir,
        manifest_path: PathBuf,
        index_path: PathBuf,
        packages_dir: PathBuf,
    }

    /// A manifest, an index with the given packages and an empty packages directory.
    fn fixture(manifest: &str, packages: &[(&str, &str, bool)]) -> Fixture {
        let temp_dir = tempfile::tempdir().unwrap();
        let index_dir = temp_dir.path().join("index");
        fs::create_dir_all(index_dir.join("packages")).unwrap();

        let mut index = String::new();
        for (name, version, with_checksum) in packages {
            let file_name = format!("packages/{name}-{version}.tar.gz");
            let module = format!("{name}/__init__.py");
            let bytecode = format!("{name}/__pycache__/__init__.pyc");
            let contents = format!("VERSION = '{version}'\n");
            write_tarball(
                &index_dir.join(&file_name),
                &[(module.as_str(), contents.as_str()), (bytecode.as_str(), "bytecode")],
            );

            write!(
                index,
                "[[packages]]\nname = \"{name}\"\nversion = \"{version}\"\nurl = \"{file_name}\"\n"
            )
            .unwrap();

            if *with_checksum {
                let checksum = sha256(index_dir.join(&file_name)).unwrap();
                writeln!(index, "checksum = \"{checksum}\"").unwrap();
            }
        }

        let index_path = index_dir.join("index.toml");
        fs::write(&index_path, index).unwrap();

        let manifest_path = temp_dir.path().join("requirements.txt");
        fs::write(&manifest_path, manifest).unwrap();

        Fixture {
            manifest_path,
            index_path,
            packages_dir: temp_dir.path().join("rootfs/site-packages"),
            _temp_dir: temp_dir,
        }
    }

    fn install(fixture: &Fixture, skip_bytecode: bool) -> Result<Vec<InstalledPackage>, BuildError> {
        install_dependencies(
            &fixture.manifest_path,
            &fixture.index_path,
            &fixture.packages_dir,
            skip_bytecode,
        )
    }

    fn names(packages: &[InstalledPackage]) -> Vec<String> {
        packages
            .iter()
            .map(|package| format!("{}=={}", package.name, package.version))
            .collect()
    }

    #[test]
    fn installs_resolved_packages() {
        let fixture = fixture(
            "uvicorn>=0.27\nfastapi==0.110.0\n",
            &[
                ("fastapi", "0.109.2", true),
                ("fastapi", "0.110.0", true),
                ("uvicorn", "0.27.1", false),
                ("uvicorn", "0.29.0", false),
            ],
        );

        let installed = install(&fixture, false).unwrap();

        assert_eq!(names(&installed), vec!["fastapi==0.110.0", "uvicorn==0.29.0"]);
        assert_eq!(
            fs::read_to_string(fixture.packages_dir.join("fastapi/fastapi/__init__.py")).unwrap(),
            "VERSION = '0.110.0'\n"
        );
        assert!(fixture
            .packages_dir
            .join("uvicorn/uvicorn/__pycache__/__init__.pyc")
            .exists());
    }

    #[test]
    fn skips_bytecode_when_requested() {
        let fixture = fixture("fastapi\n", &[("fastapi", "0.110.0", false)]);

        install(&fixture, true).unwrap();

        assert!(fixture.packages_dir.join("fastapi/fastapi/__init__.py").exists());
        assert!(!fixture.packages_dir.join("fastapi/fastapi/__pycache__").exists());
    }

    #[test]
    fn reinstalling_yields_the_same_set_without_fetching() {
        let fixture = fixture(
            "fastapi\nuvicorn\n",
            &[("fastapi", "0.110.0", true), ("uvicorn", "0.29.0", true)],
        );

        let first = install(&fixture, false).unwrap();

        // Unchanged packages must not be fetched again.
        fs::remove_dir_all(fixture.index_path.parent().unwrap().join("packages")).unwrap();

        let second = install(&fixture, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn removes_packages_that_are_no_longer_required() {
        let fixture = fixture(
            "fastapi\nuvicorn\n",
            &[("fastapi", "0.110.0", false), ("uvicorn", "0.29.0", false)],
        );

        install(&fixture, false).unwrap();
        fs::write(&fixture.manifest_path, "fastapi\n").unwrap();

        let installed = install(&fixture, false).unwrap();
        assert_eq!(names(&installed), vec!["fastapi==0.110.0"]);
        assert!(!fixture.packages_dir.join("uvicorn").exists());
    }

    #[test]
    fn missing_manifest() {
        let fixture = fixture("", &[]);
        fs::remove_file(&fixture.manifest_path).unwrap();

        assert!(matches!(
            install(&fixture, false),
            Err(BuildError::InstallError(InstallError::ManifestNotFound(_)))
        ));
    }

    #[test]
    fn malformed_manifest() {
        let fixture = fixture("fastapi=0.110\n", &[("fastapi", "0.110.0", false)]);

        assert!(matches!(
            install(&fixture, false),
            Err(BuildError::DependencyResolutionError(
                ResolutionError::InvalidManifest(_, _)
            ))
        ));
    }

    #[test]
    fn unsatisfiable_constraint_fetches_nothing() {
        let fixture = fixture(
            "fastapi==0.110.0\nuvicorn>=1\n",
            &[("fastapi", "0.110.0", false), ("uvicorn", "0.29.0", false)],
        );

        assert!(matches!(
            install(&fixture, false),
            Err(BuildError::DependencyResolutionError(
                ResolutionError::Unresolvable(IndexResolutionError::Unsatisfiable { .. })
            ))
        ));
        assert!(!fixture.packages_dir.exists());
    }

    #[test]
    fn unknown_package() {
        let fixture = fixture("starlette\n", &[("fastapi", "0.110.0", false)]);

        assert!(matches!(
            install(&fixture, false),
            Err(BuildError::DependencyResolutionError(
                ResolutionError::Unresolvable(IndexResolutionError::UnknownPackage(_))
            ))
        ));
    }

    #[test]
    fn checksum_mismatch() {
        let fixture = fixture("fastapi\n", &[("fastapi", "0.110.0", true)]);
        write_tarball(
            &fixture
                .index_path
                .parent()
                .unwrap()
                .join("packages/fastapi-0.110.0.tar.gz"),
            &[("fastapi/__init__.py", "tampered\n")],
        );

        assert!(matches!(
            install(&fixture, false),
            Err(BuildError::InstallError(InstallError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn empty_manifest_without_index() {
        let fixture = fixture("# nothing yet\n", &[]);
        fs::remove_file(&fixture.index_path).unwrap();

        assert_eq!(install(&fixture, false).unwrap(), Vec::new());
        assert!(fixture.packages_dir.join(INSTALL_RECORD_FILE_NAME).exists());
    }
}
