use std::path::{Path, PathBuf};
use std::{fs, io};

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    // Boxed to prevent `large_enum_variant` errors since `ureq::Error` is massive.
    #[error("HTTP error while downloading file: {0}")]
    HttpError(#[from] Box<ureq::Error>),

    #[error("IO error while downloading file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Where an artifact is fetched from.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum ArtifactSource {
    Http(String),
    File(PathBuf),
}

impl ArtifactSource {
    /// Interprets an artifact URL. Relative paths are resolved against `base_dir`.
    pub(crate) fn parse(url: &str, base_dir: &Path) -> Result<Self, DownloadError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(ArtifactSource::Http(String::from(url)))
        } else if let Some(path) = url.strip_prefix("file://") {
            Ok(ArtifactSource::File(PathBuf::from(path)))
        } else if let Some((scheme, _)) = url.split_once("://") {
            Err(DownloadError::UnsupportedScheme(String::from(scheme)))
        } else {
            Ok(ArtifactSource::File(base_dir.join(url)))
        }
    }
}

/// Fetches an artifact to a local path, via HTTP(S) or by copying a local file.
pub(crate) fn fetch(
    source: &ArtifactSource,
    destination: impl AsRef<Path>,
) -> Result<(), DownloadError> {
    match source {
        ArtifactSource::Http(uri) => download_file(uri, destination),
        ArtifactSource::File(path) => fs::copy(path, destination)
            .map(|_| ())
            .map_err(DownloadError::IoError),
    }
}

/// Downloads a file via HTTP(S) to a local path.
pub(crate) fn download_file(
    uri: impl AsRef<str>,
    destination: impl AsRef<Path>,
) -> Result<(), DownloadError> {
    let response = ureq::get(uri.as_ref()).call().map_err(Box::new)?;
    let mut reader = response.into_reader();
    let mut file = fs::File::create(destination.as_ref())?;
    io::copy(&mut reader, &mut file)?;

    Ok(())
}
