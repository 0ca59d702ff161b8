use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// An error that occurred during reading or writing a TOML file.
#[derive(thiserror::Error, Debug)]
pub enum TomlFileError {
    #[error("I/O error while reading/writing TOML file {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("TOML deserialization error while reading TOML file {}: {}", .0.display(), .1)]
    TomlDeserializationError(PathBuf, #[source] toml::de::Error),

    #[error("TOML serialization error while writing TOML file {}: {}", .0.display(), .1)]
    TomlSerializationError(PathBuf, #[source] toml::ser::Error),
}

impl TomlFileError {
    /// Returns `true` if the error was caused by the file not existing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IoError(_, io_error) if io_error.kind() == ErrorKind::NotFound)
    }
}

/// Serializes the given value as TOML and writes it to the given file path.
///
/// # Errors
///
/// Will return `Err` if the file couldn't be written or the value couldn't be serialized as a TOML string.
pub fn write_toml_file(
    value: &impl Serialize,
    path: impl AsRef<Path>,
) -> Result<(), TomlFileError> {
    let path = path.as_ref();

    let contents = toml::to_string(value)
        .map_err(|error| TomlFileError::TomlSerializationError(path.to_path_buf(), error))?;

    fs::write(path, contents).map_err(|error| TomlFileError::IoError(path.to_path_buf(), error))
}

/// Reads the file at the given path and parses it as `A`.
///
/// # Errors
///
/// Will return `Err` if the file couldn't be read or its contents couldn't be deserialized.
pub fn read_toml_file<A: DeserializeOwned>(path: impl AsRef<Path>) -> Result<A, TomlFileError> {
    let path = path.as_ref();

    let contents = fs::read_to_string(path)
        .map_err(|error| TomlFileError::IoError(path.to_path_buf(), error))?;

    toml::from_str(&contents)
        .map_err(|error| TomlFileError::TomlDeserializationError(path.to_path_buf(), error))
}

/// Like [`read_toml_file`], but yields `None` when the file does not exist.
pub fn read_optional_toml_file<A: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Option<A>, TomlFileError> {
    match read_toml_file(path) {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_not_found() => Ok(None),
        Err(error) => Err(error),
    }
}
