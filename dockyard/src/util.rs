use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Removes [`std::io::Error`] values from a [`Result`] that have the
/// [`std::io::ErrorKind::NotFound`] error kind by replacing them with the default value for `T`.
pub(crate) fn default_on_not_found<T: Default>(
    result: Result<T, std::io::Error>,
) -> Result<T, std::io::Error> {
    match result {
        Err(io_error) => match io_error.kind() {
            std::io::ErrorKind::NotFound => Ok(T::default()),
            _ => Err(io_error),
        },
        other => other,
    }
}

/// Maps an absolute path inside an image to the corresponding path under the image's root
/// filesystem directory.
///
/// Returns `None` if the path is relative or would leave the root via `..`.
pub(crate) fn path_in_rootfs(rootfs: &Path, image_path: &Path) -> Option<PathBuf> {
    if !image_path.has_root() {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in image_path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => relative.push(part),
            Component::ParentDir => {
                if !relative.pop() {
                    return None;
                }
            }
            Component::Prefix(_) => return None,
        }
    }

    Some(rootfs.join(relative))
}

/// Returns `true` for compiled bytecode files and their cache directories.
pub(crate) fn is_bytecode_artifact(path: &Path) -> bool {
    path.components().any(|component| {
        component.as_os_str() == OsStr::new("__pycache__")
            || Path::new(component.as_os_str())
                .extension()
                .is_some_and(|extension| extension == "pyc" || extension == "pyo")
    })
}
