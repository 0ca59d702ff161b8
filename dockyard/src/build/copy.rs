use crate::util::is_bytecode_artifact;
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Files listed in this file, using gitignore syntax, are never copied into an image.
pub const IGNORE_FILE_NAME: &str = ".dockyardignore";

#[derive(thiserror::Error, Debug)]
pub enum CopyError {
    #[error("Source pattern {0:?} does not match any files in the build context")]
    NoMatches(String),

    #[error("Source pattern {0:?} must be relative and stay inside the build context")]
    OutsideContext(String),

    #[error("Invalid source pattern {0:?}: {1}")]
    InvalidPattern(String, #[source] glob::PatternError),

    #[error("Cannot list build context files: {0}")]
    CannotWalkContext(#[source] ignore::Error),

    #[error("Cannot copy {} to {}: {}", .0.display(), .1.display(), .2)]
    IoError(PathBuf, PathBuf, #[source] std::io::Error),
}

/// The files of a build context that may be copied into an image.
#[derive(Debug)]
pub(crate) struct BuildContextFiles {
    root: PathBuf,
    files: BTreeSet<PathBuf>,
}

impl BuildContextFiles {
    /// Lists all files and symbolic links below `root` that are not excluded by an ignore file.
    /// Symbolic links are not followed.
    pub(crate) fn scan(root: &Path) -> Result<Self, CopyError> {
        let mut files = BTreeSet::new();

        for entry in WalkBuilder::new(root)
            .standard_filters(false)
            .add_custom_ignore_filename(IGNORE_FILE_NAME)
            .build()
        {
            let entry = entry.map_err(CopyError::CannotWalkContext)?;

            if entry
                .file_type()
                .is_some_and(|file_type| file_type.is_file() || file_type.is_symlink())
            {
                if let Some(relative_path) = pathdiff::diff_paths(entry.path(), root) {
                    files.insert(relative_path);
                }
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    /// The files a source pattern refers to, as pairs of a context-relative source path and the
    /// destination path relative to the copy destination.
    ///
    /// A file match is copied by its file name. A directory match copies the directory's
    /// contents, keeping their structure.
    fn matches(&self, pattern: &str) -> Result<Vec<(PathBuf, PathBuf)>, CopyError> {
        let pattern_path = Path::new(pattern);
        if pattern_path.has_root()
            || pattern_path
                .components()
                .any(|component| component == Component::ParentDir)
        {
            return Err(CopyError::OutsideContext(String::from(pattern)));
        }

        let matched_paths = if pattern_path
            .components()
            .all(|component| component == Component::CurDir)
        {
            vec![PathBuf::new()]
        } else {
            let glob_pattern = glob::Pattern::new(pattern)
                .map_err(|error| CopyError::InvalidPattern(String::from(pattern), error))?;

            let root_pattern = format!(
                "{}/{}",
                glob::Pattern::escape(&self.root.to_string_lossy()),
                glob_pattern.as_str().trim_start_matches("./")
            );

            glob::glob(&root_pattern)
                .map_err(|error| CopyError::InvalidPattern(String::from(pattern), error))?
                .filter_map(Result::ok)
                .filter_map(|path| pathdiff::diff_paths(path, &self.root))
                .collect()
        };

        let mut pairs = Vec::new();
        for matched in matched_paths {
            if self.files.contains(&matched) {
                if let Some(file_name) = matched.file_name() {
                    pairs.push((matched.clone(), PathBuf::from(file_name)));
                }
            } else {
                pairs.extend(
                    self.files
                        .iter()
                        .filter(|file| file.starts_with(&matched))
                        .filter_map(|file| {
                            file.strip_prefix(&matched)
                                .ok()
                                .map(|relative| (file.clone(), relative.to_path_buf()))
                        }),
                );
            }
        }

        Ok(pairs)
    }
}

/// Copies the build context files matching `pattern` into `destination`.
///
/// Returns the number of copied files. Fails if the pattern does not match any file.
pub(crate) fn copy_source(
    context: &BuildContextFiles,
    pattern: &str,
    destination: &Path,
    skip_bytecode: bool,
) -> Result<usize, CopyError> {
    let pairs = context.matches(pattern)?;

    if pairs.is_empty() {
        return Err(CopyError::NoMatches(String::from(pattern)));
    }

    let mut copied = 0;
    for (source, target) in pairs {
        if skip_bytecode && is_bytecode_artifact(&source) {
            continue;
        }

        let source_path = context.root.join(&source);
        let target_path = destination.join(&target);
        let io_error =
            |error| CopyError::IoError(source_path.clone(), target_path.clone(), error);

        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        if fs::symlink_metadata(&source_path)
            .map_err(io_error)?
            .file_type()
            .is_symlink()
        {
            copy_symlink(&source_path, &target_path).map_err(io_error)?;
            log::debug!("Copied symbolic link {}", source.display());
        } else {
            fs::copy(&source_path, &target_path).map_err(io_error)?;
            log::debug!("Copied {}", source.display());
        }
        copied += 1;
    }

    Ok(copied)
}

// The link target is kept as written, relative targets resolve inside the image.
fn copy_symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    let link_target = fs::read_link(source)?;

    if fs::symlink_metadata(target).is_ok() {
        fs::remove_file(target)?;
    }

    std::os::unix::fs::symlink(link_target, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(files: &[(&str, &str)]) -> tempfile::TempDir {
        let temp_dir = tempfile::tempdir().unwrap();

        for (path, contents) in files {
            let path = temp_dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        temp_dir
    }

    fn listing(root: &Path) -> Vec<String> {
        BuildContextFiles::scan(root)
            .unwrap()
            .files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn copy_whole_context() {
        let context_dir = context(&[
            ("dockyard.toml", ""),
            ("requirements.txt", "fastapi\n"),
            ("app/main.py", "app = None\n"),
            ("app/__pycache__/main.cpython-311.pyc", "bytecode"),
        ]);
        let destination = tempfile::tempdir().unwrap();
        let files = BuildContextFiles::scan(context_dir.path()).unwrap();

        assert_eq!(copy_source(&files, ".", destination.path(), false).unwrap(), 4);
        assert_eq!(
            listing(destination.path()),
            vec![
                "app/__pycache__/main.cpython-311.pyc",
                "app/main.py",
                "dockyard.toml",
                "requirements.txt"
            ]
        );
    }

    #[test]
    fn skip_bytecode() {
        let context_dir = context(&[
            ("app/main.py", "app = None\n"),
            ("app/__pycache__/main.cpython-311.pyc", "bytecode"),
        ]);
        let destination = tempfile::tempdir().unwrap();
        let files = BuildContextFiles::scan(context_dir.path()).unwrap();

        assert_eq!(copy_source(&files, "app", destination.path(), true).unwrap(), 1);
        assert_eq!(listing(destination.path()), vec!["main.py"]);
    }

    #[test]
    fn directory_matches_copy_their_contents() {
        let context_dir = context(&[
            ("app/main.py", "app = None\n"),
            ("app/core/config.py", "settings = None\n"),
            ("tests/test_main.py", ""),
        ]);
        let destination = tempfile::tempdir().unwrap();
        let files = BuildContextFiles::scan(context_dir.path()).unwrap();

        copy_source(&files, "app", &destination.path().join("app"), false).unwrap();

        assert_eq!(
            listing(destination.path()),
            vec!["app/core/config.py", "app/main.py"]
        );
    }

    #[test]
    fn glob_file_matches_copy_by_name() {
        let context_dir = context(&[
            ("pyproject.toml", ""),
            ("dockyard.toml", ""),
            ("config/extra.toml", ""),
        ]);
        let destination = tempfile::tempdir().unwrap();
        let files = BuildContextFiles::scan(context_dir.path()).unwrap();

        assert_eq!(
            copy_source(&files, "*.toml", destination.path(), false).unwrap(),
            2
        );
        assert_eq!(
            listing(destination.path()),
            vec!["dockyard.toml", "pyproject.toml"]
        );
    }

    #[test]
    fn ignore_file_excludes_files() {
        let context_dir = context(&[
            (IGNORE_FILE_NAME, "*.log\n.venv/\n"),
            ("app/main.py", ""),
            ("debug.log", ""),
            (".venv/lib/site.py", ""),
        ]);

        assert_eq!(
            listing(context_dir.path()),
            vec![IGNORE_FILE_NAME, "app/main.py"]
        );
    }

    #[test]
    fn symlinks_are_copied_as_links() {
        let context_dir = context(&[("app/main.py", "app = None\n")]);
        std::os::unix::fs::symlink("main.py", context_dir.path().join("app/current.py")).unwrap();
        let destination = tempfile::tempdir().unwrap();
        let files = BuildContextFiles::scan(context_dir.path()).unwrap();

        assert_eq!(copy_source(&files, ".", destination.path(), false).unwrap(), 2);
        assert_eq!(
            fs::read_link(destination.path().join("app/current.py")).unwrap(),
            PathBuf::from("main.py")
        );
        assert_eq!(
            fs::read_to_string(destination.path().join("app/current.py")).unwrap(),
            "app = None\n"
        );
    }

    #[test]
    fn no_matches() {
        let context_dir = context(&[("app/main.py", "")]);
        let destination = tempfile::tempdir().unwrap();
        let files = BuildContextFiles::scan(context_dir.path()).unwrap();

        assert!(matches!(
            copy_source(&files, "static/*", destination.path(), false),
            Err(CopyError::NoMatches(pattern)) if pattern == "static/*"
        ));
    }

    #[test]
    fn patterns_must_stay_inside_the_context() {
        let context_dir = context(&[("app/main.py", "")]);
        let destination = tempfile::tempdir().unwrap();
        let files = BuildContextFiles::scan(context_dir.path()).unwrap();

        for pattern in ["../secrets", "/etc/passwd", "app/../../x"] {
            assert!(matches!(
                copy_source(&files, pattern, destination.path(), false),
                Err(CopyError::OutsideContext(_))
            ));
        }
    }
}
