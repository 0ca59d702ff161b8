use crate::env::EnvironmentSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PACKAGES_DIR: &str = "/usr/local/lib/site-packages";

/// Data structure for the `base.toml` file of a base environment.
///
/// ```toml
/// description = "Python 3.11 slim"
/// packages-dir = "/usr/local/lib/python3.11/site-packages"
///
/// [env]
/// PATH = "/usr/local/bin:/usr/bin:/bin"
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BaseDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The absolute path inside the image where third-party packages are installed.
    #[serde(default = "default_packages_dir")]
    pub packages_dir: PathBuf,
    #[serde(default, skip_serializing_if = "EnvironmentSet::is_empty")]
    pub env: EnvironmentSet,
}

impl Default for BaseDescriptor {
    fn default() -> Self {
        Self {
            description: None,
            packages_dir: default_packages_dir(),
            env: EnvironmentSet::new(),
        }
    }
}

fn default_packages_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PACKAGES_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal() {
        let base: BaseDescriptor = toml::from_str("").unwrap();

        assert_eq!(base.description, None);
        assert_eq!(base.packages_dir, PathBuf::from(DEFAULT_PACKAGES_DIR));
        assert!(base.env.is_empty());
    }

    #[test]
    fn deserialize_full() {
        let base: BaseDescriptor = toml::from_str(
            r#"
            description = "Python 3.11 slim"
            packages-dir = "/usr/local/lib/python3.11/site-packages"

            [env]
            PATH = "/usr/local/bin:/usr/bin:/bin"
            LANG = "C.UTF-8"
            "#,
        )
        .unwrap();

        assert_eq!(base.description.as_deref(), Some("Python 3.11 slim"));
        assert_eq!(
            base.packages_dir,
            PathBuf::from("/usr/local/lib/python3.11/site-packages")
        );
        assert_eq!(base.env.get("LANG"), Some("C.UTF-8"));
    }

    #[test]
    fn reject_unknown_keys() {
        assert!(toml::from_str::<BaseDescriptor>("layers = []").is_err());
    }
}
