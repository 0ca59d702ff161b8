use crate::data::env::EnvironmentSet;

/// Skip writing compiled bytecode artifacts.
pub const DONT_WRITE_BYTECODE: &str = "PYTHONDONTWRITEBYTECODE";
/// Write process output without buffering.
pub const UNBUFFERED: &str = "PYTHONUNBUFFERED";

/// The boolean flags that change how dependencies are installed and how the service runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProcessFlags {
    pub dont_write_bytecode: bool,
    pub unbuffered: bool,
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
#[error("Invalid value {value:?} for process flag {name}, expected \"1\" or \"0\"")]
pub struct InvalidProcessFlag {
    pub name: String,
    pub value: String,
}

impl ProcessFlags {
    /// Reads the flags from an environment. Absent flags are off.
    pub fn from_env(env: &EnvironmentSet) -> Result<Self, InvalidProcessFlag> {
        Ok(Self {
            dont_write_bytecode: read_flag(env, DONT_WRITE_BYTECODE)?,
            unbuffered: read_flag(env, UNBUFFERED)?,
        })
    }
}

fn read_flag(env: &EnvironmentSet, name: &str) -> Result<bool, InvalidProcessFlag> {
    match env.get(name) {
        None | Some("0") => Ok(false),
        Some("1") => Ok(true),
        Some(value) => Err(InvalidProcessFlag {
            name: String::from(name),
            value: String::from(value),
        }),
    }
}

/// The process-wide environment of an image.
///
/// It is built once, after all variables have been applied, and passed explicitly to everything
/// that depends on it. There is no way to modify it afterwards.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProcessEnvironment {
    vars: EnvironmentSet,
    flags: ProcessFlags,
}

impl ProcessEnvironment {
    pub fn new(vars: EnvironmentSet) -> Result<Self, InvalidProcessFlag> {
        let flags = ProcessFlags::from_env(&vars)?;
        Ok(Self { vars, flags })
    }

    #[must_use]
    pub fn vars(&self) -> &EnvironmentSet {
        &self.vars
    }

    #[must_use]
    pub fn flags(&self) -> ProcessFlags {
        self.flags
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key)
    }

    /// The variables a child process is started with.
    ///
    /// Flags that are off are left out: the runtime treats any non-empty value as on, `"0"`
    /// included.
    #[must_use]
    pub fn child_vars(&self) -> EnvironmentSet {
        self.vars
            .iter()
            .filter(|(key, _)| match *key {
                DONT_WRITE_BYTECODE => self.flags.dont_write_bytecode,
                UNBUFFERED => self.flags.unbuffered,
                _ => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(entries: &[(&str, &str)]) -> EnvironmentSet {
        entries.iter().copied().collect()
    }

    #[test]
    fn absent_flags_are_off() {
        let process_env = ProcessEnvironment::new(env(&[("PATH", "/usr/bin")])).unwrap();

        assert_eq!(process_env.flags(), ProcessFlags::default());
        assert_eq!(process_env.get("PATH"), Some("/usr/bin"));
    }

    #[test]
    fn flags_on_and_off() {
        let process_env = ProcessEnvironment::new(env(&[
            (DONT_WRITE_BYTECODE, "1"),
            (UNBUFFERED, "0"),
        ]))
        .unwrap();

        assert_eq!(
            process_env.flags(),
            ProcessFlags {
                dont_write_bytecode: true,
                unbuffered: false
            }
        );
    }

    #[test]
    fn invalid_flag_values() {
        for value in ["true", "yes", "", "2", " 1"] {
            assert_eq!(
                ProcessFlags::from_env(&env(&[(UNBUFFERED, value)])),
                Err(InvalidProcessFlag {
                    name: String::from(UNBUFFERED),
                    value: String::from(value)
                })
            );
        }
    }

    #[test]
    fn flags_that_are_off_are_not_passed_to_children() {
        let process_env = ProcessEnvironment::new(env(&[
            ("PATH", "/usr/bin"),
            (DONT_WRITE_BYTECODE, "0"),
            (UNBUFFERED, "1"),
        ]))
        .unwrap();

        assert_eq!(
            process_env.child_vars().iter().collect::<Vec<_>>(),
            vec![("PATH", "/usr/bin"), (UNBUFFERED, "1")]
        );
        assert_eq!(process_env.get(DONT_WRITE_BYTECODE), Some("0"));
    }

    #[test]
    fn unrelated_variables_pass_through_unvalidated() {
        assert!(ProcessEnvironment::new(env(&[("DEBUG", "true")])).is_ok());
    }
}
