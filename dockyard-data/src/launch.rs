use crate::newtypes::dockyard_newtype;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

pub const DEFAULT_LAUNCHER: &str = "uvicorn";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

dockyard_newtype!(
    /// A reference to the application object the launcher serves, written as
    /// `<module path>:<attribute>`, e.g. `app.main:app`.
    ///
    /// The module path consists of one or more `.` separated identifiers, the attribute is a single
    /// identifier.
    EntryPoint,
    /// An error that occurred when parsing an invalid [`EntryPoint`].
    EntryPointError,
    r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*:[A-Za-z_][A-Za-z0-9_]*$"
);

impl EntryPoint {
    /// The dotted module path, e.g. `app.main`.
    #[must_use]
    pub fn module(&self) -> &str {
        self.0.split_once(':').map_or(&self.0, |(module, _)| module)
    }

    /// The attribute that holds the application object, e.g. `app`.
    #[must_use]
    pub fn attribute(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, attribute)| attribute)
    }
}

dockyard_newtype!(
    HostName,
    HostNameError,
    r"^(?=.{1,253}$)(?!-)[A-Za-z0-9-]{1,63}(?<!-)(?:\.(?!-)[A-Za-z0-9-]{1,63}(?<!-))*$"
);

/// The address the listener binds to: an IP address or a hostname.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BindHost {
    Ip(IpAddr),
    Name(HostName),
}

impl Default for BindHost {
    fn default() -> Self {
        BindHost::Ip(IpAddr::from([0, 0, 0, 0]))
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
#[error("Invalid bind host: {0}")]
pub struct BindHostError(String);

impl FromStr for BindHost {
    type Err = BindHostError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Ok(ip) = value.parse::<IpAddr>() {
            return Ok(BindHost::Ip(ip));
        }

        // A bracketed IPv6 address, as it appears in URLs.
        if let Some(ip) = value
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(|inner| inner.parse::<IpAddr>().ok())
        {
            return Ok(BindHost::Ip(ip));
        }

        // Dotted all-numeric values are malformed IPv4 addresses, not hostnames.
        if value
            .chars()
            .all(|character| character.is_ascii_digit() || character == '.')
        {
            return Err(BindHostError(String::from(value)));
        }

        value
            .parse::<HostName>()
            .map(BindHost::Name)
            .map_err(|_| BindHostError(String::from(value)))
    }
}

impl Display for BindHost {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BindHost::Ip(ip) => write!(f, "{ip}"),
            BindHost::Name(name) => write!(f, "{name}"),
        }
    }
}

impl Serialize for BindHost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BindHost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// The fully resolved invocation of an image's foreground process.
///
/// # Examples
/// ```
/// use dockyard_data::launch::LaunchDescriptor;
///
/// let descriptor = LaunchDescriptor::new("app.main:app".parse().unwrap());
///
/// assert_eq!(
///     descriptor.args(),
///     vec!["app.main:app", "--host", "0.0.0.0", "--port", "8000"]
/// );
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct LaunchDescriptor {
    pub launcher: String,
    pub entry_point: EntryPoint,
    pub host: BindHost,
    pub port: u16,
}

impl LaunchDescriptor {
    /// A descriptor with the default launcher, host and port.
    #[must_use]
    pub fn new(entry_point: EntryPoint) -> Self {
        Self {
            launcher: String::from(DEFAULT_LAUNCHER),
            entry_point,
            host: BindHost::default(),
            port: DEFAULT_PORT,
        }
    }

    /// The arguments passed to the launcher program.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![
            self.entry_point.to_string(),
            String::from("--host"),
            self.host.to_string(),
            String::from("--port"),
            self.port.to_string(),
        ]
    }

    /// The complete command line, for display purposes.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.launcher.clone())
            .chain(self.args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
