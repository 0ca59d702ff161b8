use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An ordered set of environment variables.
///
/// Keys are unique. Inserting a key that is already present replaces its value but keeps the
/// key's original position, so iteration order is the order in which keys were first declared.
///
/// # Examples
/// ```
/// use dockyard_data::env::EnvironmentSet;
///
/// let mut env = EnvironmentSet::new();
/// env.insert("PYTHONUNBUFFERED", "1");
/// env.insert("PORT", "8000");
/// env.insert("PYTHONUNBUFFERED", "0");
///
/// assert_eq!(env.get("PYTHONUNBUFFERED"), Some("0"));
/// assert_eq!(
///     env.keys().collect::<Vec<_>>(),
///     vec!["PYTHONUNBUFFERED", "PORT"]
/// );
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EnvironmentSet {
    entries: Vec<(String, String)>,
}

impl EnvironmentSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a variable, overwriting the value of an earlier declaration with the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing_value)) => *existing_value = value,
            None => self.entries.push((key, value)),
        }

        self
    }

    /// Applies all variables of `other` on top of this set, in `other`'s order.
    pub fn extend(&mut self, other: &EnvironmentSet) -> &mut Self {
        for (key, value) in other {
            self.insert(key, value);
        }

        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a EnvironmentSet {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = EnvironmentSet::new();
        for (key, value) in iter {
            env.insert(key, value);
        }
        env
    }
}

impl Serialize for EnvironmentSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EnvironmentSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvironmentSetVisitor;

        impl<'de> Visitor<'de> for EnvironmentSetVisitor {
            type Value = EnvironmentSet;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a table of environment variable names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut env = EnvironmentSet::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    env.insert(key, value);
                }
                Ok(env)
            }
        }

        deserializer.deserialize_map(EnvironmentSetVisitor)
    }
}
