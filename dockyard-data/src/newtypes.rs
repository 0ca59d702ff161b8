/// Macro to generate a newtype backed by `String` that is validated by a regular expression.
///
/// Automatically implements the following traits for the newtype:
/// - [`Clone`]
/// - [`Debug`]
/// - [`Display`](std::fmt::Display)
/// - [`Eq`]
/// - [`Hash`]
/// - [`Ord`]
/// - [`PartialEq`]
/// - [`PartialOrd`]
/// - [`serde::Deserialize`]
/// - [`serde::Serialize`]
/// - [`FromStr`](std::str::FromStr)
/// - [`Borrow<str>`](std::borrow::Borrow<str>)
/// - [`Deref<Target=String>`]
/// - [`AsRef<str>`]
///
/// # Usage:
// This has to use compile_fail since `dockyard_newtype` is not public.
/// ```compile_fail
/// use crate::newtypes::dockyard_newtype;
///
/// dockyard_newtype!(
///     /// RustDoc for the newtype itself (optional)
///     PackageName,
///     /// RustDoc for the newtype error (optional)
///     PackageNameError,
///     // The regular expression that must match for the String to be valid. Uses the
///     // `fancy_regex` crate which supports negative lookarounds.
///     r"^[[:alnum:]._-]+$",
/// );
///
/// let name = "fastapi".parse::<PackageName>().unwrap();
/// ```
macro_rules! dockyard_newtype {
    (
        $(#[$type_attributes:meta])*
        $name:ident,
        $(#[$error_type_attributes:meta])*
        $error_name:ident,
        $regex:expr
    ) => {
        #[derive(Debug, Eq, PartialEq, ::serde::Serialize, Clone, Hash)]
        $(#[$type_attributes])*
        #[allow(unreachable_pub)]
        pub struct $name(String);

        #[derive(::thiserror::Error, Debug, Eq, PartialEq)]
        $(#[$error_type_attributes])*
        #[allow(unreachable_pub)]
        pub enum $error_name {
            #[error("Invalid {}: {}", stringify!($name), .0)]
            InvalidValue(String),
        }

        impl ::std::str::FromStr for $name {
            type Err = $error_name;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let regex_matches = ::fancy_regex::Regex::new($regex)
                    .and_then(|regex| regex.is_match(value))
                    .unwrap_or(false);

                if regex_matches {
                    Ok(Self(String::from(value)))
                } else {
                    Err($error_name::InvalidValue(String::from(value)))
                }
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                String::deserialize(d)?
                    .parse::<$name>()
                    .map_err(::serde::de::Error::custom)
            }
        }

        impl ::std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = String;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl ::std::convert::AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                ::std::write!(f, "{}", self.0)
            }
        }

        impl ::std::cmp::Ord for $name {
            fn cmp(&self, other: &Self) -> ::std::cmp::Ordering {
                self.0.cmp(&other.0)
            }
        }

        impl ::std::cmp::PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<::std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
    };
}

pub(crate) use dockyard_newtype;

#[cfg(test)]
mod tests {
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Token};

    dockyard_newtype!(
        CapitalizedName,
        CapitalizedNameError,
        r"^(?!Manuel$)[A-Z][a-z]*$"
    );

    fn name(value: &str) -> CapitalizedName {
        value.parse().unwrap()
    }

    #[test]
    fn validation() {
        assert!("Katrin".parse::<CapitalizedName>().is_ok());

        assert_eq!(
            "manuel".parse::<CapitalizedName>(),
            Err(CapitalizedNameError::InvalidValue(String::from("manuel")))
        );

        assert_eq!(
            "Manuel".parse::<CapitalizedName>(),
            Err(CapitalizedNameError::InvalidValue(String::from("Manuel")))
        );
    }

    #[test]
    fn error_message_names_the_type() {
        assert_eq!(
            "katrin".parse::<CapitalizedName>().unwrap_err().to_string(),
            "Invalid CapitalizedName: katrin"
        );
    }

    #[test]
    fn deref() {
        fn takes_str(value: &str) {
            assert_eq!(value, "Johanna");
        }

        takes_str(&name("Johanna"));
    }

    #[test]
    fn ord() {
        let mut names = [name("A"), name("C"), name("B")];
        names.sort();

        assert_eq!([name("A"), name("B"), name("C")], names);
    }

    #[test]
    fn deserialize() {
        assert_de_tokens(&name("Jonas"), &[Token::Str("Jonas")]);

        assert_de_tokens_error::<CapitalizedName>(
            &[Token::Str("Manuel")],
            "Invalid CapitalizedName: Manuel",
        );
    }
}
