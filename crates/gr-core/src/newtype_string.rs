//! Macro for defining strongly-typed identifier newtypes.
//!
//! Natural keys are compared byte-for-byte by the store, so every identifier
//! shares one invariant: non-empty and free of leading/trailing whitespace
//! (`"corn"` and `" corn"` must never become two entities). The macro
//! generates the struct plus `Display`, `Deref`, `AsRef`, `Borrow`,
//! `TryFrom`, `FromStr`, `PartialEq<str>` and a validating `Deserialize`.

/// Check the shared identifier invariant, returning the reason on failure.
pub(crate) fn check_identifier(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.trim() != s {
        return Err(format!("'{s}' has leading or trailing whitespace"));
    }
    Ok(())
}

/// Define a strongly-typed identifier newtype.
macro_rules! define_newtype_string {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident => $kind:literal;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        $vis struct $Name(String);

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $Name::parse(s).map_err(serde::de::Error::custom)
            }
        }

        impl $Name {
            /// Create a new instance, panicking if the identifier is invalid.
            ///
            /// Prefer [`parse`](Self::parse) when handling untrusted input.
            pub fn new(name: impl Into<String>) -> Self {
                match Self::parse(name) {
                    Ok(v) => v,
                    Err(e) => panic!("{e}"),
                }
            }

            /// Validate and wrap an identifier.
            pub fn parse(name: impl Into<String>) -> $crate::error::CoreResult<Self> {
                let s = name.into();
                $crate::newtype_string::check_identifier(&s).map_err(|reason| {
                    $crate::error::CoreError::InvalidName { kind: $kind, reason }
                })?;
                Ok(Self(s))
            }

            /// Return the underlying identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $crate::error::CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str { &self.0 }
        }

        impl std::ops::Deref for $Name {
            type Target = str;
            fn deref(&self) -> &str { &self.0 }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str { &self.0 }
        }

        impl TryFrom<String> for $Name {
            type Error = $crate::error::CoreError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl TryFrom<&str> for $Name {
            type Error = $crate::error::CoreError;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool { self.0 == *other }
        }
    };
}

pub(crate) use define_newtype_string;
