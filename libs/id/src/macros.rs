//! The `define_id!` macro behind every typed ID.

/// Defines a ULID-backed ID newtype bound to a fixed prefix.
///
/// The generated type is `Copy`, ordered by creation time, renders as
/// `{prefix}_{ulid}` through `Display`, and parses strictly through `FromStr`
/// (the same form is used for serde).
///
/// ```ignore
/// define_id!(ContainerId, "ctr");
///
/// let id = ContainerId::new();
/// let parsed: ContainerId = id.to_string().parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Ulid);

        impl $name {
            /// The prefix for this ID type.
            pub const PREFIX: &'static str = $prefix;

            /// Creates a new ID with a fresh ULID.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::Ulid::new())
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn ulid(&self) -> $crate::Ulid {
                self.0
            }

            /// Milliseconds since the Unix epoch at which the ID was minted.
            #[must_use]
            pub fn timestamp_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }

            /// Parses an ID of the form `{prefix}_{ulid}`.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some((prefix, ulid_str)) = s.split_once('_') else {
                    return Err($crate::IdError::MissingSeparator);
                };

                if prefix != Self::PREFIX {
                    return Err($crate::IdError::InvalidPrefix {
                        expected: Self::PREFIX,
                        actual: prefix.to_string(),
                    });
                }

                ulid_str
                    .parse::<$crate::Ulid>()
                    .map(Self)
                    .map_err(|e| $crate::IdError::InvalidUlid(e.to_string()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
