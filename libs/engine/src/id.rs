//! Typed identifiers for inventory rows.
//!
//! Every identifier is a ULID with a short prefix, rendered as
//! `{prefix}_{ulid}` (e.g. `ip_01HV4Z2WQXKJNM8GPQY6VBKC3D`). Parsing is
//! strict: the prefix must match the type.

use thiserror::Error;

/// Identifier parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("ID cannot be empty")]
    Empty,

    #[error("ID missing underscore separator")]
    MissingSeparator,

    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    #[error("invalid ULID: {0}")]
    InvalidUlid(String),
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(ulid::Ulid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            #[must_use]
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            #[must_use]
            pub const fn from_ulid(ulid: ulid::Ulid) -> Self {
                Self(ulid)
            }

            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.0
            }

            pub fn parse(s: &str) -> Result<Self, IdError> {
                if s.is_empty() {
                    return Err(IdError::Empty);
                }
                let Some((prefix, raw)) = s.split_once('_') else {
                    return Err(IdError::MissingSeparator);
                };
                if prefix != Self::PREFIX {
                    return Err(IdError::InvalidPrefix {
                        expected: Self::PREFIX,
                        actual: prefix.to_string(),
                    });
                }
                raw.parse::<ulid::Ulid>()
                    .map(Self)
                    .map_err(|e| IdError::InvalidUlid(e.to_string()))
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
            type Err = IdError;

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

define_id!(
    /// Identifier of one address inventory row.
    RecordId,
    "ip"
);
define_id!(
    /// Identifier of a catalog subnet.
    SubnetId,
    "sub"
);
define_id!(
    /// Identifier of a network section.
    SectionId,
    "sec"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let id = RecordId::new();
        let text = id.to_string();
        assert!(text.starts_with("ip_"));
        assert_eq!(text.parse::<RecordId>().unwrap(), id);
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let sub = SubnetId::new().to_string();
        let err = sub.parse::<RecordId>().unwrap_err();
        assert!(matches!(err, IdError::InvalidPrefix { expected: "ip", .. }));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(RecordId::parse(""), Err(IdError::Empty));
        assert_eq!(RecordId::parse("ip01"), Err(IdError::MissingSeparator));
        assert!(matches!(
            SectionId::parse("sec_nope"),
            Err(IdError::InvalidUlid(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let id = SectionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: SectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
