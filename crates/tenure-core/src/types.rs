use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Declares a platform identifier newtype.
///
/// Identifiers are 64-bit snowflakes. They serialize as strings (they overflow
/// JavaScript numbers) and deserialize from either a string or a number, so
/// YAML config can list them bare.
macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Raw {
                    Num(u64),
                    Str(String),
                }

                match Raw::deserialize(d)? {
                    Raw::Num(n) => Ok($name(n)),
                    Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
                }
            }
        }
    };
}

snowflake_id!(
    /// A community (guild) the reconciler manages.
    CommunityId
);
snowflake_id!(
    /// A member of a community.
    MemberId
);
snowflake_id!(
    /// A role object within a community.
    RoleId
);

// ---------------------------------------------------------------------------
// RoleDescriptor
// ---------------------------------------------------------------------------

/// A remote role as reported by the directory. Identity is the id alone; two
/// descriptors with the same id and different names are the same role (it was
/// renamed between reads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub id: RoleId,
    pub name: String,
}

impl RoleDescriptor {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl PartialEq for RoleDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RoleDescriptor {}

// ---------------------------------------------------------------------------
// CommunityDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityDescriptor {
    pub id: CommunityId,
    pub name: String,
}

impl CommunityDescriptor {
    pub fn new(id: CommunityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for CommunityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
