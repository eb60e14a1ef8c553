use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{TypeError, TypeResult};

/// Arena index of a class-like entity.
///
/// Ids are handed out by a hierarchy table and are only meaningful
/// relative to the table that issued them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Wrap a raw arena index.
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The raw arena index.
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Named element (property or method) scoped within an entity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Member(String);

impl Member {
    /// Create a member scope. The name must be non-empty.
    pub fn new(name: impl Into<String>) -> TypeResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TypeError::InvalidMember(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member({})", self.0)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Member {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Member {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::new(name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_index_roundtrip() {
        let id = EntityId::from_index(7);
        assert_eq!(id.index(), 7);
        assert_eq!(id.to_string(), "#7");
        assert_eq!(format!("{id:?}"), "EntityId(7)");
    }

    #[test]
    fn member_rejects_blank_names() {
        assert!(Member::new("").is_err());
        assert!(Member::new("   ").is_err());
        assert_eq!(Member::new("email").unwrap().as_str(), "email");
    }

    #[test]
    fn member_deserialize_validates() {
        let member: Member = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(member, Member::new("email").unwrap());
        assert_eq!(serde_json::to_string(&member).unwrap(), "\"email\"");
        assert!(serde_json::from_str::<Member>("\"\"").is_err());
        assert!(serde_json::from_str::<Member>("\"   \"").is_err());
    }
}
