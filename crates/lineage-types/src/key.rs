//! Attribute key validation and parsing.
//!
//! Valid key segments:
//! - Must be non-empty
//! - Must not contain the delimiter `:`
//! - Must not contain whitespace or control characters
//!
//! The textual form is `namespace:name` or `namespace:name:subkey`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{TypeError, TypeResult};

/// Separator between key segments in the textual form.
pub const KEY_DELIMITER: char = ':';

/// Identifier of an attribute: a namespace, a name and an optional subkey.
///
/// Keys order lexicographically by namespace, then name, then subkey
/// (absent subkeys first). Serialized as its textual form; deserializing
/// applies the same validation as [`parse`](Self::parse).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey {
    namespace: String,
    name: String,
    subkey: Option<String>,
}

impl AttributeKey {
    /// Create a key from a namespace and a name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> TypeResult<Self> {
        let namespace = namespace.into();
        let name = name.into();
        validate_segment(&namespace, "namespace")?;
        validate_segment(&name, "name")?;
        Ok(Self {
            namespace,
            name,
            subkey: None,
        })
    }

    /// Return a copy of this key narrowed to `subkey`.
    pub fn with_subkey(mut self, subkey: impl Into<String>) -> TypeResult<Self> {
        let subkey = subkey.into();
        validate_segment(&subkey, "subkey")?;
        self.subkey = Some(subkey);
        Ok(self)
    }

    /// Parse `namespace:name[:subkey]`.
    pub fn parse(text: &str) -> TypeResult<Self> {
        let mut parts = text.split(KEY_DELIMITER);
        let (Some(namespace), Some(name)) = (parts.next(), parts.next()) else {
            return Err(TypeError::InvalidKey {
                key: text.to_string(),
                reason: "expected namespace:name[:subkey]".into(),
            });
        };
        let subkey = parts.next();
        if parts.next().is_some() {
            return Err(TypeError::InvalidKey {
                key: text.to_string(),
                reason: "too many segments".into(),
            });
        }

        let key = Self::new(namespace, name)?;
        match subkey {
            Some(sub) => key.with_subkey(sub),
            None => Ok(key),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subkey(&self) -> Option<&str> {
        self.subkey.as_deref()
    }
}

fn validate_segment(segment: &str, what: &str) -> TypeResult<()> {
    if segment.is_empty() {
        return Err(TypeError::InvalidKey {
            key: segment.to_string(),
            reason: format!("{what} must not be empty"),
        });
    }
    if segment.contains(KEY_DELIMITER) {
        return Err(TypeError::InvalidKey {
            key: segment.to_string(),
            reason: format!("{what} must not contain {KEY_DELIMITER:?}"),
        });
    }
    if let Some(ch) = segment.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(TypeError::InvalidKey {
            key: segment.to_string(),
            reason: format!("{what} contains forbidden character: {ch:?}"),
        });
    }
    Ok(())
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_DELIMITER}{}", self.namespace, self.name)?;
        if let Some(sub) = &self.subkey {
            write!(f, "{KEY_DELIMITER}{sub}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeKey({self})")
    }
}

impl FromStr for AttributeKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AttributeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AttributeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
