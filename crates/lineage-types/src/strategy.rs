use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Policy for combining attribute values found at several chain levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// The most-derived value wins outright.
    #[default]
    Override,
    /// Shallow map merge, derived keys win on conflict.
    Merge,
    /// Sequence concatenation, base items first.
    Concat,
}

impl MergeStrategy {
    pub const ALL: [MergeStrategy; 3] = [Self::Override, Self::Merge, Self::Concat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Merge => "merge",
            Self::Concat => "concat",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| TypeError::InvalidStrategy(s.to_string()))
    }
}
