use std::fmt;

/// Name of a registered loader.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderKey(String);

impl LoaderKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LoaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoaderKey({})", self.0)
    }
}

impl fmt::Display for LoaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LoaderKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for LoaderKey {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&LoaderKey> for LoaderKey {
    fn from(key: &LoaderKey) -> Self {
        key.clone()
    }
}

/// Lifecycle of one loader registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotLoaded => "not-loaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
        })
    }
}
