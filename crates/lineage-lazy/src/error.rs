//! Error types for lazy loading.

use std::error::Error;
use std::sync::Arc;

use crate::key::LoaderKey;

/// Boxed cause returned by a failing loader function.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors surfaced by [`LazyLoader`](crate::LazyLoader).
///
/// Cloneable so that one outcome can be delivered to every caller sharing a
/// single in-flight load.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoaderError {
    /// The dependency graph reachable from `key` contains a cycle.
    #[error("cyclic dependency while loading {key}: {}", render_cycle(.cycle))]
    CyclicDependency {
        key: LoaderKey,
        /// The keys forming the cycle, first key repeated at the end.
        cycle: Vec<LoaderKey>,
    },

    /// The loader function for `key` failed.
    #[error("loader {key} failed: {source}")]
    LoaderFailure {
        key: LoaderKey,
        source: Arc<dyn Error + Send + Sync>,
    },

    /// No loader is registered under this key.
    #[error("no loader registered for {0}")]
    UnknownLoader(LoaderKey),

    /// The task running the load was dropped before it finished.
    #[error("load of {key} was abandoned before completing")]
    Abandoned { key: LoaderKey },
}

impl LoaderError {
    /// The key the error is tagged with.
    pub fn key(&self) -> &LoaderKey {
        match self {
            Self::CyclicDependency { key, .. }
            | Self::LoaderFailure { key, .. }
            | Self::Abandoned { key } => key,
            Self::UnknownLoader(key) => key,
        }
    }
}

fn render_cycle(cycle: &[LoaderKey]) -> String {
    cycle
        .iter()
        .map(LoaderKey::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Convenience alias for loader results.
pub type LoaderResult<T> = Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_is_rendered_as_path() {
        let err = LoaderError::CyclicDependency {
            key: "a".into(),
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency while loading a: a -> b -> a");
    }

    #[test]
    fn failure_exposes_source() {
        let cause: BoxError = "disk on fire".into();
        let err = LoaderError::LoaderFailure {
            key: "schema".into(),
            source: Arc::from(cause),
        };
        assert_eq!(err.to_string(), "loader schema failed: disk on fire");
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");
        assert_eq!(err.key().as_str(), "schema");
    }
}
