use std::io;

use thiserror::Error;

/// Fatal, pre-run failures raised while resolving roots into sources.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid root '{root}': {reason}")]
    InvalidRoot { root: String, reason: String },

    #[error("no .json, .ndjson, or .jsonl files found in '{root}'")]
    NoMatches { root: String },

    #[error("no processable files found in any of the provided paths")]
    NoSources,

    #[error("source unavailable for '{root}': {reason}")]
    SourceUnavailable { root: String, reason: String },

    #[error("failed to walk '{root}': {source}")]
    Walk {
        root: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("discovery cancelled")]
    Cancelled,
}

/// Failures scoped to a single source. These never abort a run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open '{path}': {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("object gs://{bucket}/{name} not found")]
    ObjectNotFound { bucket: String, name: String },
}

#[cfg(test)]
mod tests {
    use super::{DiscoveryError, SourceError};

    #[test]
    fn discovery_errors_name_the_root() {
        let err = DiscoveryError::InvalidRoot {
            root: "/nope".to_string(),
            reason: "not a directory".to_string(),
        };
        assert_eq!(err.to_string(), "invalid root '/nope': not a directory");

        let err = DiscoveryError::NoMatches {
            root: "/data".to_string(),
        };
        assert!(err.to_string().contains("/data"));
    }

    #[test]
    fn missing_object_renders_uri() {
        let err = SourceError::ObjectNotFound {
            bucket: "logs".to_string(),
            name: "a/b.json".to_string(),
        };
        assert_eq!(err.to_string(), "object gs://logs/a/b.json not found");
    }
}
