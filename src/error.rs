//! Error types for batchflow

use std::fmt;

use thiserror::Error;

/// Main error type for batch planning and streaming
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration, e.g. a global batch size that
    /// does not split evenly across workers and accumulation steps
    #[error("Configuration error: {0}")]
    Config(String),

    /// A position in a nested validation structure does not hold a usable dataset
    #[error("Structural error at {path}: {message}")]
    Structural {
        /// Position of the offending entry
        path: String,
        /// What was found there
        message: String,
    },

    /// A worker would produce fewer batches than its peers
    #[error("Rank {rank} produces {actual} items where its peers produce {expected}")]
    ExhaustionInconsistency {
        /// Rank whose shard or stream came up short
        rank: usize,
        /// Length every rank is expected to have
        expected: usize,
        /// Length actually produced
        actual: usize,
    },

    /// Failure while building or streaming one leaf of a validation structure
    #[error("Validation dataset at {path}: {source}")]
    Validation {
        /// Position of the leaf
        path: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// Dataset collaborator failure
    #[error("Dataset '{name}' error: {message}")]
    Dataset {
        /// Dataset name
        name: String,
        /// Failure description
        message: String,
    },

    /// Out-of-range sample access
    #[error("Invalid sample index: {index} >= {dataset_size}")]
    InvalidIndex {
        /// Requested index
        index: usize,
        /// Dataset length
        dataset_size: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Layered configuration source error
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for batchflow operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a structural error at the given position
    pub fn structural(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Structural {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Create an exhaustion inconsistency error
    pub fn exhaustion(rank: usize, expected: usize, actual: usize) -> Self {
        Self::ExhaustionInconsistency {
            rank,
            expected,
            actual,
        }
    }

    /// Attach a validation leaf position to an error
    pub fn validation(path: impl fmt::Display, source: Error) -> Self {
        Self::Validation {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    /// Create a dataset error
    pub fn dataset(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dataset {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error signals a broken configuration
    pub fn is_config(&self) -> bool {
        matches!(
            self.innermost(),
            Self::Config(_) | Self::ConfigSource(_)
        )
    }

    /// The error underneath any validation positions
    pub fn innermost(&self) -> &Error {
        match self {
            Self::Validation { source, .. } => source.innermost(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::config("batch size 65 is not divisible by 8");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.is_config());

        let err = Error::structural("[1][0]", "expected a dataset name, found 3");
        assert_eq!(
            err.to_string(),
            "Structural error at [1][0]: expected a dataset name, found 3"
        );
        assert!(!err.is_config());

        let err = Error::exhaustion(1, 5, 4);
        assert!(err.to_string().contains("Rank 1"));

        let err = Error::validation("[0]", Error::config("bad"));
        assert_eq!(err.to_string(), "Validation dataset at [0]: Configuration error: bad");
        assert!(err.is_config());
        assert!(matches!(err.innermost(), Error::Config(_)));
    }
}
