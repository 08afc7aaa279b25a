//! Typed error hierarchy for hiro.
//!
//! One enum per subsystem:
//! - `ResourceError`: hosting API (GitHub) failures
//! - `GenerationError`: language-model call failures
//! - `StoreError`: local artifact persistence failures
//! - `PipelineError`: failures that abort a whole run

use thiserror::Error;

/// Errors from a `ResourceClient` call.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Hosting API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Revision conflict while writing {path}: {message}")]
    Conflict { path: String, message: String },

    #[error("Request to hosting API failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Could not decode {what}: {message}")]
    Decode { what: String, message: String },
}

impl ResourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::NotFound { .. })
    }
}

/// Errors from an `ArtifactGenerator` call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Request to model API failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("No response from model")]
    EmptyResponse,

    #[error("Invalid response format from model: {0}")]
    InvalidResponse(String),
}

/// Errors from the local artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata log lock poisoned")]
    LockPoisoned,
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Discovery failed: {0}")]
    Discovery(#[source] ResourceError),

    #[error("Failed to read local artifacts: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_error_not_found_is_detected() {
        let err = ResourceError::NotFound {
            path: "src/main.rs".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("src/main.rs"));

        let err = ResourceError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn api_error_carries_status() {
        let err = ResourceError::Api {
            status: 403,
            message: "rate limited".to_string(),
        };
        match &err {
            ResourceError::Api { status, .. } => assert_eq!(*status, 403),
            _ => panic!("Expected Api"),
        }
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn pipeline_error_wraps_discovery_source() {
        let inner = ResourceError::Api {
            status: 404,
            message: "no such repo".to_string(),
        };
        let err = PipelineError::Discovery(inner);
        let source = std::error::Error::source(&err).expect("discovery error has a source");
        assert!(source.to_string().contains("no such repo"));
    }

    #[test]
    fn store_error_write_carries_path() {
        let path = std::path::PathBuf::from("/out/repo/metadata.md");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StoreError::Write {
            path: path.clone(),
            source: io_err,
        };
        match &err {
            StoreError::Write { path: p, source } => {
                assert_eq!(p, &path);
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Write"),
        }
    }

    #[test]
    fn pipeline_error_converts_from_store_error() {
        let err: PipelineError = StoreError::LockPoisoned.into();
        assert!(matches!(err, PipelineError::Store(StoreError::LockPoisoned)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ResourceError::NotFound { path: "x".into() });
        assert_std_error(&GenerationError::EmptyResponse);
        assert_std_error(&StoreError::LockPoisoned);
        assert_std_error(&PipelineError::Store(StoreError::LockPoisoned));
    }
}
