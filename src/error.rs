//! Typed errors raised by the orchestration core.
//!
//! Collectors, bundles and sinks return [`anyhow::Result`]; these variants are
//! the ones the framework itself produces and callers may want to match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    /// The unit was cancelled (deadline, collector signal or shutdown)
    /// and its conduit no longer accepts records.
    #[error("result conduit closed")]
    SinkClosed,

    /// The unit's context was cancelled while the collector was still working.
    #[error("collection cancelled")]
    Cancelled,

    /// A record could not be encoded for the conduit.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The client bundle could not build a handle the resource type requires.
    #[error("client initialization failed for {resource_type}: {reason}")]
    InitFailed {
        resource_type: String,
        reason: String,
    },

    /// A record lacked a resource id after path extraction.
    #[error("resource id is empty (path {path})")]
    MissingResourceId { path: String },

    #[error("invalid platform configuration: {0}")]
    InvalidPlatform(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CollectError {
    /// True when the error only reports that the unit stopped accepting work.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CollectError::SinkClosed | CollectError::Cancelled)
    }
}

/// Checks whether an `anyhow` chain bottoms out in a cancellation.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<CollectError>())
        .any(CollectError::is_cancellation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cancellation_detection_through_context() {
        let err: anyhow::Result<()> = Err(CollectError::SinkClosed.into());
        let err = err.context("pushing bucket record").unwrap_err();
        assert!(is_cancellation(&err));

        let other = anyhow::anyhow!("AccessDenied");
        assert!(!is_cancellation(&other));
    }

    #[test]
    fn test_error_messages() {
        let err = CollectError::InitFailed {
            resource_type: "Bucket".to_string(),
            reason: "no credentials".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "client initialization failed for Bucket: no credentials"
        );
        assert!(!err.is_cancellation());
    }
}
