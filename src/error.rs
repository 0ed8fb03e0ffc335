//! Error taxonomy for course generation runs

use thiserror::Error;
use uuid::Uuid;

use crate::llm::AggregateError;
use crate::store::StoreError;

/// Run-level errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No usable credentials or an unusable backend configuration; the run never starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bad difficulty level or empty subject; rejected before any capability call
    #[error("Validation error: {0}")]
    Validation(String),

    /// A capability call failed for every credential
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: AggregateError,
    },

    /// Malformed structured response that could not be recovered by rotation
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Durable-store write failures. Already-written sibling documents are not rolled back.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write topic {topic_id}: {source}")]
    Topic {
        topic_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("failed to write course {course_id}: {source}")]
    Course {
        course_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_stage_error_mentions_stage_and_attempts() {
        let err = PipelineError::Stage {
            stage: "topic generation",
            source: AggregateError {
                attempts: 3,
                last: LlmError::Quota("429 Too Many Requests".to_string()),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("topic generation"), "got: {msg}");
        assert!(msg.contains("3"), "got: {msg}");
    }

    #[test]
    fn test_persistence_error_converts() {
        let err: PipelineError = PersistenceError::Course {
            course_id: Uuid::nil(),
            source: StoreError::NotAnObject,
        }
        .into();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }
}
