//! API request handlers

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::jobs::{Accepted, CourseJobLauncher};
use crate::state::RunStatus;

use super::models::GenerateCourseRequest;

/// Handler failures, each mapped to one HTTP status by the server
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl From<PipelineError> for HandlerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(message) => HandlerError::BadRequest(message),
            other => HandlerError::Internal(other.to_string()),
        }
    }
}

/// Handle health check requests
pub async fn health_check(launcher: &CourseJobLauncher) -> Value {
    serde_json::json!({
        "status": "healthy",
        "service": "course-path-generator",
        "version": env!("CARGO_PKG_VERSION"),
        "store": launcher.orchestrator().tracker().backend(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

/// Validate and queue a generation run
pub async fn generate_course_path(
    launcher: &CourseJobLauncher,
    body: GenerateCourseRequest,
) -> Result<Accepted, HandlerError> {
    let accepted = launcher.submit(
        &body.subject,
        &body.difficulty_level,
        body.requester_identity.as_deref(),
    )?;
    Ok(accepted)
}

/// Look up the status document of one run
pub async fn run_status(launcher: &CourseJobLauncher, id: &str) -> Result<RunStatus, HandlerError> {
    let correlation_id = Uuid::parse_str(id.trim())
        .map_err(|_| HandlerError::BadRequest(format!("'{}' is not a valid run id", id)))?;

    launcher
        .orchestrator()
        .tracker()
        .load(correlation_id)
        .await
        .map_err(|e| HandlerError::Internal(e.to_string()))?
        .ok_or_else(|| HandlerError::NotFound(format!("run {} not found", correlation_id)))
}
