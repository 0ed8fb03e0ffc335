//! Detached course generation jobs

use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::course::GenerationRequest;
use crate::error::PipelineError;
use crate::pipeline::{PipelineOrchestrator, RunReport};

/// Acknowledgment handed back to the trigger before the run starts
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub correlation_id: Uuid,
    pub status: &'static str,
}

/// Hands validated requests to the tokio runtime
#[derive(Clone)]
pub struct CourseJobLauncher {
    orchestrator: Arc<PipelineOrchestrator>,
}

impl CourseJobLauncher {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    /// Validate and start a run in the background. Returns as soon as the job
    /// is queued; the outcome is only visible through the run status document.
    pub fn submit(
        &self,
        subject: &str,
        difficulty: &str,
        requester: Option<&str>,
    ) -> Result<Accepted, PipelineError> {
        let request = GenerationRequest::new(subject, difficulty, requester)?;
        let correlation_id = request.correlation_id;

        drop(self.spawn(request));
        info!("📨 Accepted course request {} for '{}'", correlation_id, subject.trim());

        Ok(Accepted {
            correlation_id,
            status: "accepted",
        })
    }

    /// Spawn a run and keep the handle, for callers that do want the report
    pub fn spawn(&self, request: GenerationRequest) -> JoinHandle<RunReport> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run(&request).await })
    }
}
