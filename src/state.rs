use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::course::{Difficulty, GenerationRequest, SkipReason, SkippedTopic};
use crate::store::{DocumentStore, StoreError, RUNS};

/// Run lifecycle states recorded against the correlation id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Started,
    TopicsGenerated,
    Assembled,
    Persisted,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Persisted | RunState::Failed)
    }
}

/// A skipped topic as recorded in the run document: its generation index and
/// why it was dropped, never its name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSlot {
    pub position: usize,
    pub reason: SkipReason,
}

impl From<&SkippedTopic> for SkippedSlot {
    fn from(topic: &SkippedTopic) -> Self {
        Self {
            position: topic.position,
            reason: topic.reason,
        }
    }
}

/// Status document stored in the `runs` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub correlation_id: Uuid,
    pub state: RunState,
    pub subject: String,
    pub difficulty_level: Difficulty,
    pub requester_identity: Option<String>,
    pub topics_requested: usize,
    pub topics_structured: usize,
    pub skipped: Vec<SkippedSlot>,
    pub course_path_id: Option<Uuid>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunStatus {
    pub fn started(request: &GenerationRequest) -> Self {
        let now = Utc::now();
        Self {
            correlation_id: request.correlation_id,
            state: RunState::Started,
            subject: request.subject.clone(),
            difficulty_level: request.difficulty_level,
            requester_identity: request.requester_identity.clone(),
            topics_requested: 0,
            topics_structured: 0,
            skipped: Vec::new(),
            course_path_id: None,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Move to `state`, stamping the update time
    pub fn advance(&mut self, state: RunState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl ToString) {
        self.error = Some(error.to_string());
        self.advance(RunState::Failed);
    }
}

/// Records run status documents. Write failures are logged and never fail the run.
#[derive(Clone)]
pub struct RunTracker {
    store: Arc<dyn DocumentStore>,
}

impl RunTracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn record(&self, status: &RunStatus) {
        let id = status.correlation_id.to_string();
        let document = match serde_json::to_value(status) {
            Ok(document) => document,
            Err(e) => {
                warn!("⚠️ Could not serialize run status {}: {}", id, e);
                return;
            }
        };

        match self.store.put(RUNS, &id, document).await {
            Ok(()) => debug!("Run {} -> {:?}", id, status.state),
            Err(e) => warn!("⚠️ Failed to record run {} as {:?}: {}", id, status.state, e),
        }
    }

    pub async fn load(&self, correlation_id: Uuid) -> Result<Option<RunStatus>, StoreError> {
        let Some(mut document) = self.store.get(RUNS, &correlation_id.to_string()).await? else {
            return Ok(None);
        };
        if let Some(fields) = document.as_object_mut() {
            fields.remove("_id");
        }
        match serde_json::from_value(document) {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                warn!("⚠️ Run document {} is unreadable: {}", correlation_id, e);
                Ok(None)
            }
        }
    }
}
