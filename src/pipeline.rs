//! Course generation pipeline: topics, then per-topic discovery and curation,
//! then assembly and persistence.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::course::{structure_topic, AssembledCourse, GenerationRequest, SkipReason, SkippedTopic, TopicOutcome};
use crate::curation::{ContentCurator, CurationJudgment};
use crate::error::PipelineError;
use crate::llm::{create_model, CredentialRotator, CredentialSet, GenerativeModel};
use crate::persistence::PersistenceGateway;
use crate::state::{RunState, RunStatus, RunTracker, SkippedSlot};
use crate::store::{create_store, DocumentStore};
use crate::topics::TopicGenerator;
use crate::video::{create_video_search, VideoCandidate, VideoDiscovery, VideoSearch, DEFAULT_MAX_RESULTS};

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Topics discovered and curated concurrently; 1 keeps processing sequential
    pub max_topic_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_topic_workers: 1 }
    }
}

/// What a finished run produced. `course` survives a persistence failure.
#[derive(Debug)]
pub struct RunReport {
    pub correlation_id: Uuid,
    pub state: RunState,
    pub course: Option<AssembledCourse>,
    pub course_path_id: Option<Uuid>,
    pub skipped: Vec<SkippedTopic>,
    pub error: Option<PipelineError>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Persisted
    }
}

/// Outcome of one topic given what discovery found and what curation decided
pub fn topic_outcome(name: &str, candidates: &[VideoCandidate], judgment: Option<CurationJudgment>) -> TopicOutcome {
    if candidates.is_empty() {
        return TopicOutcome::Skipped(SkipReason::NoCandidates);
    }
    match judgment {
        Some(judgment) => TopicOutcome::Structured(Box::new(structure_topic(name, &judgment))),
        None => TopicOutcome::Skipped(SkipReason::CurationFailed),
    }
}

pub struct PipelineOrchestrator {
    topics: TopicGenerator,
    discovery: VideoDiscovery,
    curator: ContentCurator,
    persistence: PersistenceGateway,
    tracker: RunTracker,
    max_results: usize,
    max_topic_workers: usize,
}

impl PipelineOrchestrator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        credentials: CredentialSet,
        search: Arc<dyn VideoSearch>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let rotator = CredentialRotator::new(credentials);
        Self {
            topics: TopicGenerator::new(model.clone(), rotator.clone()),
            discovery: VideoDiscovery::new(search),
            curator: ContentCurator::new(model, rotator),
            persistence: PersistenceGateway::new(store.clone()),
            tracker: RunTracker::new(store),
            max_results: DEFAULT_MAX_RESULTS,
            max_topic_workers: 1,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_max_topic_workers(mut self, workers: usize) -> Self {
        self.max_topic_workers = workers.max(1);
        self
    }

    /// Wire every capability from configuration. Fails when no credentials are configured.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let credentials = config.credentials()?;
        let model = create_model(&config.llm).map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let search = create_video_search(&config.video);
        let store = create_store(&config.storage).map_err(|e| PipelineError::Configuration(e.to_string()))?;

        info!(
            "🔧 Pipeline ready: {:?} model with {} key(s), {} store, {} topic worker(s)",
            model.provider_type(),
            credentials.len(),
            store.backend(),
            config.pipeline.max_topic_workers
        );

        Ok(Self::new(model, credentials, search, store)
            .with_max_results(config.video.max_results)
            .with_max_topic_workers(config.pipeline.max_topic_workers))
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    /// Run one request to completion. Never panics on stage failures; the
    /// terminal state is in the report and in the run status document.
    pub async fn run(&self, request: &GenerationRequest) -> RunReport {
        let started = Instant::now();
        info!(
            "🚀 Run {} started: '{}' at {} level",
            request.correlation_id, request.subject, request.difficulty_level
        );

        let mut status = RunStatus::started(request);
        self.tracker.record(&status).await;

        let names = match self
            .topics
            .generate_for(&request.subject, request.difficulty_level)
            .await
        {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => {
                let err = PipelineError::Parse("topic generation returned no numbered topics".to_string());
                return self.fail(status, err, None, started).await;
            }
            Err(err) => return self.fail(status, err, None, started).await,
        };

        info!("📚 Generated {} topics", names.len());
        status.topics_requested = names.len();
        status.advance(RunState::TopicsGenerated);
        self.tracker.record(&status).await;

        let outcomes = self.resolve_topics(request, &names).await;
        let course = AssembledCourse::assemble(request, outcomes, Utc::now());

        status.topics_structured = course.topics.len();
        status.skipped = course.skipped.iter().map(SkippedSlot::from).collect();
        status.advance(RunState::Assembled);
        self.tracker.record(&status).await;
        info!(
            "🧩 Assembled course with {} of {} topics ({} skipped)",
            course.topics.len(),
            names.len(),
            course.skipped.len()
        );

        match self
            .persistence
            .persist(&course, request.requester_identity.as_deref())
            .await
        {
            Ok(course_path_id) => {
                status.course_path_id = Some(course_path_id);
                status.advance(RunState::Persisted);
                self.tracker.record(&status).await;
                info!(
                    "🎉 Run {} persisted course {} in {:.2}s",
                    request.correlation_id,
                    course_path_id,
                    started.elapsed().as_secs_f64()
                );
                RunReport {
                    correlation_id: request.correlation_id,
                    state: RunState::Persisted,
                    skipped: course.skipped.clone(),
                    course: Some(course),
                    course_path_id: Some(course_path_id),
                    error: None,
                    elapsed: started.elapsed(),
                }
            }
            Err(err) => self.fail(status, err.into(), Some(course), started).await,
        }
    }

    /// Discover and curate every topic with at most `max_topic_workers` in flight.
    /// Results come back keyed by generation index, in completion order.
    async fn resolve_topics(&self, request: &GenerationRequest, names: &[String]) -> Vec<(usize, String, TopicOutcome)> {
        let total = names.len();
        stream::iter(names.iter().cloned().enumerate())
            .map(move |(index, name): (usize, String)| async move {
                let outcome = self.process_topic(request, index, total, &name).await;
                (index, name, outcome)
            })
            .buffer_unordered(self.max_topic_workers)
            .collect()
            .await
    }

    async fn process_topic(&self, request: &GenerationRequest, index: usize, total: usize, name: &str) -> TopicOutcome {
        info!("  [{}/{}] Processing: '{}'", index + 1, total, name);

        let candidates = self
            .discovery
            .search(name, &request.subject, self.max_results)
            .await;

        let judgment = if candidates.is_empty() {
            None
        } else {
            self.curator
                .curate(name, &candidates, &request.subject, request.difficulty_level)
                .await
        };

        let outcome = topic_outcome(name, &candidates, judgment);
        match &outcome {
            TopicOutcome::Structured(_) => info!("    ✅ Structured '{}'", name),
            TopicOutcome::Skipped(reason) => warn!("    ⚠️ Skipped '{}' ({:?})", name, reason),
        }
        outcome
    }

    async fn fail(
        &self,
        mut status: RunStatus,
        err: PipelineError,
        course: Option<AssembledCourse>,
        started: Instant,
    ) -> RunReport {
        error!("❌ Run {} failed: {}", status.correlation_id, err);
        status.fail(&err);
        self.tracker.record(&status).await;

        RunReport {
            correlation_id: status.correlation_id,
            state: RunState::Failed,
            skipped: course.as_ref().map(|c| c.skipped.clone()).unwrap_or_default(),
            course,
            course_path_id: None,
            error: Some(err),
            elapsed: started.elapsed(),
        }
    }
}
