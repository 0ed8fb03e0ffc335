//! End-to-end runs of the course pipeline against in-process doubles

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use course_path_generator::llm::{LLMResponse, LlmError};
use course_path_generator::store::{StoreError, COURSES, PROGRESS, RUNS, TOPICS, USERS};
use course_path_generator::video::SearchError;
use course_path_generator::{
    Credential, CredentialSet, CourseJobLauncher, DocumentStore, GenerationRequest, GenerativeModel,
    LLMProvider, MemoryStore, PipelineError, PipelineOrchestrator, RunState, VideoSearch,
};

type Script = dyn Fn(&str, &str) -> Result<String, LlmError> + Send + Sync;

/// Replies chosen by a closure over (prompt, credential); records every key used
struct ScriptedModel {
    script: Box<Script>,
    calls: AtomicUsize,
    keys: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<LLMResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(credential.expose().to_string());
        (self.script)(prompt, credential.expose()).map(|content| LLMResponse {
            content,
            tokens_used: None,
        })
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }
}

fn is_topic_prompt(prompt: &str) -> bool {
    prompt.contains("curriculum designer")
}

/// Topic named in a curation prompt
fn curated_topic(prompt: &str) -> &str {
    let marker = "for the topic \"";
    prompt
        .find(marker)
        .map(|start| &prompt[start + marker.len()..])
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default()
}

fn judgment_reply(video_number: usize, start_ms: u64, end_ms: u64) -> String {
    format!(
        "```json\n{}\n```",
        json!({
            "selectedVideo": {
                "videoNumber": video_number,
                "reason": "Clear walkthrough with worked examples",
                "startTimeMs": start_ms,
                "endTimeMs": end_ms,
                "contentQuality": "high",
                "relevanceScore": 92
            }
        })
    )
}

/// Search double keyed by topic name, with an optional per-topic delay
#[derive(Default)]
struct FakeSearch {
    results: HashMap<String, Vec<Value>>,
    delays: HashMap<String, u64>,
}

impl FakeSearch {
    fn with(mut self, topic: &str, ids: &[&str]) -> Self {
        let records = ids
            .iter()
            .map(|id| json!({"id": id, "title": format!("{} explained ({})", topic, id), "view_count": 1200}))
            .collect();
        self.results.insert(topic.to_string(), records);
        self
    }

    fn delayed(mut self, topic: &str, millis: u64) -> Self {
        self.delays.insert(topic.to_string(), millis);
        self
    }
}

#[async_trait]
impl VideoSearch for FakeSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>, SearchError> {
        let topic = query.split(": ").nth(1).unwrap_or(query);
        if let Some(millis) = self.delays.get(topic) {
            tokio::time::sleep(Duration::from_millis(*millis)).await;
        }
        Ok(self
            .results
            .get(topic)
            .map(|records| records.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Memory store that refuses writes to one collection
struct FailingStore {
    inner: MemoryStore,
    broken: &'static str,
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError> {
        if collection == self.broken {
            return Err(StoreError::Configuration(format!("{} is read-only", collection)));
        }
        self.inner.put(collection, id, document).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn add_to_set(&self, collection: &str, id: &str, field: &str, value: Value) -> Result<bool, StoreError> {
        self.inner.add_to_set(collection, id, field, value).await
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// Memory store that remembers the state of every run document written
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    states: Mutex<Vec<String>>,
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError> {
        if collection == RUNS {
            if let Some(state) = document["state"].as_str() {
                self.states.lock().unwrap().push(state.to_string());
            }
        }
        self.inner.put(collection, id, document).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn add_to_set(&self, collection: &str, id: &str, field: &str, value: Value) -> Result<bool, StoreError> {
        self.inner.add_to_set(collection, id, field, value).await
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

fn keys(names: &[&str]) -> CredentialSet {
    CredentialSet::new(names.iter().copied()).unwrap()
}

fn algebra_model() -> Arc<ScriptedModel> {
    ScriptedModel::new(|prompt, _key| {
        if is_topic_prompt(prompt) {
            Ok("Here you go:\n1. Variables\n2. Linear Equations\n3. Graphing Lines\n".to_string())
        } else {
            Ok(judgment_reply(1, 1500, 9999))
        }
    })
}

fn algebra_search() -> FakeSearch {
    FakeSearch::default()
        .with("Variables", &["var111", "var222"])
        .with("Linear Equations", &["lin111"])
}

#[tokio::test]
async fn test_algebra_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    store.put(USERS, "u1", json!({"name": "Ada"})).await.unwrap();

    let model = algebra_model();
    let orchestrator = PipelineOrchestrator::new(
        model.clone(),
        keys(&["k1", "k2"]),
        Arc::new(algebra_search()),
        store.clone(),
    );

    let request = GenerationRequest::new("Algebra", "beginner", Some("u1")).unwrap();
    let report = orchestrator.run(&request).await;

    assert!(report.succeeded(), "run failed: {:?}", report.error);
    // one topic call plus one curation per topic that had candidates
    assert_eq!(model.calls(), 3);

    let course = report.course.as_ref().unwrap();
    let names: Vec<&str> = course.topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Variables", "Linear Equations"]);
    assert_eq!(course.skipped.len(), 1);
    assert_eq!(course.skipped[0].name, "Graphing Lines");

    assert!(course.topics[0].prerequisites.is_empty());
    assert_eq!(course.topics[1].prerequisites, vec![course.topics[0].id]);

    let video = &course.topics[0].video_info;
    assert_eq!(video.start_time_sec, 1);
    assert_eq!(video.end_time_sec, 9);
    assert_eq!(video.youtube_url, "https://www.youtube.com/watch?v=var111");

    assert_eq!(store.count(TOPICS).await, 2);
    assert_eq!(store.count(COURSES).await, 1);

    let course_id = report.course_path_id.unwrap().to_string();
    let stored = store.get(COURSES, &course_id).await.unwrap().unwrap();
    assert_eq!(stored["topicIds"].as_array().unwrap().len(), 2);
    assert_eq!(stored["title"], "Algebra Learning Path");

    let user = store.get(USERS, "u1").await.unwrap().unwrap();
    assert_eq!(user["createdCourses"], json!([course_id]));
    assert_eq!(user["enrolledCourses"], json!([course_id]));
    assert_eq!(store.count(PROGRESS).await, 1);

    let run = store
        .get(RUNS, &request.correlation_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run["state"], "PERSISTED");
    assert_eq!(run["topicsRequested"], 3);
    assert_eq!(run["topicsStructured"], 2);
    assert_eq!(run["skipped"], json!([{"position": 2, "reason": "no_candidates"}]));

    // the skipped topic is reported in memory only
    for collection in [COURSES, TOPICS, USERS, PROGRESS, RUNS] {
        for document in store.documents(collection).await {
            assert!(
                !document.to_string().contains("Graphing Lines"),
                "{} document mentions the skipped topic: {}",
                collection,
                document
            );
        }
    }
}

#[tokio::test]
async fn test_run_document_passes_through_every_state() {
    let store = Arc::new(RecordingStore::default());
    let orchestrator = PipelineOrchestrator::new(
        algebra_model(),
        keys(&["k1"]),
        Arc::new(algebra_search()),
        store.clone(),
    );

    let request = GenerationRequest::new("Algebra", "beginner", None).unwrap();
    assert!(orchestrator.run(&request).await.succeeded());

    let states = store.states.lock().unwrap().clone();
    assert_eq!(states, vec!["STARTED", "TOPICS_GENERATED", "ASSEMBLED", "PERSISTED"]);
}

#[tokio::test]
async fn test_rotation_recovers_after_exhausted_keys() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::new(|prompt, key| {
        if key != "k3" {
            return Err(LlmError::Quota(format!("{} exhausted", key)));
        }
        if is_topic_prompt(prompt) {
            Ok("1. Variables".to_string())
        } else {
            Ok(judgment_reply(1, 0, 60_000))
        }
    });

    let orchestrator = PipelineOrchestrator::new(
        model.clone(),
        keys(&["k1", "k2", "k3"]),
        Arc::new(algebra_search()),
        store.clone(),
    );

    let request = GenerationRequest::new("Algebra", "beginner", None).unwrap();
    let report = orchestrator.run(&request).await;

    assert!(report.succeeded());
    assert_eq!(report.course.as_ref().unwrap().topics.len(), 1);
    // every call starts over from the first key
    assert_eq!(model.keys(), vec!["k1", "k2", "k3", "k1", "k2", "k3"]);
}

#[tokio::test]
async fn test_topic_generation_failure_fails_run() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::new(|_prompt, _key| {
        Err(LlmError::Api {
            status: 500,
            body: "backend down".to_string(),
        })
    });

    let orchestrator = PipelineOrchestrator::new(
        model.clone(),
        keys(&["k1", "k2"]),
        Arc::new(algebra_search()),
        store.clone(),
    );

    let request = GenerationRequest::new("Algebra", "advanced", None).unwrap();
    let report = orchestrator.run(&request).await;

    assert_eq!(report.state, RunState::Failed);
    assert!(report.course.is_none());
    assert!(matches!(report.error, Some(PipelineError::Stage { .. })));
    assert_eq!(model.calls(), 2);
    assert_eq!(store.count(COURSES).await, 0);

    let status = orchestrator
        .tracker()
        .load(request.correlation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, RunState::Failed);
    assert!(status.error.is_some());
}

#[tokio::test]
async fn test_unnumbered_topic_reply_fails_run() {
    let model = ScriptedModel::new(|_prompt, _key| Ok("I cannot help with that.".to_string()));
    let orchestrator = PipelineOrchestrator::new(
        model,
        keys(&["k1"]),
        Arc::new(FakeSearch::default()),
        Arc::new(MemoryStore::new()),
    );

    let request = GenerationRequest::new("Algebra", "beginner", None).unwrap();
    let report = orchestrator.run(&request).await;

    assert_eq!(report.state, RunState::Failed);
    assert!(matches!(report.error, Some(PipelineError::Parse(_))));
}

#[tokio::test]
async fn test_unresolvable_curation_reference_skips_topic() {
    let store = Arc::new(MemoryStore::new());
    let model = ScriptedModel::new(|prompt, _key| {
        if is_topic_prompt(prompt) {
            return Ok("1. Variables\n2. Linear Equations".to_string());
        }
        match curated_topic(prompt) {
            "Variables" => Ok(judgment_reply(7, 0, 1000)),
            _ => Ok(judgment_reply(1, 0, 1000)),
        }
    });

    let orchestrator = PipelineOrchestrator::new(
        model,
        keys(&["k1", "k2"]),
        Arc::new(algebra_search()),
        store.clone(),
    );

    let request = GenerationRequest::new("Algebra", "intermediate", None).unwrap();
    let report = orchestrator.run(&request).await;

    assert!(report.succeeded());
    let course = report.course.unwrap();
    assert_eq!(course.topics.len(), 1);
    assert_eq!(course.topics[0].name, "Linear Equations");
    assert!(course.topics[0].prerequisites.is_empty());

    let skipped = serde_json::to_value(&course.skipped).unwrap();
    assert_eq!(skipped, json!([{"position": 0, "name": "Variables", "reason": "curation_failed"}]));
}

#[tokio::test]
async fn test_all_topics_skipped_still_persists() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = PipelineOrchestrator::new(
        algebra_model(),
        keys(&["k1"]),
        Arc::new(FakeSearch::default()),
        store.clone(),
    );

    let request = GenerationRequest::new("Algebra", "beginner", None).unwrap();
    let report = orchestrator.run(&request).await;

    assert!(report.succeeded());
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(store.count(COURSES).await, 1);
    assert_eq!(store.count(TOPICS).await, 0);
}

#[tokio::test]
async fn test_persistence_failure_keeps_course() {
    let store = Arc::new(FailingStore {
        inner: MemoryStore::new(),
        broken: COURSES,
    });

    let orchestrator = PipelineOrchestrator::new(
        algebra_model(),
        keys(&["k1"]),
        Arc::new(algebra_search()),
        store.clone(),
    );

    let request = GenerationRequest::new("Algebra", "beginner", None).unwrap();
    let report = orchestrator.run(&request).await;

    assert_eq!(report.state, RunState::Failed);
    assert!(matches!(report.error, Some(PipelineError::Persistence(_))));
    assert!(report.course_path_id.is_none());
    assert_eq!(report.course.as_ref().unwrap().topics.len(), 2);

    // topic documents written before the course write are left in place
    assert_eq!(store.inner.count(TOPICS).await, 2);
    let status = orchestrator
        .tracker()
        .load(request.correlation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, RunState::Failed);
}

#[tokio::test]
async fn test_parallel_workers_keep_generation_order() {
    let store = Arc::new(MemoryStore::new());
    let search = algebra_search()
        .with("Graphing Lines", &["gra111"])
        .delayed("Variables", 80)
        .delayed("Linear Equations", 40);

    let orchestrator = PipelineOrchestrator::new(
        algebra_model(),
        keys(&["k1"]),
        Arc::new(search),
        store.clone(),
    )
    .with_max_topic_workers(3);

    let request = GenerationRequest::new("Algebra", "beginner", None).unwrap();
    let report = orchestrator.run(&request).await;

    assert!(report.succeeded());
    let course = report.course.unwrap();
    let names: Vec<&str> = course.topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Variables", "Linear Equations", "Graphing Lines"]);
    assert_eq!(course.topics[2].prerequisites, vec![course.topics[1].id]);
    assert_eq!(
        course.course_path.topic_ids,
        course.topics.iter().map(|t| t.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_invalid_request_makes_no_calls() {
    let model = algebra_model();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = PipelineOrchestrator::new(model.clone(), keys(&["k1"]), Arc::new(algebra_search()), store.clone());
    let launcher = CourseJobLauncher::new(Arc::new(orchestrator));

    let err = launcher.submit("Algebra", "expert", None).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    let err = launcher.submit("   ", "beginner", None).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(model.calls(), 0);
    assert_eq!(store.count(RUNS).await, 0);
}

#[tokio::test]
async fn test_submitted_job_runs_to_completion() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = PipelineOrchestrator::new(algebra_model(), keys(&["k1"]), Arc::new(algebra_search()), store.clone());
    let launcher = CourseJobLauncher::new(Arc::new(orchestrator));

    let accepted = tokio_test::assert_ok!(launcher.submit("Algebra", "BEGINNER", None));
    assert_eq!(accepted.status, "accepted");

    let mut final_state = None;
    for _ in 0..100 {
        let status = launcher
            .orchestrator()
            .tracker()
            .load(accepted.correlation_id)
            .await
            .unwrap();
        if let Some(status) = status.filter(|s| s.state.is_terminal()) {
            final_state = Some(status.state);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(final_state, Some(RunState::Persisted));
    assert_eq!(store.count(COURSES).await, 1);
}

#[tokio::test]
async fn test_spawned_job_returns_report() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = PipelineOrchestrator::new(algebra_model(), keys(&["k1"]), Arc::new(algebra_search()), store);
    let launcher = CourseJobLauncher::new(Arc::new(orchestrator));

    let request = GenerationRequest::new("Algebra", "beginner", None).unwrap();
    let correlation_id = request.correlation_id;
    let report = launcher.spawn(request).await.unwrap();

    assert_eq!(report.correlation_id, correlation_id);
    assert!(report.succeeded());
    assert_eq!(report.skipped.len(), 1);
}
