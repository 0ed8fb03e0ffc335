//! Course data model: requests, persisted entities and course assembly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::curation::{ContentQuality, CurationJudgment};
use crate::error::PipelineError;

const STOP_WORDS: [&str; 13] = [
    "and", "or", "the", "a", "an", "in", "on", "at", "to", "for", "of", "with", "by",
];

const MAX_TAGS: usize = 5;

/// Course difficulty level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Soft ceiling on topic count handed to the generator
    pub fn max_topics(self) -> usize {
        match self {
            Difficulty::Beginner => 15,
            Difficulty::Intermediate => 25,
            Difficulty::Advanced => 50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(PipelineError::Validation(format!(
                "difficulty level must be beginner, intermediate or advanced, got '{}'",
                other
            ))),
        }
    }
}

/// One pipeline run's input. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub subject: String,
    pub difficulty_level: Difficulty,
    pub requester_identity: Option<String>,
    pub correlation_id: Uuid,
}

impl GenerationRequest {
    /// Validate the trigger fields and assign a fresh correlation id
    pub fn new(subject: &str, difficulty: &str, requester: Option<&str>) -> Result<Self, PipelineError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(PipelineError::Validation("subject must not be empty".to_string()));
        }
        let difficulty_level = difficulty.parse()?;
        let requester_identity = requester
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(Self {
            subject: subject.to_string(),
            difficulty_level,
            requester_identity,
            correlation_id: Uuid::new_v4(),
        })
    }
}

/// Curated video reference stored on a topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub youtube_url: String,
    pub title: String,
    pub start_time_sec: u64,
    pub end_time_sec: u64,
}

impl VideoInfo {
    /// Millisecond offsets become whole seconds here and nowhere earlier
    pub fn from_judgment(judgment: &CurationJudgment) -> Self {
        Self {
            youtube_url: judgment.selected_video.url.clone(),
            title: judgment.selected_video.title.clone(),
            start_time_sec: judgment.start_time_ms / 1000,
            end_time_sec: judgment.end_time_ms / 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub content_quality: ContentQuality,
    pub relevance_score: u8,
}

/// Persisted topic entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub video_info: VideoInfo,
    pub prerequisites: Vec<Uuid>,
    pub tags: Vec<String>,
    pub quality_metrics: QualityMetrics,
}

/// Persisted course entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePath {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub target_level: Difficulty,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub topic_ids: Vec<Uuid>,
    pub reviews: Vec<serde_json::Value>,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub topic_id: Uuid,
    pub is_covered: bool,
    pub last_updated: DateTime<Utc>,
}

/// Per-user progress tracker for one course
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: Uuid,
    pub user_id: String,
    pub course_path_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub readiness: u32,
    pub progress: Vec<TopicProgress>,
}

impl ProgressRecord {
    /// Deterministic id per (user, course) pair
    pub fn id_for(user_id: &str, course_path_id: Uuid) -> Uuid {
        Uuid::new_v5(&course_path_id, user_id.as_bytes())
    }

    /// One unstarted entry per topic
    pub fn seed(user_id: &str, course: &CoursePath, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::id_for(user_id, course.id),
            user_id: user_id.to_string(),
            course_path_id: course.id,
            started_at: now,
            readiness: 0,
            progress: course
                .topic_ids
                .iter()
                .map(|topic_id| TopicProgress {
                    topic_id: *topic_id,
                    is_covered: false,
                    last_updated: now,
                })
                .collect(),
        }
    }
}

/// Why a topic was left out of the course
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoCandidates,
    CurationFailed,
}

/// Result of processing one generated topic
#[derive(Debug, Clone)]
pub enum TopicOutcome {
    Structured(Box<Topic>),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTopic {
    /// Generation index of the topic
    pub position: usize,
    pub name: String,
    pub reason: SkipReason,
}

/// Lower-cased word tokens from a topic name, stop words and short tokens removed
pub fn generate_tags(name: &str) -> Vec<String> {
    let lowered = name.to_lowercase();
    let mut tags: Vec<String> = Vec::new();
    for word in lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
    {
        if tags.len() == MAX_TAGS {
            break;
        }
        if !tags.iter().any(|tag| tag == word) {
            tags.push(word.to_string());
        }
    }
    tags
}

/// Build a topic record from a curation judgment. Prerequisites are linked later.
pub fn structure_topic(name: &str, judgment: &CurationJudgment) -> Topic {
    Topic {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: format!("Learn about {} - {}", name.to_lowercase(), judgment.reason),
        video_info: VideoInfo::from_judgment(judgment),
        prerequisites: Vec::new(),
        tags: generate_tags(name),
        quality_metrics: QualityMetrics {
            content_quality: judgment.content_quality,
            relevance_score: judgment.relevance_score,
        },
    }
}

/// Each topic depends on the one before it; the first has none
pub fn link_prerequisites(topics: &mut [Topic]) {
    let mut previous: Option<Uuid> = None;
    for topic in topics.iter_mut() {
        topic.prerequisites = previous.into_iter().collect();
        previous = Some(topic.id);
    }
}

/// In-memory course ready for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledCourse {
    pub course_path: CoursePath,
    pub topics: Vec<Topic>,
    pub skipped: Vec<SkippedTopic>,
}

impl AssembledCourse {
    /// Assemble from per-topic outcomes keyed by generation index.
    ///
    /// Outcomes may arrive in any order; the course follows the index order.
    pub fn assemble(
        request: &GenerationRequest,
        mut outcomes: Vec<(usize, String, TopicOutcome)>,
        now: DateTime<Utc>,
    ) -> Self {
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut topics = Vec::new();
        let mut skipped = Vec::new();
        for (position, name, outcome) in outcomes {
            match outcome {
                TopicOutcome::Structured(topic) => topics.push(*topic),
                TopicOutcome::Skipped(reason) => skipped.push(SkippedTopic { position, name, reason }),
            }
        }

        link_prerequisites(&mut topics);

        let subject = &request.subject;
        let level = request.difficulty_level;
        let course_path = CoursePath {
            id: Uuid::new_v4(),
            title: format!("{} Learning Path", subject),
            description: format!(
                "A step-by-step learning path for mastering {} at {} level.",
                subject, level
            ),
            target_level: level,
            created_at: now,
            created_by: request.requester_identity.clone(),
            topic_ids: topics.iter().map(|t| t.id).collect(),
            reviews: Vec::new(),
            average_rating: None,
        };

        Self {
            course_path,
            topics,
            skipped,
        }
    }
}
