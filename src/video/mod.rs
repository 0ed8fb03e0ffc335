//! Video discovery: query building, backend trait and record normalization

pub mod hybrid;
pub mod results_page;
pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use hybrid::HybridVideoSearch;
pub use results_page::YouTubeResultsScraper;
pub use youtube::YouTubeDataApi;

/// Placeholder URL for a candidate that has neither a URL nor an id
pub const UNAVAILABLE_URL: &str = "N/A";

/// Longest description kept on a candidate, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Default number of candidates requested per topic
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Video search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub max_results: usize,
    /// YouTube Data API v3 key; without it only the results-page scraper is used
    #[serde(skip_serializing)]
    pub youtube_api_key: Option<String>,
    /// Daily quota units the Data API may spend before falling back
    pub daily_quota_limit: u64,
    pub timeout_seconds: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            youtube_api_key: None,
            daily_quota_limit: youtube::DEFAULT_DAILY_QUOTA,
            timeout_seconds: 15,
        }
    }
}

/// One candidate video for a topic. Ephemeral; never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoCandidate {
    pub video_id: Option<String>,
    pub title: String,
    pub url: String,
    pub description: String,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub duration_seconds: Option<u64>,
    pub channel: Option<String>,
    pub upload_date: Option<String>,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YouTube API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Daily quota exhausted ({used}/{limit} units)")]
    QuotaExhausted { used: u64, limit: u64 },

    #[error("Unexpected response: {0}")]
    Malformed(String),

    #[error("No search backend configured")]
    Unavailable,
}

/// A video-search capability. Records are raw and untrusted: entries may be
/// null, missing fields or carry fields of the wrong type.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>, SearchError>;
    fn name(&self) -> &'static str;
}

/// Build the backend stack from configuration
pub fn create_video_search(config: &VideoConfig) -> Arc<dyn VideoSearch> {
    let fallback: Arc<dyn VideoSearch> = Arc::new(YouTubeResultsScraper::new(config.timeout_seconds));
    let primary = config
        .youtube_api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| {
            Arc::new(YouTubeDataApi::new(key, config.daily_quota_limit, config.timeout_seconds))
                as Arc<dyn VideoSearch>
        });

    if primary.is_none() {
        info!("🎥 No YouTube API key configured, using results page search only");
    }

    Arc::new(HybridVideoSearch::new(primary, fallback))
}

/// `"{subject}: {topic}"`, or the bare topic when the subject is blank
pub fn build_query(topic: &str, subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        topic.to_string()
    } else {
        format!("{}: {}", subject, topic)
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

fn text_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s != UNAVAILABLE_URL).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_field(record: &Value, key: &str) -> Option<u64> {
    match record.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Turn one raw record into a candidate.
///
/// Returns `None` for records that identify nothing: not an object, or with no
/// id, URL and title. URL preference: `url`, then `webpage_url`, then a watch
/// URL built from the id, then [`UNAVAILABLE_URL`].
pub fn normalize_record(record: &Value) -> Option<VideoCandidate> {
    if !record.is_object() {
        return None;
    }

    let video_id = text_field(record, "id").or_else(|| text_field(record, "video_id"));
    let explicit_url = text_field(record, "url").or_else(|| text_field(record, "webpage_url"));
    let title = text_field(record, "title");

    if video_id.is_none() && explicit_url.is_none() && title.is_none() {
        return None;
    }

    let url = explicit_url
        .or_else(|| video_id.as_deref().map(watch_url))
        .unwrap_or_else(|| UNAVAILABLE_URL.to_string());

    Some(VideoCandidate {
        title: title.unwrap_or_else(|| "Untitled".to_string()),
        url,
        description: text_field(record, "description")
            .map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS))
            .unwrap_or_default(),
        view_count: count_field(record, "view_count"),
        like_count: count_field(record, "like_count"),
        duration_seconds: count_field(record, "duration"),
        channel: text_field(record, "channel").or_else(|| text_field(record, "uploader")),
        upload_date: text_field(record, "upload_date"),
        video_id,
    })
}

/// Finds candidate videos for a topic
pub struct VideoDiscovery {
    backend: Arc<dyn VideoSearch>,
}

impl VideoDiscovery {
    pub fn new(backend: Arc<dyn VideoSearch>) -> Self {
        Self { backend }
    }

    /// Up to `max_results` candidates. A failed query yields an empty list,
    /// which the orchestrator reads as "no candidates".
    pub async fn search(&self, topic: &str, subject: &str, max_results: usize) -> Vec<VideoCandidate> {
        let query = build_query(topic, subject);
        debug!("Searching {} for '{}'", self.backend.name(), query);

        let records = match self.backend.search(&query, max_results).await {
            Ok(records) => records,
            Err(e) => {
                warn!("⚠️ Video search failed for topic '{}': {}", topic, e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::with_capacity(records.len().min(max_results));
        for (position, record) in records.iter().enumerate() {
            if candidates.len() >= max_results {
                break;
            }
            match normalize_record(record) {
                Some(candidate) => candidates.push(candidate),
                None => debug!("Skipping unusable search result #{} for '{}'", position + 1, topic),
            }
        }

        info!("🎥 Found {} candidate videos for '{}'", candidates.len(), topic);
        candidates
    }
}
