//! AI curation: pick one candidate video and a time window for a topic

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::course::Difficulty;
use crate::llm::{strip_code_fence, CredentialRotator, GenerativeModel, LlmError};
use crate::video::{VideoCandidate, UNAVAILABLE_URL};

const MAX_REASON_CHARS: usize = 200;
const MAX_RELEVANCE: u64 = 100;

/// Coarse quality tier assigned by the curator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentQuality {
    High,
    #[default]
    Medium,
    Low,
}

impl ContentQuality {
    fn from_loose(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("high") => ContentQuality::High,
            Some("low") => ContentQuality::Low,
            _ => ContentQuality::Medium,
        }
    }
}

/// The curator's selection. `selected_video` is always one of the candidates it was given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurationJudgment {
    pub selected_video: VideoCandidate,
    /// 1-based position of the selected video in the candidate list
    pub video_number: usize,
    pub reason: String,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub content_quality: ContentQuality,
    pub relevance_score: u8,
}

#[derive(Debug, Deserialize)]
struct CuratorReply {
    #[serde(rename = "selectedVideo")]
    selected_video: SelectedVideo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectedVideo {
    video_number: Option<serde_json::Value>,
    youtube_url: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    start_time_ms: Option<serde_json::Value>,
    end_time_ms: Option<serde_json::Value>,
    content_quality: Option<String>,
    relevance_score: Option<serde_json::Value>,
}

fn loose_u64(value: Option<&serde_json::Value>) -> Option<u64> {
    match value? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// YouTube video id from a watch, short or embed URL
pub fn extract_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let id = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" => match url.query_pairs().find(|(key, _)| key == "v") {
            Some((_, id)) => Some(id.into_owned()),
            None => {
                let mut segments = url.path_segments()?;
                match segments.next() {
                    Some("embed") | Some("shorts") | Some("live") => segments.next().map(str::to_string),
                    _ => None,
                }
            }
        },
        _ => None,
    };
    id.filter(|id| !id.is_empty())
}

fn resolve_reference(selected: &SelectedVideo, candidates: &[VideoCandidate]) -> Option<usize> {
    if let Some(number) = loose_u64(selected.video_number.as_ref()) {
        let number = number as usize;
        if (1..=candidates.len()).contains(&number) {
            return Some(number - 1);
        }
    }

    let url = selected.youtube_url.as_deref()?.trim();
    if url.is_empty() || url == UNAVAILABLE_URL {
        return None;
    }
    if let Some(index) = candidates.iter().position(|c| c.url == url) {
        return Some(index);
    }
    let id = extract_video_id(url)?;
    candidates
        .iter()
        .position(|c| c.video_id.as_deref() == Some(id.as_str()))
}

/// Parse a curator response against the candidates that were offered.
///
/// Fences are stripped first. A reference that matches none of the candidates
/// is a parse error, so the rotator moves on to the next credential.
pub fn parse_judgment(response: &str, candidates: &[VideoCandidate]) -> Result<CurationJudgment, LlmError> {
    let body = strip_code_fence(response)?;
    let reply: CuratorReply = serde_json::from_str(body)?;
    let selected = reply.selected_video;

    let index = resolve_reference(&selected, candidates).ok_or_else(|| {
        LlmError::Parse(format!(
            "selected video {:?} / {:?} is not one of the {} candidates",
            selected.video_number,
            selected.youtube_url,
            candidates.len()
        ))
    })?;

    let start_time_ms = loose_u64(selected.start_time_ms.as_ref()).unwrap_or(0);
    let mut end_time_ms = loose_u64(selected.end_time_ms.as_ref()).unwrap_or(0);
    if end_time_ms < start_time_ms {
        end_time_ms = start_time_ms;
    }

    let reason = selected
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("Educational content")
        .chars()
        .take(MAX_REASON_CHARS)
        .collect();

    let relevance_score = loose_u64(selected.relevance_score.as_ref())
        .unwrap_or(0)
        .min(MAX_RELEVANCE) as u8;

    Ok(CurationJudgment {
        selected_video: candidates[index].clone(),
        video_number: index + 1,
        reason,
        start_time_ms,
        end_time_ms,
        content_quality: ContentQuality::from_loose(selected.content_quality.as_deref()),
        relevance_score,
    })
}

/// Thousands separators, `1234567` -> `1,234,567`
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn build_curation_prompt(
    topic: &str,
    candidates: &[VideoCandidate],
    subject: &str,
    difficulty: Difficulty,
) -> String {
    let videos: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, video)| {
            format!(
                "Video {}:\nTitle: {}\nURL: {}\nDescription: {}\nViews: {}\nLikes: {}\nDuration: {} seconds\nChannel: {}\n",
                i + 1,
                video.title,
                video.url,
                if video.description.is_empty() { "N/A" } else { video.description.as_str() },
                format_count(video.view_count.unwrap_or(0)),
                format_count(video.like_count.unwrap_or(0)),
                video.duration_seconds.unwrap_or(0),
                video.channel.as_deref().unwrap_or("N/A"),
            )
        })
        .collect();

    format!(
        r#"You are an expert educational content curator. Analyze these {count} YouTube videos for the topic "{topic}" in the subject "{subject}" at {level} level.

TASK: Select the BEST video and provide specific start/end times for the most relevant content.

ANALYSIS CRITERIA (in priority order):
1. PRIMARY: How well the content matches the topic and difficulty level
2. SECONDARY: Video metrics (views, likes) as supporting indicators
3. Look for timestamp information in descriptions to identify relevant segments
4. Ensure content is appropriate for {level} learners

VIDEOS TO ANALYZE:
{videos}
INSTRUCTIONS:
- Pick exactly one of the videos above
- If no specific timestamps are mentioned, cover the entire video duration
- Focus on educational value over popularity metrics

REQUIRED OUTPUT FORMAT (JSON only, no other text):
{{
  "selectedVideo": {{
    "videoNumber": 1,
    "youtubeUrl": "https://www.youtube.com/watch?v=...",
    "title": "Video Title",
    "reason": "Why this video was selected (max 200 chars)",
    "startTimeMs": 0,
    "endTimeMs": 300000,
    "contentQuality": "high|medium|low",
    "relevanceScore": 95
  }}
}}

Respond with ONLY the JSON object, no additional text."#,
        count = candidates.len(),
        topic = topic,
        subject = subject,
        level = difficulty,
        videos = videos.join("\n"),
    )
}

/// Selects one candidate per topic through the generative model
pub struct ContentCurator {
    model: Arc<dyn GenerativeModel>,
    rotator: CredentialRotator,
}

impl ContentCurator {
    pub fn new(model: Arc<dyn GenerativeModel>, rotator: CredentialRotator) -> Self {
        Self { model, rotator }
    }

    /// `None` when there are no candidates (no call is made) or when every
    /// credential failed to produce a usable judgment.
    pub async fn curate(
        &self,
        topic: &str,
        candidates: &[VideoCandidate],
        subject: &str,
        difficulty: Difficulty,
    ) -> Option<CurationJudgment> {
        if candidates.is_empty() {
            debug!("No candidates for '{}', skipping curation", topic);
            return None;
        }

        let prompt = build_curation_prompt(topic, candidates, subject, difficulty);
        let model = &self.model;
        let prompt = prompt.as_str();
        let operation = format!("curation of '{}'", topic);

        let result = self
            .rotator
            .attempt(&operation, move |credential| async move {
                let response = model.generate(prompt, &credential).await?;
                parse_judgment(&response.content, candidates)
            })
            .await;

        match result {
            Ok(rotated) => {
                let judgment = rotated.value;
                info!(
                    "🧠 Selected video {} for '{}' ({:?}, relevance {})",
                    judgment.video_number, topic, judgment.content_quality, judgment.relevance_score
                );
                Some(judgment)
            }
            Err(e) => {
                warn!("❌ Curation failed for '{}' after {} attempt(s): {}", topic, e.attempts, e.last);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Credential, CredentialSet, LLMProvider, LLMResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn candidate(id: &str) -> VideoCandidate {
        VideoCandidate {
            video_id: Some(id.to_string()),
            title: format!("Video {}", id),
            url: format!("https://www.youtube.com/watch?v={}", id),
            description: String::new(),
            view_count: Some(1500),
            like_count: Some(20),
            duration_seconds: Some(300),
            channel: None,
            upload_date: None,
        }
    }

    fn candidates() -> Vec<VideoCandidate> {
        vec![candidate("aaa"), candidate("bbb"), candidate("ccc")]
    }

    const REPLY: &str = r#"{"selectedVideo":{"videoNumber":2,"youtubeUrl":"https://www.youtube.com/watch?v=bbb","title":"Video bbb","reason":"Clear","startTimeMs":1500,"endTimeMs":9999,"contentQuality":"high","relevanceScore":88}}"#;

    #[test]
    fn test_fenced_and_unfenced_parse_identically() {
        let fenced = format!("```json\n{}\n```", REPLY);
        let a = parse_judgment(REPLY, &candidates()).unwrap();
        let b = parse_judgment(&fenced, &candidates()).unwrap();
        assert_eq!(a.video_number, b.video_number);
        assert_eq!(a.selected_video, b.selected_video);
        assert_eq!(a.start_time_ms, b.start_time_ms);
        assert_eq!(a.relevance_score, 88);
        assert_eq!(a.content_quality, ContentQuality::High);
    }

    #[test]
    fn test_reference_falls_back_to_url() {
        let reply = r#"{"selectedVideo":{"videoNumber":9,"youtubeUrl":"https://youtu.be/ccc","reason":"ok"}}"#;
        let judgment = parse_judgment(reply, &candidates()).unwrap();
        assert_eq!(judgment.video_number, 3);
        assert_eq!(judgment.content_quality, ContentQuality::Medium);
    }

    #[test]
    fn test_unknown_reference_is_parse_error() {
        let reply = r#"{"selectedVideo":{"videoNumber":7,"youtubeUrl":"https://www.youtube.com/watch?v=zzz"}}"#;
        assert!(matches!(parse_judgment(reply, &candidates()), Err(LlmError::Parse(_))));
        assert!(matches!(parse_judgment("not json", &candidates()), Err(LlmError::Parse(_))));
        assert!(matches!(
            parse_judgment("```json\n{\"selectedVideo\":{}}", &candidates()),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_clamps_and_truncates() {
        let reply = format!(
            r#"{{"selectedVideo":{{"videoNumber":"1","reason":"{}","startTimeMs":5000,"endTimeMs":100,"relevanceScore":250}}}}"#,
            "r".repeat(400)
        );
        let judgment = parse_judgment(&reply, &candidates()).unwrap();
        assert_eq!(judgment.reason.chars().count(), 200);
        assert_eq!(judgment.relevance_score, 100);
        assert_eq!(judgment.end_time_ms, 5000);
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=abc123&t=10"), Some("abc123".to_string()));
        assert_eq!(extract_video_id("https://youtu.be/abc123"), Some("abc123".to_string()));
        assert_eq!(extract_video_id("https://www.youtube.com/embed/abc123"), Some("abc123".to_string()));
        assert_eq!(extract_video_id("https://example.com/watch?v=abc123"), None);
        assert_eq!(extract_video_id("N/A"), None);
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1500), "1,500");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    struct SequenceModel {
        replies: Mutex<Vec<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerativeModel for SequenceModel {
        async fn generate(&self, prompt: &str, _credential: &Credential) -> Result<LLMResponse, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().remove(0) {
                Ok(content) => Ok(LLMResponse { content, tokens_used: None }),
                Err(msg) => Err(LlmError::Quota(msg)),
            }
        }

        fn provider_type(&self) -> LLMProvider {
            LLMProvider::Gemini
        }
    }

    fn curator(replies: Vec<Result<String, String>>, keys: usize) -> (Arc<SequenceModel>, ContentCurator) {
        let model = Arc::new(SequenceModel {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        });
        let keys: Vec<String> = (0..keys).map(|i| format!("key-{}", i)).collect();
        let rotator = CredentialRotator::new(CredentialSet::new(keys).unwrap());
        (model.clone(), ContentCurator::new(model, rotator))
    }

    #[tokio::test]
    async fn test_no_candidates_makes_no_call() {
        let (model, curator) = curator(Vec::new(), 1);
        assert!(curator.curate("Variables", &[], "Algebra", Difficulty::Beginner).await.is_none());
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_rotates_to_next_key() {
        let (model, curator) = curator(
            vec![
                Ok("Sure! Here is my pick.".to_string()),
                Err("429".to_string()),
                Ok(format!("```\n{}\n```", REPLY)),
            ],
            3,
        );
        let judgment = curator
            .curate("Variables", &candidates(), "Algebra", Difficulty::Beginner)
            .await
            .unwrap();
        assert_eq!(judgment.selected_video.video_id.as_deref(), Some("bbb"));
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("Video 3:"));
        assert!(prompts[0].contains("Views: 1,500"));
    }

    #[tokio::test]
    async fn test_all_keys_failing_yields_none() {
        let (_, curator) = curator(vec![Ok("{}".to_string()), Ok("[]".to_string())], 2);
        assert!(curator
            .curate("Variables", &candidates(), "Algebra", Difficulty::Beginner)
            .await
            .is_none());
    }
}
