/// YouTube results page scraper, used when the Data API is unavailable
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{SearchError, VideoSearch};

const RESULTS_URL: &str = "https://www.youtube.com/results";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Clone)]
pub struct YouTubeResultsScraper {
    client: Client,
}

impl YouTubeResultsScraper {
    pub fn new(timeout_seconds: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    fn results_url(query: &str) -> String {
        format!("{}?search_query={}", RESULTS_URL, urlencoding::encode(query))
    }
}

#[async_trait]
impl VideoSearch for YouTubeResultsScraper {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>, SearchError> {
        let url = Self::results_url(query);
        debug!("Fetching results page: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(SearchError::Api {
                status,
                body: "results page request failed".to_string(),
            });
        }

        let html = response.text().await?;
        let data = extract_initial_data(&html)
            .ok_or_else(|| SearchError::Malformed("ytInitialData not found in results page".to_string()))?;

        let mut renderers = Vec::new();
        collect_video_renderers(&data, &mut renderers);

        let records: Vec<Value> = renderers
            .into_iter()
            .take(max_results)
            .map(renderer_to_record)
            .collect();

        info!("🔎 Results page yielded {} videos", records.len());
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "youtube-results-page"
    }
}

static INITIAL_DATA: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)ytInitialData"?\]?\s*=\s*(\{.*\})\s*;"#).ok());

/// Locate and parse the `ytInitialData` JSON embedded in a script tag
pub fn extract_initial_data(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script").ok()?;
    let re = INITIAL_DATA.as_ref()?;

    document
        .select(&selector)
        .map(|script| script.text().collect::<String>())
        .filter(|text| text.contains("ytInitialData"))
        .find_map(|text| {
            let caps = re.captures(&text)?;
            serde_json::from_str(caps.get(1)?.as_str()).ok()
        })
}

/// Depth-first collection of every `videoRenderer` object, in page order
fn collect_video_renderers<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "videoRenderer" {
                    out.push(child);
                } else {
                    collect_video_renderers(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_video_renderers(item, out);
            }
        }
        _ => {}
    }
}

/// `simpleText`, or the concatenated `runs[].text`
fn renderer_text(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if let Some(text) = value.get("simpleText").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let joined: String = value
        .get("runs")?
        .as_array()?
        .iter()
        .filter_map(|run| run.get("text").and_then(Value::as_str))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

/// `"1:02:03"` or `"4:13"` into seconds
pub fn parse_clock_duration(text: &str) -> Option<u64> {
    text.trim()
        .split(':')
        .try_fold(0u64, |acc, part| part.trim().parse::<u64>().ok().map(|n| acc * 60 + n))
}

fn renderer_to_record(renderer: &Value) -> Value {
    let description = renderer_text(renderer.get("descriptionSnippet")).or_else(|| {
        renderer
            .pointer("/detailedMetadataSnippets/0/snippetText")
            .and_then(|snippet| renderer_text(Some(snippet)))
    });

    json!({
        "id": renderer.get("videoId").and_then(Value::as_str),
        "title": renderer_text(renderer.get("title")),
        "description": description,
        "view_count": renderer_text(renderer.get("viewCountText")),
        "duration": renderer_text(renderer.get("lengthText")).as_deref().and_then(parse_clock_duration),
        "channel": renderer_text(renderer.get("ownerText")),
        "upload_date": renderer_text(renderer.get("publishedTimeText")),
    })
}
