//! YouTube Data API v3 backend with a daily quota ledger

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SearchError, VideoSearch};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Units charged by `search.list`
pub const SEARCH_COST: u64 = 100;
/// Units charged per video by `videos.list`
pub const VIDEO_COST: u64 = 1;
/// Conservative share of the default 10k daily allowance
pub const DEFAULT_DAILY_QUOTA: u64 = 9000;

#[derive(Debug)]
struct QuotaLedger {
    day: NaiveDate,
    used: u64,
}

pub struct YouTubeDataApi {
    client: Client,
    api_key: String,
    daily_limit: u64,
    ledger: Mutex<QuotaLedger>,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
    #[serde(rename = "contentDetails", default)]
    content_details: ContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    description: Option<String>,
    channel_title: Option<String>,
    published_at: Option<String>,
}

// The API returns counts as decimal strings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

static ISO_DURATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^P(?:(\d+)D)?T?(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").ok());

/// Parse an ISO-8601 duration such as `PT4M13S` into seconds
pub fn parse_iso_duration(value: &str) -> Option<u64> {
    let re = ISO_DURATION.as_ref()?;
    let caps = re.captures(value.trim())?;
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    Some(part(1) * 86_400 + part(2) * 3600 + part(3) * 60 + part(4))
}

impl YouTubeDataApi {
    pub fn new(api_key: &str, daily_limit: u64, timeout_seconds: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.to_string(),
            daily_limit,
            ledger: Mutex::new(QuotaLedger {
                day: Utc::now().date_naive(),
                used: 0,
            }),
        }
    }

    /// Units spent today
    pub fn quota_used(&self) -> u64 {
        self.with_ledger(|ledger| ledger.used)
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&mut QuotaLedger) -> T) -> T {
        let mut ledger = self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let today = Utc::now().date_naive();
        if ledger.day != today {
            debug!("Resetting YouTube API quota ledger for {}", today);
            ledger.day = today;
            ledger.used = 0;
        }
        f(&mut ledger)
    }

    fn ensure_quota(&self, cost: u64) -> Result<(), SearchError> {
        let limit = self.daily_limit;
        self.with_ledger(|ledger| {
            if ledger.used + cost > limit {
                Err(SearchError::QuotaExhausted {
                    used: ledger.used,
                    limit,
                })
            } else {
                Ok(())
            }
        })
    }

    fn charge(&self, cost: u64) {
        self.with_ledger(|ledger| ledger.used += cost);
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, SearchError> {
        let response = self
            .client
            .get(format!("{}/{}", API_BASE, endpoint))
            .header("x-goog-api-key", &self.api_key)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            if body.contains("quotaExceeded") {
                warn!("⚠️ YouTube API reports quota exceeded, disabling for today");
                let limit = self.daily_limit;
                self.with_ledger(|ledger| ledger.used = limit);
                return Err(SearchError::QuotaExhausted { used: limit, limit });
            }
            return Err(SearchError::Api {
                status,
                body: body.chars().take(300).collect(),
            });
        }

        Ok(response.json().await?)
    }

    fn to_record(item: VideoItem) -> Value {
        json!({
            "id": item.id,
            "title": item.snippet.title,
            "description": item.snippet.description,
            "channel": item.snippet.channel_title,
            "upload_date": item.snippet.published_at,
            "view_count": item.statistics.view_count.and_then(|v| v.parse::<u64>().ok()),
            "like_count": item.statistics.like_count.and_then(|v| v.parse::<u64>().ok()),
            "duration": item.content_details.duration.as_deref().and_then(parse_iso_duration),
        })
    }
}

#[async_trait]
impl VideoSearch for YouTubeDataApi {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>, SearchError> {
        self.ensure_quota(SEARCH_COST + VIDEO_COST * max_results as u64)?;

        let search: SearchListResponse = self
            .get_json(
                "search",
                &[
                    ("part", "snippet".to_string()),
                    ("type", "video".to_string()),
                    ("q", query.to_string()),
                    ("maxResults", max_results.to_string()),
                    ("relevanceLanguage", "en".to_string()),
                ],
            )
            .await?;
        self.charge(SEARCH_COST);

        let ids: Vec<String> = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let details: VideoListResponse = self
            .get_json(
                "videos",
                &[
                    ("part", "snippet,statistics,contentDetails".to_string()),
                    ("id", ids.join(",")),
                ],
            )
            .await?;
        self.charge(VIDEO_COST * ids.len() as u64);

        // videos.list does not promise search order
        let mut by_id: HashMap<String, VideoItem> =
            details.items.into_iter().map(|item| (item.id.clone(), item)).collect();
        let records: Vec<Value> = ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(Self::to_record)
            .collect();

        info!(
            "✅ YouTube API found {} videos (quota used: {}/{})",
            records.len(),
            self.quota_used(),
            self.daily_limit
        );
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "youtube-data-api"
    }
}
