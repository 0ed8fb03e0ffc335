use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::{SearchError, VideoSearch};

/// Data API first, results page when it fails or finds nothing
pub struct HybridVideoSearch {
    primary: Option<Arc<dyn VideoSearch>>,
    fallback: Arc<dyn VideoSearch>,
}

impl HybridVideoSearch {
    pub fn new(primary: Option<Arc<dyn VideoSearch>>, fallback: Arc<dyn VideoSearch>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl VideoSearch for HybridVideoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>, SearchError> {
        if let Some(primary) = &self.primary {
            match primary.search(query, max_results).await {
                Ok(records) if !records.is_empty() => return Ok(records),
                Ok(_) => info!("🔄 {} returned nothing for '{}', falling back", primary.name(), query),
                Err(SearchError::QuotaExhausted { used, limit }) => {
                    info!("🔄 API quota used ({}/{}), falling back to {}", used, limit, self.fallback.name())
                }
                Err(e) => warn!("⚠️ {} failed for '{}': {}, falling back", primary.name(), query, e),
            }
        }

        self.fallback.search(query, max_results).await
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
