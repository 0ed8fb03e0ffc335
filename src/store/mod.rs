//! Document store abstraction over named collections of JSON documents

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub const COURSES: &str = "courses";
pub const TOPICS: &str = "topics";
pub const USERS: &str = "users";
pub const PROGRESS: &str = "progress";
pub const RUNS: &str = "runs";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("field '{0}' exists and is not an array")]
    NotAnArray(String),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON conversion error: {0}")]
    Bson(#[from] bson::ser::Error),

    #[error("Store configuration error: {0}")]
    Configuration(String),
}

/// Free-form documents keyed by string id, grouped into named collections.
///
/// Every operation is atomic per document only.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the whole document stored under `id`
    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Add `value` to the array `field` unless already present.
    /// Returns `false` when no document with `id` exists.
    async fn add_to_set(&self, collection: &str, id: &str, field: &str, value: Value) -> Result<bool, StoreError>;

    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

/// Selects how the Mongo URI is resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// Required in production; may carry credentials so it is never written out
    #[serde(skip_serializing)]
    pub connection_string: Option<String>,
    pub database_name: String,
    pub server_selection_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Mongo,
            environment: Environment::Development,
            host: "localhost".to_string(),
            port: 27017,
            connection_string: None,
            database_name: "skillmateAiDb".to_string(),
            server_selection_timeout_ms: 8000,
        }
    }
}

impl StorageConfig {
    /// Development talks to `mongodb://{host}:{port}/`; production needs an explicit connection string
    pub fn mongo_uri(&self) -> Result<String, StoreError> {
        match self.environment {
            Environment::Development => Ok(format!("mongodb://{}:{}/", self.host, self.port)),
            Environment::Production => self
                .connection_string
                .as_deref()
                .map(str::trim)
                .filter(|uri| !uri.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::Configuration(
                        "MONGODB_CONNECTION_STRING is required in production".to_string(),
                    )
                }),
        }
    }
}

/// Build the configured store. Mongo connects lazily on first use.
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Mongo => Ok(Arc::new(MongoStore::new(
            config.mongo_uri()?,
            &config.database_name,
            config.server_selection_timeout_ms,
        ))),
    }
}
