use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PipelineError;
use crate::llm::{CredentialSet, LLMConfig, LLMProvider, CREDENTIAL_ENV_VARS};
use crate::pipeline::PipelineConfig;
use crate::store::{Environment, StorageBackend, StorageConfig};
use crate::video::VideoConfig;

/// Files tried in order by [`Config::load`]
pub const CONFIG_PATHS: [&str; 3] = [
    "course-path.toml",
    "config/course-path.toml",
    "/etc/course-path/config.toml",
];

/// Configuration for the course path generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generative model settings and credentials
    pub llm: LLMConfig,

    /// Video search backends
    pub video: VideoConfig,

    /// Document store
    pub storage: StorageConfig,

    /// Per-run processing
    pub pipeline: PipelineConfig,

    /// HTTP trigger surface
    pub server: ServerConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from the first readable config file (or defaults), then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                match Self::from_file(path) {
                    Ok(loaded) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config = loaded;
                        break;
                    }
                    Err(e) => tracing::warn!("Failed to load config file {}: {:#}", path, e),
                }
            }
        }

        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let keys: Vec<String> = CREDENTIAL_ENV_VARS.iter().filter_map(|name| get(*name)).collect();
        if !keys.is_empty() {
            self.llm.provider = LLMProvider::Gemini;
            self.llm.api_keys = keys;
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.llm.model = model;
        }

        if let Some(key) = get("YOUTUBE_API_KEY") {
            self.video.youtube_api_key = Some(key);
        }

        if let Some(env) = get("APP_ENV").or_else(|| get("ENV")) {
            match Environment::parse(&env) {
                Some(environment) => self.storage.environment = environment,
                None => tracing::warn!("Unknown environment '{}', keeping {:?}", env, self.storage.environment),
            }
        }
        if let Some(host) = get("MONGODB_HOST") {
            self.storage.host = host;
        }
        if let Some(port) = get("MONGODB_PORT") {
            match port.parse() {
                Ok(port) => self.storage.port = port,
                Err(_) => tracing::warn!("Ignoring invalid MONGODB_PORT '{}'", port),
            }
        }
        if let Some(uri) = get("MONGODB_CONNECTION_STRING") {
            self.storage.connection_string = Some(uri);
        }
        if let Some(name) = get("MONGODB_DATABASE_NAME") {
            self.storage.database_name = name;
        }

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT '{}'", port),
            }
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(workers) = get("COURSE_PATH_MAX_TOPIC_WORKERS") {
            match workers.parse() {
                Ok(workers) => self.pipeline.max_topic_workers = workers,
                Err(_) => tracing::warn!("Ignoring invalid COURSE_PATH_MAX_TOPIC_WORKERS '{}'", workers),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_topic_workers == 0 {
            return Err(anyhow!("pipeline.max_topic_workers must be greater than 0"));
        }

        if self.video.max_results == 0 {
            return Err(anyhow!("video.max_results must be greater than 0"));
        }

        if self.storage.backend == StorageBackend::Mongo {
            self.storage.mongo_uri()?;
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// The credential list; empty is a configuration error
    pub fn credentials(&self) -> std::result::Result<CredentialSet, PipelineError> {
        CredentialSet::new(self.llm.api_keys.iter().cloned())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Course Path Generator Configuration:\n\
            - LLM Provider: {:?} ({})\n\
            - API Keys: {}\n\
            - YouTube Data API: {}\n\
            - Videos per Topic: {}\n\
            - Storage: {:?} / {:?} / {}\n\
            - Topic Workers: {}\n\
            - Server: {}:{}\n\
            - Log Level: {}",
            self.llm.provider,
            self.llm.model,
            self.llm.api_keys.len(),
            if self.video.youtube_api_key.is_some() { "enabled" } else { "disabled" },
            self.video.max_results,
            self.storage.backend,
            self.storage.environment,
            self.storage.database_name,
            self.pipeline.max_topic_workers,
            self.server.host,
            self.server.port,
            self.logging.level,
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_api_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.llm.api_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_provider(mut self, provider: LLMProvider) -> Self {
        self.config.llm.provider = provider;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.llm.model = model.to_string();
        self
    }

    pub fn with_youtube_api_key(mut self, key: &str) -> Self {
        self.config.video.youtube_api_key = Some(key.to_string());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.video.max_results = max_results;
        self
    }

    pub fn with_topic_workers(mut self, workers: usize) -> Self {
        self.config.pipeline.max_topic_workers = workers;
        self
    }

    pub fn with_storage_backend(mut self, backend: StorageBackend) -> Self {
        self.config.storage.backend = backend;
        self
    }

    pub fn with_server(mut self, host: &str, port: u16) -> Self {
        self.config.server.host = host.to_string();
        self.config.server.port = port;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
