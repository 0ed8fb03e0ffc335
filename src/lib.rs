//! Course Path Generator
//!
//! Builds multi-topic learning courses by chaining an LLM (topic enumeration),
//! a YouTube search backend (candidate discovery) and the same LLM again
//! (per-topic curation), then persists the linked course into a document store.
//! Runs are detached background jobs identified by a correlation id.

pub mod config;
pub mod error;
pub mod llm;
pub mod course;
pub mod topics;
pub mod video;
pub mod curation;
pub mod store;
pub mod persistence;
pub mod state;
pub mod pipeline;
pub mod jobs;

#[cfg(feature = "api")]
pub mod api;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{PersistenceError, PipelineError};
pub use crate::llm::{Credential, CredentialRotator, CredentialSet, GenerativeModel, LLMConfig, LLMProvider};
pub use crate::course::{AssembledCourse, CoursePath, Difficulty, GenerationRequest, Topic};
pub use crate::topics::TopicGenerator;
pub use crate::video::{VideoCandidate, VideoDiscovery, VideoSearch};
pub use crate::curation::{ContentCurator, CurationJudgment};
pub use crate::store::{DocumentStore, MemoryStore, MongoStore};
pub use crate::persistence::PersistenceGateway;
pub use crate::state::{RunState, RunStatus, RunTracker};
pub use crate::pipeline::{PipelineOrchestrator, RunReport};
pub use crate::jobs::{Accepted, CourseJobLauncher};
