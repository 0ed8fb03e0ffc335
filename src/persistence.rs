//! Writes an assembled course into the document store as linked records

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::course::{AssembledCourse, ProgressRecord};
use crate::error::PersistenceError;
use crate::store::{DocumentStore, COURSES, PROGRESS, TOPICS, USERS};

/// User fields that receive back-references
pub const CREATED_COURSES_FIELD: &str = "createdCourses";
pub const ENROLLED_COURSES_FIELD: &str = "enrolledCourses";
pub const PROGRESS_FIELD: &str = "courseProgress";

pub struct PersistenceGateway {
    store: Arc<dyn DocumentStore>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Persist topics, then the course that references them, then the optional
    /// user links. Topic or course write failures abort; nothing already
    /// written is rolled back. User links are best-effort.
    pub async fn persist(
        &self,
        course: &AssembledCourse,
        requester: Option<&str>,
    ) -> Result<Uuid, PersistenceError> {
        for topic in &course.topics {
            let document = serde_json::to_value(topic)?;
            self.store
                .put(TOPICS, &topic.id.to_string(), document)
                .await
                .map_err(|source| PersistenceError::Topic {
                    topic_id: topic.id,
                    source,
                })?;
        }

        let course_path = &course.course_path;
        let course_id = course_path.id;
        self.store
            .put(COURSES, &course_id.to_string(), serde_json::to_value(course_path)?)
            .await
            .map_err(|source| PersistenceError::Course { course_id, source })?;

        info!(
            "💾 Persisted course {} with {} topics",
            course_id,
            course.topics.len()
        );

        if let Some(user_id) = requester.map(str::trim).filter(|u| !u.is_empty()) {
            self.link_user(user_id, course).await;
        }

        Ok(course_id)
    }

    async fn link_user(&self, user_id: &str, course: &AssembledCourse) {
        let course_id = course.course_path.id.to_string();

        match self.store.get(USERS, user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("👤 Requester '{}' is not a known user, skipping user links", user_id);
                return;
            }
            Err(e) => {
                warn!("⚠️ Could not look up user '{}': {}", user_id, e);
                return;
            }
        }

        self.add_reference(user_id, CREATED_COURSES_FIELD, &course_id).await;
        self.add_reference(user_id, ENROLLED_COURSES_FIELD, &course_id).await;

        let progress_id = ProgressRecord::id_for(user_id, course.course_path.id).to_string();
        match self.store.get(PROGRESS, &progress_id).await {
            Ok(Some(_)) => info!("📈 Progress record {} already exists", progress_id),
            Ok(None) => {
                let record = ProgressRecord::seed(user_id, &course.course_path, Utc::now());
                let written = match serde_json::to_value(&record) {
                    Ok(document) => self.store.put(PROGRESS, &progress_id, document).await,
                    Err(e) => {
                        warn!("⚠️ Could not serialize progress record: {}", e);
                        return;
                    }
                };
                if let Err(e) = written {
                    warn!("⚠️ Failed to create progress record for '{}': {}", user_id, e);
                    return;
                }
                info!("📈 Created progress record {} for '{}'", progress_id, user_id);
            }
            Err(e) => {
                warn!("⚠️ Could not check progress record {}: {}", progress_id, e);
                return;
            }
        }

        self.add_reference(user_id, PROGRESS_FIELD, &progress_id).await;
    }

    async fn add_reference(&self, user_id: &str, field: &str, value: &str) {
        match self
            .store
            .add_to_set(USERS, user_id, field, Value::String(value.to_string()))
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("⚠️ User '{}' disappeared before {} was updated", user_id, field),
            Err(e) => warn!("⚠️ Failed to update {} for '{}': {}", field, user_id, e),
        }
    }
}
