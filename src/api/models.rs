//! API data models

use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Body of `POST /api/v1/generate-course-path`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateCourseRequest {
    #[serde(default)]
    pub subject: String,

    #[serde(default, alias = "difficultyLevel", alias = "difficulty")]
    pub difficulty_level: String,

    #[serde(default, alias = "userId", alias = "user_id", alias = "requester")]
    pub requester_identity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_aliases() {
        let body: GenerateCourseRequest = serde_json::from_value(json!({
            "subject": "Algebra",
            "difficultyLevel": "beginner",
            "userId": "u1"
        }))
        .unwrap();
        assert_eq!(body.difficulty_level, "beginner");
        assert_eq!(body.requester_identity.as_deref(), Some("u1"));

        let body: GenerateCourseRequest = serde_json::from_value(json!({"subject": "Algebra"})).unwrap();
        assert!(body.difficulty_level.is_empty());
        assert!(body.requester_identity.is_none());
    }

    #[test]
    fn test_error_envelope() {
        let response: ApiResponse<()> = ApiResponse::error("bad".to_string());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "bad");
    }
}
