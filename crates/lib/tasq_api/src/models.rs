//! Request and response bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasq_core::models::task::{IndexRecord, TaskDraft, TaskRecord};
use tasq_core::validation::ValidationErrors;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Create or edit payload. A missing name fails validation like a blank one.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl TaskInput {
    pub fn to_draft(&self) -> Result<TaskDraft, ValidationErrors> {
        TaskDraft::new(&self.name, self.description.as_deref())
    }
}

/// Validate a batch, keying each failure by position (`[i].name`).
pub fn drafts_from_inputs(inputs: &[TaskInput]) -> Result<Vec<TaskDraft>, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut drafts = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        match input.to_draft() {
            Ok(draft) => drafts.push(draft),
            Err(e) => errors.merge_prefixed(&format!("[{i}]"), e),
        }
    }
    errors.into_result()?;
    Ok(drafts)
}

/// `?name=` is required; an empty value is a valid fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
}

impl SearchQuery {
    pub fn fragment(self) -> Result<String, ValidationErrors> {
        self.name.ok_or_else(|| {
            let mut errors = ValidationErrors::new();
            errors.add("name", "query parameter is required");
            errors
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
}

impl From<TaskRecord> for TaskResponse {
    fn from(r: TaskRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            completed: r.completed,
            created_at: r.created_at,
            user_id: r.owner_id,
        }
    }
}

impl From<IndexRecord> for TaskResponse {
    fn from(r: IndexRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            completed: r.completed,
            created_at: r.created_at,
            user_id: r.owner_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> TaskInput {
        TaskInput {
            name: name.to_string(),
            description: None,
        }
    }

    #[test]
    fn batch_validation_reports_every_bad_position() {
        let err = drafts_from_inputs(&[input("ok"), input(""), input(&"x".repeat(101))]).unwrap_err();
        let fields = err.fields();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("[1].name"));
        assert!(fields.contains_key("[2].name"));
    }

    #[test]
    fn task_json_is_camel_case() {
        let json = serde_json::to_value(TaskResponse {
            id: "t1".into(),
            name: "a".into(),
            description: String::new(),
            completed: false,
            created_at: Utc::now(),
            user_id: "u1".into(),
        })
        .unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["userId"], "u1");
    }
}
