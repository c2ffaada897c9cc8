//! Task domain models: the ledger record, its index projection and the
//! validated payload that creates or edits one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{self, ValidationErrors};

/// Ledger revision counter. Starts at 1; every committed write increments it.
pub type Revision = i64;

/// A validated `{name, description}` pair.
///
/// Only constructible through [`TaskDraft::new`], so ledger code never sees
/// an out-of-range value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    name: String,
    description: String,
}

impl TaskDraft {
    /// Validate raw input. A missing description becomes the empty string.
    pub fn new(name: &str, description: Option<&str>) -> Result<Self, ValidationErrors> {
        let description = description.unwrap_or_default();
        let mut errors = ValidationErrors::new();
        validation::check_name(name, &mut errors);
        validation::check_description(description, &mut errors);
        errors.into_result()?;
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// The authoritative task entity held by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub revision: Revision,
}

impl TaskRecord {
    /// A fresh, pending record owned by `owner_id`.
    pub fn new(id: String, owner_id: &str, draft: &TaskDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: owner_id.to_string(),
            name: draft.name().to_string(),
            description: draft.description().to_string(),
            completed: false,
            created_at,
            revision: 1,
        }
    }

    /// The next revision with the draft's content applied.
    pub fn edited(&self, draft: &TaskDraft) -> Self {
        Self {
            name: draft.name().to_string(),
            description: draft.description().to_string(),
            revision: self.revision + 1,
            ..self.clone()
        }
    }

    /// The next revision marked completed.
    pub fn completed(&self) -> Self {
        Self {
            completed: true,
            revision: self.revision + 1,
            ..self.clone()
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// The search index's projection of a [`TaskRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&TaskRecord> for IndexRecord {
    fn from(record: &TaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            completed: record.completed,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> TaskDraft {
        TaskDraft::new(name, None).unwrap()
    }

    #[test]
    fn draft_defaults_description_to_empty() {
        assert_eq!(draft("Buy milk").description(), "");
    }

    #[test]
    fn draft_collects_every_field_error() {
        let err = TaskDraft::new("", Some(&"x".repeat(501))).unwrap_err();
        assert!(err.fields().contains_key("name"));
        assert!(err.fields().contains_key("description"));
    }

    #[test]
    fn new_record_is_pending_at_revision_one() {
        let record = TaskRecord::new("t1".into(), "u1", &draft("a"), Utc::now());
        assert!(!record.completed);
        assert_eq!(record.revision, 1);
        assert!(record.is_owned_by("u1"));
        assert!(!record.is_owned_by("u2"));
    }

    #[test]
    fn transitions_bump_revision_and_keep_identity() {
        let record = TaskRecord::new("t1".into(), "u1", &draft("a"), Utc::now());
        let edited = record.edited(&draft("b"));
        assert_eq!(edited.name, "b");
        assert_eq!(edited.revision, 2);
        let done = edited.completed();
        assert!(done.completed);
        assert_eq!(done.revision, 3);
        assert_eq!(done.id, record.id);
        assert_eq!(done.created_at, record.created_at);
    }

    #[test]
    fn projection_keeps_owner() {
        let record = TaskRecord::new("t1".into(), "u1", &draft("a"), Utc::now());
        let projected = IndexRecord::from(&record);
        assert_eq!(projected.id, "t1");
        assert_eq!(projected.owner_id, "u1");
    }
}
