//! Field validation for task payloads.
//!
//! Validation runs at the boundary. Failures are collected per field rather
//! than stopping at the first one, so a client sees every problem at once.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ErrorKind;

/// Maximum task name length, in characters.
pub const NAME_MAX_CHARS: usize = 100;

/// Maximum task description length, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Field-level validation failures, keyed by field path (e.g. `name`, `[2].description`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`. The first message for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Merge `other` under a prefix, e.g. `[3]` yields `[3].name`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, message) in other.fields {
            self.add(format!("{prefix}.{field}"), message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ValidationFailed
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        write!(f, "validation failed ({})", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Check a task name: required, not blank, at most [`NAME_MAX_CHARS`] characters.
pub fn check_name(name: &str, errors: &mut ValidationErrors) {
    if name.trim().is_empty() {
        errors.add("name", "Name cannot be blank");
    } else if name.chars().count() > NAME_MAX_CHARS {
        errors.add(
            "name",
            format!("Name must be at most {NAME_MAX_CHARS} characters"),
        );
    }
}

/// Check a task description: at most [`DESCRIPTION_MAX_CHARS`] characters.
pub fn check_description(description: &str, errors: &mut ValidationErrors) {
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        errors.add(
            "description",
            format!("Description must be at most {DESCRIPTION_MAX_CHARS} characters"),
        );
    }
}
