//! Stable error kinds shared by every core error type.
//!
//! The transport layer maps these to protocol status codes; the string form is
//! part of the public error body and must not change.

use std::fmt;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad, expired or missing credential, or a credential naming an unknown account.
    Unauthenticated,
    /// No record owned by the caller matches.
    NotFound,
    /// Content edit attempted on a completed record.
    AlreadyCompleted,
    /// Payload violates field constraints.
    ValidationFailed,
    /// Ledger committed; index write not yet confirmed.
    PropagationFault,
    /// Timeout or connection failure from a backing store.
    StoreUnavailable,
}

impl ErrorKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyCompleted => "already_completed",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::PropagationFault => "propagation_fault",
            ErrorKind::StoreUnavailable => "store_unavailable",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::StoreUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_unavailable_is_retryable() {
        assert!(ErrorKind::StoreUnavailable.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::AlreadyCompleted.is_retryable());
        assert!(!ErrorKind::Unauthenticated.is_retryable());
    }

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(ErrorKind::AlreadyCompleted.to_string(), "already_completed");
        assert_eq!(ErrorKind::PropagationFault.as_str(), "propagation_fault");
    }
}
