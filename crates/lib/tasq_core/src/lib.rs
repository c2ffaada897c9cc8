//! # tasq_core
//!
//! Core domain logic for Tasq.
//!
//! Two concerns live here: stateless bearer-token authentication that resolves
//! to a live account ([`auth`]), and keeping the task ledger ([`ledger`]) and
//! the search mirror ([`index`]) consistent across concurrent writes
//! ([`sync`]).

pub mod auth;
pub mod config;
pub mod error;
pub mod index;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod store;
pub mod sync;
pub mod uuid;
pub mod validation;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
