//! Domain models.
//!
//! These are internal domain types, distinct from the camelCase DTOs the HTTP
//! layer serializes.

pub mod auth;
pub mod task;
