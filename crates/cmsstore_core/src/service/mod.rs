//! Use-case services over the repositories.
//!
//! # Responsibility
//! - Combine repository writes, audit entries and notifications into single
//!   use-case calls.
//! - Keep callers (CLI, hosts) decoupled from unit-of-work plumbing.

pub mod content_service;

pub use content_service::{ContentService, SaveOutcome};
