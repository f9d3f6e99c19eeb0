//! Domain model for versioned, tree-structured content.
//!
//! # Responsibility
//! - Define the records repositories map to and from relational rows.
//! - Keep change tracking on entities so persistence can decide between
//!   in-place updates and new versions.
//!
//! # Invariants
//! - Every persisted entity exposes a stable identity through [`Entity::id`].
//! - A freshly loaded or cloned-from-cache entity reports no dirty fields.

pub mod audit;
pub mod content;
pub mod content_type;
pub mod domain;
pub mod entity;
pub mod node;
pub mod permission;
pub mod property;
pub mod tag;
