//! Versioned content persistence for a tree-structured CMS.
//! This crate owns the relational mapping, caching and unit-of-work rules
//! every caller relies on.

pub mod cache;
pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;

pub use cache::{CacheRegistry, RepositoryCachePolicy};
pub use config::{ConfigError, StoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, TransactionScope};
pub use events::{EventDispatcher, EventOutcome, Notification};
pub use logging::{default_log_level, init_logging};
pub use model::content::Content;
pub use model::content_type::ContentType;
pub use query::{FieldExt, Query};
pub use repo::{
    CachedLookup, ContentRepository, RecycleBinCapable, RepoError, RepoResult, Repository,
    UnitOfWork, UnitOfWorkWrites, Versionable,
};
pub use service::{ContentService, SaveOutcome};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
