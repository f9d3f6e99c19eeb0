//! Repository layer over the content store.
//!
//! # Responsibility
//! - Map entities to relational rows behind capability traits.
//! - Route reads and writes through per-entity cache policies.
//! - Group writes into units of work that commit atomically.
//!
//! # Invariants
//! - Repositories verify the migrated schema in `try_new` before use.
//! - Cache entries written during a failed commit are cleared again.
//! - Repository APIs return semantic errors (`NotFound`, `Duplicate`,
//!   `Unsupported`) in addition to DB transport errors.

pub mod audit_repo;
pub mod base;
mod content_rows;
pub mod content_repo;
pub mod content_type_repo;
pub mod content_xml;
pub mod domain_repo;
mod error;
mod node_store;
pub mod permission_repo;
pub mod recycle_bin;
mod schema_check;
pub mod tag_repo;
pub mod unit_of_work;
pub mod versionable;

pub use audit_repo::{AuditField, AuditRepository};
pub use base::{CachedLookup, Repository, UnitOfWorkWrites, MAX_PARAMETER_COUNT};
pub use content_repo::{ContentField, ContentRepository, NewVersionRule, RebuildReport, SortDirection};
pub use content_type_repo::{ContentTypeField, ContentTypeRepository};
pub use content_xml::{ContentXmlSerializer, DefaultXmlSerializer};
pub use domain_repo::{CacheableDomainRepository, DomainField, DomainRepository};
pub use error::{RepoError, RepoResult};
pub use permission_repo::{PermissionRepository, DEFAULT_PERMISSION_TTL};
pub use recycle_bin::RecycleBinCapable;
pub use tag_repo::TagRepository;
pub use unit_of_work::{CommitContext, UnitOfWork};
pub use versionable::Versionable;
