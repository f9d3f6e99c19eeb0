//! Repository capability traits.
//!
//! # Responsibility
//! - `Repository`: per-entity persistence primitives and its cache policy.
//! - `CachedLookup`: reads routed through the cache policy.
//! - `UnitOfWorkWrites`: add/update/delete registered with a unit of work.
//!
//! # Invariants
//! - Bulk lookups bind at most [`MAX_PARAMETER_COUNT`] ids; larger requests
//!   fail before any query runs.
//! - Forbidden writes fail at registration; nothing is queued.

use super::unit_of_work::UnitOfWork;
use super::{RepoError, RepoResult};
use crate::cache::RepositoryCachePolicy;
use crate::model::entity::Entity;
use crate::query::{Query, QueryField};

/// Upper bound of bound parameters per statement.
pub const MAX_PARAMETER_COUNT: usize = 2000;

pub fn check_parameter_limit(requested: usize) -> RepoResult<()> {
    if requested > MAX_PARAMETER_COUNT {
        return Err(RepoError::ParameterLimit {
            requested,
            max: MAX_PARAMETER_COUNT,
        });
    }
    Ok(())
}

/// Persistence primitives supplied by each concrete repository.
pub trait Repository {
    type Entity: Entity;
    type Field: QueryField;

    /// Entity name used in errors and log lines.
    const ENTITY_NAME: &'static str;

    fn cache_policy(&self) -> &dyn RepositoryCachePolicy<Self::Entity>;

    fn perform_get(&self, id: <Self::Entity as Entity>::Id) -> RepoResult<Option<Self::Entity>>;
    /// Empty `ids` loads every entity.
    fn perform_get_all(&self, ids: &[<Self::Entity as Entity>::Id]) -> RepoResult<Vec<Self::Entity>>;
    fn perform_get_by_query(&self, query: &Query<Self::Field>) -> RepoResult<Vec<Self::Entity>>;
    fn perform_exists(&self, id: <Self::Entity as Entity>::Id) -> RepoResult<bool>;
    fn perform_count(&self, query: &Query<Self::Field>) -> RepoResult<u64>;

    fn persist_new(&self, entity: &mut Self::Entity) -> RepoResult<()>;
    fn persist_updated(&self, entity: &mut Self::Entity) -> RepoResult<()>;
    fn persist_deleted(&self, entity: &Self::Entity) -> RepoResult<()>;

    fn supports_update(&self) -> bool {
        true
    }

    fn supports_delete(&self) -> bool {
        true
    }
}

/// Cached read operations available on every repository.
pub trait CachedLookup: Repository {
    fn get(&self, id: <Self::Entity as Entity>::Id) -> RepoResult<Option<Self::Entity>> {
        self.cache_policy().get(
            id,
            &|id| self.perform_get(id),
            &|ids| self.perform_get_all(ids),
        )
    }

    /// Empty `ids` returns every entity; missing ids are absent from the result.
    fn get_all(&self, ids: &[<Self::Entity as Entity>::Id]) -> RepoResult<Vec<Self::Entity>> {
        check_parameter_limit(ids.len())?;
        self.cache_policy()
            .get_all(ids, &|ids| self.perform_get_all(ids))
    }

    fn get_by_query(&self, query: &Query<Self::Field>) -> RepoResult<Vec<Self::Entity>> {
        self.perform_get_by_query(query)
    }

    fn exists(&self, id: <Self::Entity as Entity>::Id) -> RepoResult<bool> {
        self.cache_policy().exists(
            id,
            &|id| self.perform_exists(id),
            &|ids| self.perform_get_all(ids),
        )
    }

    fn count(&self, query: &Query<Self::Field>) -> RepoResult<u64> {
        self.perform_count(query)
    }
}

impl<R: Repository + ?Sized> CachedLookup for R {}

/// Writes registered with a [`UnitOfWork`] and executed on commit.
pub trait UnitOfWorkWrites: Repository + Sized {
    fn add_or_update<'a>(
        &'a self,
        uow: &mut UnitOfWork<'a>,
        entity: &'a mut Self::Entity,
    ) -> RepoResult<()> {
        let is_new = !entity.has_identity();
        if !is_new && !self.supports_update() {
            return Err(RepoError::Unsupported {
                entity: Self::ENTITY_NAME,
                operation: "update",
            });
        }

        let work = move |ctx: &mut super::unit_of_work::CommitContext<'a>| {
            let policy = self.cache_policy();
            policy.create_or_update(entity, &mut |entity| {
                if is_new {
                    self.persist_new(entity)
                } else {
                    self.persist_updated(entity)
                }
            })?;
            if let Some(id) = entity.id() {
                ctx.on_rollback(move || policy.clear_entity(id));
            }
            Ok(())
        };

        if is_new {
            uow.register_added(Self::ENTITY_NAME, work);
        } else {
            uow.register_changed(Self::ENTITY_NAME, work);
        }
        Ok(())
    }

    fn delete<'a>(&'a self, uow: &mut UnitOfWork<'a>, entity: &'a Self::Entity) -> RepoResult<()> {
        if !self.supports_delete() {
            return Err(RepoError::Unsupported {
                entity: Self::ENTITY_NAME,
                operation: "delete",
            });
        }

        uow.register_removed(Self::ENTITY_NAME, move |_| {
            self.cache_policy()
                .remove(entity, &mut |entity| self.persist_deleted(entity))
        });
        Ok(())
    }
}

impl<R: Repository> UnitOfWorkWrites for R {}
