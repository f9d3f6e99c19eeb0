//! Repository cache policies.
//!
//! A policy decides how lookups are memoized and how writes keep the cache
//! coherent. Loaders and persisters are passed per call so policies stay
//! independent of any repository type.

use super::runtime::{CacheItemPolicy, RuntimeCache};
use crate::model::entity::Entity;
use crate::repo::RepoResult;
use std::collections::HashMap;
use std::sync::Arc;

pub type GetOne<'a, E> = &'a dyn Fn(<E as Entity>::Id) -> RepoResult<Option<E>>;
pub type GetMany<'a, E> = &'a dyn Fn(&[<E as Entity>::Id]) -> RepoResult<Vec<E>>;
pub type ExistsOne<'a, E> = &'a dyn Fn(<E as Entity>::Id) -> RepoResult<bool>;

pub trait RepositoryCachePolicy<E: Entity>: Send + Sync {
    fn get(&self, id: E::Id, get_one: GetOne<'_, E>, get_many: GetMany<'_, E>) -> RepoResult<Option<E>>;

    /// Empty `ids` means every entity.
    fn get_all(&self, ids: &[E::Id], get_many: GetMany<'_, E>) -> RepoResult<Vec<E>>;

    fn exists(&self, id: E::Id, exists_one: ExistsOne<'_, E>, get_many: GetMany<'_, E>) -> RepoResult<bool>;

    /// Runs `persist`, then makes the cache reflect the outcome.
    fn create_or_update(
        &self,
        entity: &mut E,
        persist: &mut dyn FnMut(&mut E) -> RepoResult<()>,
    ) -> RepoResult<()>;

    fn remove(&self, entity: &E, persist: &mut dyn FnMut(&E) -> RepoResult<()>) -> RepoResult<()>;

    /// Drops whatever is cached for `id`.
    fn clear_entity(&self, id: E::Id);

    fn clear_all(&self);
}

fn cache_copy<E: Entity>(entity: &E) -> E {
    let mut copy = entity.clone();
    copy.reset_dirty_properties();
    copy
}

/// Per-id write-through caching.
pub struct DefaultCachePolicy {
    cache: Arc<RuntimeCache>,
    item_policy: CacheItemPolicy,
}

impl DefaultCachePolicy {
    pub fn new(cache: Arc<RuntimeCache>) -> Self {
        Self {
            cache,
            item_policy: CacheItemPolicy::default(),
        }
    }

    pub fn with_item_policy(mut self, item_policy: CacheItemPolicy) -> Self {
        self.item_policy = item_policy;
        self
    }

    fn key<E: Entity>(id: E::Id) -> String {
        format!("{}_{}", E::CACHE_PREFIX, id)
    }

    fn store<E: Entity>(&self, entity: &E) {
        if let Some(id) = entity.id() {
            self.cache
                .insert(Self::key::<E>(id), cache_copy(entity), self.item_policy);
        }
    }
}

impl<E: Entity> RepositoryCachePolicy<E> for DefaultCachePolicy {
    fn get(&self, id: E::Id, get_one: GetOne<'_, E>, _get_many: GetMany<'_, E>) -> RepoResult<Option<E>> {
        if let Some(hit) = self.cache.get::<E>(&Self::key::<E>(id)) {
            return Ok(Some(hit));
        }
        let loaded = get_one(id)?;
        if let Some(entity) = loaded.as_ref() {
            self.store(entity);
        }
        Ok(loaded)
    }

    fn get_all(&self, ids: &[E::Id], get_many: GetMany<'_, E>) -> RepoResult<Vec<E>> {
        if ids.is_empty() {
            let all = get_many(&[])?;
            for entity in &all {
                self.store(entity);
            }
            return Ok(all);
        }

        let mut found: HashMap<E::Id, E> = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.cache.get::<E>(&Self::key::<E>(*id)) {
                Some(hit) => {
                    found.insert(*id, hit);
                }
                None => missing.push(*id),
            }
        }

        if !missing.is_empty() {
            for entity in get_many(&missing)? {
                self.store(&entity);
                if let Some(id) = entity.id() {
                    found.insert(id, entity);
                }
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    fn exists(&self, id: E::Id, exists_one: ExistsOne<'_, E>, _get_many: GetMany<'_, E>) -> RepoResult<bool> {
        if self.cache.get::<E>(&Self::key::<E>(id)).is_some() {
            return Ok(true);
        }
        exists_one(id)
    }

    fn create_or_update(
        &self,
        entity: &mut E,
        persist: &mut dyn FnMut(&mut E) -> RepoResult<()>,
    ) -> RepoResult<()> {
        match persist(entity) {
            Ok(()) => {
                self.store(entity);
                Ok(())
            }
            Err(err) => {
                if let Some(id) = entity.id() {
                    self.cache.remove(&Self::key::<E>(id));
                }
                Err(err)
            }
        }
    }

    fn remove(&self, entity: &E, persist: &mut dyn FnMut(&E) -> RepoResult<()>) -> RepoResult<()> {
        let result = persist(entity);
        if let Some(id) = entity.id() {
            self.cache.remove(&Self::key::<E>(id));
        }
        result
    }

    fn clear_entity(&self, id: E::Id) {
        self.cache.remove(&Self::key::<E>(id));
    }

    fn clear_all(&self) {
        self.cache
            .remove_by_prefix(&format!("{}_", E::CACHE_PREFIX));
    }
}

/// Caches the whole collection under one key; any write drops it.
pub struct FullDataSetCachePolicy {
    cache: Arc<RuntimeCache>,
    item_policy: CacheItemPolicy,
}

impl FullDataSetCachePolicy {
    pub fn new(cache: Arc<RuntimeCache>) -> Self {
        Self {
            cache,
            item_policy: CacheItemPolicy::default(),
        }
    }

    fn key<E: Entity>() -> String {
        format!("{}_all", E::CACHE_PREFIX)
    }

    fn load_all<E: Entity>(&self, get_many: GetMany<'_, E>) -> RepoResult<Vec<E>> {
        if let Some(all) = self.cache.get::<Vec<E>>(&Self::key::<E>()) {
            return Ok(all);
        }
        let all = get_many(&[])?;
        let copies: Vec<E> = all.iter().map(cache_copy).collect();
        self.cache.insert(Self::key::<E>(), copies, self.item_policy);
        Ok(all)
    }

    fn invalidate<E: Entity>(&self) {
        self.cache.remove(&Self::key::<E>());
    }
}

impl<E: Entity> RepositoryCachePolicy<E> for FullDataSetCachePolicy {
    fn get(&self, id: E::Id, _get_one: GetOne<'_, E>, get_many: GetMany<'_, E>) -> RepoResult<Option<E>> {
        Ok(self
            .load_all(get_many)?
            .into_iter()
            .find(|entity| entity.id() == Some(id)))
    }

    fn get_all(&self, ids: &[E::Id], get_many: GetMany<'_, E>) -> RepoResult<Vec<E>> {
        let all = self.load_all(get_many)?;
        if ids.is_empty() {
            return Ok(all);
        }
        let mut by_id: HashMap<E::Id, E> = all
            .into_iter()
            .filter_map(|entity| entity.id().map(|id| (id, entity)))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn exists(&self, id: E::Id, _exists_one: ExistsOne<'_, E>, get_many: GetMany<'_, E>) -> RepoResult<bool> {
        Ok(self
            .load_all(get_many)?
            .iter()
            .any(|entity| entity.id() == Some(id)))
    }

    fn create_or_update(
        &self,
        entity: &mut E,
        persist: &mut dyn FnMut(&mut E) -> RepoResult<()>,
    ) -> RepoResult<()> {
        let result = persist(entity);
        self.invalidate::<E>();
        result
    }

    fn remove(&self, entity: &E, persist: &mut dyn FnMut(&E) -> RepoResult<()>) -> RepoResult<()> {
        let result = persist(entity);
        self.invalidate::<E>();
        result
    }

    fn clear_entity(&self, _id: E::Id) {
        self.invalidate::<E>();
    }

    fn clear_all(&self) {
        self.invalidate::<E>();
    }
}

/// Always goes to storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCachePolicy;

impl<E: Entity> RepositoryCachePolicy<E> for NoCachePolicy {
    fn get(&self, id: E::Id, get_one: GetOne<'_, E>, _get_many: GetMany<'_, E>) -> RepoResult<Option<E>> {
        get_one(id)
    }

    fn get_all(&self, ids: &[E::Id], get_many: GetMany<'_, E>) -> RepoResult<Vec<E>> {
        get_many(ids)
    }

    fn exists(&self, id: E::Id, exists_one: ExistsOne<'_, E>, _get_many: GetMany<'_, E>) -> RepoResult<bool> {
        exists_one(id)
    }

    fn create_or_update(
        &self,
        entity: &mut E,
        persist: &mut dyn FnMut(&mut E) -> RepoResult<()>,
    ) -> RepoResult<()> {
        persist(entity)
    }

    fn remove(&self, entity: &E, persist: &mut dyn FnMut(&E) -> RepoResult<()>) -> RepoResult<()> {
        persist(entity)
    }

    fn clear_entity(&self, _id: E::Id) {}

    fn clear_all(&self) {}
}
