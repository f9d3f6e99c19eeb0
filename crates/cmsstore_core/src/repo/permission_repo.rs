//! Node permission grants per principal.
//!
//! # Responsibility
//! - Read grants per principal over node sets (cached) and per node (uncached).
//! - Replace or extend grants in batches that respect the parameter limit.
//!
//! # Invariants
//! - Every write runs in one transaction scope and raises exactly one
//!   `PermissionsAssigned` notification once the outermost scope committed.
//! - Writes drop every cached entry of each affected principal.
//! - Concurrent replaces are last-writer-wins.

use super::base::MAX_PARAMETER_COUNT;
use super::schema_check::ensure_tables;
use super::{RepoError, RepoResult};
use crate::cache::{CacheItemPolicy, CachePriority, CacheRegistry, RuntimeCache};
use crate::db::{defer_until_commit, run_in_scope};
use crate::db::sql::placeholders;
use crate::events::{EventDispatcher, Notification};
use crate::model::node::NodeId;
use crate::model::permission::{EntityPermission, EntityPermissionSet, PrincipalId};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Lifetime of cached per-principal permission lookups.
pub const DEFAULT_PERMISSION_TTL: Duration = Duration::from_secs(20 * 60);

pub struct PermissionRepository<'conn> {
    conn: &'conn Connection,
    cache: Arc<RuntimeCache>,
    item_policy: CacheItemPolicy,
    events: Arc<EventDispatcher>,
}

impl<'conn> PermissionRepository<'conn> {
    pub fn try_new(
        conn: &'conn Connection,
        caches: &CacheRegistry,
        events: Arc<EventDispatcher>,
    ) -> RepoResult<Self> {
        ensure_tables(
            conn,
            &[("node_permissions", &["node_id", "principal_id", "permission"])],
        )?;
        Ok(Self {
            conn,
            cache: caches.for_type::<EntityPermission>(),
            item_policy: CacheItemPolicy::with_ttl(DEFAULT_PERMISSION_TTL, CachePriority::Low),
            events,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.item_policy = CacheItemPolicy::with_ttl(ttl, CachePriority::Low);
        self
    }

    /// Grants of `principal` on `ids`; empty `ids` means every node.
    pub fn get_for_entities(
        &self,
        principal: PrincipalId,
        ids: &[NodeId],
    ) -> RepoResult<Vec<EntityPermission>> {
        let ids: Vec<NodeId> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let key = cache_key(principal, &ids);
        if let Some(hit) = self.cache.get::<Vec<EntityPermission>>(&key) {
            return Ok(hit);
        }
        let grants = self.load_for_principal(principal, &ids)?;
        self.cache.insert(key, grants.clone(), self.item_policy);
        Ok(grants)
    }

    /// Every principal's grants on one node.
    pub fn get_for_entity(&self, id: NodeId) -> RepoResult<EntityPermissionSet> {
        let mut stmt = self.conn.prepare(
            "SELECT principal_id, permission
             FROM node_permissions
             WHERE node_id = ?1
             ORDER BY principal_id, permission;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut by_principal: BTreeMap<PrincipalId, Vec<char>> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let permission: String = row.get(1)?;
            by_principal
                .entry(row.get(0)?)
                .or_default()
                .push(parse_permission(&permission)?);
        }
        Ok(EntityPermissionSet {
            entity_id: id,
            permissions: by_principal
                .into_iter()
                .map(|(principal, chars)| EntityPermission::new(principal, id, &chars))
                .collect(),
        })
    }

    /// Replaces the grants of `principal` on every id with `permissions`.
    pub fn replace(
        &self,
        principal: PrincipalId,
        permissions: &[char],
        ids: &[NodeId],
    ) -> RepoResult<()> {
        let ids: BTreeSet<NodeId> = ids.iter().copied().collect();
        let ids: Vec<NodeId> = ids.into_iter().collect();

        run_in_scope(self.conn, |conn| {
            for batch in ids.chunks(MAX_PARAMETER_COUNT) {
                let mut values = vec![Value::Integer(principal)];
                values.extend(batch.iter().map(|id| Value::Integer(*id)));
                conn.execute(
                    &format!(
                        "DELETE FROM node_permissions WHERE principal_id = ? AND node_id IN ({});",
                        placeholders(batch.len())
                    ),
                    params_from_iter(values),
                )?;
                for id in batch {
                    for permission in permissions {
                        insert_grant(conn, *id, principal, *permission)?;
                    }
                }
            }
            Ok::<_, RepoError>(())
        })?;

        self.invalidate(&[principal]);
        let grants: Vec<EntityPermission> = ids
            .iter()
            .map(|id| EntityPermission::new(principal, *id, permissions))
            .collect();
        self.raise_assigned("replace", grants);
        Ok(())
    }

    /// Adds one permission for `principal` on every id, keeping other grants.
    pub fn assign(&self, principal: PrincipalId, permission: char, ids: &[NodeId]) -> RepoResult<()> {
        let ids: Vec<NodeId> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();

        run_in_scope(self.conn, |conn| {
            for id in &ids {
                conn.execute(
                    "INSERT INTO node_permissions (node_id, principal_id, permission)
                     SELECT ?1, ?2, ?3
                     WHERE NOT EXISTS (
                        SELECT 1 FROM node_permissions
                        WHERE node_id = ?1 AND principal_id = ?2 AND permission = ?3
                     );",
                    params![id, principal, permission.to_string()],
                )?;
            }
            Ok::<_, RepoError>(())
        })?;

        self.invalidate(&[principal]);
        let grants = if ids.is_empty() {
            Vec::new()
        } else {
            self.load_for_principal(principal, &ids)?
        };
        self.raise_assigned("assign", grants);
        Ok(())
    }

    /// Replaces every principal's grants on one node with `set`.
    pub fn replace_for_entity(&self, set: &EntityPermissionSet) -> RepoResult<()> {
        let previous: Vec<PrincipalId> = self
            .get_for_entity(set.entity_id)?
            .permissions
            .into_iter()
            .map(|grant| grant.principal_id)
            .collect();

        run_in_scope(self.conn, |conn| {
            conn.execute(
                "DELETE FROM node_permissions WHERE node_id = ?1;",
                [set.entity_id],
            )?;
            for grant in &set.permissions {
                for permission in &grant.permissions {
                    insert_grant(conn, set.entity_id, grant.principal_id, *permission)?;
                }
            }
            Ok::<_, RepoError>(())
        })?;

        let mut affected: BTreeSet<PrincipalId> = previous.into_iter().collect();
        affected.extend(set.permissions.iter().map(|grant| grant.principal_id));
        self.invalidate(&affected.into_iter().collect::<Vec<_>>());

        let grants: Vec<EntityPermission> = set
            .permissions
            .iter()
            .map(|grant| EntityPermission::new(grant.principal_id, set.entity_id, &grant.permissions))
            .collect();
        self.raise_assigned("replace_for_entity", grants);
        Ok(())
    }

    fn load_for_principal(
        &self,
        principal: PrincipalId,
        ids: &[NodeId],
    ) -> RepoResult<Vec<EntityPermission>> {
        let mut by_node: BTreeMap<NodeId, Vec<char>> = BTreeMap::new();
        if ids.is_empty() {
            let mut stmt = self.conn.prepare(
                "SELECT node_id, permission FROM node_permissions
                 WHERE principal_id = ?1
                 ORDER BY node_id, permission;",
            )?;
            let mut rows = stmt.query([principal])?;
            while let Some(row) = rows.next()? {
                let permission: String = row.get(1)?;
                by_node
                    .entry(row.get(0)?)
                    .or_default()
                    .push(parse_permission(&permission)?);
            }
        } else {
            for batch in ids.chunks(MAX_PARAMETER_COUNT) {
                let mut values = vec![Value::Integer(principal)];
                values.extend(batch.iter().map(|id| Value::Integer(*id)));
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT node_id, permission FROM node_permissions
                     WHERE principal_id = ? AND node_id IN ({})
                     ORDER BY node_id, permission;",
                    placeholders(batch.len())
                ))?;
                let mut rows = stmt.query(params_from_iter(values))?;
                while let Some(row) = rows.next()? {
                    let permission: String = row.get(1)?;
                    by_node
                        .entry(row.get(0)?)
                        .or_default()
                        .push(parse_permission(&permission)?);
                }
            }
        }

        Ok(by_node
            .into_iter()
            .map(|(node_id, chars)| EntityPermission::new(principal, node_id, &chars))
            .collect())
    }

    fn invalidate(&self, principals: &[PrincipalId]) {
        forget_principals(&self.cache, principals);
    }

    fn raise_assigned(&self, operation: &'static str, grants: Vec<EntityPermission>) {
        info!(
            "event=permissions_write module=repo status=ok operation={} grants={}",
            operation,
            grants.len()
        );
        let events = Arc::clone(&self.events);
        defer_until_commit(self.conn, move || {
            events.dispatch(&Notification::PermissionsAssigned {
                permissions: &grants,
            });
        });
    }
}

/// Drops every cached lookup of the given principals.
pub(crate) fn forget_principals(cache: &RuntimeCache, principals: &[PrincipalId]) {
    for principal in principals {
        cache.remove_by_prefix(&format!("permissions_{principal}_"));
    }
}

fn cache_key(principal: PrincipalId, sorted_ids: &[NodeId]) -> String {
    let ids = sorted_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("permissions_{principal}_{ids}")
}

fn insert_grant(
    conn: &Connection,
    node_id: NodeId,
    principal: PrincipalId,
    permission: char,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO node_permissions (node_id, principal_id, permission) VALUES (?1, ?2, ?3);",
        params![node_id, principal, permission.to_string()],
    )?;
    Ok(())
}

fn parse_permission(value: &str) -> RepoResult<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(permission), None) => Ok(permission),
        _ => Err(RepoError::InvalidData(format!(
            "invalid permission `{value}` in node_permissions.permission"
        ))),
    }
}
