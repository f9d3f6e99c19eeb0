//! Recycle bin capability and the node purge cascade.
//!
//! # Responsibility
//! - Move nodes under their object type's bin node.
//! - Permanently delete trashed nodes, their descendants and every row that
//!   references them.
//!
//! # Invariants
//! - Only the moved root carries `trashed = 1`; descendants are trashed by
//!   path containment.
//! - The purge runs as one ordered statement list in one scope; node rows
//!   go last.
//! - Purging an empty bin deletes nothing and succeeds.

use super::base::Repository;
use super::content_repo::ContentRepository;
use super::node_store;
use super::{RepoError, RepoResult};
use crate::cache::RepositoryCachePolicy;
use crate::db::run_in_scope;
use crate::model::content::Content;
use crate::model::node::{NodeId, ObjectType, CONTENT_RECYCLE_BIN_ID};
use crate::model::permission::PrincipalId;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use std::time::Instant;

/// Which nodes seed a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PurgeSeed {
    /// Every trashed node of the object type.
    Trashed,
    /// One node, trashed or not.
    Subtree(NodeId),
}

/// Rows a purge removed that other caches may still hold.
#[derive(Debug, Default)]
pub(crate) struct PurgeOutcome {
    pub deleted: usize,
    /// Principals that held grants on purged nodes.
    pub principals: Vec<PrincipalId>,
}

/// Cleanup statements keyed on `temp.purge_nodes`, in foreign-key order.
const PURGE_STATEMENTS: &[&str] = &[
    "DELETE FROM node_notifications WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM node_permissions WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM access_rules WHERE access_id IN (
        SELECT id FROM access WHERE node_id IN (SELECT id FROM temp.purge_nodes)
    );",
    "UPDATE access SET login_node_id = NULL WHERE login_node_id IN (SELECT id FROM temp.purge_nodes);",
    "UPDATE access SET no_access_node_id = NULL WHERE no_access_node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM access WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM relations WHERE parent_id IN (SELECT id FROM temp.purge_nodes)
        OR child_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM tag_relationships WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM domains WHERE root_node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM documents WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM property_data WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM preview_xml WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM content_xml WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM content_versions WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "DELETE FROM content WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "UPDATE audit_log SET node_id = NULL WHERE node_id IN (SELECT id FROM temp.purge_nodes);",
    "UPDATE nodes SET parent_id = NULL WHERE id IN (SELECT id FROM temp.purge_nodes);",
];

/// Deletes the seeded nodes and their same-type descendants. Callers
/// provide the transaction scope.
pub(crate) fn purge_nodes(conn: &Connection, object_type: ObjectType, seed: PurgeSeed) -> RepoResult<PurgeOutcome> {
    let object_type = object_type.as_db();
    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS purge_nodes (id INTEGER PRIMARY KEY);
         DELETE FROM temp.purge_nodes;",
    )?;

    match seed {
        PurgeSeed::Trashed => {
            conn.execute(
                "INSERT OR IGNORE INTO temp.purge_nodes (id)
                 SELECT id FROM nodes WHERE object_type = ?1 AND trashed = 1;",
                [&object_type],
            )?;
        }
        PurgeSeed::Subtree(id) => {
            conn.execute(
                "INSERT OR IGNORE INTO temp.purge_nodes (id)
                 SELECT id FROM nodes WHERE object_type = ?1 AND id = ?2;",
                params![object_type, id],
            )?;
        }
    }
    conn.execute(
        "INSERT OR IGNORE INTO temp.purge_nodes (id)
         SELECT d.id
         FROM nodes d
         INNER JOIN nodes seed ON d.path LIKE seed.path || ',%'
         WHERE seed.id IN (SELECT id FROM temp.purge_nodes)
           AND d.object_type = ?1;",
        [&object_type],
    )?;

    let principals = purged_principals(conn)?;
    for statement in PURGE_STATEMENTS {
        conn.execute(statement, [])?;
    }
    let deleted = conn.execute(
        "DELETE FROM nodes WHERE id IN (SELECT id FROM temp.purge_nodes);",
        [],
    )?;
    conn.execute("DELETE FROM temp.purge_nodes;", [])?;
    Ok(PurgeOutcome { deleted, principals })
}

fn purged_principals(conn: &Connection) -> RepoResult<Vec<PrincipalId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT principal_id FROM node_permissions
         WHERE node_id IN (SELECT id FROM temp.purge_nodes)
         ORDER BY principal_id;",
    )?;
    let mut rows = stmt.query([])?;
    let mut principals = Vec::new();
    while let Some(row) = rows.next()? {
        principals.push(row.get(0)?);
    }
    Ok(principals)
}

/// Whether `path` lies below the bin node of `object_type`.
pub(crate) fn is_below_recycle_bin(conn: &Connection, object_type: ObjectType, path: &str) -> RepoResult<bool> {
    let Some(bin_id) = object_type.recycle_bin_id() else {
        return Ok(false);
    };
    let bin = node_store::require_node(conn, bin_id)?;
    Ok(path.starts_with(&format!("{},", bin.path)))
}

pub trait RecycleBinCapable: Repository {
    /// Bin node trashed entities are moved under.
    fn recycle_bin_id(&self) -> NodeId;

    /// Entities in the bin, including descendants of trashed roots.
    fn get_recycle_bin_items(&self) -> RepoResult<Vec<Self::Entity>>;

    /// Re-parents the entity under the bin and flags it trashed.
    fn move_to_recycle_bin(&self, id: NodeId) -> RepoResult<()>;

    /// Permanently deletes everything in the bin; returns removed node count.
    fn empty_recycle_bin(&self) -> RepoResult<usize>;
}

impl RecycleBinCapable for ContentRepository<'_> {
    fn recycle_bin_id(&self) -> NodeId {
        CONTENT_RECYCLE_BIN_ID
    }

    fn get_recycle_bin_items(&self) -> RepoResult<Vec<Content>> {
        let bin = node_store::require_node(self.conn, self.recycle_bin_id())?;
        let base = self
            .base_query()
            .where_clause("d.newest = 1", Vec::new())
            .where_clause(
                "n.path LIKE ? || ',%'",
                vec![Value::Text(bin.path)],
            )
            .order_by("n.level")
            .order_by("n.id");
        self.assemble(base)
    }

    fn move_to_recycle_bin(&self, id: NodeId) -> RepoResult<()> {
        if !self.perform_exists(id)? {
            return Err(RepoError::NotFound {
                entity: Self::ENTITY_NAME,
                id: id.to_string(),
            });
        }
        let bin_id = self.recycle_bin_id();
        let moved = run_in_scope(self.conn, |conn| {
            let moved = node_store::move_node(conn, id, bin_id)?;
            node_store::set_trashed(conn, id, true)?;
            conn.execute(
                "UPDATE documents SET published = 0
                 WHERE published = 1
                   AND node_id IN (SELECT id FROM nodes WHERE id = ?1 OR path LIKE ?2 || ',%');",
                params![id, moved.node.path],
            )?;
            conn.execute(
                "DELETE FROM content_xml
                 WHERE node_id IN (SELECT id FROM nodes WHERE id = ?1 OR path LIKE ?2 || ',%');",
                params![id, moved.node.path],
            )?;
            conn.execute(
                "DELETE FROM tag_relationships
                 WHERE node_id IN (SELECT id FROM nodes WHERE id = ?1 OR path LIKE ?2 || ',%');",
                params![id, moved.node.path],
            )?;
            Ok::<_, RepoError>(moved)
        })?;

        self.forget(&moved.affected);
        info!(
            "event=recycle_bin_move module=repo status=ok node_id={} affected={}",
            id,
            moved.affected.len()
        );
        Ok(())
    }

    fn empty_recycle_bin(&self) -> RepoResult<usize> {
        let started_at = Instant::now();
        let outcome = run_in_scope(self.conn, |conn| {
            purge_nodes(conn, ObjectType::Document, PurgeSeed::Trashed)
        })?;
        RepositoryCachePolicy::<Content>::clear_all(&self.cache);
        self.forget_purged(&outcome);
        let deleted = outcome.deleted;
        info!(
            "event=recycle_bin_empty module=repo status=ok deleted_nodes={} duration_ms={}",
            deleted,
            started_at.elapsed().as_millis()
        );
        Ok(deleted)
    }
}
