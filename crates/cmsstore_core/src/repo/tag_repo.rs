//! Tag persistence keyed by node and property type.
//!
//! # Invariants
//! - A (tag, group) pair is stored once in `tags` and shared by every node.
//! - Replacing tags for a (node, property type) pair is all-or-nothing.
//! - Tag text is trimmed; blank tags are ignored.

use super::schema_check::ensure_tables;
use super::RepoResult;
use crate::db::run_in_scope;
use crate::model::node::NodeId;
use crate::model::tag::Tag;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

pub struct TagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> TagRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(
            conn,
            &[
                ("tags", &["id", "tag", "tag_group"]),
                ("tag_relationships", &["node_id", "tag_id", "property_type_id"]),
            ],
        )?;
        Ok(Self { conn })
    }

    /// Assigns `tags` to the node's property; `replace` drops existing links first.
    pub fn assign(
        &self,
        node_id: NodeId,
        property_type_id: i64,
        tags: &[Tag],
        replace: bool,
    ) -> RepoResult<()> {
        let normalized: BTreeSet<Tag> = tags
            .iter()
            .map(|tag| Tag::new(tag.group.trim(), tag.text.trim()))
            .filter(|tag| !tag.text.is_empty())
            .collect();

        run_in_scope(self.conn, |conn| {
            if replace {
                conn.execute(
                    "DELETE FROM tag_relationships WHERE node_id = ?1 AND property_type_id = ?2;",
                    params![node_id, property_type_id],
                )?;
            }
            for tag in &normalized {
                conn.execute(
                    "INSERT OR IGNORE INTO tags (tag, tag_group) VALUES (?1, ?2);",
                    params![tag.text, tag.group],
                )?;
                conn.execute(
                    "INSERT OR IGNORE INTO tag_relationships (node_id, tag_id, property_type_id)
                     SELECT ?1, id, ?2 FROM tags WHERE tag = ?3 AND tag_group = ?4;",
                    params![node_id, property_type_id, tag.text, tag.group],
                )?;
            }
            Ok(())
        })
    }

    /// Removes every tag link of the node.
    pub fn clear_for_node(&self, node_id: NodeId) -> RepoResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM tag_relationships WHERE node_id = ?1;", [node_id])?)
    }

    /// Tags linked to the node, sorted by group then text.
    pub fn get_for_node(&self, node_id: NodeId) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT t.tag_group, t.tag
             FROM tag_relationships tr
             INNER JOIN tags t ON t.id = tr.tag_id
             WHERE tr.node_id = ?1
             ORDER BY t.tag_group ASC, t.tag ASC;",
        )?;
        let mut rows = stmt.query([node_id])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(Tag::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?));
        }
        Ok(tags)
    }

    /// Tags in use by at least one node, optionally limited to one group.
    pub fn get_all(&self, group: Option<&str>) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT t.tag_group, t.tag
             FROM tags t
             INNER JOIN tag_relationships tr ON tr.tag_id = t.id
             WHERE ?1 IS NULL OR t.tag_group = ?1
             ORDER BY t.tag_group ASC, t.tag ASC;",
        )?;
        let mut rows = stmt.query([group])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(Tag::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?));
        }
        Ok(tags)
    }
}
