//! Tree bookkeeping on the `nodes` table.
//!
//! # Invariants
//! - `path == parent.path + "," + id` and `level == parent.level + 1` after
//!   every insert and move, for the node and all of its descendants.
//! - New nodes get `max(sibling sort_order) + 1`.
//! - A node cannot be moved below itself.

use super::{RepoError, RepoResult};
use crate::model::node::{child_path, path_ids, Node, NodeId, ObjectType};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const NODE_COLUMNS: &str =
    "id, unique_id, parent_id, level, path, sort_order, trashed, created_by, text, object_type, created_at";

pub(crate) struct NewNode<'a> {
    pub unique_id: Uuid,
    pub parent_id: NodeId,
    pub object_type: ObjectType,
    pub created_by: i64,
    pub text: &'a str,
    pub created_at: i64,
}

/// Result of a move: the node as stored and every id whose path changed.
pub(crate) struct MovedNode {
    pub node: Node,
    pub affected: Vec<NodeId>,
}

pub(crate) fn load_node(conn: &Connection, id: NodeId) -> RepoResult<Option<Node>> {
    let node = conn
        .query_row(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1;"),
            [id],
            |row| Ok(read_node(row)),
        )
        .optional()?;
    node.transpose()
}

pub(crate) fn require_node(conn: &Connection, id: NodeId) -> RepoResult<Node> {
    load_node(conn, id)?.ok_or_else(|| RepoError::NotFound {
        entity: "node",
        id: id.to_string(),
    })
}

pub(crate) fn insert_node(conn: &Connection, new: &NewNode<'_>) -> RepoResult<Node> {
    let parent = require_node(conn, new.parent_id)?;
    let sort_order = next_sort_order(conn, parent.id)?;
    let level = parent.level + 1;

    // path is completed once the id is known
    conn.execute(
        "INSERT INTO nodes (
            unique_id, parent_id, level, path, sort_order, trashed,
            created_by, text, object_type, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9);",
        params![
            new.unique_id.to_string(),
            parent.id,
            level,
            parent.path,
            sort_order,
            new.created_by,
            new.text,
            new.object_type.as_db(),
            new.created_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let path = child_path(&parent.path, id);
    conn.execute("UPDATE nodes SET path = ?1 WHERE id = ?2;", params![path, id])?;

    Ok(Node {
        id,
        unique_id: new.unique_id,
        parent_id: Some(parent.id),
        path,
        level,
        sort_order,
        trashed: false,
        created_by: Some(new.created_by),
        text: Some(new.text.to_string()),
        object_type: new.object_type,
        created_at: new.created_at,
    })
}

pub(crate) fn next_sort_order(conn: &Connection, parent_id: NodeId) -> RepoResult<i32> {
    let next: i32 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM nodes WHERE parent_id = ?1;",
        [parent_id],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Re-parents `id` under `new_parent_id` and rewrites descendant paths.
pub(crate) fn move_node(conn: &Connection, id: NodeId, new_parent_id: NodeId) -> RepoResult<MovedNode> {
    let node = require_node(conn, id)?;
    let parent = require_node(conn, new_parent_id)?;
    if path_ids(&parent.path).contains(&id) {
        return Err(RepoError::InvalidData(format!(
            "node {id} cannot be moved below itself (target {new_parent_id})"
        )));
    }

    let old_path = node.path.clone();
    let new_path = child_path(&parent.path, id);
    let new_level = parent.level + 1;
    let level_delta = new_level - node.level;
    let sort_order = if node.parent_id == Some(parent.id) {
        node.sort_order
    } else {
        next_sort_order(conn, parent.id)?
    };

    let descendants = descendant_ids(conn, &old_path)?;
    conn.execute(
        "UPDATE nodes
         SET parent_id = ?1, path = ?2, level = ?3, sort_order = ?4
         WHERE id = ?5;",
        params![parent.id, new_path, new_level, sort_order, id],
    )?;
    conn.execute(
        "UPDATE nodes
         SET path = ?1 || substr(path, length(?2) + 1),
             level = level + ?3
         WHERE path LIKE ?2 || ',%';",
        params![new_path, old_path, level_delta],
    )?;

    let mut affected = Vec::with_capacity(descendants.len() + 1);
    affected.push(id);
    affected.extend(descendants);
    Ok(MovedNode {
        node: require_node(conn, id)?,
        affected,
    })
}

/// Ids of every node strictly below `path`.
pub(crate) fn descendant_ids(conn: &Connection, path: &str) -> RepoResult<Vec<NodeId>> {
    let mut stmt = conn.prepare("SELECT id FROM nodes WHERE path LIKE ?1 || ',%' ORDER BY level, id;")?;
    let mut rows = stmt.query([path])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

pub(crate) fn set_trashed(conn: &Connection, id: NodeId, trashed: bool) -> RepoResult<()> {
    conn.execute(
        "UPDATE nodes SET trashed = ?1 WHERE id = ?2;",
        params![trashed, id],
    )?;
    Ok(())
}

pub(crate) fn update_text_and_sort(
    conn: &Connection,
    id: NodeId,
    text: &str,
    sort_order: i32,
) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE nodes SET text = ?1, sort_order = ?2 WHERE id = ?3;",
        params![text, sort_order, id],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound {
            entity: "node",
            id: id.to_string(),
        });
    }
    Ok(())
}

fn read_node(row: &Row<'_>) -> RepoResult<Node> {
    let unique_id: String = row.get("unique_id")?;
    let object_type: String = row.get("object_type")?;
    Ok(Node {
        id: row.get("id")?,
        unique_id: parse_uuid(&unique_id, "nodes.unique_id")?,
        parent_id: row.get("parent_id")?,
        path: row.get("path")?,
        level: row.get("level")?,
        sort_order: row.get("sort_order")?,
        trashed: row.get("trashed")?,
        created_by: row.get("created_by")?,
        text: row.get("text")?,
        object_type: parse_uuid(&object_type, "nodes.object_type")
            .ok()
            .and_then(ObjectType::from_guid)
            .ok_or_else(|| {
                RepoError::InvalidData(format!("unknown object type `{object_type}`"))
            })?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
