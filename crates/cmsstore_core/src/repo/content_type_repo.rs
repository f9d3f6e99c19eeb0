//! Content type (document type) repository.
//!
//! # Responsibility
//! - Persist content types as `DocumentType` nodes plus their property types.
//! - Serve cached content type lookups to content assembly.
//!
//! # Invariants
//! - Aliases are validated and unique before any row is written.
//! - A content type still used by documents cannot be deleted.

use super::base::Repository;
use super::node_store::{self, parse_uuid, NewNode};
use super::schema_check::ensure_tables;
use super::{RepoError, RepoResult};
use crate::cache::{CacheRegistry, DefaultCachePolicy, RepositoryCachePolicy};
use crate::db::{now_epoch_ms, run_in_scope, SqlBuilder};
use crate::model::content_type::{ContentType, PropertyType};
use crate::model::node::{NodeId, ObjectType, ROOT_NODE_ID};
use crate::model::property::StorageKind;
use crate::query::{ColumnMap, FieldExt, Query, QueryField, QueryTranslator};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTypeField {
    Id,
    Key,
    Alias,
    Name,
}

impl QueryField for ContentTypeField {
    const ALL: &'static [Self] = &[Self::Id, Self::Key, Self::Alias, Self::Name];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Key => "key",
            Self::Alias => "alias",
            Self::Name => "name",
        }
    }
}

pub struct ContentTypeRepository<'conn> {
    conn: &'conn Connection,
    columns: ColumnMap<ContentTypeField>,
    cache: DefaultCachePolicy,
}

impl<'conn> ContentTypeRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, caches: &CacheRegistry) -> RepoResult<Self> {
        ensure_tables(
            conn,
            &[
                ("content_types", &["node_id", "alias", "icon", "description"]),
                (
                    "property_types",
                    &["id", "content_type_id", "alias", "name", "storage_kind", "tag_group", "sort_order"],
                ),
            ],
        )?;
        let columns = ColumnMap::new("content_type")
            .map(ContentTypeField::Id, "n.id")
            .map(ContentTypeField::Key, "n.unique_id")
            .map(ContentTypeField::Alias, "ct.alias")
            .map(ContentTypeField::Name, "n.text");
        columns.validate()?;

        Ok(Self {
            conn,
            columns,
            cache: DefaultCachePolicy::new(caches.for_type::<ContentType>()),
        })
    }

    pub fn get_by_alias(&self, alias: &str) -> RepoResult<Option<ContentType>> {
        let query = Query::new().filter(ContentTypeField::Alias.equals(alias));
        Ok(self.perform_get_by_query(&query)?.into_iter().next())
    }

    fn base_query(&self) -> SqlBuilder {
        SqlBuilder::select([
            "n.id",
            "n.unique_id",
            "n.text",
            "n.created_by",
            "ct.alias",
            "ct.icon",
            "ct.description",
        ])
        .from("nodes n")
        .inner_join("content_types ct", "ct.node_id = n.id")
        .where_clause(
            "n.object_type = ?",
            vec![Value::Text(ObjectType::DocumentType.as_db())],
        )
        .order_by("n.id")
    }

    fn load(&self, base: SqlBuilder) -> RepoResult<Vec<ContentType>> {
        let (sql, params) = base.build();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut types = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get("unique_id")?;
            types.push(ContentType {
                id: Some(row.get("id")?),
                key: parse_uuid(&key, "nodes.unique_id")?,
                alias: row.get("alias")?,
                name: row.get::<_, Option<String>>("text")?.unwrap_or_default(),
                icon: row.get("icon")?,
                description: row.get("description")?,
                property_types: Vec::new(),
                created_by: row.get::<_, Option<i64>>("created_by")?.unwrap_or_default(),
            });
        }
        if types.is_empty() {
            return Ok(types);
        }

        let (ids_sql, ids_params) = base.with_select(["n.id"]).clear_order_by().build();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, content_type_id, alias, name, storage_kind, tag_group, sort_order
             FROM property_types
             WHERE content_type_id IN ({ids_sql})
             ORDER BY content_type_id, sort_order, id;"
        ))?;
        let mut rows = stmt.query(params_from_iter(ids_params))?;
        let mut by_type: HashMap<NodeId, Vec<PropertyType>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let storage: String = row.get("storage_kind")?;
            let property_type = PropertyType {
                id: Some(row.get("id")?),
                alias: row.get("alias")?,
                name: row.get("name")?,
                storage: StorageKind::from_db(&storage).ok_or_else(|| {
                    RepoError::InvalidData(format!("unknown storage kind `{storage}`"))
                })?,
                tag_group: row.get("tag_group")?,
                sort_order: row.get("sort_order")?,
            };
            by_type
                .entry(row.get("content_type_id")?)
                .or_default()
                .push(property_type);
        }

        for content_type in &mut types {
            if let Some(id) = content_type.id {
                content_type.property_types = by_type.remove(&id).unwrap_or_default();
            }
        }
        Ok(types)
    }

    fn ensure_alias_free(&self, alias: &str, own_id: Option<NodeId>) -> RepoResult<()> {
        let taken: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM content_types
                WHERE alias = ?1 COLLATE NOCASE AND node_id <> ?2
            );",
            params![alias, own_id.unwrap_or_default()],
            |row| row.get(0),
        )?;
        if taken == 1 {
            return Err(RepoError::Duplicate {
                entity: "content_type",
                value: alias.to_string(),
            });
        }
        Ok(())
    }

    fn insert_property_type(
        conn: &Connection,
        content_type_id: NodeId,
        property_type: &mut PropertyType,
    ) -> RepoResult<()> {
        conn.execute(
            "INSERT INTO property_types (content_type_id, alias, name, storage_kind, tag_group, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                content_type_id,
                property_type.alias,
                property_type.name,
                property_type.storage.as_db(),
                property_type.tag_group,
                property_type.sort_order,
            ],
        )?;
        property_type.id = Some(conn.last_insert_rowid());
        Ok(())
    }
}

impl Repository for ContentTypeRepository<'_> {
    type Entity = ContentType;
    type Field = ContentTypeField;
    const ENTITY_NAME: &'static str = "content_type";

    fn cache_policy(&self) -> &dyn RepositoryCachePolicy<ContentType> {
        &self.cache
    }

    fn perform_get(&self, id: NodeId) -> RepoResult<Option<ContentType>> {
        let base = self.base_query().where_clause("n.id = ?", vec![Value::Integer(id)]);
        Ok(self.load(base)?.into_iter().next())
    }

    fn perform_get_all(&self, ids: &[NodeId]) -> RepoResult<Vec<ContentType>> {
        let mut base = self.base_query();
        if !ids.is_empty() {
            base = base.where_in("n.id", ids.iter().map(|id| Value::Integer(*id)).collect());
        }
        self.load(base)
    }

    fn perform_get_by_query(&self, query: &Query<ContentTypeField>) -> RepoResult<Vec<ContentType>> {
        let base = QueryTranslator::new(&self.columns).translate(self.base_query(), query)?;
        self.load(base)
    }

    fn perform_exists(&self, id: NodeId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM content_types WHERE node_id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn perform_count(&self, query: &Query<ContentTypeField>) -> RepoResult<u64> {
        let base = QueryTranslator::new(&self.columns)
            .translate(self.base_query(), query)?
            .with_select(["COUNT(*)"])
            .clear_order_by();
        let (sql, params) = base.build();
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn persist_new(&self, content_type: &mut ContentType) -> RepoResult<()> {
        content_type.validate()?;
        self.ensure_alias_free(&content_type.alias, None)?;

        run_in_scope(self.conn, |conn| {
            let node = node_store::insert_node(
                conn,
                &NewNode {
                    unique_id: content_type.key,
                    parent_id: ROOT_NODE_ID,
                    object_type: ObjectType::DocumentType,
                    created_by: content_type.created_by,
                    text: &content_type.name,
                    created_at: now_epoch_ms(),
                },
            )?;
            conn.execute(
                "INSERT INTO content_types (node_id, alias, icon, description) VALUES (?1, ?2, ?3, ?4);",
                params![node.id, content_type.alias, content_type.icon, content_type.description],
            )?;
            for property_type in &mut content_type.property_types {
                Self::insert_property_type(conn, node.id, property_type)?;
            }
            content_type.id = Some(node.id);
            Ok::<_, RepoError>(())
        })
    }

    fn persist_updated(&self, content_type: &mut ContentType) -> RepoResult<()> {
        content_type.validate()?;
        let id = content_type.id.ok_or_else(|| {
            RepoError::InvalidData("content type update without identity".to_string())
        })?;
        self.ensure_alias_free(&content_type.alias, Some(id))?;

        run_in_scope(self.conn, |conn| {
            let node = node_store::require_node(conn, id)?;
            node_store::update_text_and_sort(conn, id, &content_type.name, node.sort_order)?;
            conn.execute(
                "UPDATE content_types SET alias = ?1, icon = ?2, description = ?3 WHERE node_id = ?4;",
                params![content_type.alias, content_type.icon, content_type.description, id],
            )?;

            let kept: HashSet<i64> = content_type
                .property_types
                .iter()
                .filter_map(|property_type| property_type.id)
                .collect();
            let mut stmt = conn.prepare("SELECT id FROM property_types WHERE content_type_id = ?1;")?;
            let mut rows = stmt.query([id])?;
            let mut removed = Vec::new();
            while let Some(row) = rows.next()? {
                let existing: i64 = row.get(0)?;
                if !kept.contains(&existing) {
                    removed.push(existing);
                }
            }
            for property_type_id in removed {
                conn.execute(
                    "DELETE FROM tag_relationships WHERE property_type_id = ?1;",
                    [property_type_id],
                )?;
                conn.execute(
                    "DELETE FROM property_data WHERE property_type_id = ?1;",
                    [property_type_id],
                )?;
                conn.execute("DELETE FROM property_types WHERE id = ?1;", [property_type_id])?;
            }

            for property_type in &mut content_type.property_types {
                match property_type.id {
                    Some(property_type_id) => {
                        conn.execute(
                            "UPDATE property_types
                             SET alias = ?1, name = ?2, storage_kind = ?3, tag_group = ?4, sort_order = ?5
                             WHERE id = ?6 AND content_type_id = ?7;",
                            params![
                                property_type.alias,
                                property_type.name,
                                property_type.storage.as_db(),
                                property_type.tag_group,
                                property_type.sort_order,
                                property_type_id,
                                id,
                            ],
                        )?;
                    }
                    None => Self::insert_property_type(conn, id, property_type)?,
                }
            }
            Ok::<_, RepoError>(())
        })
    }

    fn persist_deleted(&self, content_type: &ContentType) -> RepoResult<()> {
        let Some(id) = content_type.id else {
            return Ok(());
        };
        let in_use: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM content WHERE content_type_id = ?1;",
            [id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(RepoError::InvalidData(format!(
                "content type `{}` is used by {in_use} documents",
                content_type.alias
            )));
        }

        run_in_scope(self.conn, |conn| {
            conn.execute("DELETE FROM property_types WHERE content_type_id = ?1;", [id])?;
            conn.execute("DELETE FROM content_types WHERE node_id = ?1;", [id])?;
            conn.execute("DELETE FROM node_permissions WHERE node_id = ?1;", [id])?;
            conn.execute("DELETE FROM nodes WHERE id = ?1;", [id])?;
            Ok::<_, RepoError>(())
        })
    }
}
