//! Versioned document repository.
//!
//! # Responsibility
//! - Assemble documents from node, version, document and property rows.
//! - Persist creates and updates, deciding between a new version and an
//!   in-place update of the newest version.
//! - Keep tags in step with publish transitions.
//! - Page documents and rebuild the published XML projection.
//!
//! # Invariants
//! - Exactly one version per document has `newest = 1`.
//! - At most one version per document has `published = 1`.
//! - Property rows are never shared between versions.
//! - Assembly issues the property query only when the first query returned rows.
//! - A node re-parented into the bin is flagged trashed; one re-parented out
//!   of it is not.

use super::base::{CachedLookup, Repository};
use super::content_rows::{ContentRow, PropertyRow, CONTENT_COLUMNS, PROPERTY_COLUMNS};
use super::content_type_repo::ContentTypeRepository;
use super::content_xml::ContentXmlSerializer;
use super::node_store::{self, NewNode};
use super::permission_repo::forget_principals;
use super::recycle_bin::{is_below_recycle_bin, purge_nodes, PurgeOutcome, PurgeSeed};
use super::schema_check::ensure_tables;
use super::tag_repo::TagRepository;
use super::{RepoError, RepoResult};
use crate::cache::{CacheRegistry, DefaultCachePolicy, RepositoryCachePolicy, RuntimeCache};
use crate::db::{now_epoch_ms, run_in_scope, SqlBuilder};
use crate::model::content::{Content, PublishAction};
use crate::model::content_type::ContentType;
use crate::model::domain::CacheableDomain;
use crate::model::entity::Entity;
use crate::model::node::{NodeId, ObjectType};
use crate::model::permission::EntityPermission;
use crate::model::property::{Property, PropertyCollection};
use crate::model::tag::Tag;
use crate::query::{ColumnMap, Query, QueryField, QueryTranslator};
use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentField {
    Id,
    Key,
    ParentId,
    Path,
    Level,
    SortOrder,
    Trashed,
    CreatorId,
    CreateDate,
    Name,
    ContentTypeId,
    ContentTypeAlias,
    VersionId,
    VersionDate,
    UpdateDate,
    WriterId,
    Published,
    Newest,
}

impl QueryField for ContentField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Key,
        Self::ParentId,
        Self::Path,
        Self::Level,
        Self::SortOrder,
        Self::Trashed,
        Self::CreatorId,
        Self::CreateDate,
        Self::Name,
        Self::ContentTypeId,
        Self::ContentTypeAlias,
        Self::VersionId,
        Self::VersionDate,
        Self::UpdateDate,
        Self::WriterId,
        Self::Published,
        Self::Newest,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Key => "key",
            Self::ParentId => "parent_id",
            Self::Path => "path",
            Self::Level => "level",
            Self::SortOrder => "sort_order",
            Self::Trashed => "trashed",
            Self::CreatorId => "creator_id",
            Self::CreateDate => "create_date",
            Self::Name => "name",
            Self::ContentTypeId => "content_type_id",
            Self::ContentTypeAlias => "content_type_alias",
            Self::VersionId => "version_id",
            Self::VersionDate => "version_date",
            Self::UpdateDate => "update_date",
            Self::WriterId => "writer_id",
            Self::Published => "published",
            Self::Newest => "newest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Decides whether saving `content` must append a version.
pub type NewVersionRule = Box<dyn Fn(&Content) -> bool + Send + Sync>;

/// Default rule: the saved version is the published one and it changed.
pub fn requires_new_version(content: &Content) -> bool {
    content.persisted_published() && content.is_dirty()
}

/// Outcome of a projection rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub processed: usize,
    pub written: usize,
    pub failed: Vec<NodeId>,
}

pub struct ContentRepository<'conn> {
    pub(super) conn: &'conn Connection,
    columns: ColumnMap<ContentField>,
    pub(super) cache: DefaultCachePolicy,
    /// Purges delete domain rows bound to purged nodes.
    domain_cache: Arc<RuntimeCache>,
    /// Purges delete grants on purged nodes.
    permission_cache: Arc<RuntimeCache>,
    content_types: ContentTypeRepository<'conn>,
    tags: TagRepository<'conn>,
    new_version_rule: NewVersionRule,
}

impl<'conn> ContentRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, caches: &CacheRegistry) -> RepoResult<Self> {
        ensure_tables(
            conn,
            &[
                (
                    "nodes",
                    &["id", "unique_id", "parent_id", "level", "path", "sort_order", "trashed", "object_type"],
                ),
                ("content", &["node_id", "content_type_id"]),
                ("content_versions", &["id", "node_id", "version_id", "version_date"]),
                (
                    "documents",
                    &["node_id", "version_id", "name", "published", "newest", "writer_id", "updated_at"],
                ),
                (
                    "property_data",
                    &["id", "node_id", "version_id", "property_type_id", "int_value", "date_value", "varchar_value", "text_value"],
                ),
                ("content_xml", &["node_id", "xml"]),
            ],
        )?;

        let columns = ColumnMap::new("content")
            .map(ContentField::Id, "n.id")
            .map(ContentField::Key, "n.unique_id")
            .map(ContentField::ParentId, "n.parent_id")
            .map(ContentField::Path, "n.path")
            .map(ContentField::Level, "n.level")
            .map(ContentField::SortOrder, "n.sort_order")
            .map(ContentField::Trashed, "n.trashed")
            .map(ContentField::CreatorId, "n.created_by")
            .map(ContentField::CreateDate, "n.created_at")
            .map(ContentField::Name, "d.name")
            .map(ContentField::ContentTypeId, "c.content_type_id")
            .map(ContentField::ContentTypeAlias, "ct.alias")
            .map(ContentField::VersionId, "cv.version_id")
            .map(ContentField::VersionDate, "cv.version_date")
            .map(ContentField::UpdateDate, "d.updated_at")
            .map(ContentField::WriterId, "d.writer_id")
            .map(ContentField::Published, "d.published")
            .map(ContentField::Newest, "d.newest");
        columns.validate()?;

        Ok(Self {
            conn,
            columns,
            cache: DefaultCachePolicy::new(caches.for_type::<Content>()),
            domain_cache: caches.for_type::<CacheableDomain>(),
            permission_cache: caches.for_type::<EntityPermission>(),
            content_types: ContentTypeRepository::try_new(conn, caches)?,
            tags: TagRepository::try_new(conn)?,
            new_version_rule: Box::new(requires_new_version),
        })
    }

    /// Replaces the rule deciding when a save appends a version.
    pub fn with_new_version_rule(mut self, rule: impl Fn(&Content) -> bool + Send + Sync + 'static) -> Self {
        self.new_version_rule = Box::new(rule);
        self
    }

    pub fn content_types(&self) -> &ContentTypeRepository<'conn> {
        &self.content_types
    }

    pub fn tags(&self) -> &TagRepository<'conn> {
        &self.tags
    }

    /// Base query over every version of every document.
    pub(super) fn base_query(&self) -> SqlBuilder {
        SqlBuilder::select(CONTENT_COLUMNS.iter().copied())
            .from("nodes n")
            .inner_join("content c", "c.node_id = n.id")
            .inner_join("content_types ct", "ct.node_id = c.content_type_id")
            .inner_join("content_versions cv", "cv.node_id = n.id")
            .inner_join("documents d", "d.version_id = cv.version_id")
            .left_join("documents pd", "pd.node_id = n.id AND pd.published = 1")
            .where_clause(
                "n.object_type = ?",
                vec![Value::Text(ObjectType::Document.as_db())],
            )
    }

    fn newest_query(&self) -> SqlBuilder {
        self.base_query().where_clause("d.newest = 1", Vec::new())
    }

    /// Runs `base`, then one property query over the same version set.
    pub(super) fn assemble(&self, base: SqlBuilder) -> RepoResult<Vec<Content>> {
        let (sql, params) = base.build();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut content_rows = Vec::new();
        let mut seen_versions = HashSet::new();
        while let Some(row) = rows.next()? {
            let content_row = ContentRow::from_row(row)?;
            if seen_versions.insert(content_row.version_id) {
                content_rows.push(content_row);
            }
        }
        if content_rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut content_types: HashMap<NodeId, ContentType> = HashMap::new();
        for row in &content_rows {
            if content_types.contains_key(&row.content_type_id) {
                continue;
            }
            let content_type = self.content_types.get(row.content_type_id)?.ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "document {} references missing content type {}",
                    row.node_id, row.content_type_id
                ))
            })?;
            content_types.insert(row.content_type_id, content_type);
        }

        let (ids_sql, ids_params) = base.with_select(["cv.version_id"]).build();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM property_data WHERE version_id IN ({ids_sql}) ORDER BY id;"
        ))?;
        let mut rows = stmt.query(params_from_iter(ids_params))?;
        let mut properties: HashMap<Uuid, Vec<PropertyRow>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let property_row = PropertyRow::from_row(row)?;
            properties
                .entry(property_row.version_id)
                .or_default()
                .push(property_row);
        }

        let mut documents = Vec::with_capacity(content_rows.len());
        for row in content_rows {
            let content_type = content_types.get(&row.content_type_id).ok_or_else(|| {
                RepoError::InvalidData(format!("content type {} not resolved", row.content_type_id))
            })?;
            let property_rows = properties.remove(&row.version_id).unwrap_or_default();
            documents.push(build_content(row, content_type, property_rows));
        }
        Ok(documents)
    }

    /// One page of newest versions plus the total match count.
    pub fn get_paged(
        &self,
        query: &Query<ContentField>,
        page_index: u64,
        page_size: u64,
        order_by: ContentField,
        direction: SortDirection,
    ) -> RepoResult<(Vec<Content>, u64)> {
        let total = self.perform_count(query)?;
        // zero-sized pages and pages SQLite cannot address hold no rows
        let Some((limit, offset)) = page_window(page_index, page_size) else {
            return Ok((Vec::new(), total));
        };
        let column = self.columns.column(order_by)?;
        let base = QueryTranslator::new(&self.columns)
            .translate(self.newest_query(), query)?
            .order_by(format!("{column} {}", direction.as_sql()))
            .order_by("n.id")
            .limit(limit, offset);
        Ok((self.assemble(base)?, total))
    }

    /// Rewrites `content_xml` for published documents of the given types
    /// (all types when empty), one transaction scope per batch.
    pub fn rebuild_xml(
        &self,
        serializer: &dyn ContentXmlSerializer,
        batch_size: usize,
        content_type_ids: &[NodeId],
    ) -> RepoResult<RebuildReport> {
        let started_at = Instant::now();
        let batch_size = batch_size.max(1);
        let type_values: Vec<Value> = content_type_ids.iter().map(|id| Value::Integer(*id)).collect();

        if content_type_ids.is_empty() {
            self.conn.execute("DELETE FROM content_xml;", [])?;
        } else {
            super::base::check_parameter_limit(content_type_ids.len())?;
            self.conn.execute(
                &format!(
                    "DELETE FROM content_xml
                     WHERE node_id IN (SELECT node_id FROM content WHERE content_type_id IN ({}));",
                    crate::db::sql::placeholders(type_values.len())
                ),
                params_from_iter(type_values.iter()),
            )?;
        }

        let mut report = RebuildReport::default();
        let mut page = 0_i64;
        loop {
            let mut base = self
                .base_query()
                .where_clause("d.published = 1", Vec::new())
                .order_by("n.id")
                .limit(batch_size as i64, page * batch_size as i64);
            if !type_values.is_empty() {
                base = base.where_in("c.content_type_id", type_values.clone());
            }
            let batch = self.assemble(base)?;
            if batch.is_empty() {
                break;
            }

            run_in_scope(self.conn, |conn| {
                for content in &batch {
                    let Some(node_id) = content.id else {
                        continue;
                    };
                    match serializer.serialize(content) {
                        Ok(xml) => {
                            conn.execute(
                                "INSERT OR REPLACE INTO content_xml (node_id, xml) VALUES (?1, ?2);",
                                params![node_id, xml],
                            )?;
                            report.written += 1;
                        }
                        Err(err) => {
                            warn!(
                                "event=content_xml_rebuild module=repo status=skip node_id={} error={}",
                                node_id, err
                            );
                            report.failed.push(node_id);
                        }
                    }
                }
                Ok::<_, RepoError>(())
            })?;

            report.processed += batch.len();
            if batch.len() < batch_size {
                break;
            }
            page += 1;
        }

        info!(
            "event=content_xml_rebuild module=repo status=ok processed={} written={} failed={} duration_ms={}",
            report.processed,
            report.written,
            report.failed.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn content_type_for(&self, content: &Content) -> RepoResult<ContentType> {
        self.content_types
            .get(content.content_type_id)?
            .ok_or_else(|| RepoError::NotFound {
                entity: "content_type",
                id: content.content_type_id.to_string(),
            })
    }

    fn sync_tags(&self, node_id: NodeId, properties: &PropertyCollection) -> RepoResult<()> {
        for property in properties.iter() {
            let Some(group) = property.tag_group.as_deref() else {
                continue;
            };
            let tags: Vec<Tag> = property
                .tag_values()
                .into_iter()
                .map(|text| Tag::new(group, text))
                .collect();
            self.tags
                .assign(node_id, property.property_type_id, &tags, true)?;
        }
        Ok(())
    }

    /// Drops cached rows of other repositories that a purge deleted.
    pub(super) fn forget_purged(&self, outcome: &PurgeOutcome) {
        self.domain_cache.clear();
        forget_principals(&self.permission_cache, &outcome.principals);
    }

    /// Drops cached copies of documents whose path changed.
    pub(super) fn forget(&self, ids: &[NodeId]) {
        for id in ids {
            RepositoryCachePolicy::<Content>::clear_entity(&self.cache, *id);
        }
    }
}

/// SQLite `LIMIT` / `OFFSET` of one non-empty page, `None` when it does
/// not fit an `i64`.
fn page_window(page_index: u64, page_size: u64) -> Option<(i64, i64)> {
    if page_size == 0 {
        return None;
    }
    let limit = i64::try_from(page_size).ok()?;
    let offset = i64::try_from(page_index.checked_mul(page_size)?).ok()?;
    Some((limit, offset))
}

fn build_content(row: ContentRow, content_type: &ContentType, property_rows: Vec<PropertyRow>) -> Content {
    let mut content = Content::new(row.name, row.parent_id, content_type, row.created_by);
    content.id = Some(row.node_id);
    content.key = row.unique_id;
    content.path = row.path;
    content.level = row.level;
    content.sort_order = row.sort_order;
    content.trashed = row.trashed;
    content.writer_id = row.writer_id;
    content.create_date = row.created_at;
    content.update_date = row.updated_at;
    content.content_type_id = row.content_type_id;
    content.version = row.version_id;
    content.version_date = row.version_date;
    content.newest = row.newest;
    content.published = row.published;
    content.published_version = row.published_version_id;

    for property_row in property_rows {
        if let Some(property) = content
            .properties
            .iter_mut()
            .find(|property| property.property_type_id == property_row.property_type_id)
        {
            property.id = Some(property_row.id);
            property.value = Property::value_from_slots(property.storage, property_row.slots);
        }
    }
    content.reset_dirty_properties();
    content
}

fn insert_version(conn: &Connection, node_id: NodeId, version: Uuid, now: i64) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO content_versions (node_id, version_id, version_date) VALUES (?1, ?2, ?3);",
        params![node_id, version.to_string(), now],
    )?;
    Ok(())
}

fn insert_document(
    conn: &Connection,
    content: &Content,
    node_id: NodeId,
    published: bool,
    now: i64,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO documents (node_id, version_id, name, published, newest, writer_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6);",
        params![
            node_id,
            content.version.to_string(),
            content.name,
            published,
            content.writer_id,
            now,
        ],
    )?;
    Ok(())
}

fn insert_property(
    conn: &Connection,
    node_id: NodeId,
    version: Uuid,
    property: &mut Property,
) -> RepoResult<()> {
    let slots = property.to_slots()?;
    conn.execute(
        "INSERT INTO property_data (
            node_id, version_id, property_type_id, int_value, date_value, varchar_value, text_value
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            node_id,
            version.to_string(),
            property.property_type_id,
            slots.int_value,
            slots.date_value,
            slots.varchar_value,
            slots.text_value,
        ],
    )?;
    property.id = Some(conn.last_insert_rowid());
    Ok(())
}

fn insert_properties(
    conn: &Connection,
    node_id: NodeId,
    version: Uuid,
    properties: &mut PropertyCollection,
) -> RepoResult<()> {
    for property in properties.iter_mut() {
        if property.value.is_some() {
            insert_property(conn, node_id, version, property)?;
        }
    }
    Ok(())
}

fn update_properties(
    conn: &Connection,
    node_id: NodeId,
    version: Uuid,
    properties: &mut PropertyCollection,
) -> RepoResult<()> {
    for property in properties.iter_mut() {
        match (property.id, property.value.is_some()) {
            (Some(row_id), true) => {
                let slots = property.to_slots()?;
                conn.execute(
                    "UPDATE property_data
                     SET int_value = ?1, date_value = ?2, varchar_value = ?3, text_value = ?4
                     WHERE id = ?5;",
                    params![
                        slots.int_value,
                        slots.date_value,
                        slots.varchar_value,
                        slots.text_value,
                        row_id,
                    ],
                )?;
            }
            (Some(row_id), false) => {
                conn.execute("DELETE FROM property_data WHERE id = ?1;", [row_id])?;
                property.id = None;
            }
            (None, true) => insert_property(conn, node_id, version, property)?,
            (None, false) => {}
        }
    }
    Ok(())
}

impl Repository for ContentRepository<'_> {
    type Entity = Content;
    type Field = ContentField;
    const ENTITY_NAME: &'static str = "content";

    fn cache_policy(&self) -> &dyn RepositoryCachePolicy<Content> {
        &self.cache
    }

    fn perform_get(&self, id: NodeId) -> RepoResult<Option<Content>> {
        let base = self
            .newest_query()
            .where_clause("n.id = ?", vec![Value::Integer(id)]);
        Ok(self.assemble(base)?.into_iter().next())
    }

    fn perform_get_all(&self, ids: &[NodeId]) -> RepoResult<Vec<Content>> {
        let mut base = self.newest_query().order_by("n.id");
        if !ids.is_empty() {
            base = base.where_in("n.id", ids.iter().map(|id| Value::Integer(*id)).collect());
        }
        self.assemble(base)
    }

    fn perform_get_by_query(&self, query: &Query<ContentField>) -> RepoResult<Vec<Content>> {
        let base = QueryTranslator::new(&self.columns)
            .translate(self.newest_query(), query)?
            .order_by("n.id");
        self.assemble(base)
    }

    fn perform_exists(&self, id: NodeId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1 AND object_type = ?2);",
            params![id, ObjectType::Document.as_db()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn perform_count(&self, query: &Query<ContentField>) -> RepoResult<u64> {
        let (sql, params) = QueryTranslator::new(&self.columns)
            .translate(self.newest_query(), query)?
            .with_select(["COUNT(DISTINCT n.id)"])
            .build();
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn persist_new(&self, content: &mut Content) -> RepoResult<()> {
        let started_at = Instant::now();
        let content_type = self.content_type_for(content)?;
        let publishing = content.publish_action() == PublishAction::Publish;
        let now = now_epoch_ms();

        run_in_scope(self.conn, |conn| {
            let node = node_store::insert_node(
                conn,
                &NewNode {
                    unique_id: content.key,
                    parent_id: content.parent_id,
                    object_type: ObjectType::Document,
                    created_by: content.creator_id,
                    text: &content.name,
                    created_at: now,
                },
            )?;
            conn.execute(
                "INSERT INTO content (node_id, content_type_id) VALUES (?1, ?2);",
                params![node.id, content.content_type_id],
            )?;
            insert_version(conn, node.id, content.version, now)?;
            insert_document(conn, content, node.id, publishing, now)?;
            insert_properties(conn, node.id, content.version, &mut content.properties)?;

            content.id = Some(node.id);
            content.path = node.path;
            content.level = node.level;
            content.sort_order = node.sort_order;
            content.trashed = false;
            content.create_date = now;
            content.update_date = now;
            content.version_date = now;
            content.newest = true;
            content.published = publishing;
            content.published_version = publishing.then_some(content.version);
            content.content_type_alias = content_type.alias.clone();

            if publishing {
                self.sync_tags(node.id, &content.properties)?;
            }
            Ok::<_, RepoError>(())
        })?;

        content.reset_dirty_properties();
        info!(
            "event=content_persist module=repo status=ok operation=create node_id={} version={} published={} duration_ms={}",
            content.id.unwrap_or_default(),
            content.version,
            publishing,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn persist_updated(&self, content: &mut Content) -> RepoResult<()> {
        let started_at = Instant::now();
        let id = content
            .id
            .ok_or_else(|| RepoError::InvalidData("document update without identity".to_string()))?;
        let new_version = (self.new_version_rule)(content);
        let action = content.publish_action();
        let parent_changed = content
            .persisted_parent_id()
            .is_some_and(|parent_id| parent_id != content.parent_id);
        let now = now_epoch_ms();
        let mut moved_ids = Vec::new();

        run_in_scope(self.conn, |conn| {
            if parent_changed {
                let moved = node_store::move_node(conn, id, content.parent_id)?;
                let trashed = is_below_recycle_bin(conn, ObjectType::Document, &moved.node.path)?;
                node_store::set_trashed(conn, id, trashed)?;
                content.trashed = trashed;
                content.path = moved.node.path;
                content.level = moved.node.level;
                content.sort_order = moved.node.sort_order;
                moved_ids = moved.affected;
            }
            node_store::update_text_and_sort(conn, id, &content.name, content.sort_order)?;

            if action != PublishAction::None {
                conn.execute("UPDATE documents SET published = 0 WHERE node_id = ?1;", [id])?;
            }
            let published_now = match action {
                PublishAction::Publish => true,
                PublishAction::Unpublish => false,
                PublishAction::None => !new_version && content.published,
            };

            if new_version {
                conn.execute("UPDATE documents SET newest = 0 WHERE node_id = ?1;", [id])?;
                content.version = Uuid::new_v4();
                insert_version(conn, id, content.version, now)?;
                insert_document(conn, content, id, published_now, now)?;
                content.properties.clear_row_ids();
                insert_properties(conn, id, content.version, &mut content.properties)?;
            } else {
                let version = content.version.to_string();
                let changed = conn.execute(
                    "UPDATE documents
                     SET name = ?1, writer_id = ?2, updated_at = ?3, published = ?4, newest = 1
                     WHERE node_id = ?5 AND version_id = ?6;",
                    params![content.name, content.writer_id, now, published_now, id, version],
                )?;
                if changed == 0 {
                    return Err(RepoError::NotFound {
                        entity: "content_version",
                        id: version,
                    });
                }
                conn.execute(
                    "UPDATE content_versions SET version_date = ?1 WHERE version_id = ?2;",
                    params![now, version],
                )?;
                update_properties(conn, id, content.version, &mut content.properties)?;
            }

            content.version_date = now;
            content.update_date = now;
            content.newest = true;
            content.published = published_now;
            match action {
                PublishAction::Publish => {
                    content.published_version = Some(content.version);
                    self.sync_tags(id, &content.properties)?;
                }
                PublishAction::Unpublish => {
                    content.published_version = None;
                    self.tags.clear_for_node(id)?;
                }
                PublishAction::None => {}
            }
            Ok::<_, RepoError>(())
        })?;

        if moved_ids.len() > 1 {
            self.forget(&moved_ids[1..]);
        }
        content.reset_dirty_properties();
        info!(
            "event=content_persist module=repo status=ok operation=update node_id={} version={} new_version={} duration_ms={}",
            id,
            content.version,
            new_version,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn persist_deleted(&self, content: &Content) -> RepoResult<()> {
        let Some(id) = content.id else {
            return Ok(());
        };
        let descendants = node_store::descendant_ids(self.conn, &content.path)?;
        let outcome = run_in_scope(self.conn, |conn| {
            purge_nodes(conn, ObjectType::Document, PurgeSeed::Subtree(id))
        })?;
        self.forget(&descendants);
        self.forget_purged(&outcome);
        info!(
            "event=content_delete module=repo status=ok node_id={} deleted_nodes={}",
            id, outcome.deleted
        );
        Ok(())
    }
}
