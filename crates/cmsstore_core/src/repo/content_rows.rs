//! Typed row shapes of the content assembly queries.

use super::node_store::parse_uuid;
use super::RepoResult;
use crate::model::node::NodeId;
use crate::model::property::StorageSlots;
use rusqlite::Row;
use uuid::Uuid;

/// Projection shared by every full content query.
pub(crate) const CONTENT_COLUMNS: &[&str] = &[
    "n.id AS node_id",
    "n.unique_id",
    "n.parent_id",
    "n.level",
    "n.path",
    "n.sort_order",
    "n.trashed",
    "n.created_by",
    "n.created_at",
    "c.content_type_id",
    "cv.version_id",
    "cv.version_date",
    "d.name",
    "d.published",
    "d.newest",
    "d.writer_id",
    "d.updated_at",
    "pd.version_id AS published_version_id",
];

/// One (node × version × published version) row.
#[derive(Debug, Clone)]
pub(crate) struct ContentRow {
    pub node_id: NodeId,
    pub unique_id: Uuid,
    pub parent_id: NodeId,
    pub level: i32,
    pub path: String,
    pub sort_order: i32,
    pub trashed: bool,
    pub created_by: i64,
    pub created_at: i64,
    pub content_type_id: NodeId,
    pub version_id: Uuid,
    pub version_date: i64,
    pub name: String,
    pub published: bool,
    pub newest: bool,
    pub writer_id: i64,
    pub updated_at: i64,
    pub published_version_id: Option<Uuid>,
}

impl ContentRow {
    pub fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let unique_id: String = row.get("unique_id")?;
        let version_id: String = row.get("version_id")?;
        let published_version_id: Option<String> = row.get("published_version_id")?;
        Ok(Self {
            node_id: row.get("node_id")?,
            unique_id: parse_uuid(&unique_id, "nodes.unique_id")?,
            parent_id: row.get::<_, Option<NodeId>>("parent_id")?.unwrap_or_default(),
            level: row.get("level")?,
            path: row.get("path")?,
            sort_order: row.get("sort_order")?,
            trashed: row.get("trashed")?,
            created_by: row.get::<_, Option<i64>>("created_by")?.unwrap_or_default(),
            created_at: row.get("created_at")?,
            content_type_id: row.get("content_type_id")?,
            version_id: parse_uuid(&version_id, "content_versions.version_id")?,
            version_date: row.get("version_date")?,
            name: row.get("name")?,
            published: row.get("published")?,
            newest: row.get("newest")?,
            writer_id: row.get::<_, Option<i64>>("writer_id")?.unwrap_or_default(),
            updated_at: row.get("updated_at")?,
            published_version_id: published_version_id
                .map(|value| parse_uuid(&value, "documents.version_id"))
                .transpose()?,
        })
    }
}

/// One `property_data` row.
#[derive(Debug, Clone)]
pub(crate) struct PropertyRow {
    pub id: i64,
    pub version_id: Uuid,
    pub property_type_id: i64,
    pub slots: StorageSlots,
}

pub(crate) const PROPERTY_COLUMNS: &str =
    "id, version_id, property_type_id, int_value, date_value, varchar_value, text_value";

impl PropertyRow {
    pub fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let version_id: String = row.get("version_id")?;
        Ok(Self {
            id: row.get("id")?,
            version_id: parse_uuid(&version_id, "property_data.version_id")?,
            property_type_id: row.get("property_type_id")?,
            slots: StorageSlots {
                int_value: row.get("int_value")?,
                date_value: row.get("date_value")?,
                varchar_value: row.get("varchar_value")?,
                text_value: row.get("text_value")?,
            },
        })
    }
}
