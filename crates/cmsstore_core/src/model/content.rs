//! Versioned document model.
//!
//! # Responsibility
//! - Carry node, version and property-bag state of one document version.
//! - Track changes against the last persisted state.
//!
//! # Invariants
//! - `newest` is true for the version that represents the current edit.
//! - `published` is true only when this version is the published one.
//! - `published_version` names the node's published version, if any.
//! - A new (never persisted) document is always dirty.

use crate::model::content_type::ContentType;
use crate::model::entity::Entity;
use crate::model::node::NodeId;
use crate::model::property::{PropertyCollection, PropertyError, PropertyValue};
use uuid::Uuid;

/// Publishing intent applied by the next save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishAction {
    #[default]
    None,
    Publish,
    Unpublish,
}

#[derive(Debug, Clone, PartialEq)]
struct ContentSnapshot {
    name: String,
    parent_id: NodeId,
    sort_order: i32,
    content_type_id: NodeId,
    published: bool,
    properties: Vec<(String, Option<PropertyValue>)>,
}

#[derive(Debug, Clone)]
pub struct Content {
    pub id: Option<NodeId>,
    pub key: Uuid,
    pub parent_id: NodeId,
    pub path: String,
    pub level: i32,
    pub sort_order: i32,
    pub trashed: bool,
    pub creator_id: i64,
    pub writer_id: i64,
    /// Epoch ms.
    pub create_date: i64,
    /// Epoch ms.
    pub update_date: i64,
    pub name: String,
    pub content_type_id: NodeId,
    pub content_type_alias: String,
    pub version: Uuid,
    /// Epoch ms.
    pub version_date: i64,
    pub newest: bool,
    pub published: bool,
    pub published_version: Option<Uuid>,
    pub properties: PropertyCollection,
    publish_action: PublishAction,
    snapshot: Option<ContentSnapshot>,
}

impl Content {
    /// New unsaved document of the given (persisted) content type.
    pub fn new(
        name: impl Into<String>,
        parent_id: NodeId,
        content_type: &ContentType,
        creator_id: i64,
    ) -> Self {
        Self {
            id: None,
            key: Uuid::new_v4(),
            parent_id,
            path: String::new(),
            level: 0,
            sort_order: 0,
            trashed: false,
            creator_id,
            writer_id: creator_id,
            create_date: 0,
            update_date: 0,
            name: name.into(),
            content_type_id: content_type.id.unwrap_or_default(),
            content_type_alias: content_type.alias.clone(),
            version: Uuid::new_v4(),
            version_date: 0,
            newest: true,
            published: false,
            published_version: None,
            properties: content_type.empty_properties(),
            publish_action: PublishAction::None,
            snapshot: None,
        }
    }

    pub fn value(&self, alias: &str) -> Option<&PropertyValue> {
        self.properties
            .get(alias)
            .and_then(|property| property.value.as_ref())
    }

    pub fn set_value(
        &mut self,
        alias: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), PropertyError> {
        self.properties.set_value(alias, Some(value.into()))
    }

    pub fn clear_value(&mut self, alias: &str) -> Result<(), PropertyError> {
        self.properties.set_value(alias, None)
    }

    /// Requests that the next save publishes this version.
    pub fn publish(&mut self) {
        self.publish_action = PublishAction::Publish;
    }

    /// Requests that the next save withdraws the published version.
    pub fn unpublish(&mut self) {
        self.publish_action = PublishAction::Unpublish;
    }

    pub fn publish_action(&self) -> PublishAction {
        self.publish_action
    }

    /// Whether the version as last persisted was the published one.
    pub fn persisted_published(&self) -> bool {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.published)
            .unwrap_or(false)
    }

    /// Parent id as last persisted, `None` for new documents.
    pub fn persisted_parent_id(&self) -> Option<NodeId> {
        self.snapshot.as_ref().map(|snapshot| snapshot.parent_id)
    }

    pub fn has_published_version(&self) -> bool {
        self.published_version.is_some()
    }

    /// Names of tracked fields that differ from the persisted baseline.
    pub fn dirty_fields(&self) -> Vec<&'static str> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return vec!["new"];
        };
        let mut fields = Vec::new();
        if snapshot.name != self.name {
            fields.push("name");
        }
        if snapshot.parent_id != self.parent_id {
            fields.push("parent_id");
        }
        if snapshot.sort_order != self.sort_order {
            fields.push("sort_order");
        }
        if snapshot.content_type_id != self.content_type_id {
            fields.push("content_type_id");
        }
        if snapshot.properties != self.properties.value_snapshot() {
            fields.push("properties");
        }
        fields
    }

    fn capture(&self) -> ContentSnapshot {
        ContentSnapshot {
            name: self.name.clone(),
            parent_id: self.parent_id,
            sort_order: self.sort_order,
            content_type_id: self.content_type_id,
            published: self.published,
            properties: self.properties.value_snapshot(),
        }
    }
}

impl Entity for Content {
    type Id = NodeId;
    const CACHE_PREFIX: &'static str = "content";

    fn id(&self) -> Option<NodeId> {
        self.id
    }

    fn is_dirty(&self) -> bool {
        !self.dirty_fields().is_empty()
    }

    fn reset_dirty_properties(&mut self) {
        self.snapshot = Some(self.capture());
        self.publish_action = PublishAction::None;
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.key == other.key
            && self.parent_id == other.parent_id
            && self.path == other.path
            && self.level == other.level
            && self.sort_order == other.sort_order
            && self.trashed == other.trashed
            && self.creator_id == other.creator_id
            && self.writer_id == other.writer_id
            && self.create_date == other.create_date
            && self.update_date == other.update_date
            && self.name == other.name
            && self.content_type_id == other.content_type_id
            && self.content_type_alias == other.content_type_alias
            && self.version == other.version
            && self.version_date == other.version_date
            && self.newest == other.newest
            && self.published == other.published
            && self.published_version == other.published_version
            && self.properties == other.properties
    }
}

#[cfg(test)]
mod tests {
    use super::{Content, PublishAction};
    use crate::model::content_type::ContentType;
    use crate::model::entity::Entity;
    use crate::model::property::StorageKind;

    fn text_page() -> ContentType {
        let mut content_type = ContentType::new("textPage", "Text page")
            .with_property("title", "Title", StorageKind::Nvarchar);
        content_type.id = Some(1001);
        content_type.property_types[0].id = Some(1);
        content_type
    }

    #[test]
    fn new_content_is_dirty_until_reset() {
        let mut content = Content::new("Home", -1, &text_page(), 0);
        assert!(content.is_dirty());
        content.reset_dirty_properties();
        assert!(!content.is_dirty());
    }

    #[test]
    fn property_change_is_tracked() {
        let mut content = Content::new("Home", -1, &text_page(), 0);
        content.reset_dirty_properties();
        content.set_value("title", "Welcome").unwrap();
        assert_eq!(content.dirty_fields(), vec!["properties"]);
    }

    #[test]
    fn reset_clears_publish_action() {
        let mut content = Content::new("Home", -1, &text_page(), 0);
        content.publish();
        assert_eq!(content.publish_action(), PublishAction::Publish);
        content.reset_dirty_properties();
        assert_eq!(content.publish_action(), PublishAction::None);
    }

    #[test]
    fn unknown_alias_is_rejected() {
        let mut content = Content::new("Home", -1, &text_page(), 0);
        assert!(content.set_value("missing", "x").is_err());
    }
}
