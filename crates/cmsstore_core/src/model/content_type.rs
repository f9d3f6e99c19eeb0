//! Content type (document type) model.
//!
//! # Invariants
//! - `alias` is unique across content types and matches `[A-Za-z][A-Za-z0-9_]*`.
//! - Property type aliases are unique within one content type.

use crate::model::entity::Entity;
use crate::model::node::NodeId;
use crate::model::property::{Property, PropertyCollection, StorageKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid alias regex"));

/// Declared field of a content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyType {
    pub id: Option<i64>,
    pub alias: String,
    pub name: String,
    pub storage: StorageKind,
    /// Tag group fed by this property's comma-separated value.
    pub tag_group: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub id: Option<NodeId>,
    pub key: Uuid,
    pub alias: String,
    pub name: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub property_types: Vec<PropertyType>,
    pub created_by: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentTypeValidationError {
    InvalidAlias(String),
    DuplicatePropertyAlias(String),
}

impl Display for ContentTypeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAlias(alias) => write!(f, "invalid alias `{alias}`"),
            Self::DuplicatePropertyAlias(alias) => {
                write!(f, "property alias `{alias}` is declared twice")
            }
        }
    }
}

impl Error for ContentTypeValidationError {}

impl ContentType {
    pub fn new(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            key: Uuid::new_v4(),
            alias: alias.into(),
            name: name.into(),
            icon: None,
            description: None,
            property_types: Vec::new(),
            created_by: 0,
        }
    }

    /// Appends a property type; chainable while building fixtures and seeds.
    pub fn with_property(
        mut self,
        alias: impl Into<String>,
        name: impl Into<String>,
        storage: StorageKind,
    ) -> Self {
        let sort_order = self.property_types.len() as i32;
        self.property_types.push(PropertyType {
            id: None,
            alias: alias.into(),
            name: name.into(),
            storage,
            tag_group: None,
            sort_order,
        });
        self
    }

    /// Appends a tag-enabled property type storing comma-separated tags.
    pub fn with_tag_property(
        mut self,
        alias: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        self = self.with_property(alias, name, StorageKind::Nvarchar);
        if let Some(last) = self.property_types.last_mut() {
            last.tag_group = Some(group.into());
        }
        self
    }

    pub fn property_type(&self, alias: &str) -> Option<&PropertyType> {
        self.property_types.iter().find(|pt| pt.alias == alias)
    }

    pub fn validate(&self) -> Result<(), ContentTypeValidationError> {
        if !ALIAS_RE.is_match(&self.alias) {
            return Err(ContentTypeValidationError::InvalidAlias(self.alias.clone()));
        }
        let mut seen = HashSet::new();
        for property_type in &self.property_types {
            if !ALIAS_RE.is_match(&property_type.alias) {
                return Err(ContentTypeValidationError::InvalidAlias(
                    property_type.alias.clone(),
                ));
            }
            if !seen.insert(property_type.alias.to_ascii_lowercase()) {
                return Err(ContentTypeValidationError::DuplicatePropertyAlias(
                    property_type.alias.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Empty property bag shaped by this type. Property types must be persisted.
    pub fn empty_properties(&self) -> PropertyCollection {
        PropertyCollection::new(
            self.property_types
                .iter()
                .map(|pt| Property {
                    id: None,
                    property_type_id: pt.id.unwrap_or_default(),
                    alias: pt.alias.clone(),
                    storage: pt.storage,
                    tag_group: pt.tag_group.clone(),
                    value: None,
                })
                .collect(),
        )
    }
}

impl Entity for ContentType {
    type Id = NodeId;
    const CACHE_PREFIX: &'static str = "content_type";

    fn id(&self) -> Option<NodeId> {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentType, ContentTypeValidationError};
    use crate::model::property::StorageKind;

    #[test]
    fn validate_rejects_alias_with_spaces() {
        let err = ContentType::new("text page", "Text page")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ContentTypeValidationError::InvalidAlias(_)));
    }

    #[test]
    fn validate_rejects_duplicate_property_alias_ignoring_case() {
        let err = ContentType::new("textPage", "Text page")
            .with_property("title", "Title", StorageKind::Nvarchar)
            .with_property("Title", "Title again", StorageKind::Ntext)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ContentTypeValidationError::DuplicatePropertyAlias("Title".to_string())
        );
    }

    #[test]
    fn tag_property_is_nvarchar_with_group() {
        let content_type = ContentType::new("article", "Article").with_tag_property(
            "keywords",
            "Keywords",
            "default",
        );
        let keywords = content_type.property_type("keywords").unwrap();
        assert_eq!(keywords.storage, StorageKind::Nvarchar);
        assert_eq!(keywords.tag_group.as_deref(), Some("default"));
    }
}
