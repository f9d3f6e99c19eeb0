//! Property bag values and their typed storage slots.
//!
//! # Responsibility
//! - Hold one value per property type for a content version.
//! - Convert values to and from the four `property_data` storage slots.
//!
//! # Invariants
//! - A property without a value has no `property_data` row.
//! - The slot used is decided by the property type's [`StorageKind`].

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Database column family a property type stores its values in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Integer,
    Date,
    Nvarchar,
    Ntext,
}

impl StorageKind {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Date => "date",
            Self::Nvarchar => "nvarchar",
            Self::Ntext => "ntext",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "integer" => Some(Self::Integer),
            "date" => Some(Self::Date),
            "nvarchar" => Some(Self::Nvarchar),
            "ntext" => Some(Self::Ntext),
            _ => None,
        }
    }
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Integer(i64),
    /// Unix epoch milliseconds.
    Date(i64),
    Text(String),
}

impl PropertyValue {
    /// Plain text rendering used for tags and projections.
    pub fn as_text(&self) -> String {
        match self {
            Self::Integer(value) | Self::Date(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    UnknownAlias(String),
    IncompatibleValue {
        alias: String,
        storage: StorageKind,
    },
}

impl Display for PropertyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAlias(alias) => write!(f, "unknown property alias `{alias}`"),
            Self::IncompatibleValue { alias, storage } => write!(
                f,
                "value of property `{alias}` cannot be stored as {}",
                storage.as_db()
            ),
        }
    }
}

impl Error for PropertyError {}

/// Values for the four `property_data` slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSlots {
    pub int_value: Option<i64>,
    pub date_value: Option<i64>,
    pub varchar_value: Option<String>,
    pub text_value: Option<String>,
}

/// One property of one content version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// `property_data.id`; `None` until a row exists for this version.
    pub id: Option<i64>,
    pub property_type_id: i64,
    pub alias: String,
    pub storage: StorageKind,
    /// Set when the property type feeds the tag index.
    pub tag_group: Option<String>,
    pub value: Option<PropertyValue>,
}

impl Property {
    /// Maps the value onto the slot chosen by the storage kind.
    pub fn to_slots(&self) -> Result<StorageSlots, PropertyError> {
        let mut slots = StorageSlots::default();
        let Some(value) = self.value.as_ref() else {
            return Ok(slots);
        };

        match (self.storage, value) {
            (StorageKind::Integer, PropertyValue::Integer(v)) => slots.int_value = Some(*v),
            (StorageKind::Integer, PropertyValue::Text(text)) => {
                slots.int_value = Some(text.trim().parse().map_err(|_| self.incompatible())?);
            }
            (StorageKind::Date, PropertyValue::Date(v) | PropertyValue::Integer(v)) => {
                slots.date_value = Some(*v);
            }
            (StorageKind::Nvarchar, value) => slots.varchar_value = Some(value.as_text()),
            (StorageKind::Ntext, value) => slots.text_value = Some(value.as_text()),
            _ => return Err(self.incompatible()),
        }
        Ok(slots)
    }

    /// Reads the value back from the slot of the given storage kind.
    pub fn value_from_slots(storage: StorageKind, slots: StorageSlots) -> Option<PropertyValue> {
        match storage {
            StorageKind::Integer => slots.int_value.map(PropertyValue::Integer),
            StorageKind::Date => slots.date_value.map(PropertyValue::Date),
            StorageKind::Nvarchar => slots.varchar_value.map(PropertyValue::Text),
            StorageKind::Ntext => slots.text_value.map(PropertyValue::Text),
        }
    }

    /// Tag values split on commas, trimmed, empty entries dropped.
    pub fn tag_values(&self) -> Vec<String> {
        match self.value.as_ref() {
            Some(value) => value
                .as_text()
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }

    fn incompatible(&self) -> PropertyError {
        PropertyError::IncompatibleValue {
            alias: self.alias.clone(),
            storage: self.storage,
        }
    }
}

/// Ordered property bag of one content version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyCollection {
    items: Vec<Property>,
}

impl PropertyCollection {
    pub fn new(items: Vec<Property>) -> Self {
        Self { items }
    }

    pub fn get(&self, alias: &str) -> Option<&Property> {
        self.items.iter().find(|property| property.alias == alias)
    }

    pub fn get_mut(&mut self, alias: &str) -> Option<&mut Property> {
        self.items.iter_mut().find(|property| property.alias == alias)
    }

    pub fn set_value(
        &mut self,
        alias: &str,
        value: Option<PropertyValue>,
    ) -> Result<(), PropertyError> {
        let property = self
            .get_mut(alias)
            .ok_or_else(|| PropertyError::UnknownAlias(alias.to_string()))?;
        property.value = value;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Property> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Properties that carry a value and therefore need a storage row.
    pub fn populated(&self) -> impl Iterator<Item = &Property> {
        self.items.iter().filter(|property| property.value.is_some())
    }

    /// Forgets storage row ids, e.g. before writing a new version.
    pub fn clear_row_ids(&mut self) {
        for property in &mut self.items {
            property.id = None;
        }
    }

    pub(crate) fn value_snapshot(&self) -> Vec<(String, Option<PropertyValue>)> {
        self.items
            .iter()
            .map(|property| (property.alias.clone(), property.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Property, PropertyError, PropertyValue, StorageKind, StorageSlots};

    fn property(storage: StorageKind, value: Option<PropertyValue>) -> Property {
        Property {
            id: None,
            property_type_id: 1,
            alias: "field".to_string(),
            storage,
            tag_group: None,
            value,
        }
    }

    #[test]
    fn integer_storage_accepts_numeric_text() {
        let slots = property(StorageKind::Integer, Some("42".into()))
            .to_slots()
            .unwrap();
        assert_eq!(slots.int_value, Some(42));
        assert!(slots.text_value.is_none());
    }

    #[test]
    fn integer_storage_rejects_free_text() {
        let err = property(StorageKind::Integer, Some("forty".into()))
            .to_slots()
            .unwrap_err();
        assert!(matches!(err, PropertyError::IncompatibleValue { .. }));
    }

    #[test]
    fn value_reads_back_from_matching_slot_only() {
        let slots = StorageSlots {
            varchar_value: Some("short".to_string()),
            text_value: Some("long".to_string()),
            ..StorageSlots::default()
        };
        assert_eq!(
            Property::value_from_slots(StorageKind::Ntext, slots),
            Some(PropertyValue::Text("long".to_string()))
        );
    }

    #[test]
    fn tag_values_split_and_trim() {
        let tagged = property(StorageKind::Nvarchar, Some("news, rust ,,events".into()));
        assert_eq!(tagged.tag_values(), vec!["news", "rust", "events"]);
    }
}
