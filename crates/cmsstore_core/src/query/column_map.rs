//! Explicit field-to-column registration per entity type.

use super::{QueryError, QueryField};
use std::collections::HashMap;

/// Backing SQL column (alias-qualified) of every field of `F`.
#[derive(Debug, Clone)]
pub struct ColumnMap<F: QueryField> {
    entity: &'static str,
    columns: HashMap<F, &'static str>,
}

impl<F: QueryField> ColumnMap<F> {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            columns: HashMap::new(),
        }
    }

    pub fn map(mut self, field: F, column: &'static str) -> Self {
        self.columns.insert(field, column);
        self
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn column(&self, field: F) -> Result<&'static str, QueryError> {
        self.columns
            .get(&field)
            .copied()
            .ok_or(QueryError::UnmappedField {
                entity: self.entity,
                field: field.name(),
            })
    }

    /// Fails on the first field of `F::ALL` without a column.
    pub fn validate(&self) -> Result<(), QueryError> {
        for field in F::ALL {
            self.column(*field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ColumnMap;
    use crate::query::{QueryError, QueryField};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Field {
        Id,
        Name,
    }

    impl QueryField for Field {
        const ALL: &'static [Self] = &[Self::Id, Self::Name];

        fn name(self) -> &'static str {
            match self {
                Self::Id => "id",
                Self::Name => "name",
            }
        }
    }

    #[test]
    fn validate_reports_first_unmapped_field() {
        let map = ColumnMap::new("thing").map(Field::Id, "t.id");
        assert_eq!(
            map.validate(),
            Err(QueryError::UnmappedField {
                entity: "thing",
                field: "name",
            })
        );
    }

    #[test]
    fn complete_map_validates() {
        let map = ColumnMap::new("thing")
            .map(Field::Id, "t.id")
            .map(Field::Name, "t.name");
        assert!(map.validate().is_ok());
        assert_eq!(map.column(Field::Name).unwrap(), "t.name");
    }
}
