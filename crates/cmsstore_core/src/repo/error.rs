use crate::db::DbError;
use crate::model::content_type::ContentTypeValidationError;
use crate::model::property::PropertyError;
use crate::query::QueryError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Write targeted a row that does not exist.
    NotFound { entity: &'static str, id: String },
    /// Persisted data cannot be converted into a valid entity.
    InvalidData(String),
    /// Filter could not be translated.
    Query(QueryError),
    /// More ids than one statement may bind.
    ParameterLimit { requested: usize, max: usize },
    /// Operation is not available for this entity type.
    Unsupported {
        entity: &'static str,
        operation: &'static str,
    },
    /// Application-level uniqueness check failed.
    Duplicate { entity: &'static str, value: String },
    /// The newest version of a document cannot be removed.
    CannotDeleteNewestVersion(Uuid),
    /// The published version of a document cannot be removed.
    CannotDeletePublishedVersion(Uuid),
    /// Property value does not fit its storage kind.
    Property(PropertyError),
    /// Content type definition is invalid.
    Validation(ContentTypeValidationError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::ParameterLimit { requested, max } => write!(
                f,
                "{requested} ids requested, at most {max} can be bound in one query"
            ),
            Self::Unsupported { entity, operation } => {
                write!(f, "{operation} is not supported for {entity}")
            }
            Self::Duplicate { entity, value } => write!(f, "{entity} `{value}` already exists"),
            Self::CannotDeleteNewestVersion(version) => {
                write!(f, "version {version} is the newest version and cannot be deleted")
            }
            Self::CannotDeletePublishedVersion(version) => {
                write!(f, "version {version} is the published version and cannot be deleted")
            }
            Self::Property(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Property(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<PropertyError> for RepoError {
    fn from(value: PropertyError) -> Self {
        Self::Property(value)
    }
}

impl From<ContentTypeValidationError> for RepoError {
    fn from(value: ContentTypeValidationError) -> Self {
        Self::Validation(value)
    }
}
