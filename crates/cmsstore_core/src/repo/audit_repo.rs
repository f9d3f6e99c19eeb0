//! Append-only audit trail.
//!
//! Entries are never cached, updated or deleted; purging a node only clears
//! the entry's node reference.

use super::base::Repository;
use super::schema_check::ensure_tables;
use super::{RepoError, RepoResult};
use crate::cache::{NoCachePolicy, RepositoryCachePolicy};
use crate::db::{now_epoch_ms, SqlBuilder};
use crate::model::audit::{AuditAction, AuditEntry};
use crate::query::{ColumnMap, Query, QueryField, QueryTranslator};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditField {
    Id,
    NodeId,
    UserId,
    Action,
    CreatedAt,
}

impl QueryField for AuditField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::NodeId,
        Self::UserId,
        Self::Action,
        Self::CreatedAt,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::NodeId => "node_id",
            Self::UserId => "user_id",
            Self::Action => "action",
            Self::CreatedAt => "created_at",
        }
    }
}

pub struct AuditRepository<'conn> {
    conn: &'conn Connection,
    columns: ColumnMap<AuditField>,
    cache: NoCachePolicy,
}

impl<'conn> AuditRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(
            conn,
            &[("audit_log", &["id", "node_id", "user_id", "action", "comment", "created_at"])],
        )?;
        let columns = ColumnMap::new("audit")
            .map(AuditField::Id, "id")
            .map(AuditField::NodeId, "node_id")
            .map(AuditField::UserId, "user_id")
            .map(AuditField::Action, "action")
            .map(AuditField::CreatedAt, "created_at");
        columns.validate()?;
        Ok(Self {
            conn,
            columns,
            cache: NoCachePolicy,
        })
    }

    fn base_query(&self) -> SqlBuilder {
        SqlBuilder::select(["id", "node_id", "user_id", "action", "comment", "created_at"])
            .from("audit_log")
            .order_by("created_at")
            .order_by("id")
    }

    fn load(&self, base: SqlBuilder) -> RepoResult<Vec<AuditEntry>> {
        let (sql, params) = base.build();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let action: String = row.get("action")?;
            entries.push(AuditEntry {
                id: Some(row.get("id")?),
                node_id: row.get("node_id")?,
                user_id: row.get("user_id")?,
                action: AuditAction::from_db(&action).ok_or_else(|| {
                    RepoError::InvalidData(format!("unknown audit action `{action}`"))
                })?,
                comment: row.get("comment")?,
                created_at: row.get("created_at")?,
            });
        }
        Ok(entries)
    }

    fn unsupported(operation: &'static str) -> RepoError {
        RepoError::Unsupported {
            entity: Self::ENTITY_NAME,
            operation,
        }
    }
}

impl Repository for AuditRepository<'_> {
    type Entity = AuditEntry;
    type Field = AuditField;
    const ENTITY_NAME: &'static str = "audit_entry";

    fn cache_policy(&self) -> &dyn RepositoryCachePolicy<AuditEntry> {
        &self.cache
    }

    fn perform_get(&self, id: i64) -> RepoResult<Option<AuditEntry>> {
        let base = self.base_query().where_clause("id = ?", vec![Value::Integer(id)]);
        Ok(self.load(base)?.into_iter().next())
    }

    fn perform_get_all(&self, ids: &[i64]) -> RepoResult<Vec<AuditEntry>> {
        let mut base = self.base_query();
        if !ids.is_empty() {
            base = base.where_in("id", ids.iter().map(|id| Value::Integer(*id)).collect());
        }
        self.load(base)
    }

    fn perform_get_by_query(&self, query: &Query<AuditField>) -> RepoResult<Vec<AuditEntry>> {
        let base = QueryTranslator::new(&self.columns).translate(self.base_query(), query)?;
        self.load(base)
    }

    fn perform_exists(&self, id: i64) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM audit_log WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn perform_count(&self, query: &Query<AuditField>) -> RepoResult<u64> {
        let (sql, params) = QueryTranslator::new(&self.columns)
            .translate(self.base_query(), query)?
            .with_select(["COUNT(*)"])
            .clear_order_by()
            .build();
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn persist_new(&self, entry: &mut AuditEntry) -> RepoResult<()> {
        if entry.created_at == 0 {
            entry.created_at = now_epoch_ms();
        }
        self.conn.execute(
            "INSERT INTO audit_log (node_id, user_id, action, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entry.node_id,
                entry.user_id,
                entry.action.as_db(),
                entry.comment,
                entry.created_at,
            ],
        )?;
        entry.id = Some(self.conn.last_insert_rowid());
        Ok(())
    }

    fn persist_updated(&self, _entry: &mut AuditEntry) -> RepoResult<()> {
        Err(Self::unsupported("update"))
    }

    fn persist_deleted(&self, _entry: &AuditEntry) -> RepoResult<()> {
        Err(Self::unsupported("delete"))
    }

    fn supports_update(&self) -> bool {
        false
    }

    fn supports_delete(&self) -> bool {
        false
    }
}
