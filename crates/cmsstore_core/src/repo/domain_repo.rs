//! Hostname bindings.
//!
//! [`CacheableDomainRepository`] persists the flat rows behind a
//! full-dataset cache; [`DomainRepository`] is the public face and maps
//! those rows to [`Domain`].

use super::base::{CachedLookup, Repository, UnitOfWorkWrites};
use super::schema_check::ensure_tables;
use super::unit_of_work::UnitOfWork;
use super::{RepoError, RepoResult};
use crate::cache::{CacheRegistry, FullDataSetCachePolicy, RepositoryCachePolicy};
use crate::db::SqlBuilder;
use crate::model::domain::{CacheableDomain, Domain};
use crate::model::node::NodeId;
use crate::query::{ColumnMap, Query, QueryField, QueryTranslator};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainField {
    Id,
    Name,
    RootNodeId,
    LanguageIso,
}

impl QueryField for DomainField {
    const ALL: &'static [Self] = &[Self::Id, Self::Name, Self::RootNodeId, Self::LanguageIso];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::RootNodeId => "root_node_id",
            Self::LanguageIso => "language_iso",
        }
    }
}

pub struct CacheableDomainRepository<'conn> {
    conn: &'conn Connection,
    columns: ColumnMap<DomainField>,
    cache: FullDataSetCachePolicy,
}

impl<'conn> CacheableDomainRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, caches: &CacheRegistry) -> RepoResult<Self> {
        ensure_tables(conn, &[("domains", &["id", "root_node_id", "name", "language_iso"])])?;
        let columns = ColumnMap::new("domain")
            .map(DomainField::Id, "id")
            .map(DomainField::Name, "name")
            .map(DomainField::RootNodeId, "root_node_id")
            .map(DomainField::LanguageIso, "language_iso");
        columns.validate()?;
        Ok(Self {
            conn,
            columns,
            cache: FullDataSetCachePolicy::new(caches.for_type::<CacheableDomain>()),
        })
    }

    fn base_query(&self) -> SqlBuilder {
        SqlBuilder::select(["id", "root_node_id", "name", "language_iso"])
            .from("domains")
            .order_by("id")
    }

    fn load(&self, base: SqlBuilder) -> RepoResult<Vec<CacheableDomain>> {
        let (sql, params) = base.build();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut domains = Vec::new();
        while let Some(row) = rows.next()? {
            domains.push(CacheableDomain {
                id: Some(row.get("id")?),
                name: row.get("name")?,
                root_node_id: row.get("root_node_id")?,
                language_iso: row.get("language_iso")?,
            });
        }
        Ok(domains)
    }

    fn ensure_name_free(&self, domain: &CacheableDomain) -> RepoResult<()> {
        let taken: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM domains WHERE name = ?1 COLLATE NOCASE AND id <> ?2
            );",
            params![domain.name, domain.id.unwrap_or_default()],
            |row| row.get(0),
        )?;
        if taken == 1 {
            return Err(RepoError::Duplicate {
                entity: "domain",
                value: domain.name.clone(),
            });
        }
        Ok(())
    }
}

impl Repository for CacheableDomainRepository<'_> {
    type Entity = CacheableDomain;
    type Field = DomainField;
    const ENTITY_NAME: &'static str = "domain";

    fn cache_policy(&self) -> &dyn RepositoryCachePolicy<CacheableDomain> {
        &self.cache
    }

    fn perform_get(&self, id: i64) -> RepoResult<Option<CacheableDomain>> {
        let base = self.base_query().where_clause("id = ?", vec![Value::Integer(id)]);
        Ok(self.load(base)?.into_iter().next())
    }

    fn perform_get_all(&self, ids: &[i64]) -> RepoResult<Vec<CacheableDomain>> {
        let mut base = self.base_query();
        if !ids.is_empty() {
            base = base.where_in("id", ids.iter().map(|id| Value::Integer(*id)).collect());
        }
        self.load(base)
    }

    fn perform_get_by_query(&self, query: &Query<DomainField>) -> RepoResult<Vec<CacheableDomain>> {
        let base = QueryTranslator::new(&self.columns).translate(self.base_query(), query)?;
        self.load(base)
    }

    fn perform_exists(&self, id: i64) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM domains WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn perform_count(&self, query: &Query<DomainField>) -> RepoResult<u64> {
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

    fn persist_new(&self, domain: &mut CacheableDomain) -> RepoResult<()> {
        self.ensure_name_free(domain)?;
        self.conn.execute(
            "INSERT INTO domains (root_node_id, name, language_iso) VALUES (?1, ?2, ?3);",
            params![domain.root_node_id, domain.name, domain.language_iso],
        )?;
        domain.id = Some(self.conn.last_insert_rowid());
        Ok(())
    }

    fn persist_updated(&self, domain: &mut CacheableDomain) -> RepoResult<()> {
        self.ensure_name_free(domain)?;
        let id = domain.id.unwrap_or_default();
        let changed = self.conn.execute(
            "UPDATE domains SET root_node_id = ?1, name = ?2, language_iso = ?3 WHERE id = ?4;",
            params![domain.root_node_id, domain.name, domain.language_iso, id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "domain",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn persist_deleted(&self, domain: &CacheableDomain) -> RepoResult<()> {
        if let Some(id) = domain.id {
            self.conn.execute("DELETE FROM domains WHERE id = ?1;", [id])?;
        }
        Ok(())
    }
}

/// Public domain repository over [`CacheableDomainRepository`].
pub struct DomainRepository<'conn> {
    conn: &'conn Connection,
    inner: CacheableDomainRepository<'conn>,
}

impl<'conn> DomainRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, caches: &CacheRegistry) -> RepoResult<Self> {
        Ok(Self {
            conn,
            inner: CacheableDomainRepository::try_new(conn, caches)?,
        })
    }

    pub fn get(&self, id: i64) -> RepoResult<Option<Domain>> {
        Ok(self.inner.get(id)?.map(Domain::from))
    }

    pub fn get_all(&self, ids: &[i64]) -> RepoResult<Vec<Domain>> {
        Ok(self.inner.get_all(ids)?.into_iter().map(Domain::from).collect())
    }

    pub fn exists(&self, id: i64) -> RepoResult<bool> {
        self.inner.exists(id)
    }

    /// Case-insensitive lookup by hostname.
    pub fn get_by_name(&self, name: &str) -> RepoResult<Option<Domain>> {
        Ok(self
            .inner
            .get_all(&[])?
            .into_iter()
            .find(|domain| domain.name.eq_ignore_ascii_case(name))
            .map(Domain::from))
    }

    /// Bindings attached to one content root.
    pub fn get_assigned(&self, root_content_id: NodeId, include_wildcards: bool) -> RepoResult<Vec<Domain>> {
        Ok(self
            .inner
            .get_all(&[])?
            .into_iter()
            .map(Domain::from)
            .filter(|domain| domain.root_content_id == Some(root_content_id))
            .filter(|domain| include_wildcards || !domain.is_wildcard())
            .collect())
    }

    /// Creates or updates `domain` in its own unit of work.
    pub fn save(&self, domain: &mut Domain) -> RepoResult<()> {
        let mut row = CacheableDomain::from(&*domain);
        let mut uow = UnitOfWork::new(self.conn);
        self.inner.add_or_update(&mut uow, &mut row)?;
        uow.commit()?;
        domain.id = row.id;
        Ok(())
    }

    pub fn delete(&self, domain: &Domain) -> RepoResult<()> {
        let row = CacheableDomain::from(domain);
        let mut uow = UnitOfWork::new(self.conn);
        self.inner.delete(&mut uow, &row)?;
        uow.commit()?;
        Ok(())
    }
}
