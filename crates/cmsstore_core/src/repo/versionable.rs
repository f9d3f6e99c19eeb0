//! Version history operations of versioned repositories.

use super::base::Repository;
use super::content_repo::ContentRepository;
use super::node_store::parse_uuid;
use super::{RepoError, RepoResult};
use crate::db::run_in_scope;
use crate::model::content::Content;
use crate::model::entity::Entity;
use crate::model::node::NodeId;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

pub trait Versionable: Repository {
    /// Every version of one entity, newest version date first.
    fn get_all_versions(&self, id: <Self::Entity as Entity>::Id) -> RepoResult<Vec<Self::Entity>>;

    fn get_by_version(&self, version: Uuid) -> RepoResult<Option<Self::Entity>>;

    /// Removes one version that is neither newest nor published, with its
    /// property rows.
    fn delete_version(&self, id: <Self::Entity as Entity>::Id, version: Uuid) -> RepoResult<()>;

    /// Removes versions dated before `before` (epoch ms), keeping the newest
    /// and the published version. Returns how many were removed.
    fn delete_versions(&self, id: <Self::Entity as Entity>::Id, before: i64) -> RepoResult<usize>;
}

impl Versionable for ContentRepository<'_> {
    fn get_all_versions(&self, id: NodeId) -> RepoResult<Vec<Content>> {
        let base = self
            .base_query()
            .where_clause("n.id = ?", vec![Value::Integer(id)])
            .order_by("cv.version_date DESC")
            .order_by("cv.id DESC");
        self.assemble(base)
    }

    fn get_by_version(&self, version: Uuid) -> RepoResult<Option<Content>> {
        let base = self
            .base_query()
            .where_clause("cv.version_id = ?", vec![Value::Text(version.to_string())]);
        Ok(self.assemble(base)?.into_iter().next())
    }

    fn delete_version(&self, id: NodeId, version: Uuid) -> RepoResult<()> {
        let flags: Option<(bool, bool)> = self
            .conn
            .query_row(
                "SELECT newest, published FROM documents WHERE node_id = ?1 AND version_id = ?2;",
                params![id, version.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match flags {
            None => {
                return Err(RepoError::NotFound {
                    entity: "content_version",
                    id: version.to_string(),
                })
            }
            Some((true, _)) => return Err(RepoError::CannotDeleteNewestVersion(version)),
            Some((false, true)) => return Err(RepoError::CannotDeletePublishedVersion(version)),
            Some((false, false)) => {}
        }

        run_in_scope(self.conn, |conn| remove_version_rows(conn, version))?;
        self.forget(&[id]);
        info!(
            "event=content_version_delete module=repo status=ok node_id={} version={}",
            id, version
        );
        Ok(())
    }

    fn delete_versions(&self, id: NodeId, before: i64) -> RepoResult<usize> {
        let mut stmt = self.conn.prepare(
            "SELECT cv.version_id
             FROM content_versions cv
             INNER JOIN documents d ON d.version_id = cv.version_id
             WHERE cv.node_id = ?1
               AND cv.version_date < ?2
               AND d.newest = 0
               AND d.published = 0
             ORDER BY cv.version_date ASC;",
        )?;
        let mut rows = stmt.query(params![id, before])?;
        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            let version: String = row.get(0)?;
            candidates.push(parse_uuid(&version, "content_versions.version_id")?);
        }

        if candidates.is_empty() {
            return Ok(0);
        }
        run_in_scope(self.conn, |conn| {
            for version in &candidates {
                remove_version_rows(conn, *version)?;
            }
            Ok::<_, RepoError>(())
        })?;
        self.forget(&[id]);
        info!(
            "event=content_version_prune module=repo status=ok node_id={} removed={}",
            id,
            candidates.len()
        );
        Ok(candidates.len())
    }
}

fn remove_version_rows(conn: &Connection, version: Uuid) -> RepoResult<()> {
    let version = version.to_string();
    conn.execute("DELETE FROM property_data WHERE version_id = ?1;", [&version])?;
    conn.execute("DELETE FROM preview_xml WHERE version_id = ?1;", [&version])?;
    conn.execute("DELETE FROM documents WHERE version_id = ?1;", [&version])?;
    conn.execute("DELETE FROM content_versions WHERE version_id = ?1;", [&version])?;
    Ok(())
}
