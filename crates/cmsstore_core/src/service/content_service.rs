//! Content use-case service.
//!
//! # Responsibility
//! - Save, publish and unpublish documents with an audit entry per write.
//! - Raise `ContentSaving` before and `ContentSaved` after a save.
//! - Expose recycle bin, version pruning and projection rebuild entry points.
//!
//! # Invariants
//! - The document write and its audit entry commit together or not at all.
//! - A cancelled save touches neither the database nor the cache.
//! - Post-write notifications are raised only after the outermost scope
//!   commits.

use crate::cache::CacheRegistry;
use crate::db::{defer_until_commit, run_in_scope};
use crate::events::{EventDispatcher, EventOutcome, Notification};
use crate::model::audit::{AuditAction, AuditEntry};
use crate::model::content::{Content, PublishAction};
use crate::model::node::{NodeId, ObjectType};
use crate::repo::{
    AuditRepository, ContentRepository, ContentXmlSerializer, RebuildReport, RecycleBinCapable,
    RepoError, RepoResult, Repository, UnitOfWork, UnitOfWorkWrites, Versionable,
};
use log::{info, warn};
use rusqlite::{params, Connection};
use std::sync::Arc;
use std::time::Instant;

/// Result of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// A `ContentSaving` handler vetoed the save.
    Cancelled,
}

pub struct ContentService<'conn> {
    conn: &'conn Connection,
    content: ContentRepository<'conn>,
    audit: AuditRepository<'conn>,
    events: Arc<EventDispatcher>,
}

impl<'conn> ContentService<'conn> {
    pub fn try_new(
        conn: &'conn Connection,
        caches: &CacheRegistry,
        events: Arc<EventDispatcher>,
    ) -> RepoResult<Self> {
        Ok(Self::from_parts(
            conn,
            ContentRepository::try_new(conn, caches)?,
            AuditRepository::try_new(conn)?,
            events,
        ))
    }

    /// Builds the service around preconfigured repositories.
    pub fn from_parts(
        conn: &'conn Connection,
        content: ContentRepository<'conn>,
        audit: AuditRepository<'conn>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            conn,
            content,
            audit,
            events,
        }
    }

    pub fn repository(&self) -> &ContentRepository<'conn> {
        &self.content
    }

    pub fn audit(&self) -> &AuditRepository<'conn> {
        &self.audit
    }

    /// Creates or updates `content`, publishing or unpublishing it when an
    /// action is pending on the entity.
    pub fn save(&self, content: &mut Content, user_id: i64) -> RepoResult<SaveOutcome> {
        let action = match content.publish_action() {
            PublishAction::Publish => AuditAction::Publish,
            PublishAction::Unpublish => AuditAction::Unpublish,
            PublishAction::None => AuditAction::Save,
        };

        if self
            .events
            .dispatch(&Notification::ContentSaving { content: &*content })
            == EventOutcome::Cancel
        {
            info!(
                "event=content_save module=service status=skip reason=cancelled node_id={}",
                content.id.map(|id| id.to_string()).unwrap_or_else(|| "new".to_string())
            );
            return Ok(SaveOutcome::Cancelled);
        }

        let started_at = Instant::now();
        let was_new = content.id.is_none();
        content.writer_id = user_id;
        if was_new {
            content.creator_id = user_id;
        }

        let saved = run_in_scope(self.conn, |_| {
            let mut uow = UnitOfWork::new(self.conn);
            self.content.add_or_update(&mut uow, &mut *content)?;
            uow.commit()?;
            self.write_audit(AuditEntry::new(content.id, user_id, action))
        });

        if let Err(err) = saved {
            // the content unit of work may have released its savepoint and
            // cached the entity before the outer scope rolled back
            if let Some(id) = content.id {
                self.content.cache_policy().clear_entity(id);
            }
            if was_new {
                content.id = None;
            }
            warn!(
                "event=content_save module=service status=error action={} error={}",
                action.as_db(),
                err
            );
            return Err(err);
        }

        let events = Arc::clone(&self.events);
        let saved_content = content.clone();
        defer_until_commit(self.conn, move || {
            events.dispatch(&Notification::ContentSaved {
                content: &saved_content,
            });
        });
        info!(
            "event=content_save module=service status=ok action={} node_id={} version={} duration_ms={}",
            action.as_db(),
            content.id.unwrap_or_default(),
            content.version,
            started_at.elapsed().as_millis()
        );
        Ok(SaveOutcome::Saved)
    }

    pub fn save_and_publish(&self, content: &mut Content, user_id: i64) -> RepoResult<SaveOutcome> {
        content.publish();
        self.save(content, user_id)
    }

    pub fn unpublish(&self, content: &mut Content, user_id: i64) -> RepoResult<SaveOutcome> {
        content.unpublish();
        self.save(content, user_id)
    }

    pub fn move_to_recycle_bin(&self, id: NodeId, user_id: i64) -> RepoResult<()> {
        run_in_scope(self.conn, |_| {
            self.content.move_to_recycle_bin(id)?;
            let mut entry = AuditEntry::new(Some(id), user_id, AuditAction::Move);
            entry.comment = Some("moved to recycle bin".to_string());
            self.write_audit(entry)
        })
    }

    /// Purges the bin and raises `RecycleBinEmptied`; returns removed nodes.
    pub fn empty_recycle_bin(&self, user_id: i64) -> RepoResult<usize> {
        let deleted = run_in_scope(self.conn, |_| {
            let deleted = self.content.empty_recycle_bin()?;
            let mut entry = AuditEntry::new(None, user_id, AuditAction::RecycleBinEmptied);
            entry.comment = Some(format!("{deleted} nodes removed"));
            self.write_audit(entry)?;
            Ok::<_, RepoError>(deleted)
        })?;

        let events = Arc::clone(&self.events);
        defer_until_commit(self.conn, move || {
            events.dispatch(&Notification::RecycleBinEmptied {
                object_type: ObjectType::Document,
                deleted,
            });
        });
        Ok(deleted)
    }

    /// Removes versions older than `before` (epoch ms) of the given
    /// documents, or of every document when `ids` is empty.
    pub fn prune_versions(&self, ids: &[NodeId], before: i64) -> RepoResult<usize> {
        let started_at = Instant::now();
        let ids = if ids.is_empty() {
            self.document_ids()?
        } else {
            ids.to_vec()
        };

        let mut removed = 0;
        for id in &ids {
            removed += self.content.delete_versions(*id, before)?;
        }
        info!(
            "event=version_prune module=service status=ok documents={} removed={} duration_ms={}",
            ids.len(),
            removed,
            started_at.elapsed().as_millis()
        );
        Ok(removed)
    }

    pub fn rebuild_xml(
        &self,
        serializer: &dyn ContentXmlSerializer,
        batch_size: usize,
        content_type_ids: &[NodeId],
    ) -> RepoResult<RebuildReport> {
        self.content
            .rebuild_xml(serializer, batch_size, content_type_ids)
    }

    fn write_audit(&self, mut entry: AuditEntry) -> RepoResult<()> {
        let mut uow = UnitOfWork::new(self.conn);
        self.audit.add_or_update(&mut uow, &mut entry)?;
        uow.commit()?;
        Ok(())
    }

    fn document_ids(&self) -> RepoResult<Vec<NodeId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM nodes WHERE object_type = ?1 ORDER BY id;")?;
        let mut rows = stmt.query(params![ObjectType::Document.as_db()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }
}
