//! Deferred, all-or-nothing repository writes.
//!
//! # Responsibility
//! - Collect add/update/delete registrations from any number of repositories.
//! - Execute them in registration order inside one transaction scope.
//!
//! # Invariants
//! - Nothing touches storage before `commit()`.
//! - A failed commit rolls back every registered write and runs the
//!   registered rollback hooks (cache compensation).
//! - After-commit hooks run only once the scope has committed.

use super::RepoResult;
use crate::db::TransactionScope;
use log::{error, info};
use rusqlite::Connection;
use std::time::Instant;

type Work<'a> = Box<dyn FnOnce(&mut CommitContext<'a>) -> RepoResult<()> + 'a>;
type Hook<'a> = Box<dyn FnOnce() + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Added,
    Changed,
    Removed,
}

impl OperationKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        }
    }
}

struct Registration<'a> {
    kind: OperationKind,
    entity: &'static str,
    work: Work<'a>,
}

/// State visible to registered work while a commit runs.
pub struct CommitContext<'a> {
    conn: &'a Connection,
    rollback_hooks: Vec<Hook<'a>>,
    after_commit: Vec<Hook<'a>>,
}

impl<'a> CommitContext<'a> {
    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// Runs `hook` if the commit ends up rolled back.
    pub fn on_rollback(&mut self, hook: impl FnOnce() + 'a) {
        self.rollback_hooks.push(Box::new(hook));
    }

    /// Runs `hook` after the scope committed.
    pub fn after_commit(&mut self, hook: impl FnOnce() + 'a) {
        self.after_commit.push(Box::new(hook));
    }

    fn run_rollback_hooks(self) {
        for hook in self.rollback_hooks.into_iter().rev() {
            hook();
        }
    }
}

/// Ordered batch of repository writes bound to one connection.
pub struct UnitOfWork<'a> {
    conn: &'a Connection,
    registrations: Vec<Registration<'a>>,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            registrations: Vec::new(),
        }
    }

    pub fn register_added(
        &mut self,
        entity: &'static str,
        work: impl FnOnce(&mut CommitContext<'a>) -> RepoResult<()> + 'a,
    ) {
        self.register(OperationKind::Added, entity, Box::new(work));
    }

    pub fn register_changed(
        &mut self,
        entity: &'static str,
        work: impl FnOnce(&mut CommitContext<'a>) -> RepoResult<()> + 'a,
    ) {
        self.register(OperationKind::Changed, entity, Box::new(work));
    }

    pub fn register_removed(
        &mut self,
        entity: &'static str,
        work: impl FnOnce(&mut CommitContext<'a>) -> RepoResult<()> + 'a,
    ) {
        self.register(OperationKind::Removed, entity, Box::new(work));
    }

    fn register(&mut self, kind: OperationKind, entity: &'static str, work: Work<'a>) {
        self.registrations.push(Registration { kind, entity, work });
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Executes every registration in one scope; returns how many ran.
    pub fn commit(self) -> RepoResult<usize> {
        let count = self.registrations.len();
        if count == 0 {
            return Ok(0);
        }

        let started_at = Instant::now();
        let scope = TransactionScope::begin(self.conn)?;
        let mut ctx = CommitContext {
            conn: scope.connection(),
            rollback_hooks: Vec::new(),
            after_commit: Vec::new(),
        };

        for registration in self.registrations {
            if let Err(err) = (registration.work)(&mut ctx) {
                error!(
                    "event=uow_commit module=repo status=error entity={} operation={} error={}",
                    registration.entity,
                    registration.kind.as_str(),
                    err
                );
                drop(scope);
                ctx.run_rollback_hooks();
                return Err(err);
            }
        }

        if let Err(err) = scope.complete() {
            ctx.run_rollback_hooks();
            return Err(err.into());
        }

        for hook in ctx.after_commit {
            hook();
        }
        info!(
            "event=uow_commit module=repo status=ok operations={} duration_ms={}",
            count,
            started_at.elapsed().as_millis()
        );
        Ok(count)
    }
}
