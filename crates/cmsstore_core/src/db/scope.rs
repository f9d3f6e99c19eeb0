//! Transaction scopes over a shared connection.
//!
//! # Responsibility
//! - Give multi-statement writes all-or-nothing semantics.
//! - Let scopes nest: the outermost scope owns `BEGIN IMMEDIATE`, inner
//!   scopes become savepoints.
//!
//! - Hold post-commit hooks until the outermost scope commits.
//!
//! # Invariants
//! - A scope that is dropped without `complete()` rolls back every statement
//!   issued since it began.
//! - Errors raised inside `run_in_scope` are returned unchanged after rollback.
//! - Hooks deferred inside a scope that rolls back never run.

use log::{debug, error, warn};
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_SEQ: AtomicU64 = AtomicU64::new(0);

type CommitHook = Box<dyn FnOnce()>;

/// Open scopes and deferred hooks of one connection.
#[derive(Default)]
struct PendingCommit {
    open: usize,
    /// Hooks tagged with the depth of the scope that deferred them.
    hooks: Vec<(usize, CommitHook)>,
}

thread_local! {
    // keyed by connection address; a connection cannot move while borrowed
    // by an open scope
    static PENDING: RefCell<HashMap<usize, PendingCommit>> = RefCell::new(HashMap::new());
}

fn connection_key(conn: &Connection) -> usize {
    conn as *const Connection as usize
}

/// Runs `hook` once the outermost scope open on `conn` commits, or right
/// away when no scope is open. The hook is dropped if that scope, or the
/// nested scope it was deferred in, rolls back.
pub fn defer_until_commit(conn: &Connection, hook: impl FnOnce() + 'static) {
    let key = connection_key(conn);
    let hook: CommitHook = Box::new(hook);
    let pending = PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        match pending.get_mut(&key) {
            Some(state) if state.open > 0 => {
                state.hooks.push((state.open - 1, hook));
                None
            }
            _ => Some(hook),
        }
    });
    if let Some(hook) = pending {
        hook();
    }
}

/// Registers a scope at the next depth; `None` when the connection is in a
/// transaction no scope of this module opened.
fn enter(conn: &Connection, root: bool) -> Option<usize> {
    let key = connection_key(conn);
    PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        if root {
            pending.insert(
                key,
                PendingCommit {
                    open: 1,
                    hooks: Vec::new(),
                },
            );
            return Some(0);
        }
        let state = pending.get_mut(&key)?;
        state.open += 1;
        Some(state.open - 1)
    })
}

/// Closes the scope at `depth`; returns the hooks that are now due.
fn leave(conn: &Connection, depth: usize, committed: bool) -> Vec<CommitHook> {
    let key = connection_key(conn);
    PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        if depth == 0 {
            let state = pending.remove(&key).unwrap_or_default();
            return if committed {
                state.hooks.into_iter().map(|(_, hook)| hook).collect()
            } else {
                Vec::new()
            };
        }
        if let Some(state) = pending.get_mut(&key) {
            state.open = depth;
            if committed {
                // released work now belongs to the enclosing scope
                for (owner, _) in state.hooks.iter_mut() {
                    if *owner >= depth {
                        *owner = depth - 1;
                    }
                }
            } else {
                state.hooks.retain(|(owner, _)| *owner < depth);
            }
        }
        Vec::new()
    })
}

enum ScopeKind {
    Root,
    Savepoint(String),
}

/// RAII transaction scope bound to one connection.
pub struct TransactionScope<'conn> {
    conn: &'conn Connection,
    kind: ScopeKind,
    depth: Option<usize>,
    finished: bool,
}

impl<'conn> TransactionScope<'conn> {
    /// Opens a scope; becomes a savepoint when a transaction is already open.
    pub fn begin(conn: &'conn Connection) -> rusqlite::Result<Self> {
        let kind = if conn.is_autocommit() {
            conn.execute_batch("BEGIN IMMEDIATE;")?;
            ScopeKind::Root
        } else {
            let name = format!(
                "scope_{}",
                SAVEPOINT_SEQ.fetch_add(1, Ordering::Relaxed)
            );
            conn.execute_batch(&format!("SAVEPOINT {name};"))?;
            ScopeKind::Savepoint(name)
        };
        let depth = enter(conn, matches!(kind, ScopeKind::Root));

        Ok(Self {
            conn,
            kind,
            depth,
            finished: false,
        })
    }

    /// Connection the scope is bound to.
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Whether this scope is nested inside another one.
    pub fn is_nested(&self) -> bool {
        matches!(self.kind, ScopeKind::Savepoint(_))
    }

    /// Commits (or releases) the scope.
    pub fn complete(mut self) -> rusqlite::Result<()> {
        let sql = match &self.kind {
            ScopeKind::Root => "COMMIT;".to_string(),
            ScopeKind::Savepoint(name) => format!("RELEASE SAVEPOINT {name};"),
        };
        match self.conn.execute_batch(&sql) {
            Ok(()) => {
                self.finished = true;
                let due = self
                    .depth
                    .map(|depth| leave(self.conn, depth, true))
                    .unwrap_or_default();
                if !due.is_empty() {
                    debug!("event=scope_commit_hooks module=db status=ok hooks={}", due.len());
                }
                for hook in due {
                    hook();
                }
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=scope_complete module=db status=error nested={} error={}",
                    self.is_nested(),
                    err
                );
                // drop performs the rollback
                Err(err)
            }
        }
    }

    fn rollback(&mut self) {
        let sql = match &self.kind {
            ScopeKind::Root => "ROLLBACK;".to_string(),
            ScopeKind::Savepoint(name) => {
                format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};")
            }
        };
        if let Err(err) = self.conn.execute_batch(&sql) {
            error!(
                "event=scope_rollback module=db status=error nested={} error={}",
                self.is_nested(),
                err
            );
        } else {
            warn!(
                "event=scope_rollback module=db status=ok nested={}",
                self.is_nested()
            );
        }
        self.finished = true;
        if let Some(depth) = self.depth {
            leave(self.conn, depth, false);
        }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

/// Runs `work` inside a scope, committing on `Ok` and rolling back on `Err`.
pub fn run_in_scope<T, E, F>(conn: &Connection, work: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    let scope = TransactionScope::begin(conn)?;
    let value = work(scope.connection())?;
    scope.complete()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{defer_until_commit, run_in_scope, TransactionScope};
    use rusqlite::Connection;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER NOT NULL);")
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn error_inside_scope_rolls_back_every_statement() {
        let conn = setup();
        let result: Result<(), rusqlite::Error> = run_in_scope(&conn, |conn| {
            conn.execute("INSERT INTO t (v) VALUES (1);", [])?;
            conn.execute("INSERT INTO t (v) VALUES (NULL);", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count(&conn), 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn nested_scope_failure_only_rolls_back_inner_work() {
        let conn = setup();
        run_in_scope::<_, rusqlite::Error, _>(&conn, |conn| {
            conn.execute("INSERT INTO t (v) VALUES (1);", [])?;
            let inner: Result<(), rusqlite::Error> = run_in_scope(conn, |conn| {
                conn.execute("INSERT INTO t (v) VALUES (2);", [])?;
                conn.execute("INSERT INTO t (v) VALUES (NULL);", [])?;
                Ok(())
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn dropped_scope_without_complete_rolls_back() {
        let conn = setup();
        {
            let scope = TransactionScope::begin(&conn).unwrap();
            scope
                .connection()
                .execute("INSERT INTO t (v) VALUES (7);", [])
                .unwrap();
        }
        assert_eq!(count(&conn), 0);
    }

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |label: &'static str| {
            let sink = Rc::clone(&sink);
            Box::new(move || sink.borrow_mut().push(label)) as Box<dyn FnOnce()>
        };
        (log, make)
    }

    #[test]
    fn deferred_hook_runs_immediately_outside_a_scope() {
        let conn = setup();
        let (log, hook) = recorder();
        defer_until_commit(&conn, hook("now"));
        assert_eq!(*log.borrow(), vec!["now"]);
    }

    #[test]
    fn deferred_hooks_wait_for_the_outermost_commit() {
        let conn = setup();
        let (log, hook) = recorder();
        run_in_scope::<_, rusqlite::Error, _>(&conn, |conn| {
            run_in_scope::<_, rusqlite::Error, _>(conn, |conn| {
                defer_until_commit(conn, hook("inner"));
                Ok(())
            })?;
            assert!(log.borrow().is_empty());
            defer_until_commit(conn, hook("outer"));
            Ok(())
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec!["inner", "outer"]);
    }

    #[test]
    fn rolled_back_scopes_drop_their_deferred_hooks() {
        let conn = setup();
        let (log, hook) = recorder();
        run_in_scope::<_, rusqlite::Error, _>(&conn, |conn| {
            run_in_scope::<_, rusqlite::Error, _>(conn, |conn| {
                defer_until_commit(conn, hook("released"));
                Ok(())
            })?;
            let failed: Result<(), rusqlite::Error> = run_in_scope(conn, |conn| {
                defer_until_commit(conn, hook("rolled back"));
                conn.execute("INSERT INTO t (v) VALUES (NULL);", [])?;
                Ok(())
            });
            assert!(failed.is_err());
            Ok(())
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec!["released"]);

        let failed: Result<(), rusqlite::Error> = run_in_scope(&conn, |conn| {
            defer_until_commit(conn, hook("never"));
            conn.execute("INSERT INTO t (v) VALUES (NULL);", [])?;
            Ok(())
        });
        assert!(failed.is_err());
        assert_eq!(*log.borrow(), vec!["released"]);
    }
}
