use cmsstore_core::cache::CacheRegistry;
use cmsstore_core::db::{open_db_in_memory, run_in_scope};
use cmsstore_core::events::{EventDispatcher, EventOutcome, Notification};
use cmsstore_core::model::node::NodeId;
use cmsstore_core::model::permission::{EntityPermission, EntityPermissionSet};
use cmsstore_core::repo::{PermissionRepository, RepoError};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn seed_nodes(conn: &Connection, count: usize) -> Vec<NodeId> {
    conn.execute(
        "WITH RECURSIVE seq(n) AS (
            SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?1
         )
         INSERT INTO nodes (unique_id, parent_id, level, path, object_type)
         SELECT 'permission-node-' || n, -1, 1, '-1,p' || n, 'test' FROM seq;",
        [count as i64],
    )
    .unwrap();
    let mut stmt = conn
        .prepare("SELECT id FROM nodes WHERE object_type = 'test' ORDER BY id;")
        .unwrap();
    let ids = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<NodeId>, _>>()
        .unwrap();
    ids
}

fn counting_dispatcher() -> (Arc<EventDispatcher>, Arc<AtomicUsize>) {
    let events = Arc::new(EventDispatcher::new());
    let raised = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&raised);
    events.subscribe(move |notification| {
        if let Notification::PermissionsAssigned { .. } = notification {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        EventOutcome::Continue
    });
    (events, raised)
}

#[test]
fn replace_overwrites_grants_of_one_principal() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let (events, raised) = counting_dispatcher();
    let repo = PermissionRepository::try_new(&conn, &caches, events).unwrap();
    let ids = seed_nodes(&conn, 2);

    repo.replace(7, &['F', 'U'], &ids).unwrap();
    repo.replace(8, &['A'], &ids[..1]).unwrap();
    repo.replace(7, &['R'], &ids).unwrap();

    let grants = repo.get_for_entities(7, &ids).unwrap();
    assert_eq!(
        grants,
        vec![
            EntityPermission::new(7, ids[0], &['R']),
            EntityPermission::new(7, ids[1], &['R']),
        ]
    );
    assert_eq!(repo.get_for_entities(8, &[]).unwrap().len(), 1);
    assert_eq!(raised.load(Ordering::SeqCst), 3);
}

#[test]
fn writes_invalidate_cached_lookups() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = PermissionRepository::try_new(&conn, &caches, Arc::new(EventDispatcher::new())).unwrap();
    let ids = seed_nodes(&conn, 1);

    assert!(repo.get_for_entities(3, &ids).unwrap().is_empty());
    repo.assign(3, 'B', &ids).unwrap();
    repo.assign(3, 'B', &ids).unwrap();

    assert_eq!(
        repo.get_for_entities(3, &ids).unwrap(),
        vec![EntityPermission::new(3, ids[0], &['B'])]
    );
}

#[test]
fn replace_for_entity_is_scoped_to_that_entity() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let (events, raised) = counting_dispatcher();
    let repo = PermissionRepository::try_new(&conn, &caches, events).unwrap();
    let ids = seed_nodes(&conn, 2);
    repo.replace(1, &['F'], &ids).unwrap();
    repo.replace(2, &['U'], &ids).unwrap();

    repo.replace_for_entity(&EntityPermissionSet {
        entity_id: ids[0],
        permissions: vec![EntityPermission::new(3, ids[0], &['C', 'A'])],
    })
    .unwrap();

    let first = repo.get_for_entity(ids[0]).unwrap();
    assert_eq!(first.permissions, vec![EntityPermission::new(3, ids[0], &['A', 'C'])]);
    let second = repo.get_for_entity(ids[1]).unwrap();
    assert_eq!(second.permissions.len(), 2);
    assert!(repo.get_for_entities(1, &ids[..1]).unwrap().is_empty());
    assert_eq!(raised.load(Ordering::SeqCst), 3);
}

#[test]
fn replace_over_parameter_limit_runs_in_batches() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let (events, raised) = counting_dispatcher();
    let repo = PermissionRepository::try_new(&conn, &caches, events).unwrap();
    let ids = seed_nodes(&conn, 2001);

    repo.replace(5, &['R'], &ids).unwrap();

    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM node_permissions WHERE principal_id = 5;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 2001);
    assert_eq!(repo.get_for_entities(5, &ids).unwrap().len(), 2001);
    assert_eq!(raised.load(Ordering::SeqCst), 1);
}

#[test]
fn nested_writes_notify_once_the_outer_transaction_commits() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let (events, raised) = counting_dispatcher();
    let repo = PermissionRepository::try_new(&conn, &caches, events).unwrap();
    let ids = seed_nodes(&conn, 2);

    run_in_scope::<_, RepoError, _>(&conn, |_| {
        repo.replace(4, &['F'], &ids)?;
        repo.assign(4, 'U', &ids[..1])?;
        assert_eq!(raised.load(Ordering::SeqCst), 0);
        Ok(())
    })
    .unwrap();
    assert_eq!(raised.load(Ordering::SeqCst), 2);

    let rolled_back = run_in_scope::<(), RepoError, _>(&conn, |_| {
        repo.replace(9, &['A'], &ids)?;
        Err(RepoError::InvalidData("abort".to_string()))
    });
    assert!(rolled_back.is_err());
    assert_eq!(raised.load(Ordering::SeqCst), 2);
    assert!(repo.get_for_entities(9, &ids).unwrap().is_empty());
}
