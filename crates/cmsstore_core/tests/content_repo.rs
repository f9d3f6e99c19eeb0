use cmsstore_core::cache::CacheRegistry;
use cmsstore_core::db::open_db_in_memory;
use cmsstore_core::events::EventDispatcher;
use cmsstore_core::model::content::Content;
use cmsstore_core::model::content_type::ContentType;
use cmsstore_core::model::domain::Domain;
use cmsstore_core::model::node::{NodeId, CONTENT_RECYCLE_BIN_ID, ROOT_NODE_ID};
use cmsstore_core::model::property::{PropertyValue, StorageKind};
use cmsstore_core::query::{FieldExt, Query};
use cmsstore_core::repo::{
    CachedLookup, ContentField, ContentRepository, DomainRepository, PermissionRepository,
    RecycleBinCapable, RepoError, SortDirection, UnitOfWork, UnitOfWorkWrites, Versionable,
};
use rusqlite::Connection;
use std::sync::Arc;

fn article_type(repo: &ContentRepository<'_>, conn: &Connection) -> ContentType {
    let mut content_type = ContentType::new("article", "Article")
        .with_property("body", "Body", StorageKind::Ntext)
        .with_property("rank", "Rank", StorageKind::Integer)
        .with_tag_property("tags", "Tags", "default");
    let mut uow = UnitOfWork::new(conn);
    repo.content_types()
        .add_or_update(&mut uow, &mut content_type)
        .unwrap();
    uow.commit().unwrap();
    content_type
}

fn save(repo: &ContentRepository<'_>, conn: &Connection, content: &mut Content) {
    let mut uow = UnitOfWork::new(conn);
    repo.add_or_update(&mut uow, content).unwrap();
    uow.commit().unwrap();
}

fn create(
    repo: &ContentRepository<'_>,
    conn: &Connection,
    content_type: &ContentType,
    name: &str,
    parent_id: NodeId,
) -> Content {
    let mut content = Content::new(name, parent_id, content_type, 0);
    save(repo, conn, &mut content);
    content
}

fn count(conn: &Connection, sql: &str, id: NodeId) -> i64 {
    conn.query_row(sql, [id], |row| row.get(0)).unwrap()
}

#[test]
fn created_documents_get_parent_path_plus_own_id() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let parent = create(&repo, &conn, &article, "parent", ROOT_NODE_ID);
    let child = create(&repo, &conn, &article, "child", parent.id.unwrap());

    assert_eq!(parent.path, format!("-1,{}", parent.id.unwrap()));
    assert_eq!(parent.level, 1);
    assert_eq!(child.path, format!("{},{}", parent.path, child.id.unwrap()));
    assert_eq!(child.level, parent.level + 1);
}

#[test]
fn moving_a_document_rewrites_its_subtree_paths() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let first = create(&repo, &conn, &article, "first", ROOT_NODE_ID);
    let second = create(&repo, &conn, &article, "second", ROOT_NODE_ID);
    let mut moved = create(&repo, &conn, &article, "moved", first.id.unwrap());
    let leaf = create(&repo, &conn, &article, "leaf", moved.id.unwrap());
    // warm the cache with the old path
    assert_eq!(repo.get(leaf.id.unwrap()).unwrap().unwrap().path, leaf.path);

    moved.parent_id = second.id.unwrap();
    save(&repo, &conn, &mut moved);

    assert_eq!(moved.path, format!("{},{}", second.path, moved.id.unwrap()));
    let leaf = repo.get(leaf.id.unwrap()).unwrap().unwrap();
    assert_eq!(leaf.path, format!("{},{}", moved.path, leaf.id.unwrap()));
    assert_eq!(leaf.level, 3);
}

#[test]
fn exactly_one_version_stays_newest_across_saves() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let mut content = create(&repo, &conn, &article, "draft", ROOT_NODE_ID);
    let id = content.id.unwrap();
    let first_version = content.version;

    content.set_value("body", "edited draft").unwrap();
    save(&repo, &conn, &mut content);
    assert_eq!(content.version, first_version);

    content.publish();
    save(&repo, &conn, &mut content);
    assert_eq!(content.version, first_version);
    assert_eq!(content.published_version, Some(first_version));

    content.name = "published then edited".to_string();
    save(&repo, &conn, &mut content);
    assert_ne!(content.version, first_version);
    assert!(!content.published);

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM documents WHERE node_id = ?1;", id), 2);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM documents WHERE node_id = ?1 AND newest = 1;", id),
        1
    );
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM documents WHERE node_id = ?1 AND published = 1;", id),
        1
    );

    let loaded = repo.get(id).unwrap().unwrap();
    assert_eq!(loaded.name, "published then edited");
    assert_eq!(loaded.published_version, Some(first_version));
    assert_eq!(
        loaded.value("body"),
        Some(&PropertyValue::Text("edited draft".to_string()))
    );
}

#[test]
fn newest_and_published_versions_cannot_be_deleted_but_older_ones_can() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches)
        .unwrap()
        .with_new_version_rule(|content| content.id.is_some());
    let article = article_type(&repo, &conn);

    let mut content = Content::new("versioned", ROOT_NODE_ID, &article, 0);
    content.set_value("body", "v1").unwrap();
    save(&repo, &conn, &mut content);
    let id = content.id.unwrap();
    let old_version = content.version;

    content.set_value("body", "v2").unwrap();
    content.publish();
    save(&repo, &conn, &mut content);
    let published_version = content.version;

    content.set_value("body", "v3").unwrap();
    save(&repo, &conn, &mut content);
    let newest_version = content.version;

    let err = repo.delete_version(id, newest_version).unwrap_err();
    assert!(matches!(err, RepoError::CannotDeleteNewestVersion(version) if version == newest_version));
    let err = repo.delete_version(id, published_version).unwrap_err();
    assert!(matches!(err, RepoError::CannotDeletePublishedVersion(version) if version == published_version));

    repo.delete_version(id, old_version).unwrap();
    let versions: Vec<_> = repo
        .get_all_versions(id)
        .unwrap()
        .into_iter()
        .map(|version| version.version)
        .collect();
    assert_eq!(versions.len(), 2);
    assert!(versions.contains(&newest_version));
    assert!(versions.contains(&published_version));
    let remaining: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM property_data WHERE version_id = ?1;",
            [old_version.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(repo.get_by_version(old_version).unwrap().is_none());
    assert!(repo.get_by_version(newest_version).unwrap().is_some());
}

#[test]
fn delete_versions_keeps_newest_and_published() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches)
        .unwrap()
        .with_new_version_rule(|content| content.id.is_some());
    let article = article_type(&repo, &conn);

    let mut content = create(&repo, &conn, &article, "history", ROOT_NODE_ID);
    let id = content.id.unwrap();
    content.publish();
    save(&repo, &conn, &mut content);
    let published_version = content.version;
    content.name = "history 3".to_string();
    save(&repo, &conn, &mut content);
    content.name = "history 4".to_string();
    save(&repo, &conn, &mut content);
    assert_eq!(repo.get_all_versions(id).unwrap().len(), 4);

    let removed = repo.delete_versions(id, i64::MAX).unwrap();

    assert_eq!(removed, 2);
    let versions: Vec<_> = repo
        .get_all_versions(id)
        .unwrap()
        .into_iter()
        .map(|version| version.version)
        .collect();
    assert_eq!(versions.len(), 2);
    assert!(versions.contains(&published_version));
    assert!(versions.contains(&content.version));
}

#[test]
fn paging_returns_requested_slice_and_total() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let folder = create(&repo, &conn, &article, "folder", ROOT_NODE_ID);
    for index in 1..=5 {
        create(&repo, &conn, &article, &format!("doc {index}"), folder.id.unwrap());
    }

    let query = Query::new().filter(ContentField::ParentId.equals(folder.id.unwrap()));
    let (page, total) = repo
        .get_paged(&query, 1, 2, ContentField::Name, SortDirection::Ascending)
        .unwrap();

    assert_eq!(total, 5);
    let names: Vec<_> = page.iter().map(|content| content.name.as_str()).collect();
    assert_eq!(names, vec!["doc 3", "doc 4"]);

    let (last, _) = repo
        .get_paged(&query, 0, 1, ContentField::Name, SortDirection::Descending)
        .unwrap();
    assert_eq!(last[0].name, "doc 5");

    let (beyond, total) = repo
        .get_paged(&query, u64::MAX / 2, 10, ContentField::Name, SortDirection::Ascending)
        .unwrap();
    assert!(beyond.is_empty());
    assert_eq!(total, 5);
}

#[test]
fn translated_filter_returns_exactly_matching_documents() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let foo_one = create(&repo, &conn, &article, "Foo one", ROOT_NODE_ID);
    let foobar = create(&repo, &conn, &article, "Foobar", ROOT_NODE_ID);
    create(&repo, &conn, &article, "Bar Foo", ROOT_NODE_ID);
    let trashed = create(&repo, &conn, &article, "Foo trashed", ROOT_NODE_ID);
    repo.move_to_recycle_bin(trashed.id.unwrap()).unwrap();

    let query = Query::new()
        .filter(ContentField::Name.starts_with("Foo"))
        .filter(ContentField::Trashed.equals(false));
    let mut ids: Vec<_> = repo
        .get_by_query(&query)
        .unwrap()
        .into_iter()
        .filter_map(|content| content.id)
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, vec![foo_one.id.unwrap(), foobar.id.unwrap()]);
    assert_eq!(repo.count(&query).unwrap(), 2);
}

#[test]
fn saved_document_is_served_from_cache() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);
    let content = create(&repo, &conn, &article, "cached", ROOT_NODE_ID);
    let id = content.id.unwrap();

    conn.execute("UPDATE documents SET name = 'changed behind the cache';", [])
        .unwrap();

    let cached = repo.get(id).unwrap().unwrap();
    assert_eq!(cached, content);
}

#[test]
fn get_all_rejects_more_than_two_thousand_ids() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let ids: Vec<NodeId> = (1..=2001).collect();

    let err = repo.get_all(&ids).unwrap_err();

    assert!(matches!(
        err,
        RepoError::ParameterLimit {
            requested: 2001,
            max: 2000
        }
    ));
}

#[test]
fn missing_ids_are_absent_from_get_all() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);
    let content = create(&repo, &conn, &article, "present", ROOT_NODE_ID);

    let found = repo.get_all(&[content.id.unwrap(), 999_999]).unwrap();

    assert_eq!(found.len(), 1);
    assert!(repo.get(999_999).unwrap().is_none());
    assert!(!repo.exists(999_999).unwrap());
}

#[test]
fn emptying_the_recycle_bin_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let mut doomed = Content::new("doomed", ROOT_NODE_ID, &article, 0);
    doomed.set_value("tags", "a,b").unwrap();
    doomed.publish();
    save(&repo, &conn, &mut doomed);
    let doomed_id = doomed.id.unwrap();
    let child = create(&repo, &conn, &article, "doomed child", doomed_id);
    let survivor = create(&repo, &conn, &article, "survivor", ROOT_NODE_ID);

    repo.move_to_recycle_bin(doomed_id).unwrap();
    let in_bin = repo.get_recycle_bin_items().unwrap();
    assert_eq!(in_bin.len(), 2);
    let trashed = repo.get(doomed_id).unwrap().unwrap();
    assert!(trashed.trashed);
    assert!(!trashed.published);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tag_relationships WHERE node_id = ?1;", doomed_id), 0);

    assert_eq!(repo.empty_recycle_bin().unwrap(), 2);
    assert_eq!(repo.empty_recycle_bin().unwrap(), 0);

    assert!(repo.get(doomed_id).unwrap().is_none());
    assert!(repo.get(child.id.unwrap()).unwrap().is_none());
    assert!(repo.get(survivor.id.unwrap()).unwrap().is_some());
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM nodes WHERE id = ?1;", doomed_id), 0);
    assert!(repo.get_recycle_bin_items().unwrap().is_empty());
}

#[test]
fn restored_document_survives_emptying_the_bin() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let restored = create(&repo, &conn, &article, "restored", ROOT_NODE_ID);
    let restored_id = restored.id.unwrap();
    repo.move_to_recycle_bin(restored_id).unwrap();

    let mut restored = repo.get(restored_id).unwrap().unwrap();
    assert!(restored.trashed);
    restored.parent_id = ROOT_NODE_ID;
    save(&repo, &conn, &mut restored);
    assert!(!restored.trashed);
    assert_eq!(restored.path, format!("{ROOT_NODE_ID},{restored_id}"));
    assert_eq!(count(&conn, "SELECT trashed FROM nodes WHERE id = ?1;", restored_id), 0);

    assert_eq!(repo.empty_recycle_bin().unwrap(), 0);
    assert!(repo.get(restored_id).unwrap().is_some());

    let mut dropped = create(&repo, &conn, &article, "dropped", ROOT_NODE_ID);
    dropped.parent_id = CONTENT_RECYCLE_BIN_ID;
    save(&repo, &conn, &mut dropped);
    assert!(dropped.trashed);
    assert_eq!(repo.empty_recycle_bin().unwrap(), 1);
    assert!(repo.get(dropped.id.unwrap()).unwrap().is_none());
    assert!(repo.get(restored_id).unwrap().is_some());
}

#[test]
fn deleting_a_document_drops_cached_domains_and_grants() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let domains = DomainRepository::try_new(&conn, &caches).unwrap();
    let permissions =
        PermissionRepository::try_new(&conn, &caches, Arc::new(EventDispatcher::new())).unwrap();
    let article = article_type(&repo, &conn);

    let site = create(&repo, &conn, &article, "site", ROOT_NODE_ID);
    let site_id = site.id.unwrap();
    let mut domain = Domain::new("site.example", Some(site_id));
    domains.save(&mut domain).unwrap();
    permissions.replace(5, &['F'], &[site_id]).unwrap();
    assert_eq!(domains.get_all(&[]).unwrap().len(), 1);
    assert_eq!(permissions.get_for_entities(5, &[site_id]).unwrap().len(), 1);

    {
        let mut uow = UnitOfWork::new(&conn);
        repo.delete(&mut uow, &site).unwrap();
        uow.commit().unwrap();
    }

    assert!(domains.get_all(&[]).unwrap().is_empty());
    assert!(domains.get_by_name("site.example").unwrap().is_none());
    assert!(permissions.get_for_entities(5, &[site_id]).unwrap().is_empty());
}

#[test]
fn emptying_the_bin_drops_cached_grants_on_purged_documents() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let permissions =
        PermissionRepository::try_new(&conn, &caches, Arc::new(EventDispatcher::new())).unwrap();
    let article = article_type(&repo, &conn);

    let doomed = create(&repo, &conn, &article, "doomed", ROOT_NODE_ID);
    let kept = create(&repo, &conn, &article, "kept", ROOT_NODE_ID);
    let ids = [doomed.id.unwrap(), kept.id.unwrap()];
    permissions.replace(5, &['F'], &ids).unwrap();
    assert_eq!(permissions.get_for_entities(5, &[]).unwrap().len(), 2);
    assert_eq!(permissions.get_for_entities(5, &ids).unwrap().len(), 2);

    repo.move_to_recycle_bin(ids[0]).unwrap();
    assert_eq!(repo.empty_recycle_bin().unwrap(), 1);

    let remaining = permissions.get_for_entities(5, &[]).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].entity_id, ids[1]);
    assert_eq!(permissions.get_for_entities(5, &ids).unwrap().len(), 1);
}

#[test]
fn rebuild_xml_skips_documents_that_fail_to_serialize() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let mut bad_id = 0;
    for name in ["good one", "bad", "good two"] {
        let mut content = Content::new(name, ROOT_NODE_ID, &article, 0);
        content.publish();
        save(&repo, &conn, &mut content);
        if name == "bad" {
            bad_id = content.id.unwrap();
        }
    }
    create(&repo, &conn, &article, "unpublished", ROOT_NODE_ID);

    let serializer = |content: &Content| -> Result<String, String> {
        if content.name == "bad" {
            Err("cannot render".to_string())
        } else {
            Ok(format!("<article>{}</article>", content.name))
        }
    };
    let report = repo.rebuild_xml(&serializer, 2, &[]).unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.written, 2);
    assert_eq!(report.failed, vec![bad_id]);
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM content_xml;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn publishing_syncs_tags_and_unpublishing_clears_them() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let mut content = Content::new("tagged", ROOT_NODE_ID, &article, 0);
    content.set_value("tags", "rust, sqlite").unwrap();
    save(&repo, &conn, &mut content);
    let id = content.id.unwrap();
    assert!(repo.tags().get_for_node(id).unwrap().is_empty());

    content.publish();
    save(&repo, &conn, &mut content);
    let texts: Vec<_> = repo
        .tags()
        .get_for_node(id)
        .unwrap()
        .into_iter()
        .map(|tag| tag.text)
        .collect();
    assert_eq!(texts, vec!["rust".to_string(), "sqlite".to_string()]);

    content.unpublish();
    save(&repo, &conn, &mut content);
    assert!(repo.tags().get_for_node(id).unwrap().is_empty());
}

#[test]
fn content_type_aliases_are_unique() {
    let conn = open_db_in_memory().unwrap();
    let caches = CacheRegistry::default();
    let repo = ContentRepository::try_new(&conn, &caches).unwrap();
    let article = article_type(&repo, &conn);

    let found = repo.content_types().get_by_alias("article").unwrap().unwrap();
    assert_eq!(found.id, article.id);
    assert_eq!(found.property_types.len(), 3);

    let mut duplicate = ContentType::new("article", "Second article");
    let mut uow = UnitOfWork::new(&conn);
    repo.content_types()
        .add_or_update(&mut uow, &mut duplicate)
        .unwrap();
    let err = uow.commit().unwrap_err();
    assert!(matches!(err, RepoError::Duplicate { entity: "content_type", .. }));
}
