//! End-to-end tests across the whole storage stack: catalog, table heap,
//! B+-tree index, buffer pool, and disk file.

use common::{Config, ReplacerPolicy, Status, Transaction};
use database::Database;
use pretty_assertions::assert_eq;
use record::{Column, Field, Row, Schema};
use std::path::Path;
use std::sync::Once;

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn config(path: &Path, pool_pages: usize) -> Config {
    Config::builder()
        .db_path(path.to_path_buf())
        .buffer_pool_pages(pool_pages)
        .replacer(ReplacerPolicy::LruK { k: 2 })
        .build()
}

fn people_schema() -> Schema {
    Schema::new(vec![
        Column::new_int("id", 0, false, true),
        Column::new_char("name", 24, 1, false, false),
        Column::new_float("score", 2, true, false),
    ])
}

fn person(id: i32, name: &str, score: f32) -> Row {
    Row::new(vec![
        Field::Int(id),
        Field::Char(name.into()),
        Field::Float(score),
    ])
}

fn txn() -> Transaction {
    Transaction::default()
}

#[test]
fn fresh_database_opens_empty_and_reopens() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.db");

    let db = Database::open(config(&path, 16)).unwrap();
    assert!(db.catalog().detached_tables().is_empty());
    db.close().unwrap();

    let db = Database::open(config(&path, 16)).unwrap();
    assert!(db.catalog().detached_tables().is_empty());
    db.close().unwrap();
}

#[test]
fn rows_survive_close_and_reopen() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.db");

    let table_id = {
        let mut db = Database::open(config(&path, 16)).unwrap();
        assert_eq!(
            db.catalog_mut()
                .create_table("people", people_schema(), &txn())
                .unwrap(),
            Status::Success
        );
        let table = db.catalog().get_table("people").unwrap();
        for i in 0..200 {
            let mut row = person(i, &format!("person-{i}"), i as f32 / 2.0);
            assert!(table.heap.insert_tuple(&mut row, &txn()).unwrap());
        }
        let table_id = table.table_id;
        db.close().unwrap();
        table_id
    };

    // A second process attaches the schema and reads every row back.
    let mut db = Database::open(config(&path, 16)).unwrap();
    assert_eq!(
        db.catalog_mut()
            .attach_table(table_id, "people", people_schema()),
        Status::Success
    );
    let table = db.catalog().get_table("people").unwrap();
    let ids: Vec<i32> = table
        .heap
        .iter()
        .map(|row| match row.unwrap().fields[0] {
            Field::Int(v) => v,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(ids, (0..200).collect::<Vec<_>>());
    db.close().unwrap();
}

#[test]
fn index_points_back_at_heap_rows() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indexed.db");
    let mut db = Database::open(config(&path, 32)).unwrap();

    db.catalog_mut()
        .create_table("people", people_schema(), &txn())
        .unwrap();
    {
        let table = db.catalog().get_table("people").unwrap();
        for i in 0..100 {
            let mut row = person(i, &format!("p{i}"), 0.0);
            table.heap.insert_tuple(&mut row, &txn()).unwrap();
        }
    }
    assert_eq!(
        db.catalog_mut()
            .create_index("people", "people_by_id", &["id"], &txn())
            .unwrap(),
        Status::Success
    );

    // Every index hit resolves to the right heap tuple.
    let table = db.catalog().get_table("people").unwrap();
    let index = db.catalog().get_index("people_by_id").unwrap();
    for probe in [0, 17, 63, 99] {
        let hits = index.tree.get(&Row::new(vec![Field::Int(probe)])).unwrap();
        assert_eq!(hits.len(), 1);
        let row = table.heap.get_tuple(hits[0], &txn()).unwrap().unwrap();
        assert_eq!(row.fields[0], Field::Int(probe));
        assert_eq!(row.fields[1], Field::Char(format!("p{probe}")));
    }
    assert!(index
        .tree
        .get(&Row::new(vec![Field::Int(1000)]))
        .unwrap()
        .is_empty());

    // Range scan through the leaf chain.
    let from_90: Vec<i32> = index
        .tree
        .iter_from(&Row::new(vec![Field::Int(90)]))
        .unwrap()
        .map(|pair| match pair.unwrap().0.fields[0] {
            Field::Int(v) => v,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(from_90, (90..100).collect::<Vec<_>>());
    db.close().unwrap();
}

#[test]
fn crud_cycle_through_the_heap() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crud.db");
    let mut db = Database::open(config(&path, 16)).unwrap();

    db.catalog_mut()
        .create_table("people", people_schema(), &txn())
        .unwrap();
    let table = db.catalog().get_table("people").unwrap();

    let mut row = person(1, "before", 1.0);
    table.heap.insert_tuple(&mut row, &txn()).unwrap();
    let rid = row.rid();

    // Update in place.
    let mut updated = person(1, "after", 2.0);
    assert!(table.heap.update_tuple(&mut updated, rid, &txn()).unwrap());
    let read = table.heap.get_tuple(rid, &txn()).unwrap().unwrap();
    assert_eq!(read.fields[1], Field::Char("after".into()));

    // Two-phase delete with a rollback in between.
    assert!(table.heap.mark_delete(rid, &txn()).unwrap());
    assert!(table.heap.get_tuple(rid, &txn()).unwrap().is_none());
    table.heap.rollback_delete(rid, &txn()).unwrap();
    assert!(table.heap.get_tuple(rid, &txn()).unwrap().is_some());

    table.heap.mark_delete(rid, &txn()).unwrap();
    table.heap.apply_delete(rid, &txn()).unwrap();
    assert!(table.heap.get_tuple(rid, &txn()).unwrap().is_none());
    db.close().unwrap();
}

#[test]
fn tiny_pool_still_serves_a_large_workload() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.db");
    let mut db = Database::open(config(&path, 8)).unwrap();

    db.catalog_mut()
        .create_table("people", people_schema(), &txn())
        .unwrap();
    {
        let table = db.catalog().get_table("people").unwrap();
        for i in 0..500 {
            let mut row = person(i, &format!("pressure-{i}"), i as f32);
            assert!(table.heap.insert_tuple(&mut row, &txn()).unwrap());
        }
    }
    db.catalog_mut()
        .create_index("people", "people_by_id", &["id"], &txn())
        .unwrap();

    // Everything written under eviction pressure reads back correctly.
    let index = db.catalog().get_index("people_by_id").unwrap();
    let keys: Vec<i32> = index
        .tree
        .iter()
        .unwrap()
        .map(|pair| match pair.unwrap().0.fields[0] {
            Field::Int(v) => v,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(keys, (0..500).collect::<Vec<_>>());
    db.close().unwrap();
}

#[test]
fn dropping_objects_releases_their_pages() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drop.db");
    let mut db = Database::open(config(&path, 16)).unwrap();

    db.catalog_mut()
        .create_table("people", people_schema(), &txn())
        .unwrap();
    {
        let table = db.catalog().get_table("people").unwrap();
        for i in 0..200 {
            let mut row = person(i, "bulk", 0.0);
            table.heap.insert_tuple(&mut row, &txn()).unwrap();
        }
    }
    db.catalog_mut()
        .create_index("people", "people_by_id", &["id"], &txn())
        .unwrap();

    assert_eq!(
        db.catalog_mut().drop_table("people", &txn()).unwrap(),
        Status::Success
    );

    // Only the two registry pages remain allocated.
    let pool = db.pool().clone();
    for raw in 2..128u32 {
        assert!(
            pool.is_page_free(common::PageId(raw)).unwrap(),
            "page {raw} leaked"
        );
    }
    db.close().unwrap();
}

#[test]
fn index_survives_reopen_via_roots_registry() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roots.db");

    let (table_id, index_id, rid_of_7) = {
        let mut db = Database::open(config(&path, 16)).unwrap();
        db.catalog_mut()
            .create_table("people", people_schema(), &txn())
            .unwrap();
        let table = db.catalog().get_table("people").unwrap();
        let mut target = None;
        for i in 0..50 {
            let mut row = person(i, "persisted", 0.0);
            table.heap.insert_tuple(&mut row, &txn()).unwrap();
            if i == 7 {
                target = Some(row.rid());
            }
        }
        let table_id = table.table_id;
        db.catalog_mut()
            .create_index("people", "people_by_id", &["id"], &txn())
            .unwrap();
        let index_id = db.catalog().get_index("people_by_id").unwrap().index_id;
        db.close().unwrap();
        (table_id, index_id, target.unwrap())
    };

    let mut db = Database::open(config(&path, 16)).unwrap();
    assert_eq!(
        db.catalog_mut()
            .attach_table(table_id, "people", people_schema()),
        Status::Success
    );
    // Attaching finds the persisted root through the registry: lookups
    // work with no rebuild.
    assert_eq!(
        db.catalog_mut()
            .attach_index(index_id, "people_by_id")
            .unwrap(),
        Status::Success
    );
    let index = db.catalog().get_index("people_by_id").unwrap();
    let hits = index.tree.get(&Row::new(vec![Field::Int(7)])).unwrap();
    assert_eq!(hits, vec![rid_of_7]);
    db.close().unwrap();
}
