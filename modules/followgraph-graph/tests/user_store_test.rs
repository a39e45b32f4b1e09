//! Integration tests for UserStore against a real Neo4j.
//!
//! Requirements: Docker (for Neo4j via testcontainers)
//!
//! Run with: cargo test -p followgraph-graph --features test-utils --test user_store_test

#![cfg(feature = "test-utils")]

use chrono::Utc;

use followgraph_common::{AttributeValue, Attributes, Detail, ProfileAttributes, UserId};
use followgraph_graph::{query, EdgeInsert, GraphClient, UserStore};

async fn setup() -> (impl std::any::Any, GraphClient, UserStore) {
    followgraph_graph::testutil::migrated_store().await
}

fn profile(id: i64, screen_name: &str) -> ProfileAttributes {
    let mut extra = Attributes::new();
    extra.insert("followers_count".into(), AttributeValue::Int(42));
    extra.insert("location".into(), AttributeValue::Text("Helsinki".into()));
    ProfileAttributes {
        id: UserId(id),
        screen_name: screen_name.into(),
        accessed_at: Utc::now(),
        extra,
    }
}

async fn follows_count(client: &GraphClient, source: i64, target: i64) -> i64 {
    let q = query(
        "MATCH (:User {id: $source})-[r:FOLLOWS]->(:User {id: $target}) RETURN count(r) AS n",
    )
    .param("source", source)
    .param("target", target);
    let mut stream = client.inner().execute(q).await.unwrap();
    let row = stream.next().await.unwrap().unwrap();
    row.get::<i64>("n").unwrap()
}

#[tokio::test]
async fn stub_create_conflicts_on_existing_id() {
    let (_c, _client, store) = setup().await;

    let stub = store.create_stub(UserId(200), Utc::now()).await.unwrap();
    let stub = stub.expect("first create should succeed");
    assert_eq!(stub.detail, Detail::Basic);
    assert_eq!(stub.screen_name, None);

    let again = store.create_stub(UserId(200), Utc::now()).await.unwrap();
    assert!(again.is_none(), "second create must report the conflict");
}

#[tokio::test]
async fn full_record_is_indexed_by_id_and_label() {
    let (_c, _client, store) = setup().await;

    store.create_full(&profile(100, "a")).await.unwrap().unwrap();

    let by_id = store.find_by_id(UserId(100)).await.unwrap().unwrap();
    let by_label = store.find_by_screen_name("a").await.unwrap().unwrap();
    assert_eq!(by_id.id, by_label.id);
    assert_eq!(by_id.detail, Detail::Full);
    assert_eq!(
        by_id.attributes.get("location"),
        Some(&AttributeValue::Text("Helsinki".into()))
    );
    assert!(store.find_by_screen_name("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn promote_is_one_way() {
    let (_c, _client, store) = setup().await;

    store.create_stub(UserId(300), Utc::now()).await.unwrap();
    let promoted = store.promote(&profile(300, "late_label")).await.unwrap().unwrap();
    assert_eq!(promoted.detail, Detail::Full);
    assert_eq!(
        store.find_by_screen_name("late_label").await.unwrap().map(|u| u.id),
        Some(UserId(300))
    );

    // Already full: the detail guard refuses a second overwrite.
    assert!(store.promote(&profile(300, "other")).await.unwrap().is_none());
    let still = store.find_by_id(UserId(300)).await.unwrap().unwrap();
    assert_eq!(still.screen_name.as_deref(), Some("late_label"));
}

#[tokio::test]
async fn follow_insert_is_idempotent() {
    let (_c, client, store) = setup().await;

    store.create_stub(UserId(1), Utc::now()).await.unwrap();
    store.create_stub(UserId(2), Utc::now()).await.unwrap();

    assert!(!store.follow_exists(UserId(1), UserId(2)).await.unwrap());
    assert_eq!(
        store.insert_follow(UserId(1), UserId(2), Utc::now()).await.unwrap(),
        EdgeInsert::Created
    );
    for _ in 0..3 {
        assert_eq!(
            store.insert_follow(UserId(1), UserId(2), Utc::now()).await.unwrap(),
            EdgeInsert::AlreadyExists
        );
    }
    assert!(store.follow_exists(UserId(1), UserId(2)).await.unwrap());
    assert!(!store.follow_exists(UserId(2), UserId(1)).await.unwrap());
    assert_eq!(follows_count(&client, 1, 2).await, 1);

    assert_eq!(
        store.insert_follow(UserId(1), UserId(999), Utc::now()).await.unwrap(),
        EdgeInsert::MissingEndpoint
    );
}

#[tokio::test]
async fn basic_listing_orders_by_degree_then_id() {
    let (_c, _client, store) = setup().await;

    store.create_full(&profile(10, "hub")).await.unwrap();
    for id in [20, 30, 40] {
        store.create_stub(UserId(id), Utc::now()).await.unwrap();
    }
    // 20 has degree 2, 30 and 40 have degree 1.
    store.insert_follow(UserId(20), UserId(10), Utc::now()).await.unwrap();
    store.insert_follow(UserId(10), UserId(20), Utc::now()).await.unwrap();
    store.insert_follow(UserId(40), UserId(10), Utc::now()).await.unwrap();
    store.insert_follow(UserId(10), UserId(30), Utc::now()).await.unwrap();

    let ranked = store.list_basic_by_degree().await.unwrap();
    let order: Vec<(i64, u64)> = ranked.iter().map(|r| (r.record.id.get(), r.degree)).collect();
    assert_eq!(order, vec![(20, 2), (30, 1), (40, 1)]);

    assert_eq!(store.degree_of(UserId(10)).await.unwrap(), 4);
    assert_eq!(store.degree_of(UserId(12345)).await.unwrap(), 0);
    assert_eq!(store.count_by_detail().await.unwrap(), (3, 1));
}
