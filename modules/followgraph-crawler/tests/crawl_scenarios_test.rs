//! Crawl scenarios against the in-memory doubles.
//!
//! No network, no database. Run with: cargo test -p followgraph-crawler --test crawl_scenarios_test

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::Span;

use followgraph_common::{CrawlError, Detail, FollowEdge, Identifier, UserId};
use followgraph_crawler::testing::{MockRecordStore, MockSocialApi};
use followgraph_crawler::{parse_seeds, CrawlLoop, RecordStore, StopReason};

fn crawl(api: &Arc<MockSocialApi>, store: &Arc<MockRecordStore>, threshold: u64) -> CrawlLoop {
    CrawlLoop::new(api.clone(), store.clone(), threshold, Span::none())
}

/// 1 follows 2 and 3, 2 follows 3, 3 follows 1. Every account resolvable.
fn triangle() -> MockSocialApi {
    MockSocialApi::new()
        .on_profile(1, "one")
        .on_profile(2, "two")
        .on_profile(3, "three")
        .on_following(1, &[2, 3])
        .on_following(2, &[3])
        .on_following(3, &[1])
        .on_followers(1, &[3])
        .on_followers(2, &[1])
        .on_followers(3, &[1, 2])
}

#[tokio::test]
async fn single_expansion_creates_stub_and_edge() {
    let store = Arc::new(MockRecordStore::new());
    let api = Arc::new(MockSocialApi::new().on_profile(100, "a").on_following(100, &[200]));
    let crawl = crawl(&api, &store, 0);

    let expansion = crawl.pipeline().expand(UserId(100)).await.unwrap();

    assert!(expansion.fetched);
    let a = store.get(UserId(100)).unwrap();
    assert_eq!(a.detail, Detail::Full);
    assert_eq!(a.screen_name.as_deref(), Some("a"));
    assert!(!a.attributes.contains_key("status"), "embedded status must be dropped");

    let b = store.get(UserId(200)).unwrap();
    assert_eq!(b.detail, Detail::Basic);
    assert_eq!(b.screen_name, None);

    assert_eq!(store.edges(), vec![FollowEdge::new(UserId(100), UserId(200))]);
}

#[tokio::test]
async fn re_expanding_a_full_record_is_a_no_op() {
    let store = Arc::new(MockRecordStore::new());
    let api = Arc::new(MockSocialApi::new().on_profile(100, "a").on_following(100, &[200]));
    let crawl = crawl(&api, &store, 0);

    crawl.pipeline().expand(UserId(100)).await.unwrap();
    let calls_after_first = api.total_calls();
    let edge_writes_after_first = store.edge_insert_calls();

    let second = crawl.pipeline().expand(UserId(100)).await.unwrap();

    assert!(!second.fetched);
    assert_eq!(second.edges_inserted, 0);
    assert_eq!(api.total_calls(), calls_after_first);
    assert_eq!(store.edge_insert_calls(), edge_writes_after_first);
    assert_eq!(store.edges().len(), 1);
    assert_eq!(store.user_count(), 2);
}

#[tokio::test]
async fn quota_at_threshold_expands_nothing() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    let api = Arc::new(triangle().with_quota(5));

    let stats = crawl(&api, &store, 10).run().await.unwrap();

    assert_eq!(stats.expanded, 0);
    assert_eq!(stats.stop, Some(StopReason::QuotaExhausted { remaining: 5 }));
    assert_eq!(api.total_calls(), 0);
    assert_eq!(store.get(UserId(1)).unwrap().detail, Detail::Basic);
}

#[tokio::test]
async fn quota_spent_mid_run_stops_before_next_expansion() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    // One expansion spends three calls: profile, followers, following.
    let api = Arc::new(triangle().with_quota(12));

    let stats = crawl(&api, &store, 10).run().await.unwrap();

    assert_eq!(stats.expanded, 1);
    assert_eq!(stats.stop, Some(StopReason::QuotaExhausted { remaining: 9 }));
}

#[tokio::test]
async fn frontier_drains_on_a_closed_graph() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    let api = Arc::new(triangle());

    let stats = crawl(&api, &store, 10).run().await.unwrap();

    assert_eq!(stats.expanded, 3);
    assert_eq!(stats.stop, Some(StopReason::FrontierEmpty));
    for id in [1, 2, 3] {
        assert!(store.get(UserId(id)).unwrap().is_full());
    }
    let edges = store.edges();
    assert_eq!(edges.len(), 4);
    for (s, t) in [(1, 2), (1, 3), (2, 3), (3, 1)] {
        assert!(edges.contains(&FollowEdge::new(UserId(s), UserId(t))));
    }
}

#[tokio::test]
async fn edge_seen_from_both_ends_is_stored_once() {
    let store = Arc::new(MockRecordStore::new());
    let api = Arc::new(
        MockSocialApi::new()
            .on_profile(1, "one")
            .on_profile(2, "two")
            .on_following(1, &[2])
            .on_followers(2, &[1]),
    );
    let crawl = crawl(&api, &store, 0);

    let first = crawl.pipeline().expand(UserId(1)).await.unwrap();
    let second = crawl.pipeline().expand(UserId(2)).await.unwrap();

    assert_eq!(first.edges_inserted, 1);
    assert_eq!(second.edges_inserted, 0);
    assert_eq!(store.edges(), vec![FollowEdge::new(UserId(1), UserId(2))]);
}

#[tokio::test]
async fn detail_never_regresses() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    let api = Arc::new(triangle());
    let crawl = crawl(&api, &store, 0);

    crawl.run().await.unwrap();
    // Second pass over already-full records.
    for id in [1, 2, 3] {
        crawl.pipeline().expand(UserId(id)).await.unwrap();
    }

    assert_eq!(store.detail_history(UserId(1)), vec![Detail::Basic, Detail::Full]);
    assert_eq!(store.detail_history(UserId(2)), vec![Detail::Basic, Detail::Full]);
    assert_eq!(store.detail_history(UserId(3)), vec![Detail::Basic, Detail::Full]);
}

#[tokio::test]
async fn malformed_seed_fails_before_any_call() {
    let api = Arc::new(MockSocialApi::new().on_profile(100, "a"));

    let err = parse_seeds(&["100", "not a user"]).unwrap_err();

    assert!(matches!(err, CrawlError::Validation(_)));
    assert!(parse_seeds(&["0"]).is_err());
    assert!(parse_seeds(&["@this_label_is_too_long"]).is_err());
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn vanished_stub_is_skipped_for_the_rest_of_the_run() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    store.seed_stub(UserId(2));
    let api = Arc::new(MockSocialApi::new().on_profile(2, "two"));

    let stats = crawl(&api, &store, 0).run().await.unwrap();

    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.expanded, 1);
    assert_eq!(stats.stop, Some(StopReason::FrontierEmpty));
    assert_eq!(store.get(UserId(1)).unwrap().detail, Detail::Basic);
    assert!(store.get(UserId(2)).unwrap().is_full());
}

#[tokio::test]
async fn rate_limit_mid_expansion_keeps_promoted_record() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    // Enough for the profile and follower list, not the following list.
    let api = Arc::new(triangle().with_quota(2));

    let stats = crawl(&api, &store, 0).run().await.unwrap();

    assert_eq!(stats.stop, Some(StopReason::QuotaExhausted { remaining: 0 }));
    assert_eq!(stats.expanded, 0);
    assert!(store.get(UserId(1)).unwrap().is_full());
    assert!(store.edges().is_empty());
}

#[tokio::test]
async fn cancelled_run_makes_no_calls() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    let api = Arc::new(triangle());
    let crawl = crawl(&api, &store, 0);

    crawl.cancel_flag().store(true, Ordering::Relaxed);
    let stats = crawl.run().await.unwrap();

    assert_eq!(stats.stop, Some(StopReason::Cancelled));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn expansion_cap_bounds_a_run() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    let api = Arc::new(triangle());

    let stats = crawl(&api, &store, 0)
        .with_max_expansions(1)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.expanded, 1);
    assert_eq!(stats.stop, Some(StopReason::ExpansionCap));
    assert_eq!(store.get(UserId(2)).unwrap().detail, Detail::Basic);
}

#[tokio::test]
async fn seeding_by_label_and_id() {
    let store = Arc::new(MockRecordStore::new());
    let api = Arc::new(triangle());
    let crawl = crawl(&api, &store, 0);

    let seeds = parse_seeds(&["@one", "2", "999"]).unwrap();
    let stats = crawl.seed(&seeds).await.unwrap();

    assert_eq!(stats.expanded, 2);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.stop, Some(StopReason::SeedsDone));
    assert!(store.get(UserId(1)).unwrap().is_full());
    assert!(store.get(UserId(2)).unwrap().is_full());
    assert_eq!(store.get(UserId(3)).unwrap().detail, Detail::Basic);
    assert!(store.get(UserId(999)).is_none());

    let by_label = store
        .resolve(&Identifier::Label("one".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_label.id, UserId(1));
}

#[tokio::test]
async fn seeding_ignores_the_quota_guard() {
    let store = Arc::new(MockRecordStore::new());
    // Remaining quota already below the threshold.
    let api = Arc::new(MockSocialApi::new().on_profile(100, "a").with_quota(5));

    let stats = crawl(&api, &store, 10)
        .seed(&parse_seeds(&["100"]).unwrap())
        .await
        .unwrap();

    assert_eq!(stats.expanded, 1);
    assert_eq!(stats.stop, Some(StopReason::SeedsDone));
    assert_eq!(api.quota_calls(), 0);
    assert!(store.get(UserId(100)).unwrap().is_full());
}

#[tokio::test]
async fn rate_limit_ends_seeding() {
    let store = Arc::new(MockRecordStore::new());
    // Seed 1 spends three calls; seed 2 gets its profile and nothing more.
    let api = Arc::new(triangle().with_quota(4));

    let stats = crawl(&api, &store, 0)
        .seed(&parse_seeds(&["1", "2"]).unwrap())
        .await
        .unwrap();

    assert_eq!(stats.stop, Some(StopReason::QuotaExhausted { remaining: 0 }));
    assert_eq!(stats.expanded, 1);
    assert!(store.get(UserId(1)).unwrap().is_full());
    assert!(store.get(UserId(2)).unwrap().is_full(), "promoted before the connection calls");
}

#[tokio::test]
async fn protected_account_does_not_end_the_run() {
    let store = Arc::new(MockRecordStore::new());
    store.seed_stub(UserId(1));
    store.seed_stub(UserId(2));
    let api = Arc::new(
        MockSocialApi::new()
            .on_profile(1, "locked")
            .on_profile(2, "open")
            .on_protected(1),
    );

    let stats = crawl(&api, &store, 0).run().await.unwrap();

    assert_eq!(stats.refused, 1);
    assert_eq!(stats.not_found, 0);
    assert_eq!(stats.expanded, 1);
    assert_eq!(stats.stop, Some(StopReason::FrontierEmpty));
    assert!(store.get(UserId(2)).unwrap().is_full());
}
