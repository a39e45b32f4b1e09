// Trait seams for the crawl core.
//
// RecordStore is the graph-store side: identity lookups, record writes,
// idempotent edges and degree reads.
// SocialApi is the upstream side: profiles, connection IDs and quota.
//
// Production impls wrap followgraph_graph::UserStore and
// twitter_client::TwitterClient; tests use the in-memory doubles in testing.rs.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use followgraph_common::{
    CrawlError, Identifier, ProfileAttributes, RankedUser, Result, UserId, UserRecord,
};
use followgraph_graph::{EdgeInsert, UserStore};
use twitter_client::{RawProfile, TwitterClient, TwitterError};

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up by numeric ID or by label through the matching index.
    async fn resolve(&self, ident: &Identifier) -> Result<Option<UserRecord>>;

    /// Create a `basic` record. `CrawlError::Conflict` if the ID is already taken.
    async fn create_stub(&self, id: UserId) -> Result<UserRecord>;

    /// Create a `full` record. `CrawlError::Conflict` if the ID is already taken.
    async fn create_full(&self, profile: &ProfileAttributes) -> Result<UserRecord>;

    /// Promote a `basic` record to `full`. Returns `record` unchanged if it is
    /// already `full`.
    async fn promote(&self, record: &UserRecord, profile: &ProfileAttributes) -> Result<UserRecord>;

    async fn edge_exists(&self, source: UserId, target: UserId) -> Result<bool>;

    /// Insert `source -> target` unless present. Returns whether an edge was created.
    async fn insert_edge(&self, source: UserId, target: UserId) -> Result<bool>;

    async fn degree_of(&self, id: UserId) -> Result<u64>;

    /// All `basic` records, highest degree first, ties by ascending ID.
    async fn list_basic_by_degree(&self) -> Result<Vec<RankedUser>>;
}

fn store_err(e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Store(e.to_string())
}

/// Both endpoints are ensured before any edge write, so a missing one means
/// the store lost a node mid-expansion. That is a store fault, not an
/// upstream `NotFound`.
fn edge_outcome(outcome: EdgeInsert, source: UserId, target: UserId) -> Result<bool> {
    match outcome {
        EdgeInsert::Created => Ok(true),
        EdgeInsert::AlreadyExists => Ok(false),
        EdgeInsert::MissingEndpoint => Err(CrawlError::Store(format!(
            "edge endpoint missing for {source} -> {target}"
        ))),
    }
}

#[async_trait]
impl RecordStore for UserStore {
    async fn resolve(&self, ident: &Identifier) -> Result<Option<UserRecord>> {
        match ident {
            Identifier::Id(id) => self.find_by_id(*id).await.map_err(store_err),
            Identifier::Label(label) => self.find_by_screen_name(label).await.map_err(store_err),
        }
    }

    async fn create_stub(&self, id: UserId) -> Result<UserRecord> {
        UserStore::create_stub(self, id, Utc::now())
            .await
            .map_err(store_err)?
            .ok_or(CrawlError::Conflict(id))
    }

    async fn create_full(&self, profile: &ProfileAttributes) -> Result<UserRecord> {
        UserStore::create_full(self, profile)
            .await
            .map_err(store_err)?
            .ok_or(CrawlError::Conflict(profile.id))
    }

    async fn promote(&self, record: &UserRecord, profile: &ProfileAttributes) -> Result<UserRecord> {
        if record.is_full() {
            return Ok(record.clone());
        }
        if record.id != profile.id {
            return Err(CrawlError::Validation(format!(
                "profile {} does not belong to record {}",
                profile.id, record.id
            )));
        }
        if let Some(promoted) = UserStore::promote(self, profile).await.map_err(store_err)? {
            return Ok(promoted);
        }
        // Nothing matched the basic guard: someone else promoted it, or it vanished.
        match self.find_by_id(record.id).await.map_err(store_err)? {
            Some(current) if current.is_full() => Ok(current),
            Some(_) => Err(CrawlError::Store(format!("promotion of {} did not apply", record.id))),
            None => Err(CrawlError::NotFound(format!("user {}", record.id))),
        }
    }

    async fn edge_exists(&self, source: UserId, target: UserId) -> Result<bool> {
        self.follow_exists(source, target).await.map_err(store_err)
    }

    async fn insert_edge(&self, source: UserId, target: UserId) -> Result<bool> {
        let outcome = self.insert_follow(source, target, Utc::now()).await.map_err(store_err)?;
        edge_outcome(outcome, source, target)
    }

    async fn degree_of(&self, id: UserId) -> Result<u64> {
        UserStore::degree_of(self, id).await.map_err(store_err)
    }

    async fn list_basic_by_degree(&self) -> Result<Vec<RankedUser>> {
        UserStore::list_basic_by_degree(self).await.map_err(store_err)
    }
}

// ---------------------------------------------------------------------------
// SocialApi
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SocialApi: Send + Sync {
    async fn get_profile(&self, id: UserId) -> Result<RawProfile>;

    async fn get_profile_by_label(&self, label: &str) -> Result<RawProfile>;

    async fn get_follower_ids(&self, id: UserId) -> Result<Vec<UserId>>;

    async fn get_following_ids(&self, id: UserId) -> Result<Vec<UserId>>;

    /// Calls left in the current rate-limit window.
    async fn remaining_quota(&self) -> Result<u64>;
}

fn api_err(e: TwitterError) -> CrawlError {
    match e {
        TwitterError::NotFound(what) => CrawlError::NotFound(what),
        TwitterError::Refused { status, what } => {
            CrawlError::Refused(format!("{what} (HTTP {status})"))
        }
        TwitterError::RateLimited { reset_at } => {
            debug!(?reset_at, "Upstream rate limit");
            CrawlError::RateLimited { remaining: Some(0) }
        }
        other => CrawlError::Api(other.to_string()),
    }
}

fn to_user_ids(ids: Vec<i64>) -> Vec<UserId> {
    ids.into_iter().map(UserId).collect()
}

#[async_trait]
impl SocialApi for TwitterClient {
    async fn get_profile(&self, id: UserId) -> Result<RawProfile> {
        TwitterClient::get_profile(self, id.get()).await.map_err(api_err)
    }

    async fn get_profile_by_label(&self, label: &str) -> Result<RawProfile> {
        self.get_profile_by_screen_name(label).await.map_err(api_err)
    }

    async fn get_follower_ids(&self, id: UserId) -> Result<Vec<UserId>> {
        TwitterClient::get_follower_ids(self, id.get())
            .await
            .map(to_user_ids)
            .map_err(api_err)
    }

    async fn get_following_ids(&self, id: UserId) -> Result<Vec<UserId>> {
        TwitterClient::get_following_ids(self, id.get())
            .await
            .map(to_user_ids)
            .map_err(api_err)
    }

    async fn remaining_quota(&self) -> Result<u64> {
        TwitterClient::remaining_quota(self).await.map_err(api_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_edge_endpoint_is_a_store_fault() {
        let err = edge_outcome(EdgeInsert::MissingEndpoint, UserId(1), UserId(2)).unwrap_err();
        assert!(matches!(err, CrawlError::Store(_)));
        assert!(!err.is_skippable());

        assert!(edge_outcome(EdgeInsert::Created, UserId(1), UserId(2)).unwrap());
        assert!(!edge_outcome(EdgeInsert::AlreadyExists, UserId(1), UserId(2)).unwrap());
    }

    #[test]
    fn upstream_errors_map_to_crawl_outcomes() {
        let refused = api_err(TwitterError::Refused {
            status: 401,
            what: "/followers/ids.json".into(),
        });
        assert!(matches!(refused, CrawlError::Refused(ref msg) if msg.contains("401")));

        assert!(api_err(TwitterError::NotFound("x".into())).is_not_found());
        assert!(api_err(TwitterError::RateLimited { reset_at: None }).is_rate_limited());
        assert!(matches!(api_err(TwitterError::Timeout), CrawlError::Api(_)));
    }
}
