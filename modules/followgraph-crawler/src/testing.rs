// Test doubles for the crawl core.
//
// Two mocks matching the two trait boundaries:
// - MockSocialApi (SocialApi): HashMap-based profiles and connection lists,
//   a decrementing quota and per-endpoint call counters
// - MockRecordStore (RecordStore): stateful in-memory graph with both indexes
//
// No network, no database, no Docker.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use followgraph_common::{
    CrawlError, Detail, FollowEdge, Identifier, ProfileAttributes, RankedUser, Result, UserId,
    UserRecord,
};
use twitter_client::RawProfile;

use crate::traits::{RecordStore, SocialApi};

// ---------------------------------------------------------------------------
// MockSocialApi
// ---------------------------------------------------------------------------

/// Upstream double. Unregistered IDs answer `NotFound`. Every profile or ID
/// list call spends one unit of quota; at zero, calls fail with `RateLimited`.
/// Builder pattern: `.on_profile()`, `.on_followers()`, `.on_following()`, `.with_quota()`.
pub struct MockSocialApi {
    profiles: HashMap<UserId, RawProfile>,
    labels: HashMap<String, UserId>,
    followers: HashMap<UserId, Vec<UserId>>,
    following: HashMap<UserId, Vec<UserId>>,
    protected: HashSet<UserId>,
    quota: AtomicU64,
    spend_quota: bool,
    profile_calls: AtomicUsize,
    connection_calls: AtomicUsize,
    quota_calls: AtomicUsize,
}

impl Default for MockSocialApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSocialApi {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            labels: HashMap::new(),
            followers: HashMap::new(),
            following: HashMap::new(),
            protected: HashSet::new(),
            quota: AtomicU64::new(u64::MAX),
            spend_quota: true,
            profile_calls: AtomicUsize::new(0),
            connection_calls: AtomicUsize::new(0),
            quota_calls: AtomicUsize::new(0),
        }
    }

    /// Register a profile shaped like the real API's user object, including
    /// an embedded status that the fetcher must drop.
    pub fn on_profile(mut self, id: i64, screen_name: &str) -> Self {
        let raw = json!({
            "id": id,
            "id_str": id.to_string(),
            "screen_name": screen_name,
            "name": screen_name.to_uppercase(),
            "followers_count": 0,
            "friends_count": 0,
            "protected": false,
            "status": {"id": 1, "text": "latest post"},
        });
        if let serde_json::Value::Object(map) = raw {
            self.profiles.insert(UserId(id), map);
        }
        self.labels.insert(screen_name.to_string(), UserId(id));
        self
    }

    pub fn on_followers(mut self, id: i64, followers: &[i64]) -> Self {
        self.followers
            .insert(UserId(id), followers.iter().copied().map(UserId).collect());
        self
    }

    pub fn on_following(mut self, id: i64, following: &[i64]) -> Self {
        self.following
            .insert(UserId(id), following.iter().copied().map(UserId).collect());
        self
    }

    /// Profile stays public but both connection lists answer `Refused`.
    pub fn on_protected(mut self, id: i64) -> Self {
        self.protected.insert(UserId(id));
        self
    }

    /// Start the window with `remaining` calls.
    pub fn with_quota(self, remaining: u64) -> Self {
        self.quota.store(remaining, Ordering::Relaxed);
        self
    }

    /// Keep the reported quota fixed no matter how many calls are made.
    pub fn with_fixed_quota(mut self, remaining: u64) -> Self {
        self.quota.store(remaining, Ordering::Relaxed);
        self.spend_quota = false;
        self
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::Relaxed)
    }

    pub fn connection_calls(&self) -> usize {
        self.connection_calls.load(Ordering::Relaxed)
    }

    pub fn quota_calls(&self) -> usize {
        self.quota_calls.load(Ordering::Relaxed)
    }

    /// Profile plus connection calls.
    pub fn total_calls(&self) -> usize {
        self.profile_calls() + self.connection_calls()
    }

    fn spend(&self) -> Result<()> {
        if !self.spend_quota {
            return Ok(());
        }
        self.quota
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |q| q.checked_sub(1))
            .map(|_| ())
            .map_err(|_| CrawlError::RateLimited { remaining: Some(0) })
    }

    fn connections(&self, table: &HashMap<UserId, Vec<UserId>>, id: UserId) -> Result<Vec<UserId>> {
        self.connection_calls.fetch_add(1, Ordering::Relaxed);
        self.spend()?;
        if !self.profiles.contains_key(&id) {
            return Err(CrawlError::NotFound(format!("MockSocialApi: no user {id}")));
        }
        if self.protected.contains(&id) {
            return Err(CrawlError::Refused(format!("MockSocialApi: {id} is protected")));
        }
        Ok(table.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SocialApi for MockSocialApi {
    async fn get_profile(&self, id: UserId) -> Result<RawProfile> {
        self.profile_calls.fetch_add(1, Ordering::Relaxed);
        self.spend()?;
        self.profiles
            .get(&id)
            .cloned()
            .ok_or_else(|| CrawlError::NotFound(format!("MockSocialApi: no profile for {id}")))
    }

    async fn get_profile_by_label(&self, label: &str) -> Result<RawProfile> {
        self.profile_calls.fetch_add(1, Ordering::Relaxed);
        self.spend()?;
        self.labels
            .get(label)
            .and_then(|id| self.profiles.get(id))
            .cloned()
            .ok_or_else(|| CrawlError::NotFound(format!("MockSocialApi: no profile for @{label}")))
    }

    async fn get_follower_ids(&self, id: UserId) -> Result<Vec<UserId>> {
        self.connections(&self.followers, id)
    }

    async fn get_following_ids(&self, id: UserId) -> Result<Vec<UserId>> {
        self.connections(&self.following, id)
    }

    async fn remaining_quota(&self) -> Result<u64> {
        self.quota_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.quota.load(Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// MockRecordStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    users: BTreeMap<UserId, UserRecord>,
    labels: HashMap<String, UserId>,
    edges: BTreeSet<FollowEdge>,
    /// Every `detail` value each record has held, in order.
    detail_history: BTreeMap<UserId, Vec<Detail>>,
}

impl StoreState {
    fn put(&mut self, record: UserRecord) -> UserRecord {
        if let Some(label) = &record.screen_name {
            self.labels.insert(label.clone(), record.id);
        }
        let history = self.detail_history.entry(record.id).or_default();
        if history.last() != Some(&record.detail) {
            history.push(record.detail);
        }
        self.users.insert(record.id, record.clone());
        record
    }

    fn degree(&self, id: UserId) -> u64 {
        self.edges
            .iter()
            .filter(|e| e.source == id || e.target == id)
            .count() as u64
    }
}

/// In-memory graph honouring the same contracts as the Neo4j store:
/// conflicts on duplicate creates, one-way promotion, idempotent edges.
#[derive(Default)]
pub struct MockRecordStore {
    state: Mutex<StoreState>,
    conflict_next_full: AtomicBool,
    conflict_next_stub: AtomicBool,
    edge_insert_calls: AtomicUsize,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_stub(&self, id: UserId) {
        self.state.lock().unwrap().put(UserRecord::stub(id, Utc::now()));
    }

    pub fn seed_full(&self, id: i64, screen_name: &str) {
        let record = UserRecord::from_profile(ProfileAttributes {
            id: UserId(id),
            screen_name: screen_name.to_string(),
            accessed_at: Utc::now(),
            extra: Default::default(),
        });
        self.state.lock().unwrap().put(record);
    }

    pub fn seed_edge(&self, source: UserId, target: UserId) {
        self.state
            .lock()
            .unwrap()
            .edges
            .insert(FollowEdge::new(source, target));
    }

    /// Make the next `create_full` fail with `Conflict`, as if another writer
    /// had created the record between resolve and create.
    pub fn fail_next_create_full_with_conflict(&self) {
        self.conflict_next_full.store(true, Ordering::Relaxed);
    }

    /// Make the next `create_stub` store the record and then answer
    /// `Conflict`, as if a concurrent writer had won the same create.
    pub fn fail_next_create_stub_with_conflict(&self) {
        self.conflict_next_stub.store(true, Ordering::Relaxed);
    }

    pub fn get(&self, id: UserId) -> Option<UserRecord> {
        self.state.lock().unwrap().users.get(&id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().unwrap().users.len()
    }

    pub fn edges(&self) -> Vec<FollowEdge> {
        self.state.lock().unwrap().edges.iter().copied().collect()
    }

    pub fn detail_history(&self, id: UserId) -> Vec<Detail> {
        self.state
            .lock()
            .unwrap()
            .detail_history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn edge_insert_calls(&self) -> usize {
        self.edge_insert_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn resolve(&self, ident: &Identifier) -> Result<Option<UserRecord>> {
        let state = self.state.lock().unwrap();
        Ok(match ident {
            Identifier::Id(id) => state.users.get(id).cloned(),
            Identifier::Label(label) => state
                .labels
                .get(label)
                .and_then(|id| state.users.get(id))
                .cloned(),
        })
    }

    async fn create_stub(&self, id: UserId) -> Result<UserRecord> {
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(&id) {
            return Err(CrawlError::Conflict(id));
        }
        let stub = state.put(UserRecord::stub(id, Utc::now()));
        if self.conflict_next_stub.swap(false, Ordering::Relaxed) {
            return Err(CrawlError::Conflict(stub.id));
        }
        Ok(stub)
    }

    async fn create_full(&self, profile: &ProfileAttributes) -> Result<UserRecord> {
        if self.conflict_next_full.swap(false, Ordering::Relaxed) {
            return Err(CrawlError::Conflict(profile.id));
        }
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(&profile.id) {
            return Err(CrawlError::Conflict(profile.id));
        }
        Ok(state.put(UserRecord::from_profile(profile.clone())))
    }

    async fn promote(&self, record: &UserRecord, profile: &ProfileAttributes) -> Result<UserRecord> {
        if record.is_full() {
            return Ok(record.clone());
        }
        let mut state = self.state.lock().unwrap();
        match state.users.get(&record.id) {
            Some(current) if current.is_full() => Ok(current.clone()),
            Some(_) => Ok(state.put(UserRecord::from_profile(profile.clone()))),
            None => Err(CrawlError::NotFound(format!("user {}", record.id))),
        }
    }

    async fn edge_exists(&self, source: UserId, target: UserId) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.edges.contains(&FollowEdge::new(source, target)))
    }

    async fn insert_edge(&self, source: UserId, target: UserId) -> Result<bool> {
        self.edge_insert_calls.fetch_add(1, Ordering::Relaxed);
        if self.edge_exists(source, target).await? {
            return Ok(false);
        }
        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&source) || !state.users.contains_key(&target) {
            return Err(CrawlError::Store(format!(
                "edge endpoint missing for {source} -> {target}"
            )));
        }
        Ok(state.edges.insert(FollowEdge::new(source, target)))
    }

    async fn degree_of(&self, id: UserId) -> Result<u64> {
        Ok(self.state.lock().unwrap().degree(id))
    }

    async fn list_basic_by_degree(&self) -> Result<Vec<RankedUser>> {
        let state = self.state.lock().unwrap();
        let mut ranked: Vec<RankedUser> = state
            .users
            .values()
            .filter(|u| u.detail == Detail::Basic)
            .map(|u| RankedUser {
                record: u.clone(),
                degree: state.degree(u.id),
            })
            .collect();
        ranked.sort_by(|a, b| b.degree.cmp(&a.degree).then(a.record.id.cmp(&b.record.id)));
        Ok(ranked)
    }
}
