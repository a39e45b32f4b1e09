use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use followgraph_common::{
    AttributeValue, Attributes, CrawlError, ProfileAttributes, Result, UserId,
};
use twitter_client::RawProfile;

use crate::traits::SocialApi;

/// Keys that belong to the record's core schema or to the store's own
/// bookkeeping, never to the open attribute mapping.
const RESERVED_KEYS: [&str; 6] = ["id", "id_str", "screen_name", "detail", "accessed_at", "profile_json"];

/// Both connection lists of one account. Sets, so repeated IDs upstream
/// collapse and expansion order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connections {
    pub followers: BTreeSet<UserId>,
    pub following: BTreeSet<UserId>,
}

/// Pulls profiles and connection lists through the social API.
#[derive(Clone)]
pub struct ProfileFetcher {
    api: Arc<dyn SocialApi>,
}

impl ProfileFetcher {
    pub fn new(api: Arc<dyn SocialApi>) -> Self {
        Self { api }
    }

    pub async fn fetch_profile(&self, id: UserId) -> Result<ProfileAttributes> {
        info!(user_id = %id, "Fetching user data");
        let raw = self.api.get_profile(id).await?;
        let profile = profile_from_raw(&raw, Utc::now())?;
        if profile.id != id {
            warn!(requested = %id, returned = %profile.id, "Profile ID mismatch");
            return Err(CrawlError::Api(format!(
                "asked for user {id}, API returned {}",
                profile.id
            )));
        }
        Ok(profile)
    }

    pub async fn fetch_profile_by_label(&self, label: &str) -> Result<ProfileAttributes> {
        info!(screen_name = label, "Fetching user data by label");
        let raw = self.api.get_profile_by_label(label).await?;
        profile_from_raw(&raw, Utc::now())
    }

    pub async fn fetch_connections(&self, id: UserId) -> Result<Connections> {
        let followers: BTreeSet<UserId> = self.api.get_follower_ids(id).await?.into_iter().collect();
        let following: BTreeSet<UserId> = self.api.get_following_ids(id).await?.into_iter().collect();
        info!(
            user_id = %id,
            followers = followers.len(),
            following = following.len(),
            "Fetched connections"
        );
        Ok(Connections { followers, following })
    }
}

/// Reduce a raw user object to a `full` attribute set stamped with `accessed_at`.
///
/// Only scalar fields survive; embedded objects such as the latest status and
/// any arrays or nulls are dropped.
pub fn profile_from_raw(raw: &RawProfile, accessed_at: DateTime<Utc>) -> Result<ProfileAttributes> {
    let id = raw
        .get("id")
        .and_then(|v| v.as_i64())
        .or_else(|| raw.get("id_str").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()))
        .filter(|id| *id > 0)
        .ok_or_else(|| CrawlError::Api("profile has no usable id".to_string()))?;

    let screen_name = raw
        .get("screen_name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CrawlError::Api(format!("profile {id} has no screen_name")))?
        .to_string();

    let extra: Attributes = raw
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| AttributeValue::from_json(value).map(|v| (key.clone(), v)))
        .collect();

    Ok(ProfileAttributes {
        id: UserId(id),
        screen_name,
        accessed_at,
        extra,
    })
}
