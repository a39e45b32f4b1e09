pub mod error;
pub mod types;

pub use error::{Result, TwitterError};
pub use types::{
    Connection, IdsPage, RateLimitStatus, RateLimitWindow, RawProfile, CRAWL_ENDPOINTS,
};

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com/1.1";

/// Largest page the ID endpoints will return.
const IDS_PAGE_SIZE: u32 = 5000;

pub struct TwitterClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl TwitterClient {
    /// Build a client with app-only bearer auth. Every request is bounded by `timeout`.
    pub fn new(token: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch a user object by numeric ID.
    pub async fn get_profile(&self, user_id: i64) -> Result<RawProfile> {
        tracing::debug!(user_id, "Fetching profile");
        self.get_json("/users/show.json", &[("user_id", user_id.to_string())])
            .await
    }

    /// Fetch a user object by screen name.
    pub async fn get_profile_by_screen_name(&self, screen_name: &str) -> Result<RawProfile> {
        tracing::debug!(screen_name, "Fetching profile by screen name");
        self.get_json("/users/show.json", &[("screen_name", screen_name.to_string())])
            .await
    }

    pub async fn get_follower_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.get_all_ids(Connection::Followers, user_id).await
    }

    pub async fn get_following_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.get_all_ids(Connection::Following, user_id).await
    }

    /// Page through a cursored ID list until the last page.
    async fn get_all_ids(&self, connection: Connection, user_id: i64) -> Result<Vec<i64>> {
        let path = format!("{}.json", connection.path());
        let mut cursor: i64 = -1;
        let mut ids = Vec::new();

        loop {
            let page: IdsPage = self
                .get_json(
                    &path,
                    &[
                        ("user_id", user_id.to_string()),
                        ("cursor", cursor.to_string()),
                        ("count", IDS_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;

            ids.extend_from_slice(&page.ids);
            if page.is_last() {
                break;
            }
            tracing::debug!(user_id, fetched = ids.len(), "Fetching next ID page");
            cursor = page.next_cursor;
        }

        tracing::info!(user_id, ?connection, count = ids.len(), "Fetched connection IDs");
        Ok(ids)
    }

    pub async fn rate_limit_status(&self) -> Result<RateLimitStatus> {
        self.get_json(
            "/application/rate_limit_status.json",
            &[("resources", "users,followers,friends".to_string())],
        )
        .await
    }

    /// Calls left before the tightest crawl endpoint hits its window limit.
    pub async fn remaining_quota(&self) -> Result<u64> {
        let status = self.rate_limit_status().await?;
        status.min_remaining(&CRAWL_ENDPOINTS).ok_or_else(|| {
            TwitterError::Parse("rate limit status is missing crawl endpoints".to_string())
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if let Some(err) = refusal(status, || format!("{path} {params:?}")) {
            return Err(err);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let reset_at = resp
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_reset);
            tracing::warn!(path, ?reset_at, "Rate limit hit");
            return Err(TwitterError::RateLimited { reset_at });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TwitterError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Statuses that concern the requested account rather than the client.
fn refusal(status: reqwest::StatusCode, what: impl FnOnce() -> String) -> Option<TwitterError> {
    match status {
        reqwest::StatusCode::NOT_FOUND => Some(TwitterError::NotFound(what())),
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            Some(TwitterError::Refused {
                status: status.as_u16(),
                what: what(),
            })
        }
        _ => None,
    }
}

fn parse_reset(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}
