use std::collections::HashMap;

use serde::Deserialize;

/// A user object exactly as the API returns it. Field set varies by account
/// and API version, so it stays untyped until the crawler filters it.
pub type RawProfile = serde_json::Map<String, serde_json::Value>;

/// One page of a cursored ID list (`followers/ids`, `friends/ids`).
#[derive(Debug, Clone, Deserialize)]
pub struct IdsPage {
    pub ids: Vec<i64>,
    #[serde(default)]
    pub next_cursor: i64,
}

impl IdsPage {
    /// The API signals the final page with a zero cursor.
    pub fn is_last(&self) -> bool {
        self.next_cursor == 0
    }
}

/// Which connection list to page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Followers,
    Following,
}

impl Connection {
    pub fn path(self) -> &'static str {
        match self {
            Connection::Followers => "/followers/ids",
            Connection::Following => "/friends/ids",
        }
    }
}

/// Endpoints whose windows bound a single profile expansion.
pub const CRAWL_ENDPOINTS: [&str; 3] = ["/users/show/:id", "/followers/ids", "/friends/ids"];

/// Response of `application/rate_limit_status`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitStatus {
    /// Resource family (`users`, `followers`, ...) -> endpoint path -> window.
    pub resources: HashMap<String, HashMap<String, RateLimitWindow>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitWindow {
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds when the window resets.
    pub reset: i64,
}

impl RateLimitStatus {
    pub fn window(&self, endpoint: &str) -> Option<&RateLimitWindow> {
        self.resources
            .values()
            .find_map(|family| family.get(endpoint))
    }

    /// Smallest remaining count across the given endpoints. Endpoints the
    /// response does not mention are ignored; `None` if none were present.
    pub fn min_remaining(&self, endpoints: &[&str]) -> Option<u64> {
        endpoints
            .iter()
            .filter_map(|e| self.window(e))
            .map(|w| w.remaining)
            .min()
    }
}
