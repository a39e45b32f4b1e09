use std::env;

use tracing::info;

use crate::error::CrawlError;

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/1.1";
pub const DEFAULT_SAFETY_THRESHOLD: u64 = 10;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Neo4j
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    // Social API. The token is only needed by commands that call the API.
    pub twitter_bearer_token: Option<String>,
    pub twitter_api_base: String,
    pub http_timeout_secs: u64,

    // Crawl pacing
    pub safety_threshold: u64,
    pub max_expansions: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, CrawlError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a key if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CrawlError> {
        Ok(Self {
            neo4j_uri: required(&lookup, "NEO4J_URI")?,
            neo4j_user: required(&lookup, "NEO4J_USER")?,
            neo4j_password: required(&lookup, "NEO4J_PASSWORD")?,
            twitter_bearer_token: lookup("TWITTER_BEARER_TOKEN").filter(|t| !t.is_empty()),
            twitter_api_base: lookup("TWITTER_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            http_timeout_secs: parsed(&lookup, "HTTP_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            safety_threshold: parsed(&lookup, "CRAWL_SAFETY_THRESHOLD")?
                .unwrap_or(DEFAULT_SAFETY_THRESHOLD),
            max_expansions: parsed(&lookup, "CRAWL_MAX_EXPANSIONS")?,
        })
    }

    /// The API token, for commands that talk to the social API.
    pub fn require_twitter_token(&self) -> Result<&str, CrawlError> {
        self.twitter_bearer_token.as_deref().ok_or_else(|| {
            CrawlError::Validation("TWITTER_BEARER_TOKEN environment variable is required".to_string())
        })
    }

    /// Log the effective configuration with credentials masked.
    pub fn log_redacted(&self) {
        info!(
            neo4j_uri = self.neo4j_uri.as_str(),
            neo4j_user = self.neo4j_user.as_str(),
            neo4j_password = redact(&self.neo4j_password),
            twitter_bearer_token = ?self.twitter_bearer_token.as_deref().map(redact),
            twitter_api_base = self.twitter_api_base.as_str(),
            http_timeout_secs = self.http_timeout_secs,
            safety_threshold = self.safety_threshold,
            max_expansions = ?self.max_expansions,
            "Configuration loaded"
        );
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, CrawlError> {
    lookup(key).ok_or_else(|| CrawlError::Validation(format!("{key} environment variable is required")))
}

fn parsed(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, CrawlError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CrawlError::Validation(format!("{key} must be a non-negative integer, got {raw:?}"))),
        None => Ok(None),
    }
}

fn redact(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", secret.chars().take(4).collect::<String>())
    }
}
