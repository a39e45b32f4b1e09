use thiserror::Error;

use crate::types::UserId;

pub type Result<T> = std::result::Result<T, CrawlError>;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The account exists but its data is withheld (protected or suspended).
    #[error("Access refused: {0}")]
    Refused(String),

    #[error("Rate limited (remaining: {remaining:?})")]
    RateLimited { remaining: Option<u64> },

    #[error("Record already exists for user {0}")]
    Conflict(UserId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Graph store error: {0}")]
    Store(String),

    #[error("Social API error: {0}")]
    Api(String),
}

impl CrawlError {
    /// Failures the crawl loop logs and moves past.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CrawlError::NotFound(_))
    }

    /// Per-account failures: the crawl skips the account and carries on.
    pub fn is_skippable(&self) -> bool {
        matches!(self, CrawlError::NotFound(_) | CrawlError::Refused(_))
    }

    /// Failures that end a run normally rather than as an error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CrawlError::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_accounts_are_skippable_but_not_missing() {
        let refused = CrawlError::Refused("protected".into());
        assert!(refused.is_skippable());
        assert!(!refused.is_not_found());

        assert!(CrawlError::NotFound("gone".into()).is_skippable());
        assert!(!CrawlError::Store("down".into()).is_skippable());
        assert!(!CrawlError::RateLimited { remaining: Some(0) }.is_skippable());
    }
}
