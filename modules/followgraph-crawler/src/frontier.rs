//! Picks the next stub to expand.
//!
//! Least-connected stub first: the crawl grows outward evenly instead of
//! repeatedly descending into hubs. Ties go to the smaller ID.

use std::collections::HashSet;
use std::sync::Arc;

use followgraph_common::{RankedUser, Result, UserId};

use crate::traits::RecordStore;

pub struct FrontierSelector {
    store: Arc<dyn RecordStore>,
}

impl FrontierSelector {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// The lowest-degree stub, or `None` when every record is `full`.
    pub async fn next(&self) -> Result<Option<UserId>> {
        self.next_excluding(&HashSet::new()).await
    }

    /// As `next`, ignoring IDs in `skip` (identities that already failed this run).
    pub async fn next_excluding(&self, skip: &HashSet<UserId>) -> Result<Option<UserId>> {
        let ranked = self.store.list_basic_by_degree().await?;
        Ok(lowest_degree(&ranked, skip).map(|r| r.record.id))
    }

    /// Up to `limit` stubs in the order they would be expanded.
    pub async fn peek(&self, limit: usize) -> Result<Vec<RankedUser>> {
        let mut ranked = self.store.list_basic_by_degree().await?;
        ranked.retain(|r| !r.record.is_full());
        ranked.sort_by_key(|r| (r.degree, r.record.id));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

fn lowest_degree<'a>(ranked: &'a [RankedUser], skip: &HashSet<UserId>) -> Option<&'a RankedUser> {
    ranked
        .iter()
        .filter(|r| !r.record.is_full() && !skip.contains(&r.record.id))
        .min_by_key(|r| (r.degree, r.record.id))
}
