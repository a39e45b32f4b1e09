//! Expansion of a single identity: resolve, fetch, promote, then link.
//!
//! The record is promoted to `full` before any edge is written. A crawl cut
//! short mid-expansion therefore leaves a `full` record with a partial edge
//! set, and re-running `expand` on it is a no-op rather than a refetch.

use std::sync::Arc;

use tracing::{debug, info, info_span, Instrument, Span};

use followgraph_common::{
    CrawlError, Identifier, ProfileAttributes, Result, UserId, UserRecord,
};

use crate::fetcher::ProfileFetcher;
use crate::traits::RecordStore;

/// What a single `expand` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub record: UserRecord,
    /// False when the record was already `full` and nothing was fetched.
    pub fetched: bool,
    pub stubs_created: u32,
    pub edges_inserted: u32,
}

impl Expansion {
    fn unchanged(record: UserRecord) -> Self {
        Self {
            record,
            fetched: false,
            stubs_created: 0,
            edges_inserted: 0,
        }
    }
}

pub struct EnrichmentPipeline {
    store: Arc<dyn RecordStore>,
    fetcher: ProfileFetcher,
    span: Span,
}

impl EnrichmentPipeline {
    /// `span` is the parent for every event this pipeline emits.
    pub fn new(store: Arc<dyn RecordStore>, fetcher: ProfileFetcher, span: Span) -> Self {
        Self {
            store,
            fetcher,
            span,
        }
    }

    /// Bring `id` to `full` detail and link all of its connections.
    pub async fn expand(&self, id: UserId) -> Result<Expansion> {
        let span = info_span!(parent: &self.span, "expand", user_id = %id);
        self.expand_with(id, None).instrument(span).await
    }

    /// Like `expand`, but also accepts a label. An unknown label is resolved
    /// upstream and the fetched profile is reused for the expansion.
    pub async fn expand_identifier(&self, ident: &Identifier) -> Result<Expansion> {
        match ident {
            Identifier::Id(id) => self.expand(*id).await,
            Identifier::Label(label) => {
                let span = info_span!(parent: &self.span, "expand", screen_name = label.as_str());
                self.expand_label(label).instrument(span).await
            }
        }
    }

    async fn expand_label(&self, label: &str) -> Result<Expansion> {
        let ident = Identifier::Label(label.to_string());
        if let Some(known) = self.store.resolve(&ident).await? {
            debug!(user_id = %known.id, "Label already indexed");
            return self.expand_with(known.id, None).await;
        }
        let profile = self.fetcher.fetch_profile_by_label(label).await?;
        self.expand_with(profile.id, Some(profile)).await
    }

    async fn expand_with(
        &self,
        id: UserId,
        prefetched: Option<ProfileAttributes>,
    ) -> Result<Expansion> {
        let existing = self.store.resolve(&Identifier::Id(id)).await?;
        if let Some(record) = existing.as_ref().filter(|r| r.is_full()) {
            info!(screen_name = record.display_label(), "Already fully detailed, skipping");
            return Ok(Expansion::unchanged(record.clone()));
        }

        let profile = match prefetched {
            Some(profile) => profile,
            None => self.fetcher.fetch_profile(id).await?,
        };

        let record = match existing {
            Some(stub) => {
                info!(user_id = %id, "Promoting basic record");
                self.store.promote(&stub, &profile).await?
            }
            None => {
                info!(screen_name = profile.screen_name.as_str(), "Adding user to graph");
                self.create_or_adopt(&profile).await?
            }
        };

        let connections = self.fetcher.fetch_connections(id).await?;
        let mut stubs_created = 0;
        let mut edges_inserted = 0;

        for &follower in &connections.followers {
            if self.ensure_record(follower).await? {
                stubs_created += 1;
            }
            if self.store.insert_edge(follower, id).await? {
                edges_inserted += 1;
            }
        }

        for &followee in &connections.following {
            if self.ensure_record(followee).await? {
                stubs_created += 1;
            }
            if self.store.insert_edge(id, followee).await? {
                edges_inserted += 1;
            }
        }

        info!(
            screen_name = record.display_label(),
            stubs_created,
            edges_inserted,
            "Expansion complete"
        );

        Ok(Expansion {
            record,
            fetched: true,
            stubs_created,
            edges_inserted,
        })
    }

    /// Create the full record, or if another writer got there first, take
    /// theirs and promote it if it is still a stub.
    async fn create_or_adopt(&self, profile: &ProfileAttributes) -> Result<UserRecord> {
        match self.store.create_full(profile).await {
            Err(CrawlError::Conflict(id)) => {
                debug!(user_id = %id, "Create raced with another writer, re-resolving");
                match self.store.resolve(&Identifier::Id(id)).await? {
                    Some(current) => self.store.promote(&current, profile).await,
                    None => Err(CrawlError::Conflict(id)),
                }
            }
            other => other,
        }
    }

    /// Make sure `id` has at least a stub. Returns true if one was created.
    async fn ensure_record(&self, id: UserId) -> Result<bool> {
        if self.store.resolve(&Identifier::Id(id)).await?.is_some() {
            return Ok(false);
        }
        match self.store.create_stub(id).await {
            Ok(_) => {
                debug!(user_id = %id, "Created basic record");
                Ok(true)
            }
            Err(CrawlError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
