use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument, Span};

use followgraph_common::{CrawlError, Identifier, Result, UserId};

use crate::enrichment::{EnrichmentPipeline, Expansion};
use crate::fetcher::ProfileFetcher;
use crate::frontier::FrontierSelector;
use crate::quota::QuotaGuard;
use crate::traits::{RecordStore, SocialApi};

/// Why a seed pass or a run ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every seed was processed.
    SeedsDone,
    /// No `basic` records left to expand.
    FrontierEmpty,
    /// Remaining calls at or under the safety threshold, or the API refused a call.
    QuotaExhausted { remaining: u64 },
    /// Hit the per-run expansion cap.
    ExpansionCap,
    /// Stop flag set between expansions.
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::SeedsDone => write!(f, "all seeds processed"),
            StopReason::FrontierEmpty => write!(f, "frontier empty"),
            StopReason::QuotaExhausted { remaining } => {
                write!(f, "quota exhausted ({remaining} calls left)")
            }
            StopReason::ExpansionCap => write!(f, "expansion cap reached"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Stats from a seed pass or a crawl run.
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub expanded: u32,
    pub already_full: u32,
    pub not_found: u32,
    /// Accounts that exist but refused access (protected or suspended).
    pub refused: u32,
    pub stubs_created: u32,
    pub edges_inserted: u32,
    pub stop: Option<StopReason>,
}

impl CrawlStats {
    fn record(&mut self, expansion: &Expansion) {
        if expansion.fetched {
            self.expanded += 1;
        } else {
            self.already_full += 1;
        }
        self.stubs_created += expansion.stubs_created;
        self.edges_inserted += expansion.edges_inserted;
    }

    fn record_skip(&mut self, err: &CrawlError) {
        if err.is_not_found() {
            self.not_found += 1;
        } else {
            self.refused += 1;
        }
    }

    /// Expansions attempted, successful or not.
    pub fn attempts(&self) -> u32 {
        self.expanded + self.already_full + self.not_found + self.refused
    }
}

impl std::fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Crawl Complete ===")?;
        writeln!(f, "Expanded:       {}", self.expanded)?;
        writeln!(f, "Already full:   {}", self.already_full)?;
        writeln!(f, "Not found:      {}", self.not_found)?;
        writeln!(f, "Refused:        {}", self.refused)?;
        writeln!(f, "Stubs created:  {}", self.stubs_created)?;
        writeln!(f, "Edges inserted: {}", self.edges_inserted)?;
        match self.stop {
            Some(reason) => write!(f, "Stopped:        {reason}"),
            None => write!(f, "Stopped:        -"),
        }
    }
}

/// Parse every raw seed before anything touches the network or the store.
pub fn parse_seeds<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Identifier>> {
    raw.iter().map(|s| s.as_ref().parse()).collect()
}

/// Drives repeated expansions from the frontier under the quota guard.
/// Single worker: one `expand` at a time.
pub struct CrawlLoop {
    api: Arc<dyn SocialApi>,
    pipeline: EnrichmentPipeline,
    frontier: FrontierSelector,
    quota: QuotaGuard,
    max_expansions: Option<u32>,
    cancelled: Arc<AtomicBool>,
    span: Span,
}

impl CrawlLoop {
    /// `span` is handed down to the pipeline as the parent of all crawl events.
    pub fn new(
        api: Arc<dyn SocialApi>,
        store: Arc<dyn RecordStore>,
        safety_threshold: u64,
        span: Span,
    ) -> Self {
        let fetcher = ProfileFetcher::new(api.clone());
        let pipeline = EnrichmentPipeline::new(store.clone(), fetcher, span.clone());
        Self {
            api,
            pipeline,
            frontier: FrontierSelector::new(store),
            quota: QuotaGuard::new(safety_threshold),
            max_expansions: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            span,
        }
    }

    pub fn with_max_expansions(mut self, max: u32) -> Self {
        self.max_expansions = Some(max);
        self
    }

    /// Share an externally owned stop flag (e.g. set from a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn pipeline(&self) -> &EnrichmentPipeline {
        &self.pipeline
    }

    pub fn frontier(&self) -> &FrontierSelector {
        &self.frontier
    }

    pub fn quota(&self) -> &QuotaGuard {
        &self.quota
    }

    /// Expand each seed in order, without consulting the quota guard.
    /// Unknown or refused identities are logged and skipped; an upstream rate limit ends
    /// the pass early.
    pub async fn seed(&self, seeds: &[Identifier]) -> Result<CrawlStats> {
        let span = info_span!(parent: &self.span, "seed", seeds = seeds.len());
        self.seed_inner(seeds).instrument(span).await
    }

    async fn seed_inner(&self, seeds: &[Identifier]) -> Result<CrawlStats> {
        let mut stats = CrawlStats::default();

        for ident in seeds {
            if self.is_cancelled() {
                stats.stop = Some(StopReason::Cancelled);
                return Ok(stats);
            }
            match self.pipeline.expand_identifier(ident).await {
                Ok(expansion) => stats.record(&expansion),
                Err(e) if e.is_skippable() => {
                    warn!(seed = %ident, error = %e, "Seed unavailable upstream, skipping");
                    stats.record_skip(&e);
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(seed = %ident, "Rate limited while seeding, stopping");
                    stats.stop = Some(StopReason::QuotaExhausted { remaining: 0 });
                    return Ok(stats);
                }
                Err(e) => return Err(e),
            }
        }

        stats.stop = Some(StopReason::SeedsDone);
        info!(expanded = stats.expanded, not_found = stats.not_found, "Seeding complete");
        Ok(stats)
    }

    /// Expand frontier entries until the frontier is empty, the quota reaches
    /// the safety threshold, the cap is hit, or the stop flag is set.
    pub async fn run(&self) -> Result<CrawlStats> {
        let span = info_span!(parent: &self.span, "run", threshold = self.quota.safety_threshold());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<CrawlStats> {
        let mut stats = CrawlStats::default();
        // Identities that vanished or refused access stay `basic`; don't pick them again this run.
        let mut skipped: HashSet<UserId> = HashSet::new();

        let stop = loop {
            if self.is_cancelled() {
                break StopReason::Cancelled;
            }
            if let Some(max) = self.max_expansions {
                if stats.attempts() >= max {
                    break StopReason::ExpansionCap;
                }
            }

            let remaining = match self.api.remaining_quota().await {
                Ok(remaining) => remaining,
                Err(CrawlError::RateLimited { remaining }) => {
                    break StopReason::QuotaExhausted {
                        remaining: remaining.unwrap_or(0),
                    };
                }
                Err(e) => return Err(e),
            };
            if !self.quota.permits(remaining) {
                break StopReason::QuotaExhausted { remaining };
            }

            let Some(id) = self.frontier.next_excluding(&skipped).await? else {
                break StopReason::FrontierEmpty;
            };

            match self.pipeline.expand(id).await {
                Ok(expansion) => stats.record(&expansion),
                Err(e) if e.is_skippable() => {
                    warn!(user_id = %id, error = %e, "User unavailable upstream, skipping for the rest of this run");
                    stats.record_skip(&e);
                    skipped.insert(id);
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(user_id = %id, "Rate limited mid-run, stopping");
                    break StopReason::QuotaExhausted { remaining: 0 };
                }
                Err(e) => return Err(e),
            }
        };

        stats.stop = Some(stop);
        self.quota.log_status();
        info!(%stop, expanded = stats.expanded, "Crawl run finished");
        Ok(stats)
    }

    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            info!("Crawl cancelled, stopping between expansions");
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_seeds_rejects_the_whole_batch() {
        let err = parse_seeds(&["100", "bogus", "@ok"]).unwrap_err();
        assert!(matches!(err, CrawlError::Validation(_)));

        let seeds = parse_seeds(&["100", "@ok"]).unwrap();
        assert_eq!(seeds, vec![Identifier::Id(UserId(100)), Identifier::Label("ok".into())]);
    }

    #[test]
    fn attempts_count_every_outcome() {
        let stats = CrawlStats {
            expanded: 2,
            already_full: 1,
            not_found: 3,
            refused: 1,
            ..Default::default()
        };
        assert_eq!(stats.attempts(), 7);
    }

    #[test]
    fn stats_summary_names_stop_reason() {
        let stats = CrawlStats {
            stop: Some(StopReason::QuotaExhausted { remaining: 4 }),
            ..Default::default()
        };
        assert!(stats.to_string().contains("quota exhausted (4 calls left)"));
    }
}
