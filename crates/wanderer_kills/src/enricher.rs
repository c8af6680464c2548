//! Fills killmail name fields from external lookups.
//!
//! Every lookup runs under the [`RetryPolicy`]. Not-found, permanent errors
//! and an exhausted retry budget all leave the field empty: enrichment never
//! blocks storage of the kill itself.

use crate::error::LookupError;
use crate::lookup::EsiLookup;
use crate::retry::RetryPolicy;
use crate::types::{Killmail, Participant};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lookup statistics for one killmail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub resolved: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Enricher {
    lookup: Arc<dyn EsiLookup>,
    retry: RetryPolicy,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn EsiLookup>, retry: RetryPolicy) -> Self {
        Self { lookup, retry }
    }

    /// Resolves names for the victim and the final-blow attacker in place.
    pub async fn enrich_killmail(&self, killmail: &mut Killmail) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        let killmail_id = killmail.killmail_id;

        self.enrich_participant(killmail_id, &mut killmail.victim, &mut report)
            .await;
        if let Some(attacker) = killmail.final_blow.as_mut() {
            self.enrich_participant(killmail_id, attacker, &mut report).await;
        }

        if report.skipped > 0 {
            debug!(killmail_id, resolved = report.resolved, skipped = report.skipped, "Killmail partially enriched");
        }
        report
    }

    async fn enrich_participant(&self, killmail_id: i64, participant: &mut Participant, report: &mut EnrichmentReport) {
        let lookup = &self.lookup;

        if let Some(id) = participant.character_id {
            if let Some(info) = self.resolve(killmail_id, "character", id, report, || lookup.character(id)).await {
                participant.character_name = Some(info.name);
            }
        }
        if let Some(id) = participant.corporation_id {
            if let Some(info) = self.resolve(killmail_id, "corporation", id, report, || lookup.corporation(id)).await {
                participant.corporation_name = Some(info.name);
                participant.corporation_ticker = Some(info.ticker);
            }
        }
        if let Some(id) = participant.alliance_id {
            if let Some(info) = self.resolve(killmail_id, "alliance", id, report, || lookup.alliance(id)).await {
                participant.alliance_name = Some(info.name);
                participant.alliance_ticker = Some(info.ticker);
            }
        }
        if let Some(id) = participant.ship_type_id {
            if let Some(info) = self.resolve(killmail_id, "ship_type", id, report, || lookup.ship_type(id)).await {
                participant.ship_name = Some(info.name);
            }
        }
    }

    /// One lookup under the retry policy; `None` means skip the field.
    async fn resolve<T, F, Fut>(
        &self,
        killmail_id: i64,
        kind: &'static str,
        id: i64,
        report: &mut EnrichmentReport,
        fetch: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        match self.retry.run(kind, fetch).await {
            Ok(value) => {
                report.resolved += 1;
                Some(value)
            }
            Err(LookupError::NotFound) => {
                debug!(killmail_id, kind, id, "Lookup not found, skipping");
                report.skipped += 1;
                None
            }
            Err(err) => {
                warn!(killmail_id, kind, id, error = %err, "Lookup failed, skipping");
                report.skipped += 1;
                None
            }
        }
    }
}
