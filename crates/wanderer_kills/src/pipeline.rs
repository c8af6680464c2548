//! Killmail ingestion: time check, adaptation, enrichment, storage.

use crate::adapter::adapt_kill_data;
use crate::enricher::Enricher;
use crate::error::IngestError;
use crate::storage::KillCache;
use crate::time_handler::{extract_kill_time, KillAge, TimeHandler};
use crate::types::{Killmail, SolarSystemId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored(Box<Killmail>),
    /// Older than the cutoff; never adapted or enriched.
    Older(DateTime<Utc>),
    Duplicate(i64),
}

/// Totals for one `killmail_update` batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub stored: Vec<Killmail>,
    pub older: usize,
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct KillPipeline {
    time_handler: TimeHandler,
    enricher: Enricher,
    cache: Arc<KillCache>,
}

impl KillPipeline {
    pub fn new(time_handler: TimeHandler, enricher: Enricher, cache: Arc<KillCache>) -> Self {
        Self {
            time_handler,
            enricher,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<KillCache> {
        &self.cache
    }

    pub fn time_handler(&self) -> &TimeHandler {
        &self.time_handler
    }

    /// Runs one raw payload through the pipeline.
    ///
    /// The age check runs on the raw payload first so stale kills cost
    /// nothing. A payload without a readable time falls through to the
    /// adapter, which reports the missing or mistyped field with the rest.
    pub async fn parse_and_store_killmail(&self, payload: &Value, now: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        if let Ok(kill_time) = extract_kill_time(payload) {
            if let KillAge::Older(kill_time) = self.time_handler.classify(kill_time, now) {
                return Ok(IngestOutcome::Older(kill_time));
            }
        }

        let mut killmail = adapt_kill_data(payload)?;
        if self.cache.contains(killmail.solar_system_id, killmail.killmail_id) {
            return Ok(IngestOutcome::Duplicate(killmail.killmail_id));
        }

        self.enricher.enrich_killmail(&mut killmail).await;
        if !self.cache.insert(killmail.clone()) {
            return Ok(IngestOutcome::Duplicate(killmail.killmail_id));
        }
        Ok(IngestOutcome::Stored(Box::new(killmail)))
    }

    /// Ingests a feed batch for one system. Failures are logged and counted,
    /// never propagated.
    #[instrument(skip(self, payloads, now), fields(count = payloads.len()))]
    pub async fn process_system_update(&self, solar_system_id: SolarSystemId, payloads: &[Value], now: DateTime<Utc>) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for payload in payloads {
            match self.parse_and_store_killmail(payload, now).await {
                Ok(IngestOutcome::Stored(killmail)) => summary.stored.push(*killmail),
                Ok(IngestOutcome::Older(kill_time)) => {
                    debug!(%kill_time, "Skipping kill older than cutoff");
                    summary.older += 1;
                }
                Ok(IngestOutcome::Duplicate(killmail_id)) => {
                    debug!(killmail_id, "Skipping duplicate kill");
                    summary.duplicates += 1;
                }
                Err(IngestError::Adapter(err)) => {
                    warn!(reason = err.reason(), error = %err, "Rejected killmail payload");
                    summary.failed += 1;
                }
            }
        }

        if !summary.stored.is_empty() {
            info!(
                stored = summary.stored.len(),
                older = summary.older,
                failed = summary.failed,
                "💀 Stored new kills"
            );
        }
        summary
    }
}
