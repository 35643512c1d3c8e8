use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::RunError;
use crate::health::domain::CustomerId;
use crate::health::report::{sort_rows, ColorScale, ReportHandle, ReportRow, ReportSink};
use crate::health::repository::RunStore;
use crate::health::scoring::{ScoreResult, ScoringEngine, ScoringError};
use crate::health::settings::ReportingPeriod;
use crate::health::sources::{SignalSource, SourceError};

/// Per-run parameters shared by every batch of that run.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub report: ReportHandle,
    pub period: ReportingPeriod,
    pub color_scale: ColorScale,
}

/// Counts for one invocation's batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub remaining: usize,
}

#[derive(Debug, thiserror::Error)]
enum AccountError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),
    #[error("scoring failed: {0}")]
    Score(#[from] ScoringError),
}

/// Scores the next slice of unprocessed accounts, committing each one as it goes.
pub struct BatchProcessor {
    store: Arc<dyn RunStore>,
    signals: Arc<dyn SignalSource>,
    reports: Arc<dyn ReportSink>,
    engine: ScoringEngine,
    context: BatchContext,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn RunStore>,
        signals: Arc<dyn SignalSource>,
        reports: Arc<dyn ReportSink>,
        engine: ScoringEngine,
        context: BatchContext,
    ) -> Self {
        Self {
            store,
            signals,
            reports,
            engine,
            context,
        }
    }

    /// Processes up to `max_count` accounts in snapshot order.
    ///
    /// Each account is fetched, scored, and marked processed before the next one starts,
    /// so an interrupted invocation only loses the account in flight. Accounts that fail
    /// to fetch or score stay unprocessed and are retried by later invocations.
    pub fn process_batch(
        &self,
        max_count: usize,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, RunError> {
        if max_count == 0 {
            return Ok(BatchSummary::default());
        }

        let pending = self.store.list_unprocessed(max_count)?;
        if pending.is_empty() {
            return Ok(BatchSummary::default());
        }

        let names = self.engine.catalog().fetch_names();
        let mut results = Vec::with_capacity(pending.len());
        let mut failed = 0;

        for customer_id in pending {
            let result = match self.score_account(&customer_id, &names) {
                Ok(result) => result,
                Err(err) => {
                    warn!(%customer_id, error = %err, "account left unprocessed");
                    failed += 1;
                    continue;
                }
            };

            if let Err(err) = self.store.mark_processed(&customer_id, now) {
                if let Err(flush_err) = self.flush(&results) {
                    error!(error = %flush_err, "could not flush committed rows");
                }
                return Err(err.into());
            }

            debug!(%customer_id, score = result.score, "account scored");
            results.push(result);
        }

        self.flush(&results)?;

        let (processed_total, total) = self.store.progress()?;
        Ok(BatchSummary {
            processed: results.len(),
            failed,
            remaining: total.saturating_sub(processed_total),
        })
    }

    fn score_account(
        &self,
        customer_id: &CustomerId,
        names: &[String],
    ) -> Result<ScoreResult, AccountError> {
        let raw = self
            .signals
            .fetch_signals(customer_id, names, self.context.period)?;
        Ok(self.engine.score(customer_id, &raw)?)
    }

    fn flush(&self, results: &[ScoreResult]) -> Result<(), RunError> {
        if results.is_empty() {
            return Ok(());
        }

        let catalog = self.engine.catalog();
        let mut rows: Vec<ReportRow> = results
            .iter()
            .map(|result| ReportRow::from_result(result, catalog, &self.context.color_scale))
            .collect();
        sort_rows(&mut rows);

        self.reports.append(&self.context.report, &rows)?;
        Ok(())
    }
}
