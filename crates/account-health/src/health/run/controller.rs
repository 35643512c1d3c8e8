use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::batch::{BatchContext, BatchProcessor, BatchSummary};
use super::RunError;
use crate::health::domain::{CustomerId, RunId, RunRecord};
use crate::health::notify::Notifier;
use crate::health::report::{ReportHandle, ReportSink};
use crate::health::repository::RunStore;
use crate::health::scoring::ScoringEngine;
use crate::health::settings::Settings;
use crate::health::signals::SignalCatalog;
use crate::health::sources::{ConfigSource, FleetEnumerator, SignalSource};

/// Collaborators injected into the controller.
#[derive(Clone)]
pub struct RunServices {
    pub store: Arc<dyn RunStore>,
    pub config: Arc<dyn ConfigSource>,
    pub fleet: Arc<dyn FleetEnumerator>,
    pub signals: Arc<dyn SignalSource>,
    pub reports: Arc<dyn ReportSink>,
    pub notifier: Arc<dyn Notifier>,
}

/// Durable state as seen between invocations.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    NoRun {
        last_run_start: Option<DateTime<Utc>>,
    },
    InProgress {
        run: RunRecord,
        processed: usize,
        total: usize,
    },
}

/// What a single invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// No open run and the report frequency has not elapsed yet.
    Idle {
        last_run_start: DateTime<Utc>,
        next_due: DateTime<Utc>,
    },
    Progressed {
        run: RunId,
        started: bool,
        batch: BatchSummary,
    },
    Completed {
        run: RunId,
        started: bool,
        batch: BatchSummary,
        report: ReportHandle,
        notified: bool,
    },
}

/// Whole days elapsed, truncated toward zero.
pub fn days_since(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days()
}

/// Decides per invocation whether to start a run, continue the open one, or do nothing.
pub struct RunController {
    services: RunServices,
}

impl RunController {
    pub fn new(services: RunServices) -> Self {
        Self { services }
    }

    pub fn state(&self) -> Result<RunState, RunError> {
        let store = &self.services.store;
        match store.current_run()? {
            Some(run) => {
                let (processed, total) = store.progress()?;
                Ok(RunState::InProgress {
                    run,
                    processed,
                    total,
                })
            }
            None => Ok(RunState::NoRun {
                last_run_start: store.last_run_start()?,
            }),
        }
    }

    /// Runs one scheduled invocation at `now`.
    pub fn invoke(&self, now: DateTime<Utc>) -> Result<InvocationOutcome, RunError> {
        let settings = Settings::from_map(&self.services.config.load_settings()?)?;

        if let Some(run) = self.services.store.current_run()? {
            info!(run = %run.id, started_at = %run.started_at, "continuing open run");
            let catalog = self.load_catalog()?;
            return self.advance(run, false, catalog, &settings, now);
        }

        if let Some(last_run_start) = self.services.store.last_run_start()? {
            let elapsed = days_since(last_run_start, now);
            if elapsed < i64::from(settings.report_frequency_days) {
                let next_due =
                    last_run_start + Duration::days(i64::from(settings.report_frequency_days));
                info!(
                    %last_run_start,
                    %next_due,
                    elapsed_days = elapsed,
                    "report not due yet; nothing to do"
                );
                return Ok(InvocationOutcome::Idle {
                    last_run_start,
                    next_due,
                });
            }
        }

        let (run, catalog, settings) = self.start_run(&settings, now)?;
        self.advance(run, true, catalog, &settings, now)
    }

    fn load_catalog(&self) -> Result<Arc<SignalCatalog>, RunError> {
        let definitions = self.services.config.load_signal_definitions()?;
        Ok(Arc::new(SignalCatalog::load(definitions)?))
    }

    /// The catalog is validated and the fleet enumerated before anything is locked or
    /// cleared, so a broken configuration or an unreachable fleet leaves the previous
    /// state untouched.
    fn start_run(
        &self,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<(RunRecord, Arc<SignalCatalog>, Settings), RunError> {
        self.load_catalog()?;
        let services = &self.services;

        let listed = services
            .fleet
            .list_accounts(settings.account_label.as_deref())?;
        let accounts = dedupe_accounts(listed);

        services.config.lock()?;
        self.begin_locked(&accounts, now).map_err(|err| {
            if let Err(unlock_err) = services.config.unlock() {
                warn!(error = %unlock_err, "could not release configuration lock after failed start");
            }
            err
        })
    }

    /// Runs with the configuration locked. Catalog and settings are reloaded from the
    /// locked snapshot; that copy is the score basis for every batch of the run.
    fn begin_locked(
        &self,
        accounts: &[CustomerId],
        now: DateTime<Utc>,
    ) -> Result<(RunRecord, Arc<SignalCatalog>, Settings), RunError> {
        let services = &self.services;
        let settings = Settings::from_map(&services.config.load_settings()?)?;
        let catalog = self.load_catalog()?;

        services.store.clear_accounts()?;
        services.store.snapshot_accounts(accounts)?;

        let report = services.reports.provision(now, &catalog)?;
        let id = services.store.open_run(now, report.clone())?;

        info!(
            run = %id,
            accounts = accounts.len(),
            label = settings.account_label.as_deref().unwrap_or("<all>"),
            %report,
            "started new run"
        );

        Ok((
            RunRecord {
                id,
                started_at: now,
                ended_at: None,
                report,
            },
            catalog,
            settings,
        ))
    }

    fn advance(
        &self,
        run: RunRecord,
        started: bool,
        catalog: Arc<SignalCatalog>,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<InvocationOutcome, RunError> {
        let services = &self.services;
        let report = services.store.report_target(run.id)?;

        let processor = BatchProcessor::new(
            services.store.clone(),
            services.signals.clone(),
            services.reports.clone(),
            ScoringEngine::new(catalog),
            BatchContext {
                report: report.clone(),
                period: settings.report_period,
                color_scale: settings.color_scale.clone(),
            },
        );
        let batch = processor.process_batch(settings.batch_size, now)?;

        info!(
            run = %run.id,
            processed = batch.processed,
            failed = batch.failed,
            remaining = batch.remaining,
            "batch finished"
        );

        if !services.store.all_processed()? {
            return Ok(InvocationOutcome::Progressed {
                run: run.id,
                started,
                batch,
            });
        }

        let notified = self.complete(&run, &report, settings, now)?;
        Ok(InvocationOutcome::Completed {
            run: run.id,
            started,
            batch,
            report,
            notified,
        })
    }

    /// Every step is safe to repeat, so a run interrupted during completion is finished
    /// by the next invocation.
    fn complete(
        &self,
        run: &RunRecord,
        report: &ReportHandle,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<bool, RunError> {
        let services = &self.services;
        services.reports.finalize(report)?;
        services.config.unlock()?;
        services.store.close_run(run.id, now)?;

        let (processed, _) = services.store.progress()?;
        info!(run = %run.id, accounts = processed, %report, "run completed");

        let Some(recipient) = settings.recipient_email.as_deref() else {
            return Ok(false);
        };

        let subject = format!("Account health report ready ({})", run.started_at.date_naive());
        let body = format!(
            "The account health run started {} finished at {} after scoring {} accounts.\n\
             Report: {}\n",
            run.started_at.to_rfc3339(),
            now.to_rfc3339(),
            processed,
            report
        );

        match services.notifier.send(recipient, &subject, &body) {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(run = %run.id, recipient, error = %err, "completion notice not delivered");
                Ok(false)
            }
        }
    }
}

/// Keeps the first occurrence of each id so every account is scored once per run.
fn dedupe_accounts(listed: Vec<CustomerId>) -> Vec<CustomerId> {
    let listed_len = listed.len();
    let mut seen = HashSet::with_capacity(listed_len);
    let accounts: Vec<CustomerId> = listed
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    if accounts.len() < listed_len {
        warn!(
            duplicates = listed_len - accounts.len(),
            "fleet listing contained duplicate customer ids"
        );
    }
    accounts
}
