use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::health::domain::{AccountRecord, CustomerId, RunId, RunRecord};
use crate::health::notify::{NotifyError, Notifier};
use crate::health::report::{ReportError, ReportHandle, ReportRow, ReportSink};
use crate::health::repository::{RunStore, StoreError};
use crate::health::run::{RunController, RunServices};
use crate::health::settings::{ReportingPeriod, SettingsMap};
use crate::health::signals::{Direction, RawSignalValue, SignalCatalog, SignalDefinition};
use crate::health::sources::{ConfigSource, FleetEnumerator, SignalSource, SourceError};

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 6, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn hours_later(hours: i64) -> DateTime<Utc> {
    start_time() + Duration::hours(hours)
}

pub(super) fn definitions() -> Vec<SignalDefinition> {
    let mut ctr = SignalDefinition::number("Ctr", Direction::High, 2.0, 0.01, 0.10);
    ctr.display_name = "Click-through rate".to_string();
    ctr.format = "0.00%".to_string();
    let cpa = SignalDefinition::number("Cpa", Direction::Low, 3.0, 5.0, 50.0);
    vec![SignalDefinition::text("Name"), ctr, cpa]
}

pub(super) fn catalog() -> Arc<SignalCatalog> {
    Arc::new(SignalCatalog::load(definitions()).expect("catalog loads"))
}

pub(super) fn settings(frequency_days: u32, batch_size: usize) -> SettingsMap {
    [
        ("ReportFrequency", frequency_days.to_string()),
        ("NumAccountsProcess", batch_size.to_string()),
        ("Level1MinValue", "0".to_string()),
        ("Level2MinValue", "0.5".to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

pub(super) fn account_ids(count: usize) -> Vec<CustomerId> {
    (1..=count)
        .map(|index| CustomerId(format!("acct-{index}")))
        .collect()
}

/// Account `n` reports a CTR of `n`% and a CPA of 10, so later accounts score higher.
pub(super) fn metrics_for(ids: &[CustomerId]) -> HashMap<CustomerId, BTreeMap<String, RawSignalValue>> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| {
            let mut values = BTreeMap::new();
            values.insert("Name".to_string(), RawSignalValue::Text(format!("Account {id}")));
            values.insert("Ctr".to_string(), RawSignalValue::Percent((index + 1) as f64));
            values.insert("Cpa".to_string(), RawSignalValue::Numeric(10.0));
            (id.clone(), values)
        })
        .collect()
}

#[derive(Default)]
struct StoreState {
    runs: Vec<RunRecord>,
    accounts: Vec<AccountRecord>,
}

/// In-memory run store. `fail_marks_after` simulates an invocation terminated after a
/// number of durable commits.
#[derive(Default)]
pub(super) struct MemoryRunStore {
    state: Mutex<StoreState>,
    marks_remaining: Mutex<Option<usize>>,
}

impl MemoryRunStore {
    pub(super) fn fail_marks_after(&self, commits: usize) {
        *self.marks_remaining.lock().expect("store mutex poisoned") = Some(commits);
    }

    pub(super) fn heal(&self) {
        *self.marks_remaining.lock().expect("store mutex poisoned") = None;
    }

    pub(super) fn runs(&self) -> Vec<RunRecord> {
        self.state.lock().expect("store mutex poisoned").runs.clone()
    }

    pub(super) fn accounts(&self) -> Vec<AccountRecord> {
        self.state.lock().expect("store mutex poisoned").accounts.clone()
    }

    pub(super) fn processed_ids(&self) -> Vec<CustomerId> {
        self.accounts()
            .into_iter()
            .filter(|account| account.is_processed())
            .map(|account| account.customer_id)
            .collect()
    }
}

impl RunStore for MemoryRunStore {
    fn current_run(&self) -> Result<Option<RunRecord>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.runs.iter().find(|run| run.is_open()).cloned())
    }

    fn last_run_start(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.runs.iter().map(|run| run.started_at).max())
    }

    fn open_run(
        &self,
        started_at: DateTime<Utc>,
        report: ReportHandle,
    ) -> Result<RunId, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if let Some(open) = state.runs.iter().find(|run| run.is_open()) {
            return Err(StoreError::AlreadyOpen(open.id));
        }
        let id = RunId(state.runs.len() as u64 + 1);
        state.runs.push(RunRecord {
            id,
            started_at,
            ended_at: None,
            report,
        });
        Ok(id)
    }

    fn close_run(&self, run: RunId, ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let record = state
            .runs
            .iter_mut()
            .find(|record| record.id == run)
            .ok_or(StoreError::RunNotFound(run))?;
        record.ended_at.get_or_insert(ended_at);
        Ok(())
    }

    fn snapshot_accounts(&self, ids: &[CustomerId]) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .accounts
            .extend(ids.iter().cloned().map(AccountRecord::unprocessed));
        Ok(())
    }

    fn clear_accounts(&self) -> Result<(), StoreError> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .accounts
            .clear();
        Ok(())
    }

    fn list_unprocessed(&self, limit: usize) -> Result<Vec<CustomerId>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .accounts
            .iter()
            .filter(|account| !account.is_processed())
            .take(limit)
            .map(|account| account.customer_id.clone())
            .collect())
    }

    fn mark_processed(&self, id: &CustomerId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut remaining = self.marks_remaining.lock().expect("store mutex poisoned");
        if let Some(left) = remaining.as_mut() {
            if *left == 0 {
                return Err(StoreError::Unavailable("invocation terminated".to_string()));
            }
            *left -= 1;
        }

        let mut state = self.state.lock().expect("store mutex poisoned");
        let account = state
            .accounts
            .iter_mut()
            .find(|account| &account.customer_id == id)
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))?;
        account.processed_at = Some(at);
        Ok(())
    }

    fn all_processed(&self) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.accounts.iter().all(AccountRecord::is_processed))
    }

    fn progress(&self) -> Result<(usize, usize), StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        let processed = state
            .accounts
            .iter()
            .filter(|account| account.is_processed())
            .count();
        Ok((processed, state.accounts.len()))
    }

    fn report_target(&self, run: RunId) -> Result<ReportHandle, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        state
            .runs
            .iter()
            .find(|record| record.id == run)
            .map(|record| record.report.clone())
            .ok_or(StoreError::RunNotFound(run))
    }
}

/// Catalog and settings whose `lock` takes a snapshot, as the file-backed source does.
pub(super) struct MemoryConfig {
    definitions: Mutex<Vec<SignalDefinition>>,
    settings: Mutex<SettingsMap>,
    snapshot: Mutex<Option<(Vec<SignalDefinition>, SettingsMap)>>,
}

impl MemoryConfig {
    pub(super) fn new(definitions: Vec<SignalDefinition>, settings: SettingsMap) -> Self {
        Self {
            definitions: Mutex::new(definitions),
            settings: Mutex::new(settings),
            snapshot: Mutex::new(None),
        }
    }

    /// Edits the live catalog, bypassing the lock like a hand edit of the table would.
    pub(super) fn replace_definitions(&self, definitions: Vec<SignalDefinition>) {
        *self.definitions.lock().expect("config mutex poisoned") = definitions;
    }

    pub(super) fn locked(&self) -> bool {
        self.snapshot.lock().expect("config mutex poisoned").is_some()
    }
}

impl ConfigSource for MemoryConfig {
    fn load_signal_definitions(&self) -> Result<Vec<SignalDefinition>, SourceError> {
        if let Some((definitions, _)) = self.snapshot.lock().expect("config mutex poisoned").as_ref() {
            return Ok(definitions.clone());
        }
        Ok(self.definitions.lock().expect("config mutex poisoned").clone())
    }

    fn load_settings(&self) -> Result<SettingsMap, SourceError> {
        if let Some((_, settings)) = self.snapshot.lock().expect("config mutex poisoned").as_ref() {
            return Ok(settings.clone());
        }
        Ok(self.settings.lock().expect("config mutex poisoned").clone())
    }

    fn lock(&self) -> Result<(), SourceError> {
        let mut snapshot = self.snapshot.lock().expect("config mutex poisoned");
        if snapshot.is_none() {
            *snapshot = Some((
                self.definitions.lock().expect("config mutex poisoned").clone(),
                self.settings.lock().expect("config mutex poisoned").clone(),
            ));
        }
        Ok(())
    }

    fn unlock(&self) -> Result<(), SourceError> {
        *self.snapshot.lock().expect("config mutex poisoned") = None;
        Ok(())
    }

    fn is_locked(&self) -> Result<bool, SourceError> {
        Ok(self.locked())
    }

    fn update_setting(&self, key: &str, value: &str) -> Result<(), SourceError> {
        if self.locked() {
            return Err(SourceError::Locked);
        }
        let mut settings = self.settings.lock().expect("config mutex poisoned");
        let mut entries: BTreeMap<String, String> = settings
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.insert(key.to_string(), value.to_string());
        *settings = SettingsMap::new(entries);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryFleet {
    accounts: Mutex<Vec<(CustomerId, Vec<String>)>>,
    unreachable: bool,
}

impl MemoryFleet {
    pub(super) fn new(ids: Vec<CustomerId>) -> Self {
        Self::labelled(ids.into_iter().map(|id| (id, Vec::new())).collect())
    }

    pub(super) fn labelled(accounts: Vec<(CustomerId, Vec<String>)>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            unreachable: false,
        }
    }

    pub(super) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub(super) fn push(&self, id: CustomerId) {
        self.accounts
            .lock()
            .expect("fleet mutex poisoned")
            .push((id, Vec::new()));
    }
}

impl FleetEnumerator for MemoryFleet {
    fn list_accounts(&self, label: Option<&str>) -> Result<Vec<CustomerId>, SourceError> {
        if self.unreachable {
            return Err(SourceError::Unavailable("account directory offline".to_string()));
        }
        let accounts = self.accounts.lock().expect("fleet mutex poisoned");
        Ok(accounts
            .iter()
            .filter(|(_, labels)| label.map_or(true, |wanted| labels.iter().any(|l| l == wanted)))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemorySignals {
    values: Mutex<HashMap<CustomerId, BTreeMap<String, RawSignalValue>>>,
    failing: Mutex<HashSet<CustomerId>>,
    fetched: Mutex<Vec<(CustomerId, ReportingPeriod)>>,
}

impl MemorySignals {
    pub(super) fn new(values: HashMap<CustomerId, BTreeMap<String, RawSignalValue>>) -> Self {
        Self {
            values: Mutex::new(values),
            ..Self::default()
        }
    }

    pub(super) fn fail_for(&self, id: &CustomerId) {
        self.failing
            .lock()
            .expect("signals mutex poisoned")
            .insert(id.clone());
    }

    pub(super) fn recover(&self, id: &CustomerId) {
        self.failing
            .lock()
            .expect("signals mutex poisoned")
            .remove(id);
    }

    pub(super) fn insert(&self, id: CustomerId, values: BTreeMap<String, RawSignalValue>) {
        self.values
            .lock()
            .expect("signals mutex poisoned")
            .insert(id, values);
    }

    pub(super) fn fetched(&self) -> Vec<(CustomerId, ReportingPeriod)> {
        self.fetched.lock().expect("signals mutex poisoned").clone()
    }
}

impl SignalSource for MemorySignals {
    fn fetch_signals(
        &self,
        customer_id: &CustomerId,
        names: &[String],
        period: ReportingPeriod,
    ) -> Result<BTreeMap<String, RawSignalValue>, SourceError> {
        self.fetched
            .lock()
            .expect("signals mutex poisoned")
            .push((customer_id.clone(), period));

        if self
            .failing
            .lock()
            .expect("signals mutex poisoned")
            .contains(customer_id)
        {
            return Err(SourceError::Unavailable("metrics api timeout".to_string()));
        }

        let values = self.values.lock().expect("signals mutex poisoned");
        let account = values.get(customer_id).ok_or_else(|| SourceError::NoMetrics {
            customer_id: customer_id.clone(),
            period,
        })?;
        Ok(account
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryReports {
    reports: Mutex<BTreeMap<String, Vec<Vec<ReportRow>>>>,
    finalized: Mutex<Vec<ReportHandle>>,
    refuse_provision: Mutex<bool>,
}

impl MemoryReports {
    pub(super) fn refuse_provisioning(&self) {
        *self.refuse_provision.lock().expect("report mutex poisoned") = true;
    }

    /// Appended flushes for a report, one entry per `append` call.
    pub(super) fn flushes(&self, report: &ReportHandle) -> Vec<Vec<ReportRow>> {
        self.reports
            .lock()
            .expect("report mutex poisoned")
            .get(&report.0)
            .cloned()
            .unwrap_or_default()
    }

    pub(super) fn rows(&self, report: &ReportHandle) -> Vec<ReportRow> {
        self.flushes(report).into_iter().flatten().collect()
    }

    pub(super) fn report_count(&self) -> usize {
        self.reports.lock().expect("report mutex poisoned").len()
    }

    pub(super) fn finalized(&self) -> Vec<ReportHandle> {
        self.finalized.lock().expect("report mutex poisoned").clone()
    }
}

impl ReportSink for MemoryReports {
    fn provision(
        &self,
        started_at: DateTime<Utc>,
        _catalog: &SignalCatalog,
    ) -> Result<ReportHandle, ReportError> {
        if *self.refuse_provision.lock().expect("report mutex poisoned") {
            return Err(ReportError::Unavailable("report folder quota exceeded".to_string()));
        }
        let handle = ReportHandle(format!("memory://report-{}", started_at.timestamp()));
        self.reports
            .lock()
            .expect("report mutex poisoned")
            .entry(handle.0.clone())
            .or_default();
        Ok(handle)
    }

    fn append(&self, report: &ReportHandle, rows: &[ReportRow]) -> Result<(), ReportError> {
        let mut reports = self.reports.lock().expect("report mutex poisoned");
        let flushes = reports
            .get_mut(&report.0)
            .ok_or_else(|| ReportError::Missing(report.clone()))?;
        flushes.push(rows.to_vec());
        Ok(())
    }

    fn finalize(&self, report: &ReportHandle) -> Result<(), ReportError> {
        self.finalized
            .lock()
            .expect("report mutex poisoned")
            .push(report.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
    offline: bool,
}

impl MemoryNotifier {
    pub(super) fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub(super) fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if self.offline {
            return Err(NotifyError::Transport("smtp relay refused".to_string()));
        }
        self.sent.lock().expect("notifier mutex poisoned").push((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<MemoryRunStore>,
    pub(super) config: Arc<MemoryConfig>,
    pub(super) fleet: Arc<MemoryFleet>,
    pub(super) signals: Arc<MemorySignals>,
    pub(super) reports: Arc<MemoryReports>,
    pub(super) notifier: Arc<MemoryNotifier>,
}

impl Harness {
    pub(super) fn new(accounts: usize, settings: SettingsMap) -> Self {
        let ids = account_ids(accounts);
        Self::with_parts(
            MemoryFleet::new(ids.clone()),
            MemorySignals::new(metrics_for(&ids)),
            settings,
            MemoryNotifier::default(),
        )
    }

    pub(super) fn with_parts(
        fleet: MemoryFleet,
        signals: MemorySignals,
        settings: SettingsMap,
        notifier: MemoryNotifier,
    ) -> Self {
        Self {
            store: Arc::new(MemoryRunStore::default()),
            config: Arc::new(MemoryConfig::new(definitions(), settings)),
            fleet: Arc::new(fleet),
            signals: Arc::new(signals),
            reports: Arc::new(MemoryReports::default()),
            notifier: Arc::new(notifier),
        }
    }

    pub(super) fn controller(&self) -> RunController {
        RunController::new(RunServices {
            store: self.store.clone(),
            config: self.config.clone(),
            fleet: self.fleet.clone(),
            signals: self.signals.clone(),
            reports: self.reports.clone(),
            notifier: self.notifier.clone(),
        })
    }
}
