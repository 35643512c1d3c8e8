use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tabular::{read_rows, write_rows};
use crate::health::domain::{AccountRecord, CustomerId, RunId, RunRecord};
use crate::health::report::ReportHandle;
use crate::health::repository::{RunStore, StoreError};

const RUN_HEADERS: [&str; 4] = ["run_id", "started_at", "ended_at", "report"];
const ACCOUNT_HEADERS: [&str; 2] = ["customer_id", "processed_at"];

#[derive(Debug, Serialize, Deserialize)]
struct RunRow {
    run_id: u64,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    report: String,
}

impl From<RunRow> for RunRecord {
    fn from(row: RunRow) -> Self {
        RunRecord {
            id: RunId(row.run_id),
            started_at: row.started_at,
            ended_at: row.ended_at,
            report: ReportHandle(row.report),
        }
    }
}

impl From<&RunRecord> for RunRow {
    fn from(record: &RunRecord) -> Self {
        RunRow {
            run_id: record.id.0,
            started_at: record.started_at,
            ended_at: record.ended_at,
            report: record.report.0.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountRow {
    customer_id: String,
    processed_at: Option<DateTime<Utc>>,
}

/// Run log in `runs.csv` and the account snapshot in `accounts.csv`.
///
/// Every mutation rewrites the affected table before returning, so a commit survives a
/// process termination immediately afterwards.
pub struct CsvRunStore {
    runs_path: PathBuf,
    accounts_path: PathBuf,
    guard: Mutex<()>,
}

impl CsvRunStore {
    pub fn new(runs_path: impl Into<PathBuf>, accounts_path: impl Into<PathBuf>) -> Self {
        Self {
            runs_path: runs_path.into(),
            accounts_path: accounts_path.into(),
            guard: Mutex::new(()),
        }
    }

    fn runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let rows: Vec<RunRow> = read_rows(&self.runs_path)?;
        Ok(rows.into_iter().map(RunRecord::from).collect())
    }

    fn write_runs(&self, runs: &[RunRecord]) -> Result<(), StoreError> {
        let rows: Vec<RunRow> = runs.iter().map(RunRow::from).collect();
        write_rows(&self.runs_path, &RUN_HEADERS, &rows)?;
        Ok(())
    }

    fn accounts(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let rows: Vec<AccountRow> = read_rows(&self.accounts_path)?;
        Ok(rows
            .into_iter()
            .map(|row| AccountRecord {
                customer_id: CustomerId(row.customer_id),
                processed_at: row.processed_at,
            })
            .collect())
    }

    fn write_accounts(&self, accounts: &[AccountRecord]) -> Result<(), StoreError> {
        let rows: Vec<AccountRow> = accounts
            .iter()
            .map(|account| AccountRow {
                customer_id: account.customer_id.0.clone(),
                processed_at: account.processed_at,
            })
            .collect();
        write_rows(&self.accounts_path, &ACCOUNT_HEADERS, &rows)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.guard
            .lock()
            .map_err(|_| StoreError::Unavailable("run store lock poisoned".to_string()))
    }
}

impl RunStore for CsvRunStore {
    fn current_run(&self) -> Result<Option<RunRecord>, StoreError> {
        let _guard = self.lock()?;
        let mut open = self.runs()?.into_iter().filter(RunRecord::is_open);
        let current = open.next();
        if let Some(extra) = open.next() {
            return Err(StoreError::Corrupt(format!(
                "more than one open run ({} and {})",
                current.map(|run| run.id.to_string()).unwrap_or_default(),
                extra.id
            )));
        }
        Ok(current)
    }

    fn last_run_start(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let _guard = self.lock()?;
        Ok(self.runs()?.iter().map(|run| run.started_at).max())
    }

    fn open_run(
        &self,
        started_at: DateTime<Utc>,
        report: ReportHandle,
    ) -> Result<RunId, StoreError> {
        let _guard = self.lock()?;
        let mut runs = self.runs()?;
        if let Some(open) = runs.iter().find(|run| run.is_open()) {
            return Err(StoreError::AlreadyOpen(open.id));
        }

        let id = RunId(runs.iter().map(|run| run.id.0).max().unwrap_or(0) + 1);
        runs.push(RunRecord {
            id,
            started_at,
            ended_at: None,
            report,
        });
        self.write_runs(&runs)?;
        Ok(id)
    }

    fn close_run(&self, run: RunId, ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut runs = self.runs()?;
        let record = runs
            .iter_mut()
            .find(|record| record.id == run)
            .ok_or(StoreError::RunNotFound(run))?;
        if record.ended_at.is_some() {
            return Ok(());
        }
        record.ended_at = Some(ended_at);
        self.write_runs(&runs)
    }

    fn snapshot_accounts(&self, ids: &[CustomerId]) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut accounts = self.accounts()?;
        accounts.extend(ids.iter().cloned().map(AccountRecord::unprocessed));
        self.write_accounts(&accounts)
    }

    fn clear_accounts(&self) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        self.write_accounts(&[])
    }

    fn list_unprocessed(&self, limit: usize) -> Result<Vec<CustomerId>, StoreError> {
        let _guard = self.lock()?;
        Ok(self
            .accounts()?
            .into_iter()
            .filter(|account| !account.is_processed())
            .take(limit)
            .map(|account| account.customer_id)
            .collect())
    }

    fn mark_processed(&self, id: &CustomerId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut accounts = self.accounts()?;
        let account = accounts
            .iter_mut()
            .find(|account| &account.customer_id == id)
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))?;
        account.processed_at = Some(at);
        self.write_accounts(&accounts)
    }

    fn all_processed(&self) -> Result<bool, StoreError> {
        let _guard = self.lock()?;
        Ok(self.accounts()?.iter().all(AccountRecord::is_processed))
    }

    fn progress(&self) -> Result<(usize, usize), StoreError> {
        let _guard = self.lock()?;
        let accounts = self.accounts()?;
        let processed = accounts.iter().filter(|account| account.is_processed()).count();
        Ok((processed, accounts.len()))
    }

    fn report_target(&self, run: RunId) -> Result<ReportHandle, StoreError> {
        let _guard = self.lock()?;
        self.runs()?
            .into_iter()
            .find(|record| record.id == run)
            .map(|record| record.report)
            .ok_or(StoreError::RunNotFound(run))
    }
}
