use chrono::{DateTime, Utc};

use super::domain::{CustomerId, RunId, RunRecord};
use super::report::ReportHandle;

/// Durable bookkeeping of runs and of which snapshot accounts are already scored.
///
/// Implementations must make every call durable before returning: the run controller
/// relies on `mark_processed` surviving a termination right after it returns.
pub trait RunStore: Send + Sync {
    /// The open run, if any. At most one run is open at a time.
    fn current_run(&self) -> Result<Option<RunRecord>, StoreError>;

    fn has_open_run(&self) -> Result<bool, StoreError> {
        Ok(self.current_run()?.is_some())
    }

    fn last_run_start(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Appends a new open run. Fails with `AlreadyOpen` if another run is open.
    fn open_run(
        &self,
        started_at: DateTime<Utc>,
        report: ReportHandle,
    ) -> Result<RunId, StoreError>;

    fn close_run(&self, run: RunId, ended_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Registers the run population in order; ids are expected to be unique.
    fn snapshot_accounts(&self, ids: &[CustomerId]) -> Result<(), StoreError>;

    fn clear_accounts(&self) -> Result<(), StoreError>;

    /// Up to `limit` unprocessed accounts in snapshot order.
    fn list_unprocessed(&self, limit: usize) -> Result<Vec<CustomerId>, StoreError>;

    fn mark_processed(&self, id: &CustomerId, at: DateTime<Utc>) -> Result<(), StoreError>;

    fn all_processed(&self) -> Result<bool, StoreError>;

    /// `(processed, total)` for the current snapshot.
    fn progress(&self) -> Result<(usize, usize), StoreError>;

    fn report_target(&self, run: RunId) -> Result<ReportHandle, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("run store unavailable: {0}")]
    Unavailable(String),
    #[error("{0} is still open")]
    AlreadyOpen(RunId),
    #[error("{0} not found")]
    RunNotFound(RunId),
    #[error("account {0} is not part of the current snapshot")]
    AccountNotFound(CustomerId),
    #[error("run store data is corrupt: {0}")]
    Corrupt(String),
}
