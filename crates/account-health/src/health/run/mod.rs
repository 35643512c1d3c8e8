//! Resumable run state machine and the bounded batch loop it drives.

mod batch;
mod controller;

#[cfg(test)]
mod tests;

pub use batch::{BatchContext, BatchProcessor, BatchSummary};
pub use controller::{days_since, InvocationOutcome, RunController, RunServices, RunState};

use super::report::ReportError;
use super::repository::StoreError;
use super::settings::SettingsError;
use super::signals::CatalogError;
use super::sources::SourceError;

/// Fatal invocation error. Per-account failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Report(#[from] ReportError),
}
