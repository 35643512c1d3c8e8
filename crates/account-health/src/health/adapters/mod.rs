//! File-backed collaborators: the run store, configuration, fleet, metrics, reports,
//! and the notification outbox all live as CSV/JSON-lines files under one data directory.

mod config;
mod fleet;
mod metrics;
mod outbox;
mod report;
mod run_store;
mod tabular;

pub use config::FileConfigSource;
pub use fleet::CsvFleet;
pub use metrics::CsvSignalSource;
pub use outbox::{OutboxMessage, OutboxNotifier};
pub use report::CsvReportSink;
pub use run_store::CsvRunStore;
pub use tabular::TabularError;
